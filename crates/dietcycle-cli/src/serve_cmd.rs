use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use dietcycle_core::CycleError;
use dietcycle_core::cycle::CycleProfile;
use dietcycle_core::feedback::FeedbackSubmission;
use dietcycle_core::prediction::Plan;
use dietcycle_core::service::DietCycleService;
use dietcycle_db::models::{Cycle, Notification};
use dietcycle_db::queries::users;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
    field: Option<&'static str>,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            field: None,
        }
    }

    pub fn conflict(field: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
            field: Some(field),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
            field: None,
        }
    }
}

impl From<CycleError> for AppError {
    fn from(err: CycleError) -> Self {
        let (status, field) = match &err {
            CycleError::Validation { field, .. } => (StatusCode::BAD_REQUEST, Some(*field)),
            CycleError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            CycleError::ExhaustedRecipes => (StatusCode::CONFLICT, None),
            CycleError::Upstream(_) => (StatusCode::BAD_GATEWAY, None),
            CycleError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        Self {
            status,
            message: format!("{err:#}"),
            field,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        let body = match self.field {
            Some(field) => serde_json::json!({ "error": self.message, "field": field }),
            None => serde_json::json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NewUserRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub updated_weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct WeightRequest {
    pub current_weight: f64,
    #[serde(default)]
    pub expected_weight: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct StartedCycleResponse {
    pub cycle: Cycle,
    pub plan: Plan,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub unread: i64,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackLinkResponse {
    pub cycle_id: Uuid,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(service: DietCycleService) -> Router {
    Router::new()
        .route("/api/users", post(create_user))
        .route(
            "/api/users/{user_id}/cycles",
            get(list_cycles).post(start_cycle),
        )
        .route("/api/users/{user_id}/cycles/active", get(get_active_cycle))
        .route(
            "/api/users/{user_id}/cycles/{cycle_id}/regenerate",
            post(regenerate_plan),
        )
        .route(
            "/api/users/{user_id}/cycles/{cycle_id}/feedback",
            get(get_feedback),
        )
        .route("/api/users/{user_id}/prediction", get(get_current_prediction))
        .route(
            "/api/users/{user_id}/predictions/{prediction_id}",
            get(get_prediction),
        )
        .route("/api/users/{user_id}/feedback", post(submit_feedback))
        .route("/api/users/{user_id}/weight", post(report_weight))
        .route("/api/users/{user_id}/notifications", get(list_notifications))
        .route(
            "/api/users/{user_id}/notifications/{notification_id}/read",
            post(mark_notification_read),
        )
        .route("/api/feedback-links/{token}", get(verify_feedback_link))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(service: DietCycleService, bind: &str, port: u16) -> Result<()> {
    let app = build_router(service);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("dietcycle serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("dietcycle serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C; shutting down");
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_user(
    State(service): State<DietCycleService>,
    Json(req): Json<NewUserRequest>,
) -> Result<axum::response::Response, AppError> {
    let email = req.email.trim();
    let name = req.name.trim();
    if !email.contains('@') {
        return Err(AppError::from(CycleError::validation(
            "email",
            "must be an email address",
        )));
    }
    if name.is_empty() {
        return Err(AppError::from(CycleError::validation("name", "must not be empty")));
    }

    let user = users::insert_user(service.pool(), email, name)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::conflict("email", format!("{email} is already registered")))?;

    Ok((StatusCode::CREATED, Json(user)).into_response())
}

async fn start_cycle(
    State(service): State<DietCycleService>,
    Path(user_id): Path<Uuid>,
    Json(profile): Json<CycleProfile>,
) -> Result<axum::response::Response, AppError> {
    let (cycle, plan) = service.start_cycle(user_id, &profile).await?;
    Ok((StatusCode::CREATED, Json(StartedCycleResponse { cycle, plan })).into_response())
}

async fn list_cycles(
    State(service): State<DietCycleService>,
    Path(user_id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let cycles = service.cycles().list_cycles(user_id).await?;
    Ok(Json(cycles).into_response())
}

async fn get_active_cycle(
    State(service): State<DietCycleService>,
    Path(user_id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let cycle = service.cycles().get_active_cycle(user_id).await?;
    Ok(Json(cycle).into_response())
}

async fn regenerate_plan(
    State(service): State<DietCycleService>,
    Path((user_id, cycle_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RegenerateRequest>,
) -> Result<axum::response::Response, AppError> {
    let plan = service
        .regenerator()
        .regenerate(user_id, cycle_id, req.updated_weight)
        .await?;
    Ok((StatusCode::CREATED, Json(plan)).into_response())
}

async fn get_feedback(
    State(service): State<DietCycleService>,
    Path((user_id, cycle_id)): Path<(Uuid, Uuid)>,
) -> Result<axum::response::Response, AppError> {
    let feedback = service.feedback().get_feedback(user_id, cycle_id).await?;
    Ok(Json(feedback).into_response())
}

async fn get_current_prediction(
    State(service): State<DietCycleService>,
    Path(user_id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let plan = service.predictions().get_current_prediction(user_id).await?;
    Ok(Json(plan).into_response())
}

async fn get_prediction(
    State(service): State<DietCycleService>,
    Path((user_id, prediction_id)): Path<(Uuid, Uuid)>,
) -> Result<axum::response::Response, AppError> {
    let plan = service.predictions().get_plan(user_id, prediction_id).await?;
    Ok(Json(plan).into_response())
}

async fn submit_feedback(
    State(service): State<DietCycleService>,
    Path(user_id): Path<Uuid>,
    Json(submission): Json<FeedbackSubmission>,
) -> Result<axum::response::Response, AppError> {
    let outcome = service
        .feedback()
        .submit_feedback(user_id, &submission)
        .await?;
    Ok(Json(outcome).into_response())
}

async fn report_weight(
    State(service): State<DietCycleService>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<WeightRequest>,
) -> Result<axum::response::Response, AppError> {
    let report = service
        .dispatcher()
        .report_weight(user_id, req.current_weight, req.expected_weight)
        .await?;
    Ok(Json(report).into_response())
}

async fn list_notifications(
    State(service): State<DietCycleService>,
    Path(user_id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let dispatcher = service.dispatcher();
    let notifications = dispatcher.list_notifications(user_id).await?;
    let unread = dispatcher.unread_count(user_id).await?;
    Ok(Json(NotificationsResponse {
        unread,
        notifications,
    })
    .into_response())
}

async fn mark_notification_read(
    State(service): State<DietCycleService>,
    Path((user_id, notification_id)): Path<(Uuid, Uuid)>,
) -> Result<axum::response::Response, AppError> {
    service
        .dispatcher()
        .mark_read(notification_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn verify_feedback_link(
    State(service): State<DietCycleService>,
    Path(token): Path<String>,
) -> Result<axum::response::Response, AppError> {
    let cycle_id = service
        .dispatcher()
        .links()
        .verify(&token)
        .map_err(|e| AppError::bad_request(e.to_string()))?;
    Ok(Json(FeedbackLinkResponse { cycle_id }).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
