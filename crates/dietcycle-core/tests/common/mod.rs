//! Test doubles and a per-test environment shared by the engine's
//! integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;
use tokio::sync::oneshot;

use dietcycle_db::models::{Gender, Goal, User};
use dietcycle_test_utils::{create_test_db, drop_test_db, seed_user};

use dietcycle_core::clock::ManualClock;
use dietcycle_core::cycle::CycleProfile;
use dietcycle_core::link::LinkSigner;
use dietcycle_core::mail::{Email, MailError, Mailer};
use dietcycle_core::recommend::{
    RecommendError, Recommendation, RecommendationRequest, RecommendedMeal, Recommender,
};
use dietcycle_core::service::{DietCycleService, EngineConfig};

pub const LINK_SECRET: &[u8] = b"integration-test-link-secret";
pub const FRONTEND_URL: &str = "https://app.test";

pub const CATALOG: &[&str] = &[
    "Masala Oats",
    "Moong Dal Chilla",
    "Paneer Tikka",
    "Vegetable Upma",
    "Rajma Rice",
    "Palak Tofu",
    "Chana Salad",
    "Quinoa Khichdi",
    "Besan Cheela",
    "Lauki Kofta",
    "Sprout Bowl",
    "Millet Dosa",
];

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

pub fn sample_profile() -> CycleProfile {
    CycleProfile {
        height_cm: 175.0,
        weight_kg: 70.0,
        age: 30,
        gender: Gender::Male,
        goal: Goal::WeightLoss,
        activity_type: "walking".into(),
        preferences: "vegetarian".into(),
        health_conditions: vec![],
        meal_type: "general".into(),
        meal_frequency: 3,
    }
}

pub fn meal(name: &str) -> RecommendedMeal {
    RecommendedMeal {
        name: name.to_owned(),
        calories: 420.0,
        protein_g: 18.0,
        carbs_g: 55.0,
        fat_g: 11.0,
        fiber_g: 7.0,
        sugar_g: 6.0,
        sodium_mg: 350.0,
        instructions: vec!["Prep".into(), "Cook".into()],
        ingredients: serde_json::json!({"base": "1 cup"}),
        image_url: None,
    }
}

// ===========================================================================
// FakeRecommender -- serves meals from a fixed catalog
// ===========================================================================

/// Returns `per_plan` catalog meals per call with fixed metrics
/// (tdee 2200, target 1800). Honors `exclude_recipe_names` unless told not
/// to, which lets tests check the engine's own filtering.
pub struct FakeRecommender {
    catalog: Vec<String>,
    per_plan: AtomicUsize,
    honor_exclusions: AtomicBool,
    failing: AtomicBool,
    requests: Mutex<Vec<RecommendationRequest>>,
    hold: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl FakeRecommender {
    pub fn new(catalog: &[&str], per_plan: usize) -> Self {
        Self {
            catalog: catalog.iter().map(|s| (*s).to_owned()).collect(),
            per_plan: AtomicUsize::new(per_plan),
            honor_exclusions: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            hold: Mutex::new(None),
        }
    }

    /// Park the next call until the returned sender fires. The returned
    /// receiver resolves once that call has built its answer and is waiting.
    pub fn hold_next(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    pub fn ignore_exclusions(&self) {
        self.honor_exclusions.store(false, Ordering::SeqCst);
    }

    pub fn set_per_plan(&self, per_plan: usize) {
        self.per_plan.store(per_plan, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecommendationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Recommender for FakeRecommender {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Recommendation, RecommendError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.failing.load(Ordering::SeqCst) {
            return Err(RecommendError::Api {
                status: 503,
                body: "engine down".into(),
            });
        }

        let honor = self.honor_exclusions.load(Ordering::SeqCst);
        let excluded: HashSet<String> = request
            .exclude_recipe_names
            .iter()
            .map(|n| n.to_lowercase())
            .collect();
        let meals = self
            .catalog
            .iter()
            .filter(|name| !honor || !excluded.contains(&name.to_lowercase()))
            .take(self.per_plan.load(Ordering::SeqCst))
            .map(|name| meal(name))
            .collect();

        let hold = self.hold.lock().unwrap().take();
        if let Some((entered, release)) = hold {
            let _ = entered.send(());
            let _ = release.await;
        }

        Ok(Recommendation {
            bmr: Some(1600.0),
            tdee: Some(2200.0),
            bmi: Some(22.86),
            calorie_target: Some(1800.0),
            meals,
        })
    }
}

// ===========================================================================
// RecordingMailer -- keeps every email it is asked to send
// ===========================================================================

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(true),
        }
    }

    /// Every email handed to the mailer, including ones it rejected.
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Rejected {
                status: 550,
                body: "mailbox unavailable".into(),
            });
        }
        Ok(())
    }
}

// ===========================================================================
// TestEnv
// ===========================================================================

pub struct TestEnv {
    pub pool: PgPool,
    db_name: String,
    pub clock: Arc<ManualClock>,
    pub recommender: Arc<FakeRecommender>,
    pub mailer: Arc<RecordingMailer>,
    pub service: DietCycleService,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with(FakeRecommender::new(CATALOG, 3), RecordingMailer::default()).await
    }

    pub async fn with(recommender: FakeRecommender, mailer: RecordingMailer) -> Self {
        let (pool, db_name) = create_test_db().await;
        let clock = Arc::new(ManualClock::new(start_time()));
        let recommender = Arc::new(recommender);
        let mailer = Arc::new(mailer);

        let config = EngineConfig {
            frontend_url: FRONTEND_URL.into(),
            mail_timeout: Duration::from_secs(2),
            ..EngineConfig::default()
        };
        let service = DietCycleService::new(
            pool.clone(),
            recommender.clone(),
            mailer.clone(),
            clock.clone(),
            LinkSigner::new(LINK_SECRET.to_vec()),
            config,
        );

        Self {
            pool,
            db_name,
            clock,
            recommender,
            mailer,
            service,
        }
    }

    pub async fn user(&self, name: &str) -> User {
        seed_user(&self.pool, name).await
    }

    pub async fn teardown(self) {
        self.service.dispatcher().flush_mail().await;
        self.pool.close().await;
        drop_test_db(&self.db_name).await;
    }
}
