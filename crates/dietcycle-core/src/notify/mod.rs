//! Notification Dispatcher.
//!
//! Every notification is a row first. Email, for the kinds that send one, is
//! handed to a tracked background task after the row is committed, so a slow
//! or failing mail transport can never undo or delay the in-app record.

mod templates;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dietcycle_db::models::{Cycle, Notification, NotificationKind};
use dietcycle_db::queries::cycles::ReminderCandidate;
use dietcycle_db::queries::notifications::{self as db, NewNotification};
use dietcycle_db::queries::{predictions, users};

use crate::clock::Clock;
use crate::cycle::profile::validate_weight;
use crate::error::{CycleError, CycleResult};
use crate::link::LinkSigner;
use crate::mail::{Email, Mailer};
use crate::prediction::Plan;
use crate::projection::round2;

/// Which side of the expected weight a reported weight falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightStatus {
    Above,
    Below,
    AtTarget,
}

impl WeightStatus {
    /// Compare at the 2-decimal precision expected weights are stored with.
    /// Equal only on an exact match after rounding.
    pub fn classify(current: f64, expected: f64) -> Self {
        let (current, expected) = (round2(current), round2(expected));
        if current > expected {
            Self::Above
        } else if current < expected {
            Self::Below
        } else {
            Self::AtTarget
        }
    }

    pub fn kind(self) -> NotificationKind {
        match self {
            Self::Above => NotificationKind::WeightAboveExpected,
            Self::Below => NotificationKind::WeightBelowExpected,
            Self::AtTarget => NotificationKind::WeightAtTarget,
        }
    }
}

impl fmt::Display for WeightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Above => "above",
            Self::Below => "below",
            Self::AtTarget => "at_target",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a weight report.
#[derive(Debug, Clone, Serialize)]
pub struct WeightReport {
    pub status: WeightStatus,
    pub current_weight: f64,
    pub expected_weight: f64,
    /// `current - expected`, rounded to 2 decimals.
    pub difference: f64,
    pub notification: Notification,
}

#[derive(Clone)]
pub struct Dispatcher {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    mailer: Arc<dyn Mailer>,
    links: LinkSigner,
    frontend_url: String,
    mail_timeout: Duration,
    deliveries: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        pool: PgPool,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
        links: LinkSigner,
        frontend_url: impl Into<String>,
        mail_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            clock,
            mailer,
            links,
            frontend_url: frontend_url.into(),
            mail_timeout,
            deliveries: TaskTracker::new(),
        }
    }

    /// In-app notice that a plan is ready. No email.
    pub async fn plan_generated(
        &self,
        user_id: Uuid,
        cycle: &Cycle,
        plan: &Plan,
    ) -> CycleResult<Notification> {
        let (title, message) = templates::plan_generated(
            cycle,
            plan.prediction.calorie_target,
            plan.meals.len(),
            plan.prediction.expected_weight,
        );
        let notification = db::insert_notification(
            &self.pool,
            &NewNotification {
                user_id,
                kind: NotificationKind::DietPlanGenerated,
                title: &title,
                message: &message,
                sent_at: self.clock.now(),
                related_id: Some(cycle.id),
                has_feedback: false,
            },
        )
        .await?;

        debug!(
            user_id = %user_id,
            cycle_id = %cycle.id,
            notification_id = %notification.id,
            "plan notification created"
        );
        Ok(notification)
    }

    /// Record a self-reported weight and tell the user how it compares with
    /// the expected weight.
    ///
    /// When `expected` is omitted the expected weight of the current
    /// prediction on the active cycle is used. The user's weight snapshot
    /// and the notification are written in one transaction; the email goes
    /// out after commit.
    pub async fn report_weight(
        &self,
        user_id: Uuid,
        current: f64,
        expected: Option<f64>,
    ) -> CycleResult<WeightReport> {
        validate_weight("current_weight", current)?;
        let expected = match expected {
            Some(value) => {
                validate_weight("expected_weight", value)?;
                value
            }
            None => {
                predictions::get_current_prediction_on_active_cycle(&self.pool, user_id)
                    .await?
                    .ok_or_else(|| {
                        CycleError::not_found(format!("current prediction for user {user_id}"))
                    })?
                    .expected_weight
            }
        };

        let status = WeightStatus::classify(current, expected);
        let difference = round2(current - expected);
        let now = self.clock.now();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let user = users::get_user(&mut *tx, user_id)
            .await?
            .ok_or_else(|| CycleError::not_found(format!("user {user_id}")))?;
        users::update_weight_snapshot(&mut *tx, user_id, current, now).await?;

        let rendered = templates::weight_report(&user.name, status, current, expected, difference);
        let notification = db::insert_notification(
            &mut *tx,
            &NewNotification {
                user_id,
                kind: status.kind(),
                title: &rendered.title,
                message: &rendered.message,
                sent_at: now,
                related_id: None,
                has_feedback: false,
            },
        )
        .await?;

        tx.commit().await.context("failed to commit transaction")?;

        info!(
            user_id = %user_id,
            status = %status,
            difference,
            notification_id = %notification.id,
            "weight report recorded"
        );

        if notification.kind.sends_email() {
            self.deliver(Email {
                to: user.email,
                subject: rendered.subject,
                html: rendered.html,
            });
        }

        Ok(WeightReport {
            status,
            current_weight: current,
            expected_weight: expected,
            difference,
            notification,
        })
    }

    /// Insert the reminder row for a cycle on the caller's transaction and
    /// return the email to send once that transaction commits.
    pub(crate) async fn record_feedback_reminder(
        &self,
        conn: &mut PgConnection,
        candidate: &ReminderCandidate,
        now: DateTime<Utc>,
    ) -> CycleResult<(Notification, Email)> {
        let url = self
            .links
            .feedback_url(&self.frontend_url, candidate.cycle_id);
        let rendered = templates::feedback_reminder(
            &candidate.name,
            candidate.cycle_number,
            candidate.created_at,
            &url,
        );

        let notification = db::insert_notification(
            conn,
            &NewNotification {
                user_id: candidate.user_id,
                kind: NotificationKind::FeedbackReminder,
                title: &rendered.title,
                message: &rendered.message,
                sent_at: now,
                related_id: Some(candidate.cycle_id),
                has_feedback: true,
            },
        )
        .await?;

        let email = Email {
            to: candidate.email.clone(),
            subject: rendered.subject,
            html: rendered.html,
        };
        Ok((notification, email))
    }

    /// Hand an email to the mailer on a tracked background task. Failures
    /// and timeouts are logged only.
    pub(crate) fn deliver(&self, email: Email) {
        let mailer = Arc::clone(&self.mailer);
        let timeout = self.mail_timeout;
        self.deliveries.spawn(async move {
            match tokio::time::timeout(timeout, mailer.send(&email)).await {
                Ok(Ok(())) => debug!(to = %email.to, subject = %email.subject, "email sent"),
                Ok(Err(e)) => warn!(
                    to = %email.to,
                    subject = %email.subject,
                    error = %e,
                    "email delivery failed"
                ),
                Err(_) => warn!(
                    to = %email.to,
                    subject = %email.subject,
                    timeout_ms = timeout.as_millis() as u64,
                    "email delivery timed out"
                ),
            }
        });
    }

    /// Wait for every email handed out so far to finish.
    pub async fn flush_mail(&self) {
        self.deliveries.close();
        self.deliveries.wait().await;
        self.deliveries.reopen();
    }

    /// The user's notifications, newest first.
    pub async fn list_notifications(&self, user_id: Uuid) -> CycleResult<Vec<Notification>> {
        Ok(db::list_notifications_for_user(&self.pool, user_id).await?)
    }

    /// Flip `read` on a notification the user owns.
    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> CycleResult<()> {
        if db::mark_read(&self.pool, notification_id, user_id).await? {
            Ok(())
        } else {
            Err(CycleError::not_found(format!(
                "notification {notification_id}"
            )))
        }
    }

    pub async fn unread_count(&self, user_id: Uuid) -> CycleResult<i64> {
        Ok(db::unread_count(&self.pool, user_id).await?)
    }

    pub fn links(&self) -> &LinkSigner {
        &self.links
    }
}
