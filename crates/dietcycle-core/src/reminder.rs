//! Reminder Scheduler.
//!
//! Periodically finds cycles old enough to have ended that still have no
//! feedback and sends one `FEEDBACK_REMINDER` per cycle per debounce window.
//! Each cycle is handled in its own transaction under a row lock on the
//! cycle, so overlapping runs cannot both send for the same cycle.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dietcycle_db::models::NotificationKind;
use dietcycle_db::queries::cycles::{self, ReminderCandidate};
use dietcycle_db::queries::{feedback, notifications};

use crate::clock::Clock;
use crate::error::{CycleError, CycleResult};
use crate::notify::Dispatcher;
use crate::projection::CYCLE_LENGTH_DAYS;

/// Thresholds for the scheduler. Both are measured against the injected
/// clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderConfig {
    /// Minimum age of a cycle before it is eligible for a reminder.
    pub reminder_age: Duration,
    /// Minimum time between two reminders for the same cycle.
    pub debounce_window: Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            reminder_age: Duration::days(CYCLE_LENGTH_DAYS),
            debounce_window: Duration::days(1),
        }
    }
}

/// Tally of one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub candidates: usize,
    pub sent: usize,
    pub debounced: usize,
    pub already_answered: usize,
    pub failed: usize,
}

enum Outcome {
    Sent,
    Debounced,
    AlreadyAnswered,
}

#[derive(Clone)]
pub struct ReminderScheduler {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    config: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(
        pool: PgPool,
        clock: Arc<dyn Clock>,
        dispatcher: Dispatcher,
        config: ReminderConfig,
    ) -> Self {
        Self {
            pool,
            clock,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> ReminderConfig {
        self.config
    }

    /// One pass over every eligible cycle. A failure on one cycle is logged
    /// and counted; it never stops the pass.
    pub async fn run_once(&self) -> CycleResult<ReminderReport> {
        let now = self.clock.now();
        let created_before = now - self.config.reminder_age;
        let due = cycles::list_cycles_awaiting_feedback(&self.pool, created_before).await?;

        let mut report = ReminderReport {
            candidates: due.len(),
            ..ReminderReport::default()
        };

        for candidate in &due {
            match self.remind_cycle(candidate, now).await {
                Ok(Outcome::Sent) => report.sent += 1,
                Ok(Outcome::Debounced) => report.debounced += 1,
                Ok(Outcome::AlreadyAnswered) => report.already_answered += 1,
                Err(e) => {
                    warn!(
                        cycle_id = %candidate.cycle_id,
                        user_id = %candidate.user_id,
                        error = %e,
                        "failed to send feedback reminder"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            candidates = report.candidates,
            sent = report.sent,
            debounced = report.debounced,
            already_answered = report.already_answered,
            failed = report.failed,
            "reminder pass complete"
        );
        Ok(report)
    }

    async fn remind_cycle(
        &self,
        candidate: &ReminderCandidate,
        now: DateTime<Utc>,
    ) -> CycleResult<Outcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        if !cycles::lock_cycle(&mut *tx, candidate.cycle_id).await? {
            return Err(CycleError::not_found(format!(
                "cycle {}",
                candidate.cycle_id
            )));
        }

        // Re-check under the lock: the listing ran outside it.
        if feedback::feedback_exists(&mut *tx, candidate.cycle_id).await? {
            return Ok(Outcome::AlreadyAnswered);
        }
        let since = now - self.config.debounce_window;
        if notifications::sent_since(
            &mut *tx,
            candidate.cycle_id,
            NotificationKind::FeedbackReminder,
            since,
        )
        .await?
        {
            debug!(cycle_id = %candidate.cycle_id, "reminder debounced");
            return Ok(Outcome::Debounced);
        }

        let (notification, email) = self
            .dispatcher
            .record_feedback_reminder(&mut *tx, candidate, now)
            .await?;

        tx.commit().await.context("failed to commit transaction")?;

        info!(
            cycle_id = %candidate.cycle_id,
            user_id = %candidate.user_id,
            notification_id = %notification.id,
            "feedback reminder sent"
        );
        self.dispatcher.deliver(email);
        Ok(Outcome::Sent)
    }

    /// Run a pass every `every` until `cancel` fires. The first pass runs
    /// immediately; ticks missed while a pass is running are skipped.
    pub async fn run(&self, every: std::time::Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("reminder scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "reminder pass failed");
                    }
                }
            }
        }
    }
}
