//! Wiring for the whole engine.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use dietcycle_db::models::Cycle;

use crate::clock::Clock;
use crate::cycle::{CycleProfile, CycleStore};
use crate::error::CycleResult;
use crate::feedback::FeedbackRegister;
use crate::link::LinkSigner;
use crate::mail::Mailer;
use crate::notify::Dispatcher;
use crate::prediction::{Plan, PredictionStore};
use crate::projection::CYCLE_LENGTH_DAYS;
use crate::recommend::Recommender;
use crate::regenerate::Regenerator;
use crate::reminder::{ReminderConfig, ReminderScheduler};

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cycle_length_days: i64,
    /// Base URL of the web frontend, used in feedback links.
    pub frontend_url: String,
    pub mail_timeout: Duration,
    pub reminder: ReminderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_length_days: CYCLE_LENGTH_DAYS,
            frontend_url: "http://localhost:5173".to_owned(),
            mail_timeout: Duration::from_secs(10),
            reminder: ReminderConfig::default(),
        }
    }
}

/// Every engine component, built once over a shared pool, clock, and set
/// of collaborators.
#[derive(Clone)]
pub struct DietCycleService {
    pool: PgPool,
    cycles: CycleStore,
    predictions: PredictionStore,
    dispatcher: Dispatcher,
    regenerator: Regenerator,
    feedback: FeedbackRegister,
    scheduler: ReminderScheduler,
}

impl DietCycleService {
    pub fn new(
        pool: PgPool,
        recommender: Arc<dyn Recommender>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        links: LinkSigner,
        config: EngineConfig,
    ) -> Self {
        let cycles = CycleStore::new(pool.clone(), Arc::clone(&clock), config.cycle_length_days);
        let predictions = PredictionStore::new(pool.clone(), Arc::clone(&clock));
        let dispatcher = Dispatcher::new(
            pool.clone(),
            Arc::clone(&clock),
            mailer,
            links,
            config.frontend_url,
            config.mail_timeout,
        );
        let regenerator = Regenerator::new(
            cycles.clone(),
            predictions.clone(),
            dispatcher.clone(),
            recommender,
        );
        let feedback = FeedbackRegister::new(pool.clone(), Arc::clone(&clock), regenerator.clone());
        let scheduler =
            ReminderScheduler::new(pool.clone(), clock, dispatcher.clone(), config.reminder);

        Self {
            pool,
            cycles,
            predictions,
            dispatcher,
            regenerator,
            feedback,
            scheduler,
        }
    }

    /// Open a cycle and produce its first plan.
    ///
    /// The cycle stays committed when planning fails; the error is returned
    /// and the user can retry with [`Regenerator::regenerate`].
    pub async fn start_cycle(
        &self,
        user_id: Uuid,
        profile: &CycleProfile,
    ) -> CycleResult<(Cycle, Plan)> {
        let cycle = self.cycles.create_cycle(user_id, profile).await?;
        match self.regenerator.regenerate(user_id, cycle.id, None).await {
            Ok(plan) => Ok((cycle, plan)),
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    cycle_id = %cycle.id,
                    error = %e,
                    "cycle created but first plan failed"
                );
                Err(e)
            }
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn cycles(&self) -> &CycleStore {
        &self.cycles
    }

    pub fn predictions(&self) -> &PredictionStore {
        &self.predictions
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn regenerator(&self) -> &Regenerator {
        &self.regenerator
    }

    pub fn feedback(&self) -> &FeedbackRegister {
        &self.feedback
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }
}
