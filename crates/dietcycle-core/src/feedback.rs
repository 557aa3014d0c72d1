//! Feedback Register: one upserted feedback row per cycle, optionally
//! followed by a regeneration run.

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use dietcycle_db::models::Feedback;
use dietcycle_db::queries::feedback::{self as db, FeedbackUpsert};
use dietcycle_db::queries::{cycles, users};

use crate::clock::Clock;
use crate::cycle::profile::validate_weight;
use crate::error::{CycleError, CycleResult};
use crate::prediction::Plan;
use crate::regenerate::Regenerator;

/// End-of-cycle feedback as submitted by the user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackSubmission {
    pub cycle_id: Option<Uuid>,
    /// Weight at the end of the cycle, kg.
    #[serde(default, alias = "weight_change")]
    pub reported_weight: Option<f64>,
    #[serde(default)]
    pub achieved: Option<bool>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub regenerate: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Recorded { feedback: Feedback },
    Regenerated { feedback: Feedback, plan: Plan },
}

impl FeedbackOutcome {
    pub fn feedback(&self) -> &Feedback {
        match self {
            Self::Recorded { feedback } | Self::Regenerated { feedback, .. } => feedback,
        }
    }
}

#[derive(Clone)]
pub struct FeedbackRegister {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    regenerator: Regenerator,
}

impl FeedbackRegister {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, regenerator: Regenerator) -> Self {
        Self {
            pool,
            clock,
            regenerator,
        }
    }

    /// Upsert the feedback for a cycle the user owns.
    ///
    /// A reported weight also overwrites the cycle's stored weight and the
    /// user's weight snapshot, in the same transaction as the upsert. When
    /// `regenerate` is set the new plan is produced after that commit, so a
    /// failing recommender leaves the feedback in place.
    pub async fn submit_feedback(
        &self,
        user_id: Uuid,
        submission: &FeedbackSubmission,
    ) -> CycleResult<FeedbackOutcome> {
        let cycle_id = submission
            .cycle_id
            .ok_or_else(|| CycleError::validation("cycle_id", "is required"))?;
        if let Some(weight) = submission.reported_weight {
            validate_weight("reported_weight", weight)?;
        }
        let note = submission
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let now = self.clock.now();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        if cycles::lock_cycle_for_user(&mut *tx, cycle_id, user_id)
            .await?
            .is_none()
        {
            return Err(CycleError::validation(
                "cycle_id",
                "does not refer to one of your cycles",
            ));
        }

        let feedback = db::upsert_feedback(
            &mut *tx,
            &FeedbackUpsert {
                cycle_id,
                user_id,
                reported_weight: submission.reported_weight,
                achieved: submission.achieved,
                note,
                at: now,
            },
        )
        .await?;

        if let Some(weight) = submission.reported_weight {
            cycles::update_cycle_weight(&mut *tx, cycle_id, weight).await?;
            users::update_weight_snapshot(&mut *tx, user_id, weight, now).await?;
        }

        tx.commit().await.context("failed to commit transaction")?;

        info!(
            user_id = %user_id,
            cycle_id = %cycle_id,
            feedback_id = %feedback.id,
            weight_reported = submission.reported_weight.is_some(),
            regenerate = submission.regenerate,
            "feedback recorded"
        );

        if !submission.regenerate {
            return Ok(FeedbackOutcome::Recorded { feedback });
        }

        let plan = self
            .regenerator
            .regenerate(user_id, cycle_id, submission.reported_weight)
            .await?;
        Ok(FeedbackOutcome::Regenerated { feedback, plan })
    }

    pub async fn get_feedback(&self, user_id: Uuid, cycle_id: Uuid) -> CycleResult<Feedback> {
        db::get_feedback_for_cycle(&self.pool, cycle_id)
            .await?
            .filter(|f| f.user_id == user_id)
            .ok_or_else(|| CycleError::not_found(format!("feedback for cycle {cycle_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submission_accepts_weight_change_alias() {
        let s: FeedbackSubmission = serde_json::from_value(json!({
            "cycle_id": "0b6f3c1e-8f57-4a51-9a0c-4f7d2c9e1a11",
            "weight_change": 68.4,
            "achieved": true
        }))
        .unwrap();
        assert_eq!(s.reported_weight, Some(68.4));
        assert!(!s.regenerate);
        assert!(s.note.is_none());
    }

    #[test]
    fn missing_cycle_id_deserializes_as_none() {
        let s: FeedbackSubmission = serde_json::from_value(json!({"regenerate": true})).unwrap();
        assert!(s.cycle_id.is_none());
        assert!(s.regenerate);
    }
}
