//! Cycle Store: creates cycles and owns the "one active cycle per user" rule.

pub mod profile;

use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use dietcycle_db::models::Cycle;
use dietcycle_db::queries::cycles::{self as db, NewCycle};
use dietcycle_db::queries::users;

use crate::clock::Clock;
use crate::error::{CycleError, CycleResult};

pub use profile::CycleProfile;

/// Cycle persistence with the single-active invariant.
///
/// Creating a cycle locks the owning user row, so two concurrent creations
/// for the same user serialize: the later one deactivates the earlier one's
/// cycle and takes the next number.
#[derive(Clone)]
pub struct CycleStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    cycle_length_days: i64,
}

impl CycleStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, cycle_length_days: i64) -> Self {
        Self {
            pool,
            clock,
            cycle_length_days,
        }
    }

    /// Open a new cycle for the user and deactivate every other one.
    ///
    /// The profile is validated before any database work. The new cycle
    /// starts now and ends `cycle_length_days` later.
    pub async fn create_cycle(&self, user_id: Uuid, profile: &CycleProfile) -> CycleResult<Cycle> {
        profile.validate()?;
        let profile = profile.normalized();

        let now = self.clock.now();
        let end_date = now + Duration::days(self.cycle_length_days);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        if !users::lock_user(&mut *tx, user_id).await? {
            return Err(CycleError::not_found(format!("user {user_id}")));
        }

        let cycle_number = db::max_cycle_number(&mut *tx, user_id).await? + 1;
        let deactivated = db::deactivate_cycles(&mut *tx, user_id).await?;

        let cycle = db::insert_cycle(
            &mut *tx,
            &NewCycle {
                user_id,
                cycle_number,
                start_date: now,
                end_date,
                height_cm: profile.height_cm,
                weight_kg: profile.weight_kg,
                age: profile.age,
                gender: profile.gender,
                goal: profile.goal,
                activity_type: &profile.activity_type,
                preferences: &profile.preferences,
                health_conditions: &profile.health_conditions,
                meal_type: &profile.meal_type,
                meal_frequency: profile.meal_frequency,
                created_at: now,
            },
        )
        .await?;

        tx.commit().await.context("failed to commit transaction")?;

        info!(
            user_id = %user_id,
            cycle_id = %cycle.id,
            cycle_number,
            deactivated,
            "cycle created"
        );
        Ok(cycle)
    }

    /// The user's active cycle.
    pub async fn get_active_cycle(&self, user_id: Uuid) -> CycleResult<Cycle> {
        db::get_active_cycle(&self.pool, user_id)
            .await?
            .ok_or_else(|| CycleError::not_found(format!("active cycle for user {user_id}")))
    }

    /// A specific cycle, only if it belongs to the user.
    pub async fn get_cycle(&self, user_id: Uuid, cycle_id: Uuid) -> CycleResult<Cycle> {
        db::get_cycle_for_user(&self.pool, cycle_id, user_id)
            .await?
            .ok_or_else(|| CycleError::not_found(format!("cycle {cycle_id}")))
    }

    /// Every cycle of the user, newest first.
    pub async fn list_cycles(&self, user_id: Uuid) -> CycleResult<Vec<Cycle>> {
        Ok(db::list_cycles_for_user(&self.pool, user_id).await?)
    }

    pub fn cycle_length_days(&self) -> i64 {
        self.cycle_length_days
    }
}
