//! Prediction Store: persists computed plans and owns the "one current
//! prediction per user" rule. Also the source of truth for meal dedup.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use dietcycle_db::models::{Meal, Prediction};
use dietcycle_db::queries::predictions::{self as db, NewMeal, NewPrediction};
use dietcycle_db::queries::{cycles, users};

use crate::clock::Clock;
use crate::error::{CycleError, CycleResult};
use crate::recommend::{RecommendedMeal, normalize_meal_name};

/// Numbers stored on a prediction row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionMetrics {
    pub bmr: f64,
    pub tdee: f64,
    pub bmi: f64,
    pub calorie_target: f64,
    pub expected_weight: f64,
    pub weight_change: f64,
}

/// A prediction together with its meals in plan order.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub meals: Vec<Meal>,
}

#[derive(Clone)]
pub struct PredictionStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PredictionStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Insert a new current prediction and its meals, superseding whatever
    /// was current for the user. One transaction, serialized per user. The
    /// cycle must still be active when the transaction runs.
    pub async fn create_prediction(
        &self,
        user_id: Uuid,
        cycle_id: Uuid,
        metrics: &PredictionMetrics,
        meals: &[RecommendedMeal],
    ) -> CycleResult<Plan> {
        let now = self.clock.now();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        if !users::lock_user(&mut *tx, user_id).await? {
            return Err(CycleError::not_found(format!("user {user_id}")));
        }
        // Checked under the lock: a cycle started while the recommender was
        // working deactivates this one, and its plan must stay current.
        let cycle = cycles::lock_cycle_for_user(&mut *tx, cycle_id, user_id)
            .await?
            .ok_or_else(|| CycleError::not_found(format!("cycle {cycle_id}")))?;
        if !cycle.active {
            return Err(CycleError::validation(
                "cycle_id",
                "cycle is no longer active; start a new cycle instead",
            ));
        }

        let superseded = db::clear_current(&mut *tx, user_id).await?;
        let prediction = db::insert_prediction(
            &mut *tx,
            &NewPrediction {
                user_id,
                cycle_id,
                bmr: metrics.bmr,
                tdee: metrics.tdee,
                bmi: metrics.bmi,
                calorie_target: metrics.calorie_target,
                expected_weight: metrics.expected_weight,
                weight_change: metrics.weight_change,
                created_at: now,
            },
        )
        .await?;

        let mut rows = Vec::with_capacity(meals.len());
        for (position, meal) in meals.iter().enumerate() {
            let name_key = normalize_meal_name(&meal.name);
            let row = db::insert_meal(
                &mut *tx,
                prediction.id,
                &NewMeal {
                    position: i32::try_from(position).context("meal position overflow")?,
                    name: meal.name.trim(),
                    name_key: &name_key,
                    calories: meal.calories,
                    protein_g: meal.protein_g,
                    carbs_g: meal.carbs_g,
                    fat_g: meal.fat_g,
                    fiber_g: meal.fiber_g,
                    sugar_g: meal.sugar_g,
                    sodium_mg: meal.sodium_mg,
                    instructions: &meal.instructions,
                    ingredients: &meal.ingredients,
                    image_url: meal.image_url.as_deref(),
                },
            )
            .await?;
            rows.push(row);
        }

        tx.commit().await.context("failed to commit transaction")?;

        info!(
            user_id = %user_id,
            cycle_id = %cycle_id,
            prediction_id = %prediction.id,
            meals = rows.len(),
            superseded,
            "prediction created"
        );
        Ok(Plan {
            prediction,
            meals: rows,
        })
    }

    /// The plan currently shown to the user.
    ///
    /// Only a prediction attached to the active cycle counts. A current flag
    /// left on a prediction whose cycle was since deactivated is reported as
    /// not found and logged.
    pub async fn get_current_prediction(&self, user_id: Uuid) -> CycleResult<Plan> {
        if let Some(prediction) =
            db::get_current_prediction_on_active_cycle(&self.pool, user_id).await?
        {
            let meals = db::list_meals(&self.pool, prediction.id).await?;
            return Ok(Plan { prediction, meals });
        }

        if let Some(orphan) = db::get_current_prediction(&self.pool, user_id).await? {
            warn!(
                user_id = %user_id,
                prediction_id = %orphan.id,
                cycle_id = %orphan.cycle_id,
                "current prediction is attached to an inactive cycle"
            );
        }
        Err(CycleError::not_found(format!(
            "current prediction for user {user_id}"
        )))
    }

    /// A specific plan, only if it belongs to the user.
    pub async fn get_plan(&self, user_id: Uuid, prediction_id: Uuid) -> CycleResult<Plan> {
        let prediction = db::get_prediction_for_user(&self.pool, prediction_id, user_id)
            .await?
            .ok_or_else(|| CycleError::not_found(format!("prediction {prediction_id}")))?;
        let meals = db::list_meals(&self.pool, prediction.id).await?;
        Ok(Plan { prediction, meals })
    }

    /// Normalized names of every meal ever recommended to the user, across
    /// all cycles and predictions.
    pub async fn list_meal_names(&self, user_id: Uuid) -> CycleResult<BTreeSet<String>> {
        let names = db::list_meal_name_keys(&self.pool, user_id).await?;
        Ok(names.into_iter().collect())
    }
}
