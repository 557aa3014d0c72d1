//! Regeneration Engine: asks the recommender for a fresh plan that repeats
//! no meal the user has ever been served, then stores it as current.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cycle::CycleStore;
use crate::cycle::profile::validate_weight;
use crate::error::{CycleError, CycleResult};
use crate::notify::Dispatcher;
use crate::prediction::{Plan, PredictionMetrics, PredictionStore};
use crate::projection::{activity_multiplier, body_mass_index, project_weight, round2};
use crate::recommend::{
    RecommendError, Recommendation, RecommendationRequest, RecommendedMeal, Recommender,
    normalize_meal_name,
};

#[derive(Clone)]
pub struct Regenerator {
    cycles: CycleStore,
    predictions: PredictionStore,
    dispatcher: Dispatcher,
    recommender: Arc<dyn Recommender>,
}

impl Regenerator {
    pub fn new(
        cycles: CycleStore,
        predictions: PredictionStore,
        dispatcher: Dispatcher,
        recommender: Arc<dyn Recommender>,
    ) -> Self {
        Self {
            cycles,
            predictions,
            dispatcher,
            recommender,
        }
    }

    /// Produce and store a new current plan for an active cycle.
    ///
    /// Uses `updated_weight` when given, else the cycle's stored weight.
    /// Nothing is written when the recommender fails or when every meal it
    /// offers was already served. Not idempotent: each call consumes the
    /// meals it returns from the user's future catalog.
    pub async fn regenerate(
        &self,
        user_id: Uuid,
        cycle_id: Uuid,
        updated_weight: Option<f64>,
    ) -> CycleResult<Plan> {
        let cycle = self.cycles.get_cycle(user_id, cycle_id).await?;
        if !cycle.active {
            return Err(CycleError::validation(
                "cycle_id",
                "cycle is no longer active; start a new cycle instead",
            ));
        }
        if let Some(weight) = updated_weight {
            validate_weight("updated_weight", weight)?;
        }
        let weight_kg = updated_weight.unwrap_or(cycle.weight_kg);

        let exclude = self.predictions.list_meal_names(user_id).await?;
        let request = RecommendationRequest::for_cycle(&cycle, weight_kg, &exclude);
        let recommendation = self.recommender.recommend(&request).await?;

        let meals = fresh_meals(&recommendation.meals, &exclude);
        if meals.is_empty() {
            warn!(
                user_id = %user_id,
                cycle_id = %cycle_id,
                excluded = exclude.len(),
                offered = recommendation.meals.len(),
                "recipe catalog exhausted"
            );
            return Err(CycleError::ExhaustedRecipes);
        }

        let metrics = metrics_for(
            &recommendation,
            &cycle.activity_type,
            cycle.height_cm,
            weight_kg,
            self.cycles.cycle_length_days(),
        )?;
        let plan = self
            .predictions
            .create_prediction(user_id, cycle_id, &metrics, &meals)
            .await?;

        info!(
            user_id = %user_id,
            cycle_id = %cycle_id,
            prediction_id = %plan.prediction.id,
            meals = plan.meals.len(),
            dropped = recommendation.meals.len() - meals.len(),
            expected_weight = metrics.expected_weight,
            "plan regenerated"
        );

        // The plan is committed; a failed in-app notice must not fail the call.
        if let Err(e) = self.dispatcher.plan_generated(user_id, &cycle, &plan).await {
            warn!(
                user_id = %user_id,
                prediction_id = %plan.prediction.id,
                error = %e,
                "failed to record plan notification"
            );
        }

        Ok(plan)
    }
}

/// Meals whose normalized name is neither in `exclude` nor repeated earlier
/// in the same response, in the engine's order.
fn fresh_meals(meals: &[RecommendedMeal], exclude: &BTreeSet<String>) -> Vec<RecommendedMeal> {
    let mut seen = HashSet::new();
    meals
        .iter()
        .filter(|meal| {
            let key = normalize_meal_name(&meal.name);
            !key.is_empty() && !exclude.contains(&key) && seen.insert(key)
        })
        .cloned()
        .collect()
}

/// Fill in the stored metrics. BMR and the calorie target must come from the
/// engine; TDEE and BMI are derived locally when it leaves them out.
fn metrics_for(
    recommendation: &Recommendation,
    activity_type: &str,
    height_cm: f64,
    weight_kg: f64,
    cycle_length_days: i64,
) -> CycleResult<PredictionMetrics> {
    let bmr = recommendation.bmr.ok_or(RecommendError::Incomplete("bmr"))?;
    let calorie_target = recommendation
        .calorie_target
        .ok_or(RecommendError::Incomplete("calorie_target"))?;
    let tdee = recommendation
        .tdee
        .unwrap_or_else(|| round2(bmr * activity_multiplier(activity_type)));
    let bmi = recommendation
        .bmi
        .unwrap_or_else(|| body_mass_index(weight_kg, height_cm));

    let projection = project_weight(weight_kg, tdee, calorie_target, cycle_length_days);
    Ok(PredictionMetrics {
        bmr,
        tdee,
        bmi,
        calorie_target,
        expected_weight: projection.expected_weight,
        weight_change: projection.weight_change_kg,
    })
}
