//! Database query functions for the `predictions` and `meals` tables.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Meal, Prediction};

/// Parameters for inserting a new prediction row.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub user_id: Uuid,
    pub cycle_id: Uuid,
    pub bmr: f64,
    pub tdee: f64,
    pub bmi: f64,
    pub calorie_target: f64,
    pub expected_weight: f64,
    pub weight_change: f64,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a meal row. `name_key` is the normalized dedup
/// key and must be computed by the caller.
#[derive(Debug, Clone)]
pub struct NewMeal<'a> {
    pub position: i32,
    pub name: &'a str,
    pub name_key: &'a str,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub sugar_g: f64,
    pub sodium_mg: f64,
    pub instructions: &'a [String],
    pub ingredients: &'a serde_json::Value,
    pub image_url: Option<&'a str>,
}

/// Clear the `is_current` flag on every prediction of the user.
pub async fn clear_current(conn: &mut PgConnection, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE predictions SET is_current = false WHERE user_id = $1 AND is_current",
    )
    .bind(user_id)
    .execute(conn)
    .await
    .context("failed to clear current prediction flag")?;

    Ok(result.rows_affected())
}

/// Insert a new prediction flagged current.
pub async fn insert_prediction(
    conn: &mut PgConnection,
    new: &NewPrediction,
) -> Result<Prediction> {
    let prediction = sqlx::query_as::<_, Prediction>(
        "INSERT INTO predictions (user_id, cycle_id, bmr, tdee, bmi, calorie_target, \
         expected_weight, weight_change, is_current, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, true, $9) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.cycle_id)
    .bind(new.bmr)
    .bind(new.tdee)
    .bind(new.bmi)
    .bind(new.calorie_target)
    .bind(new.expected_weight)
    .bind(new.weight_change)
    .bind(new.created_at)
    .fetch_one(conn)
    .await
    .context("failed to insert prediction")?;

    Ok(prediction)
}

/// Insert one meal belonging to a prediction.
pub async fn insert_meal(
    conn: &mut PgConnection,
    prediction_id: Uuid,
    meal: &NewMeal<'_>,
) -> Result<Meal> {
    let row = sqlx::query_as::<_, Meal>(
        "INSERT INTO meals (prediction_id, position, name, name_key, calories, protein_g, \
         carbs_g, fat_g, fiber_g, sugar_g, sodium_mg, instructions, ingredients, image_url) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         RETURNING *",
    )
    .bind(prediction_id)
    .bind(meal.position)
    .bind(meal.name)
    .bind(meal.name_key)
    .bind(meal.calories)
    .bind(meal.protein_g)
    .bind(meal.carbs_g)
    .bind(meal.fat_g)
    .bind(meal.fiber_g)
    .bind(meal.sugar_g)
    .bind(meal.sodium_mg)
    .bind(meal.instructions)
    .bind(meal.ingredients)
    .bind(meal.image_url)
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to insert meal {:?}", meal.name))?;

    Ok(row)
}

/// Fetch a prediction by ID, scoped to its owner.
pub async fn get_prediction_for_user<'e, E>(
    executor: E,
    prediction_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Prediction>>
where
    E: PgExecutor<'e>,
{
    let prediction = sqlx::query_as::<_, Prediction>(
        "SELECT * FROM predictions WHERE id = $1 AND user_id = $2",
    )
    .bind(prediction_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .context("failed to fetch prediction")?;

    Ok(prediction)
}

/// The user's prediction flagged current, whatever the state of its cycle.
pub async fn get_current_prediction<'e, E>(executor: E, user_id: Uuid) -> Result<Option<Prediction>>
where
    E: PgExecutor<'e>,
{
    let prediction = sqlx::query_as::<_, Prediction>(
        "SELECT * FROM predictions WHERE user_id = $1 AND is_current",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .context("failed to fetch current prediction")?;

    Ok(prediction)
}

/// The user's current prediction, only if it hangs off the active cycle.
pub async fn get_current_prediction_on_active_cycle<'e, E>(
    executor: E,
    user_id: Uuid,
) -> Result<Option<Prediction>>
where
    E: PgExecutor<'e>,
{
    let prediction = sqlx::query_as::<_, Prediction>(
        "SELECT p.* FROM predictions p \
         JOIN cycles c ON c.id = p.cycle_id \
         WHERE p.user_id = $1 AND p.is_current AND c.active",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .context("failed to fetch current prediction for active cycle")?;

    Ok(prediction)
}

/// List the meals of a prediction in plan order.
pub async fn list_meals<'e, E>(executor: E, prediction_id: Uuid) -> Result<Vec<Meal>>
where
    E: PgExecutor<'e>,
{
    let meals = sqlx::query_as::<_, Meal>(
        "SELECT * FROM meals WHERE prediction_id = $1 ORDER BY position ASC",
    )
    .bind(prediction_id)
    .fetch_all(executor)
    .await
    .context("failed to list meals")?;

    Ok(meals)
}

/// Distinct normalized names of every meal ever recommended to the user,
/// across all cycles and predictions.
pub async fn list_meal_name_keys<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<String>>
where
    E: PgExecutor<'e>,
{
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT m.name_key \
         FROM meals m \
         JOIN predictions p ON p.id = m.prediction_id \
         WHERE p.user_id = $1 \
         ORDER BY m.name_key",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .context("failed to list meal names")?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// List all predictions attached to a cycle, newest first.
pub async fn list_predictions_for_cycle(pool: &PgPool, cycle_id: Uuid) -> Result<Vec<Prediction>> {
    let predictions = sqlx::query_as::<_, Prediction>(
        "SELECT * FROM predictions WHERE cycle_id = $1 ORDER BY created_at DESC",
    )
    .bind(cycle_id)
    .fetch_all(pool)
    .await
    .context("failed to list predictions for cycle")?;

    Ok(predictions)
}

/// Count every prediction the user has, current or superseded.
pub async fn count_predictions_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM predictions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("failed to count predictions")?;

    Ok(count)
}
