//! Database query functions for the `cycles` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Cycle, Gender, Goal};

/// Parameters for inserting a new cycle row.
#[derive(Debug, Clone)]
pub struct NewCycle<'a> {
    pub user_id: Uuid,
    pub cycle_number: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub age: i32,
    pub gender: Gender,
    pub goal: Goal,
    pub activity_type: &'a str,
    pub preferences: &'a str,
    pub health_conditions: &'a [String],
    pub meal_type: &'a str,
    pub meal_frequency: i32,
    pub created_at: DateTime<Utc>,
}

/// A cycle with no feedback that is old enough to be reminded about,
/// joined with the owner's contact details.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReminderCandidate {
    pub cycle_id: Uuid,
    pub user_id: Uuid,
    pub cycle_number: i32,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Highest cycle number used so far by the user, or 0 if none.
pub async fn max_cycle_number(conn: &mut PgConnection, user_id: Uuid) -> Result<i32> {
    let max: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(cycle_number), 0) FROM cycles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(conn)
    .await
    .context("failed to read max cycle number")?;

    Ok(max)
}

/// Clear the `active` flag on every cycle of the user. Returns the number of
/// rows that were active.
pub async fn deactivate_cycles(conn: &mut PgConnection, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query("UPDATE cycles SET active = false WHERE user_id = $1 AND active")
        .bind(user_id)
        .execute(conn)
        .await
        .context("failed to deactivate cycles")?;

    Ok(result.rows_affected())
}

/// Insert a new, active cycle.
pub async fn insert_cycle(conn: &mut PgConnection, new: &NewCycle<'_>) -> Result<Cycle> {
    let cycle = sqlx::query_as::<_, Cycle>(
        "INSERT INTO cycles (user_id, cycle_number, start_date, end_date, height_cm, \
         weight_kg, age, gender, goal, activity_type, preferences, health_conditions, \
         meal_type, meal_frequency, active, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, true, $15) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.cycle_number)
    .bind(new.start_date)
    .bind(new.end_date)
    .bind(new.height_cm)
    .bind(new.weight_kg)
    .bind(new.age)
    .bind(new.gender)
    .bind(new.goal)
    .bind(new.activity_type)
    .bind(new.preferences)
    .bind(new.health_conditions)
    .bind(new.meal_type)
    .bind(new.meal_frequency)
    .bind(new.created_at)
    .fetch_one(conn)
    .await
    .with_context(|| {
        format!(
            "failed to insert cycle {} for user {}",
            new.cycle_number, new.user_id
        )
    })?;

    Ok(cycle)
}

/// Fetch a cycle by ID, scoped to its owner.
pub async fn get_cycle_for_user<'e, E>(
    executor: E,
    cycle_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Cycle>>
where
    E: PgExecutor<'e>,
{
    let cycle =
        sqlx::query_as::<_, Cycle>("SELECT * FROM cycles WHERE id = $1 AND user_id = $2")
            .bind(cycle_id)
            .bind(user_id)
            .fetch_optional(executor)
            .await
            .context("failed to fetch cycle")?;

    Ok(cycle)
}

/// Fetch the user's active cycle, if any.
pub async fn get_active_cycle<'e, E>(executor: E, user_id: Uuid) -> Result<Option<Cycle>>
where
    E: PgExecutor<'e>,
{
    let cycle = sqlx::query_as::<_, Cycle>("SELECT * FROM cycles WHERE user_id = $1 AND active")
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch active cycle")?;

    Ok(cycle)
}

/// List all cycles of a user, newest first.
pub async fn list_cycles_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Cycle>> {
    let cycles = sqlx::query_as::<_, Cycle>(
        "SELECT * FROM cycles WHERE user_id = $1 ORDER BY cycle_number DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list cycles for user")?;

    Ok(cycles)
}

/// Lock a cycle row for the rest of the transaction, scoped to its owner.
pub async fn lock_cycle_for_user(
    conn: &mut PgConnection,
    cycle_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Cycle>> {
    let cycle = sqlx::query_as::<_, Cycle>(
        "SELECT * FROM cycles WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(cycle_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .context("failed to lock cycle row")?;

    Ok(cycle)
}

/// Lock a cycle row for the rest of the transaction. Returns `false` when
/// the cycle no longer exists.
pub async fn lock_cycle(conn: &mut PgConnection, cycle_id: Uuid) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM cycles WHERE id = $1 FOR UPDATE")
        .bind(cycle_id)
        .fetch_optional(conn)
        .await
        .context("failed to lock cycle row")?;

    Ok(row.is_some())
}

/// Overwrite the weight stored on a cycle.
pub async fn update_cycle_weight<'e, E>(executor: E, cycle_id: Uuid, weight_kg: f64) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("UPDATE cycles SET weight_kg = $1 WHERE id = $2")
        .bind(weight_kg)
        .bind(cycle_id)
        .execute(executor)
        .await
        .context("failed to update cycle weight")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("cycle {cycle_id} not found");
    }

    Ok(())
}

/// Active cycles created at or before `created_before` that have no
/// feedback row, oldest first. At most one per user.
pub async fn list_cycles_awaiting_feedback(
    pool: &PgPool,
    created_before: DateTime<Utc>,
) -> Result<Vec<ReminderCandidate>> {
    let rows = sqlx::query_as::<_, ReminderCandidate>(
        "SELECT c.id AS cycle_id, c.user_id, c.cycle_number, u.email, u.name, c.created_at \
         FROM cycles c \
         JOIN users u ON u.id = c.user_id \
         WHERE c.active \
           AND c.created_at <= $1 \
           AND NOT EXISTS (SELECT 1 FROM feedback f WHERE f.cycle_id = c.id) \
         ORDER BY c.created_at ASC",
    )
    .bind(created_before)
    .fetch_all(pool)
    .await
    .context("failed to list cycles awaiting feedback")?;

    Ok(rows)
}

/// Count the user's cycles flagged active. Always 0 or 1 given the partial
/// unique index.
pub async fn count_active_cycles(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cycles WHERE user_id = $1 AND active")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .context("failed to count active cycles")?;

    Ok(count)
}
