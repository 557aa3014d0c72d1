//! Database query functions for the `feedback` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::models::Feedback;

/// Parameters for an insert-or-update of a cycle's feedback row.
#[derive(Debug, Clone)]
pub struct FeedbackUpsert<'a> {
    pub cycle_id: Uuid,
    pub user_id: Uuid,
    pub reported_weight: Option<f64>,
    pub achieved: Option<bool>,
    pub note: Option<&'a str>,
    pub at: DateTime<Utc>,
}

/// Insert the feedback row for a cycle, or update the existing one.
///
/// Keyed by the UNIQUE constraint on `cycle_id`. Fields passed as `None`
/// keep their stored value on update.
pub async fn upsert_feedback(conn: &mut PgConnection, upsert: &FeedbackUpsert<'_>) -> Result<Feedback> {
    let feedback = sqlx::query_as::<_, Feedback>(
        "INSERT INTO feedback (cycle_id, user_id, reported_weight, achieved, note, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $6) \
         ON CONFLICT (cycle_id) DO UPDATE SET \
           reported_weight = COALESCE(EXCLUDED.reported_weight, feedback.reported_weight), \
           achieved = COALESCE(EXCLUDED.achieved, feedback.achieved), \
           note = COALESCE(EXCLUDED.note, feedback.note), \
           updated_at = EXCLUDED.updated_at \
         RETURNING *",
    )
    .bind(upsert.cycle_id)
    .bind(upsert.user_id)
    .bind(upsert.reported_weight)
    .bind(upsert.achieved)
    .bind(upsert.note)
    .bind(upsert.at)
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to upsert feedback for cycle {}", upsert.cycle_id))?;

    Ok(feedback)
}

/// Fetch the feedback row for a cycle, if one exists.
pub async fn get_feedback_for_cycle<'e, E>(executor: E, cycle_id: Uuid) -> Result<Option<Feedback>>
where
    E: PgExecutor<'e>,
{
    let feedback = sqlx::query_as::<_, Feedback>("SELECT * FROM feedback WHERE cycle_id = $1")
        .bind(cycle_id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch feedback")?;

    Ok(feedback)
}

/// Whether a feedback row exists for the cycle.
pub async fn feedback_exists<'e, E>(executor: E, cycle_id: Uuid) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM feedback WHERE cycle_id = $1)")
            .bind(cycle_id)
            .fetch_one(executor)
            .await
            .context("failed to check feedback existence")?;

    Ok(exists)
}

/// Count the feedback rows attached to a cycle.
pub async fn count_feedback_for_cycle<'e, E>(executor: E, cycle_id: Uuid) -> Result<i64>
where
    E: PgExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE cycle_id = $1")
        .bind(cycle_id)
        .fetch_one(executor)
        .await
        .context("failed to count feedback")?;

    Ok(count)
}
