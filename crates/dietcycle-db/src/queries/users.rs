//! Database query functions for the `users` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::User;

/// Insert a new user. Returns the inserted row with server-generated
/// defaults (id, created_at).
///
/// Email addresses are unique; `None` means the address is already
/// registered and nothing was written.
pub async fn insert_user(pool: &PgPool, email: &str, name: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, name) VALUES ($1, $2) \
         ON CONFLICT (email) DO NOTHING \
         RETURNING *",
    )
    .bind(email)
    .bind(name)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to insert user {email:?}"))?;

    Ok(user)
}

/// Fetch a user by ID.
pub async fn get_user<'e, E>(executor: E, id: Uuid) -> Result<Option<User>>
where
    E: PgExecutor<'e>,
{
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch user")?;

    Ok(user)
}

/// Take a row lock on the user for the rest of the transaction.
///
/// Every write that flips `active`/`is_current` flags for a user takes this
/// lock first, so concurrent writers for the same user queue up behind it.
/// Returns `false` when the user does not exist.
pub async fn lock_user(conn: &mut PgConnection, id: Uuid) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("failed to lock user row")?;

    Ok(row.is_some())
}

/// Record the latest self-reported weight on the user row.
pub async fn update_weight_snapshot<'e, E>(
    executor: E,
    id: Uuid,
    weight_kg: f64,
    at: DateTime<Utc>,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE users SET current_weight = $1, last_weight_update = $2 WHERE id = $3",
    )
    .bind(weight_kg)
    .bind(at)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to update user weight snapshot")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("user {id} not found");
    }

    Ok(())
}
