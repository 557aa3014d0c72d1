//! Database query functions for the `notifications` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Notification, NotificationKind};

/// Parameters for inserting a notification row.
#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: &'a str,
    pub message: &'a str,
    pub sent_at: DateTime<Utc>,
    pub related_id: Option<Uuid>,
    pub has_feedback: bool,
}

/// Insert a notification. New rows are always unread.
pub async fn insert_notification<'e, E>(executor: E, new: &NewNotification<'_>) -> Result<Notification>
where
    E: PgExecutor<'e>,
{
    let notification = sqlx::query_as::<_, Notification>(
        "INSERT INTO notifications (user_id, kind, title, message, read, sent_at, related_id, has_feedback) \
         VALUES ($1, $2, $3, $4, false, $5, $6, $7) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.kind)
    .bind(new.title)
    .bind(new.message)
    .bind(new.sent_at)
    .bind(new.related_id)
    .bind(new.has_feedback)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert {} notification", new.kind))?;

    Ok(notification)
}

/// List a user's notifications, newest first.
pub async fn list_notifications_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Notification>> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE user_id = $1 ORDER BY sent_at DESC, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list notifications")?;

    Ok(notifications)
}

/// Flag a notification read. Only matches rows owned by `user_id`; returns
/// `false` when nothing matched.
pub async fn mark_read(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE notifications SET read = true WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to mark notification read")?;

    Ok(result.rows_affected() > 0)
}

/// Number of unread notifications for a user.
pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT read",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("failed to count unread notifications")?;

    Ok(count)
}

/// Whether a notification of `kind` linked to `related_id` was sent at or
/// after `since`.
pub async fn sent_since<'e, E>(
    executor: E,
    related_id: Uuid,
    kind: NotificationKind,
    since: DateTime<Utc>,
) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(\
           SELECT 1 FROM notifications \
           WHERE related_id = $1 AND kind = $2 AND sent_at >= $3)",
    )
    .bind(related_id)
    .bind(kind)
    .bind(since)
    .fetch_one(executor)
    .await
    .context("failed to check recent notifications")?;

    Ok(exists)
}

/// Count notifications of `kind` linked to `related_id`.
pub async fn count_for_related<'e, E>(executor: E, related_id: Uuid, kind: NotificationKind) -> Result<i64>
where
    E: PgExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE related_id = $1 AND kind = $2",
    )
    .bind(related_id)
    .bind(kind)
    .fetch_one(executor)
    .await
    .context("failed to count notifications")?;

    Ok(count)
}
