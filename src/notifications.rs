use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use crate::id::new_uuid_v7;
use crate::model::{Notification, NotificationPriority, NotificationType};
use crate::time::now_ms;
use crate::AppError;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<sqlx::Error> for NotificationError {
    fn from(err: sqlx::Error) -> Self {
        NotificationError::Storage(AppError::from(err))
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub report_id: Option<String>,
    pub title: String,
    pub message: String,
    pub kind: NotificationType,
    pub priority: NotificationPriority,
}

const SELECT_WITH_REPORT: &str = "SELECT n.id, n.user_id, n.report_id, n.title, n.message, \
     n.type, n.priority, n.is_read, n.created_at, r.title AS report_title \
     FROM notifications n LEFT JOIN reports r ON r.id = n.report_id";

/// Persist a notification for `input.user_id`.
///
/// Returns `Ok(None)` when the target user does not exist. That soft fail
/// is deliberate: a dangling recipient must never abort the report
/// mutation that produced the notification.
pub async fn create(
    pool: &SqlitePool,
    input: NewNotification,
) -> Result<Option<Notification>, NotificationError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ?")
        .bind(&input.user_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        warn!(
            target = "hromada",
            event = "notification_target_missing",
            user_id = %input.user_id
        );
        return Ok(None);
    }

    let id = new_uuid_v7();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO notifications \
         (id, user_id, report_id, title, message, type, priority, is_read, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(&id)
    .bind(&input.user_id)
    .bind(&input.report_id)
    .bind(&input.title)
    .bind(&input.message)
    .bind(input.kind.as_str())
    .bind(input.priority.as_str())
    .bind(now)
    .execute(pool)
    .await?;

    info!(
        target = "hromada",
        event = "notification_created",
        id = %id,
        user_id = %input.user_id,
        kind = input.kind.as_str()
    );

    let sql = format!("{SELECT_WITH_REPORT} WHERE n.id = ?");
    let row = sqlx::query(&sql).bind(&id).fetch_one(pool).await?;
    Ok(Some(Notification::try_from(&row)?))
}

/// All notifications for a user, newest first, with the report projection
/// attached where the report still exists.
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<Notification>, NotificationError> {
    let sql = format!(
        "{SELECT_WITH_REPORT} WHERE n.user_id = ? ORDER BY n.created_at DESC, n.id DESC"
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;
    rows.iter()
        .map(|row| Notification::try_from(row).map_err(NotificationError::from))
        .collect()
}

/// Flip a single notification to read.
pub async fn mark_read(pool: &SqlitePool, id: &str) -> Result<Notification, NotificationError> {
    let res = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(NotificationError::NotFound);
    }
    let sql = format!("{SELECT_WITH_REPORT} WHERE n.id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_one(pool).await?;
    Ok(Notification::try_from(&row)?)
}

/// Flip every unread notification of a user to read; returns how many
/// rows changed. Zero is a normal outcome, not an error.
pub async fn mark_all_read(pool: &SqlitePool, user_id: &str) -> Result<u64, NotificationError> {
    let res = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
