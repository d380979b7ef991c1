use futures::FutureExt;
use serde::Deserialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::run_in_tx;
use crate::geo::{AddressResolver, GeoPoint};
use crate::id::new_uuid_v7;
use crate::model::{
    NotificationPriority, NotificationType, Report, ReportHistoryEntry, ReportPriority,
    ReportStatus,
};
use crate::notifications::{self, NewNotification};
use crate::realtime::ConnectionRegistry;
use crate::scope::{build_report_filter, AccessScope, ScopeFilter};
use crate::time::now_ms;
use crate::AppError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("address could not be resolved: {0}")]
    Resolution(String),
    #[error("report not found")]
    NotFound,
    #[error("report is outside the caller's association scope")]
    Forbidden,
    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<sqlx::Error> for WorkflowError {
    fn from(err: sqlx::Error) -> Self {
        WorkflowError::Storage(AppError::from(err))
    }
}

/// Canonical notification body for a status change. Exhaustive on
/// purpose: a new status variant will not compile until it gets a message.
pub fn status_message(status: ReportStatus) -> &'static str {
    match status {
        ReportStatus::New => "report received and registered",
        ReportStatus::InProgress => "work on your report has begun",
        ReportStatus::Done => "your report has been successfully resolved",
        ReportStatus::Rejected => "your report has been rejected",
    }
}

fn status_history_message(status: ReportStatus) -> String {
    format!("status changed to {}", status.as_str())
}

const REPORT_COLUMNS: &str = "id, title, description, status, priority, address, latitude, \
     longitude, author_id, association_id, category_id, recipient_id, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReport {
    pub title: String,
    pub description: String,
    #[serde(default, alias = "categoryId")]
    pub category_id: Option<String>,
    #[serde(default, alias = "recipientId")]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub priority: Option<ReportPriority>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Partial update applied by [`update_report`]. `notes` and `status` are
/// peeled off for the audit/notification path; the rest are plain field
/// edits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "categoryId")]
    pub category_id: Option<String>,
    #[serde(default, alias = "recipientId")]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub priority: Option<ReportPriority>,
    #[serde(default)]
    pub status: Option<ReportStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReportPatch {
    pub fn status_only(status: ReportStatus) -> Self {
        ReportPatch {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Create a report in the initial `NEW` state.
///
/// Location is mandatory: explicit coordinates win; otherwise the address
/// is handed to the resolver, and an empty result is a resolution error.
pub async fn create_report(
    pool: &SqlitePool,
    resolver: &dyn AddressResolver,
    author_id: &str,
    input: NewReport,
) -> Result<Report, WorkflowError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(WorkflowError::Validation("title must not be empty".into()));
    }
    let description = input.description.trim();
    if description.is_empty() {
        return Err(WorkflowError::Validation(
            "description must not be empty".into(),
        ));
    }

    let (address, point) = match (input.latitude, input.longitude) {
        (Some(latitude), Some(longitude)) => (
            input
                .address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            GeoPoint {
                latitude,
                longitude,
            },
        ),
        _ => {
            let addr = input
                .address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    WorkflowError::Validation(
                        "either coordinates or an address is required".into(),
                    )
                })?;
            match resolver.resolve(addr) {
                Ok(Some(point)) => (Some(addr.to_string()), point),
                Ok(None) => {
                    return Err(WorkflowError::Resolution(format!(
                        "no result for \"{addr}\""
                    )))
                }
                Err(e) => return Err(WorkflowError::Resolution(e.to_string())),
            }
        }
    };

    let association_id: Option<String> = sqlx::query_scalar::<_, Option<String>>(
        "SELECT association_id FROM users WHERE id = ?",
    )
    .bind(author_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| WorkflowError::Validation("author does not exist".into()))?;

    let id = new_uuid_v7();
    let now = now_ms();
    let priority = input.priority.unwrap_or(ReportPriority::Normal);
    sqlx::query(
        "INSERT INTO reports \
         (id, title, description, status, priority, address, latitude, longitude, \
          author_id, association_id, category_id, recipient_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(title)
    .bind(description)
    .bind(ReportStatus::New.as_str())
    .bind(priority.as_str())
    .bind(&address)
    .bind(point.latitude)
    .bind(point.longitude)
    .bind(author_id)
    .bind(&association_id)
    .bind(&input.category_id)
    .bind(&input.recipient_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    info!(
        target = "hromada",
        event = "report_created",
        report_id = %id,
        author_id = %author_id
    );

    get_report(pool, &id).await?.ok_or(WorkflowError::NotFound)
}

pub async fn get_report(pool: &SqlitePool, id: &str) -> Result<Option<Report>, WorkflowError> {
    let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(Report::try_from).transpose()?)
}

/// Reports visible under `scope`, newest first. A fail-closed scope
/// yields an empty list without touching the store.
pub async fn list_reports(
    pool: &SqlitePool,
    scope: &AccessScope,
) -> Result<Vec<Report>, WorkflowError> {
    let rows = match build_report_filter(scope) {
        ScopeFilter::Nothing => return Ok(Vec::new()),
        ScopeFilter::Unrestricted => {
            let sql =
                format!("SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at DESC, id DESC");
            sqlx::query(&sql).fetch_all(pool).await?
        }
        ScopeFilter::Association(association_id) => {
            let sql = format!(
                "SELECT {REPORT_COLUMNS} FROM reports \
                 WHERE author_id IN (SELECT id FROM users WHERE association_id = ?) \
                 ORDER BY created_at DESC, id DESC"
            );
            sqlx::query(&sql)
                .bind(association_id)
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter()
        .map(|row| Report::try_from(row).map_err(WorkflowError::from))
        .collect()
}

/// Audit trail of a report, oldest entry first.
pub async fn list_history(
    pool: &SqlitePool,
    report_id: &str,
) -> Result<Vec<ReportHistoryEntry>, WorkflowError> {
    let rows = sqlx::query(
        "SELECT id, report_id, description, author_id, created_at \
         FROM report_history WHERE report_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(report_id)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| ReportHistoryEntry::try_from(row).map_err(WorkflowError::from))
        .collect()
}

struct TxOutcome {
    author_id: String,
    title: String,
    new_status: Option<ReportStatus>,
}

/// Apply a scoped partial update to a report.
///
/// Field edits and the status value land in a single UPDATE, and the
/// audit entry is written in the same transaction: a status never changes
/// without its history line. Notification persistence and the realtime
/// push run after commit and are advisory: their failure is logged and
/// never turns a committed update into an error.
pub async fn update_report(
    pool: &SqlitePool,
    realtime: &ConnectionRegistry,
    report_id: &str,
    acting_user_id: &str,
    patch: ReportPatch,
    scope: &AccessScope,
) -> Result<Report, WorkflowError> {
    let filter = build_report_filter(scope);
    let report_id_owned = report_id.to_string();
    let acting = acting_user_id.to_string();

    let outcome: TxOutcome = run_in_tx(pool, move |conn| {
        async move {
            let row = sqlx::query(
                "SELECT r.status, r.title, r.author_id, u.association_id AS author_association \
                 FROM reports r JOIN users u ON u.id = r.author_id WHERE r.id = ?",
            )
            .bind(&report_id_owned)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(WorkflowError::NotFound)?;

            let before_raw: String = row.try_get("status").map_err(AppError::from)?;
            let before_status = ReportStatus::parse(&before_raw).ok_or_else(|| {
                AppError::new("REPORT/DECODE", "Unknown enum value")
                    .with_context("column", "status")
                    .with_context("value", before_raw.clone())
            })?;
            let title: String = row.try_get("title").map_err(AppError::from)?;
            let author_id: String = row.try_get("author_id").map_err(AppError::from)?;
            let author_association: Option<String> = row
                .try_get::<Option<String>, _>("author_association")
                .map_err(AppError::from)?;

            if !filter.allows(author_association.as_deref()) {
                return Err(WorkflowError::Forbidden);
            }

            let mut sets: Vec<&str> = Vec::new();
            let mut binds: Vec<String> = Vec::new();
            if let Some(value) = &patch.title {
                sets.push("title = ?");
                binds.push(value.clone());
            }
            if let Some(value) = &patch.description {
                sets.push("description = ?");
                binds.push(value.clone());
            }
            if let Some(value) = &patch.category_id {
                sets.push("category_id = ?");
                binds.push(value.clone());
            }
            if let Some(value) = &patch.recipient_id {
                sets.push("recipient_id = ?");
                binds.push(value.clone());
            }
            if let Some(value) = patch.priority {
                sets.push("priority = ?");
                binds.push(value.as_str().to_string());
            }
            if let Some(value) = patch.status {
                sets.push("status = ?");
                binds.push(value.as_str().to_string());
            }

            if !sets.is_empty() {
                sets.push("updated_at = ?");
                let sql = format!("UPDATE reports SET {} WHERE id = ?", sets.join(", "));
                let mut query = sqlx::query(&sql);
                for bind in &binds {
                    query = query.bind(bind);
                }
                query = query.bind(now_ms()).bind(&report_id_owned);
                query.execute(&mut *conn).await?;
            }

            let notes = patch
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty());
            let new_status = match patch.status {
                Some(status) if status != before_status => Some(status),
                _ => None,
            };

            if let Some(status) = new_status {
                // Tie-break: an explicit note replaces the generated line,
                // never duplicates it.
                let description = notes
                    .map(str::to_string)
                    .unwrap_or_else(|| status_history_message(status));
                append_history(conn, &report_id_owned, &description, &acting).await?;
            } else if let Some(note) = notes {
                append_history(conn, &report_id_owned, note, &acting).await?;
            }

            Ok(TxOutcome {
                author_id,
                title,
                new_status,
            })
        }
        .boxed()
    })
    .await?;

    if let Some(status) = outcome.new_status {
        info!(
            target = "hromada",
            event = "report_status_changed",
            report_id = %report_id,
            status = status.as_str(),
            acting_user_id = %acting_user_id
        );
        emit_status_notification(
            pool,
            realtime,
            report_id,
            &outcome.author_id,
            &outcome.title,
            status,
        )
        .await;
    }

    get_report(pool, report_id).await?.ok_or(WorkflowError::NotFound)
}

/// The original's coarse "set status" admin path, routed through
/// [`update_report`] so the no-op and audit rules hold everywhere.
pub async fn set_report_status(
    pool: &SqlitePool,
    realtime: &ConnectionRegistry,
    report_id: &str,
    acting_user_id: &str,
    status: ReportStatus,
    scope: &AccessScope,
) -> Result<Report, WorkflowError> {
    update_report(
        pool,
        realtime,
        report_id,
        acting_user_id,
        ReportPatch::status_only(status),
        scope,
    )
    .await
}

async fn append_history(
    conn: &mut SqliteConnection,
    report_id: &str,
    description: &str,
    author_id: &str,
) -> Result<(), WorkflowError> {
    sqlx::query(
        "INSERT INTO report_history (id, report_id, description, author_id, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_uuid_v7())
    .bind(report_id)
    .bind(description)
    .bind(author_id)
    .bind(now_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Best-effort tail of a status change: persist the notification, then
/// fan it out to the author's live connections. Failures are logged and
/// swallowed.
async fn emit_status_notification(
    pool: &SqlitePool,
    realtime: &ConnectionRegistry,
    report_id: &str,
    author_id: &str,
    report_title: &str,
    status: ReportStatus,
) {
    let input = NewNotification {
        user_id: author_id.to_string(),
        report_id: Some(report_id.to_string()),
        title: report_title.to_string(),
        message: status_message(status).to_string(),
        kind: NotificationType::StatusChange,
        priority: NotificationPriority::Medium,
    };
    match notifications::create(pool, input).await {
        Ok(Some(stored)) => match serde_json::to_value(&stored) {
            Ok(data) => {
                realtime.dispatch(&stored.user_id, data);
            }
            Err(e) => {
                warn!(
                    target = "hromada",
                    event = "notification_encode_failed",
                    report_id = %report_id,
                    error = %e
                );
            }
        },
        // Recipient vanished; the store already logged it.
        Ok(None) => {}
        Err(e) => {
            warn!(
                target = "hromada",
                event = "notification_emit_failed",
                report_id = %report_id,
                error = %e
            );
        }
    }
}
