use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::AppError;

const REPORT_DECODE: &str = "REPORT/DECODE";
const NOTIFICATION_DECODE: &str = "NOTIFICATION/DECODE";
const USER_DECODE: &str = "USER/DECODE";

/// Lifecycle state of a report. `New` is the only initial state; `Done`
/// and `Rejected` are terminal for notification purposes, but the engine
/// does not forbid transitioning out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    New,
    InProgress,
    Done,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::New => "NEW",
            ReportStatus::InProgress => "IN_PROGRESS",
            ReportStatus::Done => "DONE",
            ReportStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NEW" => Some(ReportStatus::New),
            "IN_PROGRESS" => Some(ReportStatus::InProgress),
            "DONE" => Some(ReportStatus::Done),
            "REJECTED" => Some(ReportStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Done | ReportStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportPriority {
    Low,
    Normal,
    Urgent,
}

impl ReportPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportPriority::Low => "LOW",
            ReportPriority::Normal => "NORMAL",
            ReportPriority::Urgent => "URGENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LOW" => Some(ReportPriority::Low),
            "NORMAL" => Some(ReportPriority::Normal),
            "URGENT" => Some(ReportPriority::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    StatusChange,
    GeneralUpdate,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::StatusChange => "STATUS_CHANGE",
            NotificationType::GeneralUpdate => "GENERAL_UPDATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STATUS_CHANGE" => Some(NotificationType::StatusChange),
            "GENERAL_UPDATE" => Some(NotificationType::GeneralUpdate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
}

impl NotificationPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationPriority::Low => "LOW",
            NotificationPriority::Medium => "MEDIUM",
            NotificationPriority::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LOW" => Some(NotificationPriority::Low),
            "MEDIUM" => Some(NotificationPriority::Medium),
            "HIGH" => Some(NotificationPriority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Resident,
    AssociationAdmin,
    GlobalAdmin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Resident => "RESIDENT",
            UserRole::AssociationAdmin => "ASSOCIATION_ADMIN",
            UserRole::GlobalAdmin => "GLOBAL_ADMIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RESIDENT" => Some(UserRole::Resident),
            "ASSOCIATION_ADMIN" => Some(UserRole::AssociationAdmin),
            "GLOBAL_ADMIN" => Some(UserRole::GlobalAdmin),
            _ => None,
        }
    }
}

fn decode_enum<T>(
    row: &SqliteRow,
    column: &str,
    code: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, AppError> {
    let raw: String = row.try_get(column).map_err(AppError::from)?;
    parse(&raw).ok_or_else(|| {
        AppError::new(code, "Unknown enum value")
            .with_context("column", column.to_string())
            .with_context("value", raw)
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Report {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: ReportStatus,
    pub priority: ReportPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Report {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            title: row.try_get("title").map_err(AppError::from)?,
            description: row.try_get("description").map_err(AppError::from)?,
            status: decode_enum(row, "status", REPORT_DECODE, ReportStatus::parse)?,
            priority: decode_enum(row, "priority", REPORT_DECODE, ReportPriority::parse)?,
            address: row
                .try_get::<Option<String>, _>("address")
                .map_err(AppError::from)?,
            latitude: row
                .try_get::<Option<f64>, _>("latitude")
                .map_err(AppError::from)?,
            longitude: row
                .try_get::<Option<f64>, _>("longitude")
                .map_err(AppError::from)?,
            author_id: row.try_get("author_id").map_err(AppError::from)?,
            association_id: row
                .try_get::<Option<String>, _>("association_id")
                .map_err(AppError::from)?,
            category_id: row
                .try_get::<Option<String>, _>("category_id")
                .map_err(AppError::from)?,
            recipient_id: row
                .try_get::<Option<String>, _>("recipient_id")
                .map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

/// One line of a report's audit trail. Append-only; never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportHistoryEntry {
    pub id: String,
    pub report_id: String,
    pub description: String,
    pub author_id: String,
    pub created_at: i64,
}

impl TryFrom<&SqliteRow> for ReportHistoryEntry {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            report_id: row.try_get("report_id").map_err(AppError::from)?,
            description: row.try_get("description").map_err(AppError::from)?,
            author_id: row.try_get("author_id").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
        })
    }
}

/// Denormalized report projection carried by notification reads so a list
/// can be rendered without a second query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub priority: NotificationPriority,
    pub is_read: bool,
    pub created_at: i64,
    /// Present when the referenced report still exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportRef>,
}

impl TryFrom<&SqliteRow> for Notification {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let report_id: Option<String> = row
            .try_get::<Option<String>, _>("report_id")
            .map_err(AppError::from)?;
        let report_title: Option<String> = row
            .try_get::<Option<String>, _>("report_title")
            .map_err(AppError::from)?;
        let report = match (report_id.clone(), report_title) {
            (Some(id), Some(title)) => Some(ReportRef { id, title }),
            _ => None,
        };
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            user_id: row.try_get("user_id").map_err(AppError::from)?,
            report_id,
            title: row.try_get("title").map_err(AppError::from)?,
            message: row.try_get("message").map_err(AppError::from)?,
            kind: decode_enum(row, "type", NOTIFICATION_DECODE, NotificationType::parse)?,
            priority: decode_enum(
                row,
                "priority",
                NOTIFICATION_DECODE,
                NotificationPriority::parse,
            )?,
            is_read: row
                .try_get::<i64, _>("is_read")
                .map(|value| value != 0)
                .map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            report,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for User {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            email: row.try_get("email").map_err(AppError::from)?,
            first_name: row
                .try_get::<Option<String>, _>("first_name")
                .map_err(AppError::from)?,
            last_name: row
                .try_get::<Option<String>, _>("last_name")
                .map_err(AppError::from)?,
            phone: row
                .try_get::<Option<String>, _>("phone")
                .map_err(AppError::from)?,
            role: decode_enum(row, "role", USER_DECODE, UserRole::parse)?,
            association_id: row
                .try_get::<Option<String>, _>("association_id")
                .map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}
