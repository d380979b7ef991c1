pub mod db;
mod error;
pub mod geo;
mod id;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod notifications;
pub mod realtime;
pub mod reports;
pub mod scope;
pub mod state;
mod time;
pub mod users;

pub use error::{AppError, AppResult};
pub use geo::{AddressResolver, GeoPoint, NoResolver};
pub use model::{
    Notification, NotificationPriority, NotificationType, Report, ReportHistoryEntry,
    ReportPriority, ReportRef, ReportStatus, User, UserRole,
};
pub use notifications::{NewNotification, NotificationError};
pub use realtime::{
    ConnectError, ConnectionRegistry, ConnectionSender, IdentityVerifier, RealtimeMessage,
    RegisteredConnection, VerifiedIdentity, NOTIFICATION_EVENT,
};
pub use reports::{
    create_report, get_report, list_history, list_reports, set_report_status, status_message,
    update_report, NewReport, ReportPatch, WorkflowError,
};
pub use scope::{
    build_report_filter, build_user_filter, resolve_scope, AccessScope, Actor, ScopeFilter,
};
pub use state::AppState;
pub use users::{delete_user, list_users, load_user, update_user, UserAdminError, UserPatch};
