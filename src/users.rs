use futures::FutureExt;
use serde::{Deserialize, Deserializer};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use crate::db::run_in_tx;
use crate::model::{User, UserRole};
use crate::scope::{build_user_filter, AccessScope, ScopeFilter};
use crate::time::now_ms;
use crate::AppError;

#[derive(Debug, Error)]
pub enum UserAdminError {
    #[error("user not found")]
    NotFound,
    #[error("user is outside the caller's association scope")]
    Forbidden,
    #[error("user still has authored reports")]
    Conflict,
    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<sqlx::Error> for UserAdminError {
    fn from(err: sqlx::Error) -> Self {
        UserAdminError::Storage(AppError::from(err))
    }
}

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, phone, role, association_id, created_at, updated_at";

pub async fn load_user(pool: &SqlitePool, id: &str) -> Result<Option<User>, UserAdminError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(User::try_from).transpose()?)
}

/// Users visible under `scope`, newest first.
pub async fn list_users(pool: &SqlitePool, scope: &AccessScope) -> Result<Vec<User>, UserAdminError> {
    let rows = match build_user_filter(scope) {
        ScopeFilter::Nothing => return Ok(Vec::new()),
        ScopeFilter::Unrestricted => {
            let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC");
            sqlx::query(&sql).fetch_all(pool).await?
        }
        ScopeFilter::Association(association_id) => {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE association_id = ? \
                 ORDER BY created_at DESC, id DESC"
            );
            sqlx::query(&sql)
                .bind(association_id)
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter()
        .map(|row| User::try_from(row).map_err(UserAdminError::from))
        .collect()
}

fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
    /// Absent key: leave untouched. Explicit `null`: detach from the
    /// association. A value: re-home the user.
    #[serde(
        default,
        alias = "associationId",
        deserialize_with = "double_option"
    )]
    pub association_id: Option<Option<String>>,
}

/// Scoped profile/role update.
///
/// An association admin may only touch members of their own association
/// and may never move a user to a different association; only a global
/// admin re-homes users.
pub async fn update_user(
    pool: &SqlitePool,
    user_id: &str,
    patch: UserPatch,
    scope: &AccessScope,
) -> Result<User, UserAdminError> {
    let current = load_user(pool, user_id)
        .await?
        .ok_or(UserAdminError::NotFound)?;

    let filter = build_user_filter(scope);
    if !filter.allows(current.association_id.as_deref()) {
        return Err(UserAdminError::Forbidden);
    }
    if let Some(requested) = &patch.association_id {
        let tenant_scoped = matches!(filter, ScopeFilter::Association(_));
        if tenant_scoped && *requested != current.association_id {
            return Err(UserAdminError::Forbidden);
        }
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut binds: Vec<Option<String>> = Vec::new();
    if let Some(value) = patch.first_name {
        sets.push("first_name = ?");
        binds.push(Some(value));
    }
    if let Some(value) = patch.last_name {
        sets.push("last_name = ?");
        binds.push(Some(value));
    }
    if let Some(value) = patch.phone {
        sets.push("phone = ?");
        binds.push(Some(value));
    }
    if let Some(value) = patch.role {
        sets.push("role = ?");
        binds.push(Some(value.as_str().to_string()));
    }
    if let Some(value) = patch.association_id {
        sets.push("association_id = ?");
        binds.push(value);
    }

    if !sets.is_empty() {
        sets.push("updated_at = ?");
        let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        query = query.bind(now_ms()).bind(user_id);
        query.execute(pool).await?;
    }

    load_user(pool, user_id)
        .await?
        .ok_or(UserAdminError::NotFound)
}

/// Scoped removal of a user together with everything only they own.
///
/// Refuses while the user has authored reports; those carry civic
/// history an admin must reassign or resolve first. The history lines the
/// user wrote as an actor, their notifications, and the user row go in
/// one transaction.
pub async fn delete_user(
    pool: &SqlitePool,
    user_id: &str,
    scope: &AccessScope,
) -> Result<(), UserAdminError> {
    let current = load_user(pool, user_id)
        .await?
        .ok_or(UserAdminError::NotFound)?;

    let filter = build_user_filter(scope);
    if !filter.allows(current.association_id.as_deref()) {
        return Err(UserAdminError::Forbidden);
    }

    let authored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE author_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    if authored > 0 {
        return Err(UserAdminError::Conflict);
    }

    let id = user_id.to_string();
    run_in_tx::<_, UserAdminError, _>(pool, move |conn| {
        async move {
            sqlx::query("DELETE FROM report_history WHERE author_id = ?")
                .bind(&id)
                .execute(&mut *conn)
                .await?;
            sqlx::query("DELETE FROM notifications WHERE user_id = ?")
                .bind(&id)
                .execute(&mut *conn)
                .await?;
            let res = sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(&id)
                .execute(&mut *conn)
                .await?;
            if res.rows_affected() == 0 {
                return Err(UserAdminError::NotFound);
            }
            Ok(())
        }
        .boxed()
    })
    .await?;

    info!(target = "hromada", event = "user_deleted", user_id = %user_id);
    Ok(())
}
