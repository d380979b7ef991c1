use serde::{Deserialize, Serialize};

use crate::model::UserRole;

/// The authenticated caller, as established by the (out of scope)
/// request-handling layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Actor {
    pub id: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_id: Option<String>,
}

/// Transient per-request value restricting what an actor may see or
/// mutate. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessScope {
    pub role: UserRole,
    pub association_id: Option<String>,
}

impl AccessScope {
    pub fn global_admin() -> Self {
        AccessScope {
            role: UserRole::GlobalAdmin,
            association_id: None,
        }
    }

    pub fn association_admin(association_id: impl Into<String>) -> Self {
        AccessScope {
            role: UserRole::AssociationAdmin,
            association_id: Some(association_id.into()),
        }
    }
}

/// Pure function of the actor; no I/O.
pub fn resolve_scope(actor: &Actor) -> AccessScope {
    AccessScope {
        role: actor.role,
        association_id: actor.association_id.clone(),
    }
}

/// Filter over report or user queries derived from an [`AccessScope`].
///
/// `Nothing` is the fail-closed result: an association admin with no
/// association on record must see an empty world, never an unconstrained
/// one. Non-admin roles are rejected upstream; if one slips through it
/// also resolves to `Nothing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeFilter {
    Unrestricted,
    Association(String),
    Nothing,
}

impl ScopeFilter {
    fn for_scope(scope: &AccessScope) -> Self {
        match scope.role {
            UserRole::GlobalAdmin => ScopeFilter::Unrestricted,
            UserRole::AssociationAdmin => match &scope.association_id {
                Some(id) if !id.is_empty() => ScopeFilter::Association(id.clone()),
                _ => ScopeFilter::Nothing,
            },
            UserRole::Resident => ScopeFilter::Nothing,
        }
    }

    /// Whether an entity bound to `association_id` passes this filter.
    pub fn allows(&self, association_id: Option<&str>) -> bool {
        match self {
            ScopeFilter::Unrestricted => true,
            ScopeFilter::Association(expected) => association_id == Some(expected.as_str()),
            ScopeFilter::Nothing => false,
        }
    }
}

/// Restricts reports to those whose author belongs to the scope's
/// association.
pub fn build_report_filter(scope: &AccessScope) -> ScopeFilter {
    ScopeFilter::for_scope(scope)
}

/// Restricts users to those whose association matches the scope's.
pub fn build_user_filter(scope: &AccessScope) -> ScopeFilter {
    ScopeFilter::for_scope(scope)
}
