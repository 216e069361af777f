//! Audit log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Action tag recorded on audit entries and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Issue,
    Return,
    Renew,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Issue => "issue",
            AuditAction::Return => "return",
            AuditAction::Renew => "renew",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditAction::Create),
            "update" => Ok(AuditAction::Update),
            "delete" => Ok(AuditAction::Delete),
            "issue" => Ok(AuditAction::Issue),
            "return" => Ok(AuditAction::Return),
            "renew" => Ok(AuditAction::Renew),
            _ => Err(format!("Invalid audit action: {}", s)),
        }
    }
}

text_enum!(AuditAction);

/// Append-only audit entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditLog {
    pub id: Uuid,
    pub title: String,
    /// Acting user, if any
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    /// Serialized JSON snapshot of the affected entity or request
    pub data: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditLog {
    pub title: String,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub data: String,
}

impl NewAuditLog {
    pub fn new<T: Serialize>(
        title: impl Into<String>,
        actor: Uuid,
        action: AuditAction,
        payload: &T,
    ) -> Self {
        Self {
            title: title.into(),
            user_id: Some(actor),
            action,
            data: serde_json::to_string(payload).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AuditLogQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}
