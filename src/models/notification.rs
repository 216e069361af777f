//! Notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::AuditAction;

/// Modules a notification can originate from
pub const MODULE_BOOK: &str = "book";
pub const MODULE_BOOK_COPY: &str = "book_copy";
pub const MODULE_BORROW: &str = "borrow";

/// Per-user message describing a state change
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub module: String,
    pub action: AuditAction,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: String,
    pub is_read: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub module: String,
    pub action: AuditAction,
    pub notification_type: String,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        module: &str,
        action: AuditAction,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            title: title.into(),
            description: description.into(),
            module: module.to_string(),
            action,
            notification_type: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    pub unread_only: Option<bool>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// Result of a bulk read-flag update
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MarkedRead {
    pub updated: u64,
}
