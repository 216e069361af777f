//! Best-effort audit log and notification emission
//!
//! Every mutating service call records what happened after its primary write.
//! A failed emission is logged and handed back as a [`SideEffectWarning`];
//! it never fails the call and is never retried.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    models::{NewAuditLog, NewNotification},
    repository::{AuditLogStore, NotificationStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectKind {
    AuditLog,
    Notification,
}

/// A side effect that could not be recorded
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SideEffectWarning {
    pub kind: SideEffectKind,
    pub message: String,
}

/// Result of a mutating operation plus the side effects that failed
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    #[serde(rename = "data")]
    pub value: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SideEffectWarning>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, warnings: Vec<SideEffectWarning>) -> Self {
        Self { value, warnings }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Clone)]
pub struct SideEffects {
    audit_logs: Arc<dyn AuditLogStore>,
    notifications: Arc<dyn NotificationStore>,
}

impl SideEffects {
    pub fn new(
        audit_logs: Arc<dyn AuditLogStore>,
        notifications: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            audit_logs,
            notifications,
        }
    }

    /// Starts collecting the side effects of one operation
    pub fn batch(&self) -> Emission<'_> {
        Emission {
            effects: self,
            warnings: Vec::new(),
        }
    }
}

/// Side effects of a single operation
pub struct Emission<'a> {
    effects: &'a SideEffects,
    warnings: Vec<SideEffectWarning>,
}

impl Emission<'_> {
    pub async fn audit(&mut self, entry: NewAuditLog) {
        let action = entry.action;
        if let Err(e) = self.effects.audit_logs.append_audit_log(entry).await {
            tracing::warn!(%action, error = %e, "failed to record audit log");
            self.warnings.push(SideEffectWarning {
                kind: SideEffectKind::AuditLog,
                message: format!("audit log for '{}' not recorded: {}", action, e),
            });
        }
    }

    pub async fn notify(&mut self, notification: NewNotification) {
        let user_id = notification.user_id;
        let action = notification.action;
        if let Err(e) = self.effects.notifications.append_notification(notification).await {
            tracing::warn!(%user_id, %action, error = %e, "failed to send notification");
            self.warnings.push(SideEffectWarning {
                kind: SideEffectKind::Notification,
                message: format!("notification for '{}' not sent: {}", action, e),
            });
        }
    }

    pub fn finish<T>(self, value: T) -> Outcome<T> {
        Outcome::new(value, self.warnings)
    }
}
