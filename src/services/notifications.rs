//! Notification inbox and audit trail reads

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{audit_log::AuditLogQuery, notification::NotificationQuery, AuditLog, Notification},
    repository::{AuditLogStore, NotificationStore},
};

#[derive(Clone)]
pub struct NotificationsService {
    notifications: Arc<dyn NotificationStore>,
    audit_logs: Arc<dyn AuditLogStore>,
}

impl NotificationsService {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        audit_logs: Arc<dyn AuditLogStore>,
    ) -> Self {
        Self {
            notifications,
            audit_logs,
        }
    }

    pub async fn list_notifications(
        &self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> AppResult<(Vec<Notification>, i64)> {
        self.notifications.list_notifications(user_id, query).await
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> AppResult<u64> {
        let updated = self.notifications.mark_all_read(user_id).await?;
        tracing::debug!(%user_id, updated, "notifications marked read");
        Ok(updated)
    }

    pub async fn list_audit_logs(&self, query: &AuditLogQuery) -> AppResult<(Vec<AuditLog>, i64)> {
        self.audit_logs.list_audit_logs(query).await
    }
}
