//! Notification inbox and audit trail endpoints

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{
        audit_log::AuditLogQuery,
        notification::{MarkedRead, NotificationQuery},
        AuditLog, Notification,
    },
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

/// List the caller's notifications, newest first
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    security(("bearer_auth" = [])),
    params(NotificationQuery),
    responses(
        (status = 200, description = "Notifications of the current user", body = PaginatedResponse<Notification>)
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<PaginatedResponse<Notification>>> {
    let (notifications, total) = state
        .services
        .notifications
        .list_notifications(claims.user_id, &query)
        .await?;
    Ok(Json(PaginatedResponse::new(
        notifications,
        total,
        query.page,
        query.size,
    )))
}

/// Mark all of the caller's notifications as read
#[utoipa::path(
    put,
    path = "/notifications/read-all",
    tag = "notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Number of notifications marked read", body = MarkedRead)
    )
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<MarkedRead>> {
    let updated = state
        .services
        .notifications
        .mark_all_read(claims.user_id)
        .await?;
    Ok(Json(MarkedRead { updated }))
}

/// Browse the audit trail
#[utoipa::path(
    get,
    path = "/audit-logs",
    tag = "notifications",
    security(("bearer_auth" = [])),
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = PaginatedResponse<AuditLog>),
        (status = 403, description = "Librarian rights required")
    )
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<Json<PaginatedResponse<AuditLog>>> {
    claims.require_staff()?;

    let (logs, total) = state.services.notifications.list_audit_logs(&query).await?;
    Ok(Json(PaginatedResponse::new(logs, total, query.page, query.size)))
}
