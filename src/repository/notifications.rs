//! Notifications repository

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{NotificationStore, Repository};
use crate::{
    error::AppResult,
    models::{notification::NotificationQuery, NewNotification, Notification, Pagination},
};

fn push_notification_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    user_id: Uuid,
    query: &NotificationQuery,
) {
    qb.push(" WHERE is_active = TRUE AND user_id = ").push_bind(user_id);
    if query.unread_only.unwrap_or(false) {
        qb.push(" AND is_read = FALSE");
    }
}

#[async_trait]
impl NotificationStore for Repository {
    async fn append_notification(&self, notification: NewNotification) -> AppResult<Notification> {
        let created = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, user_id, title, description, module, action, type, is_read, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, TRUE, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.description)
        .bind(&notification.module)
        .bind(notification.action)
        .bind(&notification.notification_type)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> AppResult<(Vec<Notification>, i64)> {
        let page = Pagination::new(query.page, query.size);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications");
        push_notification_filters(&mut count, user_id, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM notifications");
        push_notification_filters(&mut select, user_id, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.size)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let notifications = select
            .build_query_as::<Notification>()
            .fetch_all(&self.pool)
            .await?;

        Ok((notifications, total))
    }

    async fn mark_all_read(&self, user_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
