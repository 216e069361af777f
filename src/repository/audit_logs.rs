//! Audit log repository

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{AuditLogStore, Repository};
use crate::{
    error::AppResult,
    models::{audit_log::AuditLogQuery, AuditLog, NewAuditLog, Pagination},
};

fn push_audit_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &AuditLogQuery) {
    qb.push(" WHERE is_active = TRUE");
    if let Some(user_id) = query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(action) = query.action {
        qb.push(" AND action = ").push_bind(action);
    }
}

#[async_trait]
impl AuditLogStore for Repository {
    async fn append_audit_log(&self, entry: NewAuditLog) -> AppResult<AuditLog> {
        let log = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (id, title, user_id, action, data, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.title)
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(&entry.data)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(log)
    }

    async fn list_audit_logs(&self, query: &AuditLogQuery) -> AppResult<(Vec<AuditLog>, i64)> {
        let page = Pagination::new(query.page, query.size);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM audit_logs");
        push_audit_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.size)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let logs = select.build_query_as::<AuditLog>().fetch_all(&self.pool).await?;

        Ok((logs, total))
    }
}
