//! Book copies repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{loans::BLOCKING_STATUSES, CopyStore, Repository};
use crate::{
    error::{AppError, AppResult},
    models::{
        copy::{CopyQuery, NewBookCopy},
        BookCopy, CopyPatch, Pagination,
    },
};

fn push_copy_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &CopyQuery) {
    qb.push(" WHERE 1=1");
    if let Some(book_id) = query.book_id {
        qb.push(" AND book_id = ").push_bind(book_id);
    }
    if let Some(accession_number) = query.accession_number.as_deref().filter(|a| !a.is_empty()) {
        qb.push(" AND accession_number = ").push_bind(accession_number.to_string());
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status);
    }
}

#[async_trait]
impl CopyStore for Repository {
    async fn create_copy(&self, copy: NewBookCopy) -> AppResult<BookCopy> {
        let now = Utc::now();
        let created = sqlx::query_as::<_, BookCopy>(
            r#"
            INSERT INTO book_copies (id, book_id, accession_number, status, remarks, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(copy.book_id)
        .bind(&copy.accession_number)
        .bind(copy.status)
        .bind(&copy.remarks)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn list_copies(&self, query: &CopyQuery) -> AppResult<(Vec<BookCopy>, i64)> {
        let page = Pagination::new(query.page, query.size);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM book_copies");
        push_copy_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM book_copies");
        push_copy_filters(&mut select, query);
        select.push(" ORDER BY ");
        if let Some(text) = query.query.as_deref().filter(|q| !q.is_empty()) {
            select
                .push("(accession_number ILIKE ")
                .push_bind(format!("%{}%", text))
                .push(") DESC, ");
        }
        select
            .push(query.sort_column.unwrap_or_default().as_sql())
            .push(" ")
            .push(query.sort_direction.unwrap_or_default().as_sql())
            .push(" LIMIT ")
            .push_bind(page.size)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let copies = select.build_query_as::<BookCopy>().fetch_all(&self.pool).await?;

        Ok((copies, total))
    }

    async fn list_copies_for_book(
        &self,
        book_id: Uuid,
        query: &CopyQuery,
    ) -> AppResult<(Vec<BookCopy>, i64)> {
        let query = CopyQuery {
            book_id: Some(book_id),
            ..query.clone()
        };
        self.list_copies(&query).await
    }

    async fn get_copy(&self, id: Uuid) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>("SELECT * FROM book_copies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book copy with id {} not found", id)))
    }

    async fn update_copy(&self, id: Uuid, patch: &CopyPatch) -> AppResult<BookCopy> {
        let mut tx = self.pool.begin().await?;

        let mut copy =
            sqlx::query_as::<_, BookCopy>("SELECT * FROM book_copies WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Book copy with id {} not found", id)))?;

        patch.apply(&mut copy, Utc::now());

        let updated = sqlx::query_as::<_, BookCopy>(
            r#"
            UPDATE book_copies
            SET status = $2, accession_number = $3, labels = $4, remarks = $5, updated_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(copy.status)
        .bind(&copy.accession_number)
        .bind(&copy.labels)
        .bind(&copy.remarks)
        .bind(copy.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_copy(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Loan creation locks the same row, so the guard and the delete see a stable set of loans
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM book_copies WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book copy with id {} not found", id)))?;

        let active: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM borrowed_books WHERE book_copy_id = $1 AND status IN {}",
            BLOCKING_STATUSES
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if active > 0 {
            return Err(AppError::Conflict(
                "book copy has active loans and cannot be deleted".to_string(),
            ));
        }

        sqlx::query("DELETE FROM book_copies WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn has_copies_for_book(&self, book_id: Uuid) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM book_copies WHERE book_id = $1)")
                .bind(book_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn count_borrowed_for_copy(&self, copy_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM borrowed_books WHERE book_copy_id = $1 AND status IN {}",
            BLOCKING_STATUSES
        ))
        .bind(copy_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
