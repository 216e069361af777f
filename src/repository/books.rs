//! Books repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{loans::BLOCKING_STATUSES, BookStore, Repository};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookQuery, NewBook},
        Book, Pagination,
    },
};

fn push_book_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    qb.push(" WHERE is_active = TRUE");
    if let Some(title) = query.query.as_deref().filter(|q| !q.is_empty()) {
        qb.push(" AND title ILIKE ").push_bind(format!("%{}%", title));
    }
    if let Some(author) = query.author.as_deref().filter(|a| !a.is_empty()) {
        qb.push(" AND author ILIKE ").push_bind(format!("%{}%", author));
    }
    if let Some(category_id) = query.category_id {
        qb.push(" AND category_id = ").push_bind(category_id);
    }
}

#[async_trait]
impl BookStore for Repository {
    async fn create_book(&self, book: NewBook) -> AppResult<Book> {
        let now = Utc::now();
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (id, title, author, category_id, total_copies, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, TRUE, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.category_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let page = Pagination::new(query.page, query.size);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books");
        push_book_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM books");
        push_book_filters(&mut select, query);
        select
            .push(" ORDER BY ")
            .push(query.sort_column.unwrap_or_default().as_sql())
            .push(" ")
            .push(query.sort_direction.unwrap_or_default().as_sql())
            .push(" LIMIT ")
            .push_bind(page.size)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let books = select.build_query_as::<Book>().fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    async fn adjust_total_copies(&self, id: Uuid, delta: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET total_copies = GREATEST(total_copies + $2, 0), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Row lock also blocks concurrent copy inserts through the foreign key
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let borrowed: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(*) FROM borrowed_books bb
            JOIN book_copies bc ON bc.id = bb.book_copy_id
            WHERE bc.book_id = $1 AND bb.status IN {}
            "#,
            BLOCKING_STATUSES
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if borrowed > 0 {
            return Err(AppError::Conflict(
                "book cannot be deleted while copies are on loan".to_string(),
            ));
        }

        let has_copies: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM book_copies WHERE book_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        if has_copies {
            return Err(AppError::Conflict(
                "book cannot be deleted while it has copies".to_string(),
            ));
        }

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
