//! Loans repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{LoanStore, Repository};
use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{LoanQuery, NewLoan},
        Loan, LoanPatch, LoanStatus, Pagination,
    },
};

/// Loan statuses that block copy, book and user deletion
pub(crate) const BLOCKING_STATUSES: &str = "('borrowed', 'pending', 'overdue')";

fn push_loan_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &LoanQuery) {
    qb.push(" WHERE 1=1");
    if let Some(user_id) = query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(book_id) = query.book_id {
        qb.push(" AND book_id = ").push_bind(book_id);
    }
    match query.status {
        Some(LoanStatus::Overdue) => {
            qb.push(
                " AND (status = 'overdue' OR (status = 'borrowed' AND returned_date IS NULL AND due_date < NOW()))",
            );
        }
        Some(status) => {
            qb.push(" AND status = ").push_bind(status);
        }
        None => {}
    }
    if let Some(date) = query.borrowed_date {
        qb.push(" AND (borrowed_date AT TIME ZONE 'UTC')::date = ").push_bind(date);
    }
    if let Some(date) = query.due_date {
        qb.push(" AND (due_date AT TIME ZONE 'UTC')::date = ").push_bind(date);
    }
}

/// Locks the copy row and rejects a second issued loan on it
async fn ensure_copy_not_issued(
    tx: &mut Transaction<'_, Postgres>,
    copy_id: Uuid,
    except_loan: Option<Uuid>,
) -> AppResult<()> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM book_copies WHERE id = $1 FOR UPDATE")
        .bind(copy_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book copy with id {} not found", copy_id)))?;

    let issued: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM borrowed_books
            WHERE book_copy_id = $1 AND status IN ('borrowed', 'overdue') AND returned_date IS NULL
              AND ($2::uuid IS NULL OR id <> $2)
        )
        "#,
    )
    .bind(copy_id)
    .bind(except_loan)
    .fetch_one(&mut **tx)
    .await?;

    if issued {
        return Err(AppError::Conflict("book copy is already borrowed".to_string()));
    }
    Ok(())
}

#[async_trait]
impl LoanStore for Repository {
    async fn create_loan(&self, loan: NewLoan) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        if loan.status == LoanStatus::Borrowed {
            ensure_copy_not_issued(&mut tx, loan.book_copy_id, None).await?;
        } else {
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM book_copies WHERE id = $1 FOR UPDATE")
                .bind(loan.book_copy_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("Book copy with id {} not found", loan.book_copy_id))
                })?;
        }

        // The partial unique index backs this check under concurrent inserts
        let open: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrowed_books WHERE user_id = $1 AND book_id = $2 AND returned_date IS NULL)",
        )
        .bind(loan.user_id)
        .bind(loan.book_id)
        .fetch_one(&mut *tx)
        .await?;

        if open {
            return Err(AppError::Conflict("book already borrowed".to_string()));
        }

        let now = Utc::now();
        let created = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO borrowed_books (
                id, user_id, book_id, book_copy_id, librarian_id, borrowed_date, due_date,
                returned_date, renewal_count, status, is_active, remarks, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, 0, $8, TRUE, $9, $10, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(loan.user_id)
        .bind(loan.book_id)
        .bind(loan.book_copy_id)
        .bind(loan.librarian_id)
        .bind(loan.borrowed_date)
        .bind(loan.due_date)
        .bind(loan.status)
        .bind(&loan.remarks)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn list_loans(&self, query: &LoanQuery) -> AppResult<(Vec<Loan>, i64)> {
        let page = Pagination::new(query.page, query.size);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM borrowed_books");
        push_loan_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM borrowed_books");
        push_loan_filters(&mut select, query);
        select.push(" ORDER BY ");
        if let Some(text) = query.query.as_deref().filter(|q| !q.is_empty()) {
            select
                .push("(COALESCE(remarks, '') ILIKE ")
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

        let loans = select.build_query_as::<Loan>().fetch_all(&self.pool).await?;

        Ok((loans, total))
    }

    async fn get_loan(&self, id: Uuid) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM borrowed_books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    async fn get_loans_for_user(&self, user_id: Uuid) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM borrowed_books WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    async fn has_open_loan(&self, user_id: Uuid, book_id: Uuid) -> AppResult<bool> {
        let open: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrowed_books WHERE user_id = $1 AND book_id = $2 AND returned_date IS NULL)",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(open)
    }

    async fn available_copies(&self, book_id: Uuid) -> AppResult<u32> {
        let total: i32 = sqlx::query_scalar("SELECT total_copies FROM books WHERE id = $1")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let borrowed: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM borrowed_books bb
            JOIN book_copies bc ON bc.id = bb.book_copy_id
            WHERE bc.book_id = $1 AND bb.status = 'borrowed'
            "#,
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((i64::from(total) - borrowed).max(0) as u32)
    }

    async fn count_borrowed_for_book(&self, book_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(*) FROM borrowed_books bb
            JOIN book_copies bc ON bc.id = bb.book_copy_id
            WHERE bc.book_id = $1 AND bb.status IN {}
            "#,
            BLOCKING_STATUSES
        ))
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_borrowed_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowed_books WHERE user_id = $1 AND status = 'borrowed'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn update_loan(&self, id: Uuid, patch: &LoanPatch) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let mut loan =
            sqlx::query_as::<_, Loan>("SELECT * FROM borrowed_books WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        let was_issued = loan.is_issued();
        patch.apply(&mut loan, Utc::now());

        if loan.is_issued() && !was_issued {
            ensure_copy_not_issued(&mut tx, loan.book_copy_id, Some(loan.id)).await?;
        }

        let updated = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE borrowed_books
            SET user_id = $2, book_id = $3, librarian_id = $4, borrowed_date = $5, due_date = $6,
                returned_date = $7, renewal_count = $8, status = $9, remarks = $10, updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(loan.user_id)
        .bind(loan.book_id)
        .bind(loan.librarian_id)
        .bind(loan.borrowed_date)
        .bind(loan.due_date)
        .bind(loan.returned_date)
        .bind(loan.renewal_count)
        .bind(loan.status)
        .bind(&loan.remarks)
        .bind(loan.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_loan(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM borrowed_books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Loan with id {} not found", id)));
        }
        Ok(())
    }
}
