//! Repository layer: store traits and their adapters
//!
//! Services only see the traits. [`Repository`] implements them on PostgreSQL,
//! [`memory::InMemoryStore`] in process.

pub mod audit_logs;
pub mod books;
pub mod copies;
pub mod loans;
pub mod memory;
pub mod notifications;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        audit_log::AuditLogQuery,
        book::{BookQuery, NewBook},
        copy::{CopyQuery, NewBookCopy},
        loan::{LoanQuery, NewLoan},
        notification::NotificationQuery,
        AuditLog, Book, BookCopy, CopyPatch, Loan, LoanPatch, NewAuditLog, NewNotification,
        Notification, User,
    },
};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
pub trait BookStore: Send + Sync {
    async fn create_book(&self, book: NewBook) -> AppResult<Book>;
    async fn get_book(&self, id: Uuid) -> AppResult<Book>;
    async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)>;
    /// Adds `delta` to `total_copies`, never going below zero
    async fn adjust_total_copies(&self, id: Uuid, delta: i32) -> AppResult<Book>;
    /// Deletes the book unless it still has copies or blocking loans (Conflict)
    async fn delete_book(&self, id: Uuid) -> AppResult<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> AppResult<User>;
    /// Deletes the user unless they hold borrowed loans (Conflict)
    async fn delete_user(&self, id: Uuid) -> AppResult<()>;
}

#[async_trait]
pub trait CopyStore: Send + Sync {
    async fn create_copy(&self, copy: NewBookCopy) -> AppResult<BookCopy>;
    async fn list_copies(&self, query: &CopyQuery) -> AppResult<(Vec<BookCopy>, i64)>;
    async fn list_copies_for_book(
        &self,
        book_id: Uuid,
        query: &CopyQuery,
    ) -> AppResult<(Vec<BookCopy>, i64)>;
    async fn get_copy(&self, id: Uuid) -> AppResult<BookCopy>;
    async fn update_copy(&self, id: Uuid, patch: &CopyPatch) -> AppResult<BookCopy>;
    /// Deletes the copy unless a loan on it is borrowed, pending or overdue (Conflict)
    async fn delete_copy(&self, id: Uuid) -> AppResult<()>;
    async fn has_copies_for_book(&self, book_id: Uuid) -> AppResult<bool>;
    async fn count_borrowed_for_copy(&self, copy_id: Uuid) -> AppResult<i64>;
}

#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Inserts the loan unless the user already has an open loan for the book (Conflict)
    async fn create_loan(&self, loan: NewLoan) -> AppResult<Loan>;
    async fn list_loans(&self, query: &LoanQuery) -> AppResult<(Vec<Loan>, i64)>;
    async fn get_loan(&self, id: Uuid) -> AppResult<Loan>;
    async fn get_loans_for_user(&self, user_id: Uuid) -> AppResult<Vec<Loan>>;
    async fn has_open_loan(&self, user_id: Uuid, book_id: Uuid) -> AppResult<bool>;
    /// `total_copies` minus borrowed loans over the book's copies, floored at zero
    async fn available_copies(&self, book_id: Uuid) -> AppResult<u32>;
    /// Borrowed, pending or overdue loans over the book's copies
    async fn count_borrowed_for_book(&self, book_id: Uuid) -> AppResult<i64>;
    /// Borrowed loans held by the user
    async fn count_borrowed_for_user(&self, user_id: Uuid) -> AppResult<i64>;
    async fn update_loan(&self, id: Uuid, patch: &LoanPatch) -> AppResult<Loan>;
    async fn delete_loan(&self, id: Uuid) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append_audit_log(&self, entry: NewAuditLog) -> AppResult<AuditLog>;
    async fn list_audit_logs(&self, query: &AuditLogQuery) -> AppResult<(Vec<AuditLog>, i64)>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn append_notification(&self, notification: NewNotification) -> AppResult<Notification>;
    async fn list_notifications(
        &self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> AppResult<(Vec<Notification>, i64)>;
    async fn mark_all_read(&self, user_id: Uuid) -> AppResult<u64>;
}

/// Every store the services need, in one adapter
pub trait Store:
    BookStore + UserStore + CopyStore + LoanStore + AuditLogStore + NotificationStore
{
}

impl<T> Store for T where
    T: BookStore + UserStore + CopyStore + LoanStore + AuditLogStore + NotificationStore
{
}

/// Store handles shared by the services
#[derive(Clone)]
pub struct Stores {
    pub books: Arc<dyn BookStore>,
    pub users: Arc<dyn UserStore>,
    pub copies: Arc<dyn CopyStore>,
    pub loans: Arc<dyn LoanStore>,
    pub audit_logs: Arc<dyn AuditLogStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    pub fn from_store<S: Store + 'static>(store: Arc<S>) -> Self {
        Self {
            books: store.clone(),
            users: store.clone(),
            copies: store.clone(),
            loans: store.clone(),
            audit_logs: store.clone(),
            notifications: store,
        }
    }
}
