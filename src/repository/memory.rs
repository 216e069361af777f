//! In-process store
//!
//! Holds every table behind one `RwLock`; each guarded check-and-write runs under a
//! single write guard, matching the row-lock transactions of the PostgreSQL adapter.
//! Backs the unit and integration test suites.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditLogStore, BookStore, CopyStore, LoanStore, NotificationStore, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        audit_log::AuditLogQuery,
        book::{BookQuery, BookSortColumn, NewBook},
        copy::{CopyQuery, CopySortColumn, NewBookCopy},
        loan::{LoanQuery, LoanSortColumn, NewLoan},
        notification::NotificationQuery,
        AuditLog, Book, BookCopy, CopyPatch, Loan, LoanPatch, LoanStatus, NewAuditLog,
        NewNotification, Notification, Pagination, User, UserRole,
    },
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    books: Vec<Book>,
    copies: Vec<BookCopy>,
    loans: Vec<Loan>,
    audit_logs: Vec<AuditLog>,
    notifications: Vec<Notification>,
}

impl State {
    fn copy_ids_of_book(&self, book_id: Uuid) -> Vec<Uuid> {
        self.copies
            .iter()
            .filter(|c| c.book_id == book_id)
            .map(|c| c.id)
            .collect()
    }

    /// Loans joined through the book's copies
    fn count_loans_for_book(&self, book_id: Uuid, matches: impl Fn(&Loan) -> bool) -> i64 {
        let copy_ids = self.copy_ids_of_book(book_id);
        self.loans
            .iter()
            .filter(|l| copy_ids.contains(&l.book_copy_id) && matches(l))
            .count() as i64
    }

    fn count_blocking_for_copy(&self, copy_id: Uuid) -> i64 {
        self.loans
            .iter()
            .filter(|l| l.book_copy_id == copy_id && l.status.is_blocking())
            .count() as i64
    }

    fn has_open_loan(&self, user_id: Uuid, book_id: Uuid, except: Option<Uuid>) -> bool {
        self.loans.iter().any(|l| {
            l.user_id == user_id && l.book_id == book_id && l.is_open() && Some(l.id) != except
        })
    }

    fn copy_issued_elsewhere(&self, copy_id: Uuid, except: Option<Uuid>) -> bool {
        self.loans
            .iter()
            .any(|l| l.book_copy_id == copy_id && l.is_issued() && Some(l.id) != except)
    }

    fn book_mut(&mut self, id: Uuid) -> AppResult<&mut Book> {
        self.books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Users are provisioned outside this service; this seeds one
    pub async fn insert_user(&self, username: &str, role: UserRole) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            full_name: username.to_string(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.state.write().await.users.push(user.clone());
        user
    }

    /// Stores a loan row as is, bypassing every check
    pub async fn insert_loan(&self, loan: Loan) {
        self.state.write().await.loans.push(loan);
    }

    pub async fn audit_logs(&self) -> Vec<AuditLog> {
        self.state.read().await.audit_logs.clone()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }
}

#[async_trait]
impl BookStore for InMemoryStore {
    async fn create_book(&self, book: NewBook) -> AppResult<Book> {
        let now = Utc::now();
        let created = Book {
            id: Uuid::new_v4(),
            title: book.title,
            author: book.author,
            category_id: book.category_id,
            total_copies: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.state.write().await.books.push(created.clone());
        Ok(created)
    }

    async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.state
            .read()
            .await
            .books
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let state = self.state.read().await;
        let mut books: Vec<Book> = state
            .books
            .iter()
            .filter(|b| b.is_active)
            .filter(|b| match query.query.as_deref().filter(|q| !q.is_empty()) {
                Some(q) => contains_ci(&b.title, q),
                None => true,
            })
            .filter(|b| match query.author.as_deref().filter(|a| !a.is_empty()) {
                Some(a) => contains_ci(&b.author, a),
                None => true,
            })
            .filter(|b| query.category_id.map_or(true, |c| b.category_id == Some(c)))
            .cloned()
            .collect();

        let direction = query.sort_direction.unwrap_or_default();
        let column = query.sort_column.unwrap_or_default();
        books.sort_by(|a, b| {
            direction.apply(match column {
                BookSortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
                BookSortColumn::Title => a.title.cmp(&b.title),
                BookSortColumn::Author => a.author.cmp(&b.author),
            })
        });

        let total = books.len() as i64;
        Ok((Pagination::new(query.page, query.size).slice(books), total))
    }

    async fn adjust_total_copies(&self, id: Uuid, delta: i32) -> AppResult<Book> {
        let mut state = self.state.write().await;
        let book = state.book_mut(id)?;
        book.total_copies = (book.total_copies + delta).max(0);
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.book_mut(id)?;

        if state.count_loans_for_book(id, |l| l.status.is_blocking()) > 0 {
            return Err(AppError::Conflict(
                "book cannot be deleted while copies are on loan".to_string(),
            ));
        }
        if state.copies.iter().any(|c| c.book_id == id) {
            return Err(AppError::Conflict(
                "book cannot be deleted while it has copies".to_string(),
            ));
        }

        state.books.retain(|b| b.id != id);
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.state
            .read()
            .await
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.users.iter().any(|u| u.id == id) {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }

        let borrowed = state
            .loans
            .iter()
            .filter(|l| l.user_id == id && l.status == LoanStatus::Borrowed)
            .count();
        if borrowed > 0 {
            return Err(AppError::Conflict(format!(
                "user still has {} borrowed book(s)",
                borrowed
            )));
        }

        state.users.retain(|u| u.id != id);
        Ok(())
    }
}

#[async_trait]
impl CopyStore for InMemoryStore {
    async fn create_copy(&self, copy: NewBookCopy) -> AppResult<BookCopy> {
        let mut state = self.state.write().await;
        state.book_mut(copy.book_id)?;

        if state
            .copies
            .iter()
            .any(|c| c.book_id == copy.book_id && c.accession_number == copy.accession_number)
        {
            return Err(AppError::Conflict(
                "accession number already exists for this book".to_string(),
            ));
        }

        let now = Utc::now();
        let created = BookCopy {
            id: Uuid::new_v4(),
            book_id: copy.book_id,
            accession_number: copy.accession_number,
            status: copy.status,
            labels: None,
            remarks: copy.remarks,
            created_at: now,
            updated_at: now,
        };
        state.copies.push(created.clone());
        Ok(created)
    }

    async fn list_copies(&self, query: &CopyQuery) -> AppResult<(Vec<BookCopy>, i64)> {
        let state = self.state.read().await;
        let mut copies: Vec<BookCopy> = state
            .copies
            .iter()
            .filter(|c| query.book_id.map_or(true, |b| c.book_id == b))
            .filter(|c| match query.accession_number.as_deref().filter(|a| !a.is_empty()) {
                Some(a) => c.accession_number == a,
                None => true,
            })
            .filter(|c| query.status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();

        let direction = query.sort_direction.unwrap_or_default();
        let column = query.sort_column.unwrap_or_default();
        let boost = query.query.as_deref().filter(|q| !q.is_empty());
        let boosted = |c: &BookCopy| boost.map_or(false, |q| contains_ci(&c.accession_number, q));
        copies.sort_by(|a, b| {
            boosted(b).cmp(&boosted(a)).then_with(|| {
                direction.apply(match column {
                    CopySortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
                    CopySortColumn::AccessionNumber => a.accession_number.cmp(&b.accession_number),
                    CopySortColumn::Status => a.status.as_str().cmp(b.status.as_str()),
                })
            })
        });

        let total = copies.len() as i64;
        Ok((Pagination::new(query.page, query.size).slice(copies), total))
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
        self.state
            .read()
            .await
            .copies
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book copy with id {} not found", id)))
    }

    async fn update_copy(&self, id: Uuid, patch: &CopyPatch) -> AppResult<BookCopy> {
        let mut state = self.state.write().await;

        if let Some(ref accession_number) = patch.accession_number {
            let book_id = state
                .copies
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.book_id);
            let taken = state.copies.iter().any(|c| {
                Some(c.book_id) == book_id && c.id != id && &c.accession_number == accession_number
            });
            if taken {
                return Err(AppError::Conflict(
                    "accession number already exists for this book".to_string(),
                ));
            }
        }

        let copy = state
            .copies
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Book copy with id {} not found", id)))?;
        patch.apply(copy, Utc::now());
        Ok(copy.clone())
    }

    async fn delete_copy(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.copies.iter().any(|c| c.id == id) {
            return Err(AppError::NotFound(format!("Book copy with id {} not found", id)));
        }
        if state.count_blocking_for_copy(id) > 0 {
            return Err(AppError::Conflict(
                "book copy has active loans and cannot be deleted".to_string(),
            ));
        }
        state.copies.retain(|c| c.id != id);
        Ok(())
    }

    async fn has_copies_for_book(&self, book_id: Uuid) -> AppResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .copies
            .iter()
            .any(|c| c.book_id == book_id))
    }

    async fn count_borrowed_for_copy(&self, copy_id: Uuid) -> AppResult<i64> {
        Ok(self.state.read().await.count_blocking_for_copy(copy_id))
    }
}

#[async_trait]
impl LoanStore for InMemoryStore {
    async fn create_loan(&self, loan: NewLoan) -> AppResult<Loan> {
        let mut state = self.state.write().await;

        if !state.copies.iter().any(|c| c.id == loan.book_copy_id) {
            return Err(AppError::NotFound(format!(
                "Book copy with id {} not found",
                loan.book_copy_id
            )));
        }
        if loan.status == LoanStatus::Borrowed && state.copy_issued_elsewhere(loan.book_copy_id, None)
        {
            return Err(AppError::Conflict("book copy is already borrowed".to_string()));
        }
        if state.has_open_loan(loan.user_id, loan.book_id, None) {
            return Err(AppError::Conflict("book already borrowed".to_string()));
        }

        let now = Utc::now();
        let created = Loan {
            id: Uuid::new_v4(),
            user_id: loan.user_id,
            book_id: loan.book_id,
            book_copy_id: loan.book_copy_id,
            librarian_id: loan.librarian_id,
            borrowed_date: loan.borrowed_date,
            due_date: loan.due_date,
            returned_date: None,
            renewal_count: 0,
            status: loan.status,
            is_active: true,
            remarks: loan.remarks,
            created_at: now,
            updated_at: now,
        };
        state.loans.push(created.clone());
        Ok(created)
    }

    async fn list_loans(&self, query: &LoanQuery) -> AppResult<(Vec<Loan>, i64)> {
        let now = Utc::now();
        let state = self.state.read().await;
        let mut loans: Vec<Loan> = state
            .loans
            .iter()
            .filter(|l| query.user_id.map_or(true, |u| l.user_id == u))
            .filter(|l| query.book_id.map_or(true, |b| l.book_id == b))
            .filter(|l| match query.status {
                Some(LoanStatus::Overdue) => {
                    l.status == LoanStatus::Overdue || (l.is_issued() && l.due_date < now)
                }
                Some(status) => l.status == status,
                None => true,
            })
            .filter(|l| {
                query
                    .borrowed_date
                    .map_or(true, |d| l.borrowed_date.map(|b| b.date_naive()) == Some(d))
            })
            .filter(|l| query.due_date.map_or(true, |d| l.due_date.date_naive() == d))
            .cloned()
            .collect();

        let direction = query.sort_direction.unwrap_or_default();
        let column = query.sort_column.unwrap_or_default();
        let boost = query.query.as_deref().filter(|q| !q.is_empty());
        let boosted = |l: &Loan| {
            boost.map_or(false, |q| {
                l.remarks.as_deref().map_or(false, |r| contains_ci(r, q))
            })
        };
        loans.sort_by(|a, b| {
            boosted(b).cmp(&boosted(a)).then_with(|| {
                direction.apply(match column {
                    LoanSortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
                    LoanSortColumn::DueDate => a.due_date.cmp(&b.due_date),
                    LoanSortColumn::BorrowedDate => a.borrowed_date.cmp(&b.borrowed_date),
                    LoanSortColumn::Status => a.status.as_str().cmp(b.status.as_str()),
                })
            })
        });

        let total = loans.len() as i64;
        Ok((Pagination::new(query.page, query.size).slice(loans), total))
    }

    async fn get_loan(&self, id: Uuid) -> AppResult<Loan> {
        self.state
            .read()
            .await
            .loans
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    async fn get_loans_for_user(&self, user_id: Uuid) -> AppResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .state
            .read()
            .await
            .loans
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(loans)
    }

    async fn has_open_loan(&self, user_id: Uuid, book_id: Uuid) -> AppResult<bool> {
        Ok(self.state.read().await.has_open_loan(user_id, book_id, None))
    }

    async fn available_copies(&self, book_id: Uuid) -> AppResult<u32> {
        let state = self.state.read().await;
        let total = state
            .books
            .iter()
            .find(|b| b.id == book_id)
            .map(|b| b.total_copies)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        let borrowed = state.count_loans_for_book(book_id, |l| l.status == LoanStatus::Borrowed);
        Ok((i64::from(total) - borrowed).max(0) as u32)
    }

    async fn count_borrowed_for_book(&self, book_id: Uuid) -> AppResult<i64> {
        Ok(self
            .state
            .read()
            .await
            .count_loans_for_book(book_id, |l| l.status.is_blocking()))
    }

    async fn count_borrowed_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        Ok(self
            .state
            .read()
            .await
            .loans
            .iter()
            .filter(|l| l.user_id == user_id && l.status == LoanStatus::Borrowed)
            .count() as i64)
    }

    async fn update_loan(&self, id: Uuid, patch: &LoanPatch) -> AppResult<Loan> {
        let mut state = self.state.write().await;

        let mut loan = state
            .loans
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        let was_issued = loan.is_issued();
        patch.apply(&mut loan, Utc::now());

        if loan.is_issued() && !was_issued && state.copy_issued_elsewhere(loan.book_copy_id, Some(id))
        {
            return Err(AppError::Conflict("book copy is already borrowed".to_string()));
        }
        if loan.is_open() && state.has_open_loan(loan.user_id, loan.book_id, Some(id)) {
            return Err(AppError::Conflict("book already borrowed".to_string()));
        }

        if let Some(stored) = state.loans.iter_mut().find(|l| l.id == id) {
            *stored = loan.clone();
        }
        Ok(loan)
    }

    async fn delete_loan(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        let before = state.loans.len();
        state.loans.retain(|l| l.id != id);
        if state.loans.len() == before {
            return Err(AppError::NotFound(format!("Loan with id {} not found", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLogStore for InMemoryStore {
    async fn append_audit_log(&self, entry: NewAuditLog) -> AppResult<AuditLog> {
        let log = AuditLog {
            id: Uuid::new_v4(),
            title: entry.title,
            user_id: entry.user_id,
            action: entry.action,
            data: entry.data,
            is_active: true,
            created_at: Utc::now(),
        };
        self.state.write().await.audit_logs.push(log.clone());
        Ok(log)
    }

    async fn list_audit_logs(&self, query: &AuditLogQuery) -> AppResult<(Vec<AuditLog>, i64)> {
        let state = self.state.read().await;
        let logs: Vec<AuditLog> = state
            .audit_logs
            .iter()
            .rev()
            .filter(|l| query.user_id.map_or(true, |u| l.user_id == Some(u)))
            .filter(|l| query.action.map_or(true, |a| l.action == a))
            .cloned()
            .collect();

        let total = logs.len() as i64;
        Ok((Pagination::new(query.page, query.size).slice(logs), total))
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn append_notification(&self, notification: NewNotification) -> AppResult<Notification> {
        let created = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            title: notification.title,
            description: notification.description,
            module: notification.module,
            action: notification.action,
            notification_type: notification.notification_type,
            is_read: false,
            is_active: true,
            created_at: Utc::now(),
        };
        self.state.write().await.notifications.push(created.clone());
        Ok(created)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> AppResult<(Vec<Notification>, i64)> {
        let unread_only = query.unread_only.unwrap_or(false);
        let state = self.state.read().await;
        let notifications: Vec<Notification> = state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id && n.is_active)
            .filter(|n| !unread_only || !n.is_read)
            .cloned()
            .collect();

        let total = notifications.len() as i64;
        Ok((Pagination::new(query.page, query.size).slice(notifications), total))
    }

    async fn mark_all_read(&self, user_id: Uuid) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for n in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }
}
