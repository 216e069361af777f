//! Availability and borrowed-count queries

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Book, BookResponse},
    repository::{CopyStore, LoanStore},
};

/// What a borrowed count is scoped to, and which loans it counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowScope {
    /// Borrowed, pending or overdue loans over the book's copies
    Book(Uuid),
    /// Borrowed loans held by the user
    User(Uuid),
    /// Borrowed, pending or overdue loans on the copy
    Copy(Uuid),
}

#[derive(Clone)]
pub struct AvailabilityService {
    copies: Arc<dyn CopyStore>,
    loans: Arc<dyn LoanStore>,
}

impl AvailabilityService {
    pub fn new(copies: Arc<dyn CopyStore>, loans: Arc<dyn LoanStore>) -> Self {
        Self { copies, loans }
    }

    /// Total copies minus borrowed loans over the book's copies
    ///
    /// Counted from loans, not from copy status.
    pub async fn available_copies(&self, book_id: Uuid) -> AppResult<u32> {
        self.loans.available_copies(book_id).await
    }

    pub async fn count_borrowed(&self, scope: BorrowScope) -> AppResult<i64> {
        match scope {
            BorrowScope::Book(id) => self.loans.count_borrowed_for_book(id).await,
            BorrowScope::User(id) => self.loans.count_borrowed_for_user(id).await,
            BorrowScope::Copy(id) => self.copies.count_borrowed_for_copy(id).await,
        }
    }

    pub async fn with_availability(&self, book: Book) -> AppResult<BookResponse> {
        let available_copies = self.available_copies(book.id).await?;
        Ok(BookResponse {
            book,
            available_copies,
        })
    }
}
