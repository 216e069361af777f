//! Catalog service: books and their initial copies

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use super::{
    availability::{AvailabilityService, BorrowScope},
    copies::{created_delta, CopiesService},
    side_effects::{Outcome, SideEffects},
};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookQuery, CreateBook, CreatedBook, NewBook},
        copy::CopyBatch,
        notification::MODULE_BOOK,
        AuditAction, BookResponse, NewAuditLog, NewNotification,
    },
    repository::{BookStore, CopyStore},
};

#[derive(Clone)]
pub struct BooksService {
    books: Arc<dyn BookStore>,
    copies_store: Arc<dyn CopyStore>,
    copies: CopiesService,
    availability: AvailabilityService,
    side_effects: SideEffects,
}

impl BooksService {
    pub fn new(
        books: Arc<dyn BookStore>,
        copies_store: Arc<dyn CopyStore>,
        copies: CopiesService,
        availability: AvailabilityService,
        side_effects: SideEffects,
    ) -> Self {
        Self {
            books,
            copies_store,
            copies,
            availability,
            side_effects,
        }
    }

    /// Creates a book with its initial copies and records one batch audit entry
    ///
    /// `total_copies` ends up equal to the number of copies actually created.
    pub async fn create_book(
        &self,
        actor: Uuid,
        request: CreateBook,
    ) -> AppResult<Outcome<CreatedBook>> {
        request.validate()?;
        let numbers = match request.copy_mode()? {
            Some(mode) => self.copies.accession_numbers(mode)?,
            None => Vec::new(),
        };

        let book = self
            .books
            .create_book(NewBook {
                title: request.title.trim().to_string(),
                author: request.author.trim().to_string(),
                category_id: request.category_id,
            })
            .await?;

        let copies: CopyBatch = self.copies.create_batch(book.id, numbers, None).await;
        let book = if copies.created.is_empty() {
            book
        } else {
            self.books
                .adjust_total_copies(book.id, created_delta(&copies)?)
                .await?
        };

        tracing::info!(
            book_id = %book.id,
            copies = copies.created.len(),
            failed = copies.failed.len(),
            "book created"
        );

        let mut emission = self.side_effects.batch();
        emission
            .notify(NewNotification::new(
                actor,
                MODULE_BOOK,
                AuditAction::Create,
                format!(
                    "Created new Book {} with {} copies.",
                    book.title, book.total_copies
                ),
                format!("{} by {}", book.title, book.author),
            ))
            .await;
        emission
            .audit(NewAuditLog::new(
                format!("Created new Book {} with copies.", book.title),
                actor,
                AuditAction::Create,
                &serde_json::json!({ "book": &book, "copies": &copies }),
            ))
            .await;

        let book = self.availability.with_availability(book).await?;
        Ok(emission.finish(CreatedBook { book, copies }))
    }

    pub async fn get_book(&self, id: Uuid) -> AppResult<BookResponse> {
        let book = self.books.get_book(id).await?;
        self.availability.with_availability(book).await
    }

    pub async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<BookResponse>, i64)> {
        let (books, total) = self.books.list_books(query).await?;

        let mut items = Vec::with_capacity(books.len());
        for book in books {
            items.push(self.availability.with_availability(book).await?);
        }

        Ok((items, total))
    }

    /// Deletes a book once it has no copies and no loans over its copies
    pub async fn delete_book(&self, actor: Uuid, id: Uuid) -> AppResult<Outcome<()>> {
        let book = self.books.get_book(id).await?;

        let borrowed = self.availability.count_borrowed(BorrowScope::Book(id)).await?;
        if borrowed > 0 {
            return Err(AppError::Conflict(
                "book cannot be deleted while copies are on loan".to_string(),
            ));
        }
        if self.copies_store.has_copies_for_book(id).await? {
            return Err(AppError::Conflict(
                "book cannot be deleted while it has copies".to_string(),
            ));
        }

        self.books.delete_book(id).await?;
        tracing::info!(book_id = %id, "book deleted");

        let mut emission = self.side_effects.batch();
        emission
            .audit(NewAuditLog::new(
                format!("Deleted book {}.", book.title),
                actor,
                AuditAction::Delete,
                &book,
            ))
            .await;

        Ok(emission.finish(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::LendingConfig,
        repository::{memory::InMemoryStore, Stores},
        services::Services,
    };

    fn setup() -> (Arc<InMemoryStore>, Services) {
        let store = Arc::new(InMemoryStore::new());
        let services = Services::new(Stores::from_store(store.clone()), LendingConfig::default());
        (store, services)
    }

    fn request(total: Option<u32>, range: Option<(u32, u32)>) -> CreateBook {
        CreateBook {
            title: "Intro to Algorithms".to_string(),
            author: "Cormen".to_string(),
            category_id: None,
            total_copies: total,
            start_accession_number: range.map(|r| r.0),
            end_accession_number: range.map(|r| r.1),
        }
    }

    #[tokio::test]
    async fn book_creation_emits_a_single_batch_audit() {
        let (store, services) = setup();
        let outcome = services
            .books
            .create_book(Uuid::new_v4(), request(Some(4), None))
            .await
            .unwrap();

        assert_eq!(outcome.value.book.book.total_copies, 4);
        assert_eq!(outcome.value.book.available_copies, 4);
        assert_eq!(outcome.value.copies.created[0].accession_number, "000");
        assert_eq!(store.audit_logs().await.len(), 1);
        assert_eq!(store.notifications().await.len(), 1);
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let (_, services) = setup();
        let mut req = request(None, None);
        req.title = String::new();
        let err = services.books.create_book(Uuid::new_v4(), req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn list_filters_titles_by_substring() {
        let (_, services) = setup();
        let actor = Uuid::new_v4();
        services.books.create_book(actor, request(None, None)).await.unwrap();
        let mut other = request(None, None);
        other.title = "Dune".to_string();
        services.books.create_book(actor, other).await.unwrap();

        let query = BookQuery {
            query: Some("algo".to_string()),
            ..Default::default()
        };
        let (books, total) = services.books.list_books(&query).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(books[0].book.title, "Intro to Algorithms");
    }

    #[tokio::test]
    async fn book_with_copies_cannot_be_deleted() {
        let (_, services) = setup();
        let actor = Uuid::new_v4();
        let created = services
            .books
            .create_book(actor, request(None, Some((1, 1))))
            .await
            .unwrap()
            .value;
        let book_id = created.book.book.id;

        let err = services.books.delete_book(actor, book_id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        services
            .copies
            .delete_copy(actor, created.copies.created[0].id)
            .await
            .unwrap();
        services.books.delete_book(actor, book_id).await.unwrap();
        assert!(services.books.get_book(book_id).await.unwrap_err().is_not_found());
    }
}
