//! Copy inventory service

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use super::{
    availability::{AvailabilityService, BorrowScope},
    side_effects::{Outcome, SideEffects},
};
use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        copy::{CopyBatch, CopyQuery, FailedCopy, NewBookCopy},
        notification::MODULE_BOOK_COPY,
        AuditAction, BookCopy, CopyMode, CopyPatch, CopyStatus, NewAuditLog, NewNotification,
    },
    repository::{BookStore, CopyStore},
};

#[derive(Clone)]
pub struct CopiesService {
    copies: Arc<dyn CopyStore>,
    books: Arc<dyn BookStore>,
    availability: AvailabilityService,
    side_effects: SideEffects,
    accession_width: usize,
    max_batch_copies: u32,
}

impl CopiesService {
    pub fn new(
        copies: Arc<dyn CopyStore>,
        books: Arc<dyn BookStore>,
        availability: AvailabilityService,
        side_effects: SideEffects,
        lending: &LendingConfig,
    ) -> Self {
        Self {
            copies,
            books,
            availability,
            side_effects,
            accession_width: lending.accession_width,
            max_batch_copies: lending.max_batch_copies,
        }
    }

    /// Accession numbers for `mode`, within the configured batch limit
    pub(crate) fn accession_numbers(&self, mode: CopyMode) -> AppResult<Vec<String>> {
        mode.accession_numbers(self.accession_width, self.max_batch_copies)
    }

    /// Add copies to an existing book, one audit entry and notification per copy
    ///
    /// Raises the book's `total_copies` by the number of copies actually created.
    pub async fn create_copies(
        &self,
        actor: Uuid,
        book_id: Uuid,
        mode: CopyMode,
        remarks: Option<String>,
    ) -> AppResult<Outcome<CopyBatch>> {
        let book = self.books.get_book(book_id).await?;
        let numbers = self.accession_numbers(mode)?;

        let batch = self.create_batch(book.id, numbers, remarks).await;
        if !batch.created.is_empty() {
            self.books
                .adjust_total_copies(book.id, created_delta(&batch)?)
                .await?;
        }

        tracing::info!(
            book_id = %book.id,
            created = batch.created.len(),
            failed = batch.failed.len(),
            "book copies added"
        );

        let mut emission = self.side_effects.batch();
        for copy in &batch.created {
            let title = format!(
                "Created new copy {} of book {}",
                copy.accession_number, book.title
            );
            emission
                .audit(NewAuditLog::new(title.clone(), actor, AuditAction::Create, copy))
                .await;
            emission
                .notify(NewNotification::new(
                    actor,
                    MODULE_BOOK_COPY,
                    AuditAction::Create,
                    title,
                    format!("Accession number {} is now available", copy.accession_number),
                ))
                .await;
        }

        Ok(emission.finish(batch))
    }

    /// Inserts one copy per accession number; failed inserts are reported, not rolled back
    pub(crate) async fn create_batch(
        &self,
        book_id: Uuid,
        accession_numbers: Vec<String>,
        remarks: Option<String>,
    ) -> CopyBatch {
        let mut batch = CopyBatch::default();

        for accession_number in accession_numbers {
            let new_copy = NewBookCopy {
                book_id,
                accession_number: accession_number.clone(),
                status: CopyStatus::Available,
                remarks: remarks.clone(),
            };
            match self.copies.create_copy(new_copy).await {
                Ok(copy) => batch.created.push(copy),
                Err(e) => {
                    tracing::warn!(%book_id, %accession_number, error = %e, "failed to create book copy");
                    batch.failed.push(FailedCopy {
                        accession_number,
                        reason: e.to_string(),
                    });
                }
            }
        }

        batch
    }

    /// Applies a partial update without checking loans; callers keep copy and loan status consistent
    pub async fn update_copy_status(&self, id: Uuid, patch: &CopyPatch) -> AppResult<BookCopy> {
        self.copies.update_copy(id, patch).await
    }

    pub async fn update_copy(
        &self,
        actor: Uuid,
        id: Uuid,
        patch: CopyPatch,
    ) -> AppResult<Outcome<BookCopy>> {
        patch.validate()?;
        if patch.is_empty() {
            return Err(AppError::Validation("nothing to update".to_string()));
        }

        let updated = self.copies.update_copy(id, &patch).await?;
        let title = format!(
            "Updated copy {} of book {}",
            updated.accession_number, updated.book_id
        );

        let mut emission = self.side_effects.batch();
        emission
            .notify(NewNotification::new(
                actor,
                MODULE_BOOK_COPY,
                AuditAction::Update,
                title.clone(),
                format!("Copy {} is {}", updated.accession_number, updated.status),
            ))
            .await;
        emission
            .audit(NewAuditLog::new(title, actor, AuditAction::Update, &patch))
            .await;

        Ok(emission.finish(updated))
    }

    /// Deletes a copy unless a loan on it is borrowed, pending or overdue
    pub async fn delete_copy(&self, actor: Uuid, id: Uuid) -> AppResult<Outcome<()>> {
        let copy = self.copies.get_copy(id).await?;

        let active = self.availability.count_borrowed(BorrowScope::Copy(id)).await?;
        if active > 0 {
            return Err(AppError::Conflict(
                "book copy has active loans and cannot be deleted".to_string(),
            ));
        }

        self.copies.delete_copy(id).await?;
        tracing::info!(copy_id = %id, book_id = %copy.book_id, "book copy deleted");

        let mut emission = self.side_effects.batch();
        emission
            .audit(NewAuditLog::new(
                format!(
                    "Deleted copy {} of book {}",
                    copy.accession_number, copy.book_id
                ),
                actor,
                AuditAction::Delete,
                &copy,
            ))
            .await;

        Ok(emission.finish(()))
    }

    pub async fn get_copy(&self, id: Uuid) -> AppResult<BookCopy> {
        self.copies.get_copy(id).await
    }

    pub async fn list_copies(&self, query: &CopyQuery) -> AppResult<(Vec<BookCopy>, i64)> {
        self.copies.list_copies(query).await
    }

    pub async fn list_copies_for_book(
        &self,
        book_id: Uuid,
        query: &CopyQuery,
    ) -> AppResult<(Vec<BookCopy>, i64)> {
        self.books.get_book(book_id).await?;
        self.copies.list_copies_for_book(book_id, query).await
    }
}

/// Number of created copies as a `total_copies` adjustment
pub(crate) fn created_delta(batch: &CopyBatch) -> AppResult<i32> {
    i32::try_from(batch.created.len())
        .map_err(|_| AppError::Internal("copy batch exceeds total_copies range".to_string()))
}
