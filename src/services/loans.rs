//! Loan lifecycle service
//!
//! A loan moves `pending -> borrowed -> returned`. Copy status follows the loan:
//! a copy is `borrowed` exactly while an issued (borrowed or stored overdue, not
//! returned) loan holds it.
//! Overdue is derived on read from the due date.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use super::{
    copies::CopiesService,
    side_effects::{Emission, Outcome, SideEffects},
};
use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        loan::{CreateLoan, LoanQuery, NewLoan, RenewLoan},
        notification::MODULE_BORROW,
        AuditAction, Book, BookCopy, CopyPatch, CopyStatus, Loan, LoanPatch, LoanResponse,
        LoanStatus, NewAuditLog, NewNotification, User,
    },
    repository::{BookStore, LoanStore, UserStore},
};

#[derive(Clone)]
pub struct LoansService {
    loans: Arc<dyn LoanStore>,
    users: Arc<dyn UserStore>,
    books: Arc<dyn BookStore>,
    copies: CopiesService,
    side_effects: SideEffects,
    lending: LendingConfig,
}

impl LoansService {
    pub fn new(
        loans: Arc<dyn LoanStore>,
        users: Arc<dyn UserStore>,
        books: Arc<dyn BookStore>,
        copies: CopiesService,
        side_effects: SideEffects,
        lending: LendingConfig,
    ) -> Self {
        Self {
            loans,
            users,
            books,
            copies,
            side_effects,
            lending,
        }
    }

    /// Create a loan request (`pending`) or issue a copy directly (`borrowed`)
    pub async fn create_loan(
        &self,
        actor: Uuid,
        request: CreateLoan,
    ) -> AppResult<Outcome<LoanResponse>> {
        request.validate()?;

        let user_id = request
            .user_id
            .filter(|id| !id.is_nil())
            .ok_or_else(|| AppError::Validation("user_id is required".to_string()))?;
        let copy_id = request
            .book_copy_id
            .filter(|id| !id.is_nil())
            .ok_or_else(|| AppError::Validation("book_copy_id is required".to_string()))?;
        let due_date = request
            .due_date
            .ok_or_else(|| AppError::Validation("due_date is required".to_string()))?;

        let status = request.status.unwrap_or_default();
        if !matches!(status, LoanStatus::Pending | LoanStatus::Borrowed) {
            return Err(AppError::Validation(format!(
                "a loan cannot be created as {}",
                status
            )));
        }

        let copy = self.copies.get_copy(copy_id).await?;
        if self.loans.has_open_loan(user_id, copy.book_id).await? {
            return Err(AppError::Conflict("book already borrowed".to_string()));
        }

        let borrower = self.users.get_user(user_id).await?;
        let book = self.books.get_book(copy.book_id).await?;

        if status == LoanStatus::Borrowed && copy.status != CopyStatus::Available {
            return Err(AppError::Conflict(format!(
                "copy {} is {}",
                copy.accession_number, copy.status
            )));
        }

        let now = Utc::now();
        let loan = self
            .loans
            .create_loan(NewLoan {
                user_id,
                book_id: copy.book_id,
                book_copy_id: copy.id,
                librarian_id: Some(actor),
                borrowed_date: (status == LoanStatus::Borrowed).then_some(now),
                due_date,
                status,
                remarks: request.remarks.clone(),
            })
            .await?;

        tracing::info!(loan_id = %loan.id, %user_id, status = %loan.status, "loan created");

        let mut emission = self.side_effects.batch();
        if loan.is_issued() {
            self.copies
                .update_copy_status(copy.id, &CopyPatch::status(CopyStatus::Borrowed))
                .await?;
            emission
                .audit(NewAuditLog::new(
                    format!(
                        "Book {} accession number {} has been issued to {}",
                        book.title,
                        copy.accession_number,
                        borrower.display_name()
                    ),
                    actor,
                    AuditAction::Issue,
                    &loan,
                ))
                .await;
        } else {
            let title = format!(
                "{} book has been requested by {}",
                book.title,
                borrower.display_name()
            );
            emission
                .notify(NewNotification::new(
                    borrower.id,
                    MODULE_BORROW,
                    AuditAction::Create,
                    title.clone(),
                    format!(
                        "Copy {} is due back on {}",
                        copy.accession_number,
                        loan.due_date.format("%Y-%m-%d")
                    ),
                ))
                .await;
            emission
                .audit(NewAuditLog::new(title, actor, AuditAction::Create, &loan))
                .await;
        }

        Ok(emission.finish(LoanResponse::at(loan, now)))
    }

    /// Partial update; issuing and returning keep the copy status in step
    ///
    /// Audit entries and notifications are only emitted when a field actually
    /// changed, so re-submitting the same status is idempotent. The copy status is
    /// re-synchronised either way.
    pub async fn update_loan(
        &self,
        actor: Uuid,
        id: Uuid,
        patch: LoanPatch,
    ) -> AppResult<Outcome<LoanResponse>> {
        patch.validate()?;

        if patch.status == Some(LoanStatus::Overdue) {
            return Err(AppError::Validation(
                "overdue is derived from the due date and cannot be set".to_string(),
            ));
        }

        let current = self.loans.get_loan(id).await?;

        if let Some(status) = patch.status {
            if !current.is_open() && matches!(status, LoanStatus::Pending | LoanStatus::Borrowed) {
                return Err(AppError::Conflict(
                    "a returned loan cannot be reopened".to_string(),
                ));
            }
            if status == LoanStatus::Borrowed && !current.is_issued() {
                let copy = self.copies.get_copy(current.book_copy_id).await?;
                if copy.status != CopyStatus::Available {
                    return Err(AppError::Conflict(format!(
                        "copy {} is {}",
                        copy.accession_number, copy.status
                    )));
                }
            }
        }

        let updated = self.loans.update_loan(id, &patch).await?;
        let copy = self.sync_copy(&current, &updated).await?;

        tracing::info!(
            loan_id = %id,
            from = %current.status,
            to = %updated.status,
            "loan updated"
        );

        let mut emission = self.side_effects.batch();
        if current.status != updated.status {
            self.emit_transition(&mut emission, actor, &updated, copy.as_ref())
                .await;
        } else if patch_changed(&current, &updated) {
            emission
                .audit(NewAuditLog::new(
                    format!("Updated loan {}", id),
                    actor,
                    AuditAction::Update,
                    &patch,
                ))
                .await;
        }

        Ok(emission.finish(LoanResponse::at(updated, Utc::now())))
    }

    /// Extends an issued loan, up to `lending.max_renewals` times
    pub async fn renew_loan(
        &self,
        actor: Uuid,
        id: Uuid,
        request: RenewLoan,
    ) -> AppResult<Outcome<LoanResponse>> {
        let current = self.loans.get_loan(id).await?;

        let renewable = current.is_open()
            && matches!(current.status, LoanStatus::Borrowed | LoanStatus::Overdue);
        if !renewable {
            return Err(AppError::Conflict(
                "only a borrowed loan can be renewed".to_string(),
            ));
        }
        if current.renewal_count >= self.lending.max_renewals {
            return Err(AppError::Conflict(format!(
                "maximum renewals reached ({}/{})",
                current.renewal_count, self.lending.max_renewals
            )));
        }

        let due_date = request
            .due_date
            .unwrap_or(current.due_date + Duration::days(self.lending.loan_duration_days));
        if due_date <= current.due_date {
            return Err(AppError::Validation(
                "renewed due date must be after the current one".to_string(),
            ));
        }

        let patch = LoanPatch {
            due_date: Some(due_date),
            renewal_count: Some(current.renewal_count + 1),
            ..Default::default()
        };
        let updated = self.loans.update_loan(id, &patch).await?;

        tracing::info!(loan_id = %id, renewals = updated.renewal_count, "loan renewed");

        let title = format!(
            "Loan renewed until {} ({}/{})",
            updated.due_date.format("%Y-%m-%d"),
            updated.renewal_count,
            self.lending.max_renewals
        );
        let mut emission = self.side_effects.batch();
        emission
            .notify(NewNotification::new(
                updated.user_id,
                MODULE_BORROW,
                AuditAction::Renew,
                title.clone(),
                String::new(),
            ))
            .await;
        emission
            .audit(NewAuditLog::new(title, actor, AuditAction::Renew, &updated))
            .await;

        Ok(emission.finish(LoanResponse::at(updated, Utc::now())))
    }

    /// Administrative delete with no state guard; an issued copy is released
    pub async fn delete_loan(&self, actor: Uuid, id: Uuid) -> AppResult<Outcome<()>> {
        let loan = self.loans.get_loan(id).await?;
        self.loans.delete_loan(id).await?;

        if loan.is_issued() {
            self.copies
                .update_copy_status(loan.book_copy_id, &CopyPatch::status(CopyStatus::Available))
                .await?;
        }

        tracing::info!(loan_id = %id, user_id = %loan.user_id, "loan deleted");

        let title = match self.describe(&loan).await {
            Some((book, borrower)) => format!(
                "{} book loan of {} has been deleted",
                book.title,
                borrower.display_name()
            ),
            None => format!("Loan {} has been deleted", loan.id),
        };

        let mut emission = self.side_effects.batch();
        emission
            .notify(NewNotification::new(
                loan.user_id,
                MODULE_BORROW,
                AuditAction::Delete,
                title.clone(),
                String::new(),
            ))
            .await;
        emission
            .audit(NewAuditLog::new(title, actor, AuditAction::Delete, &loan))
            .await;

        Ok(emission.finish(()))
    }

    pub async fn get_loan(&self, id: Uuid) -> AppResult<LoanResponse> {
        let loan = self.loans.get_loan(id).await?;
        Ok(LoanResponse::at(loan, Utc::now()))
    }

    pub async fn list_loans(&self, query: &LoanQuery) -> AppResult<(Vec<LoanResponse>, i64)> {
        let (loans, total) = self.loans.list_loans(query).await?;
        let now = Utc::now();
        Ok((
            loans.into_iter().map(|l| LoanResponse::at(l, now)).collect(),
            total,
        ))
    }

    pub async fn get_loans_for_user(&self, user_id: Uuid) -> AppResult<Vec<LoanResponse>> {
        self.users.get_user(user_id).await?;
        let now = Utc::now();
        Ok(self
            .loans
            .get_loans_for_user(user_id)
            .await?
            .into_iter()
            .map(|l| LoanResponse::at(l, now))
            .collect())
    }

    /// Brings the copy in line with the loan; returns the copy when it was touched
    async fn sync_copy(&self, before: &Loan, after: &Loan) -> AppResult<Option<BookCopy>> {
        let status = if after.is_issued() {
            CopyStatus::Borrowed
        } else if before.is_issued() {
            CopyStatus::Available
        } else {
            return Ok(None);
        };

        let copy = self
            .copies
            .update_copy_status(after.book_copy_id, &CopyPatch::status(status))
            .await?;
        Ok(Some(copy))
    }

    async fn emit_transition(
        &self,
        emission: &mut Emission<'_>,
        actor: Uuid,
        loan: &Loan,
        copy: Option<&BookCopy>,
    ) {
        let (action, verb) = match loan.status {
            LoanStatus::Borrowed => (AuditAction::Issue, "issued to"),
            LoanStatus::Returned => (AuditAction::Return, "returned by"),
            _ => (AuditAction::Update, "updated for"),
        };

        let (book_title, borrower) = match self.describe(loan).await {
            Some((book, user)) => (book.title, user.display_name().to_string()),
            None => (loan.book_id.to_string(), loan.user_id.to_string()),
        };
        let title = format!("{} book has been {} {}", book_title, verb, borrower);

        if let Some(copy) = copy {
            emission
                .audit(NewAuditLog::new(
                    format!(
                        "Book {} accession number {} is now {}",
                        book_title, copy.accession_number, copy.status
                    ),
                    actor,
                    action,
                    copy,
                ))
                .await;
        }
        if matches!(loan.status, LoanStatus::Borrowed | LoanStatus::Returned) {
            emission
                .notify(NewNotification::new(
                    loan.user_id,
                    MODULE_BORROW,
                    action,
                    title.clone(),
                    String::new(),
                ))
                .await;
        }
        emission
            .audit(NewAuditLog::new(title, actor, action, loan))
            .await;
    }

    /// Book and borrower for side-effect texts, if both still exist
    async fn describe(&self, loan: &Loan) -> Option<(Book, User)> {
        let book = self.books.get_book(loan.book_id).await.ok()?;
        let user = self.users.get_user(loan.user_id).await.ok()?;
        Some((book, user))
    }
}

fn patch_changed(before: &Loan, after: &Loan) -> bool {
    before.user_id != after.user_id
        || before.due_date != after.due_date
        || before.librarian_id != after.librarian_id
        || before.remarks != after.remarks
        || before.returned_date != after.returned_date
        || before.renewal_count != after.renewal_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{book::NewBook, CopyMode, UserRole},
        repository::{memory::InMemoryStore, CopyStore, MockAuditLogStore, MockNotificationStore, Stores},
        services::Services,
    };

    struct Fixture {
        store: Arc<InMemoryStore>,
        services: Services,
        librarian: Uuid,
        student: Uuid,
        copies: Vec<BookCopy>,
    }

    async fn fixture_with(stores: impl FnOnce(Stores) -> Stores) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let services = Services::new(stores(Stores::from_store(store.clone())), LendingConfig::default());
        let librarian = store.insert_user("librarian", UserRole::Librarian).await.id;
        let student = store.insert_user("student", UserRole::Student).await.id;
        let book = store
            .create_book(NewBook {
                title: "Intro to Algorithms".to_string(),
                author: "Cormen".to_string(),
                category_id: None,
            })
            .await
            .unwrap();
        let copies = services
            .copies
            .create_copies(librarian, book.id, CopyMode::Range { start: 1, end: 2 }, None)
            .await
            .unwrap()
            .value
            .created;
        Fixture {
            store,
            services,
            librarian,
            student,
            copies,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(|s| s).await
    }

    fn request(user: Uuid, copy: &BookCopy, status: Option<LoanStatus>) -> CreateLoan {
        CreateLoan {
            user_id: Some(user),
            book_copy_id: Some(copy.id),
            due_date: Some(Utc::now() + Duration::days(7)),
            status,
            remarks: None,
        }
    }

    #[tokio::test]
    async fn missing_due_date_is_a_validation_error() {
        let f = fixture().await;
        let mut req = request(f.student, &f.copies[0], None);
        req.due_date = None;
        let err = f.services.loans.create_loan(f.librarian, req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_borrower_is_not_found() {
        let f = fixture().await;
        let err = f
            .services
            .loans
            .create_loan(f.librarian, request(Uuid::new_v4(), &f.copies[0], None))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn direct_issue_marks_copy_borrowed() {
        let f = fixture().await;
        let outcome = f
            .services
            .loans
            .create_loan(f.librarian, request(f.student, &f.copies[0], Some(LoanStatus::Borrowed)))
            .await
            .unwrap();

        assert_eq!(outcome.value.loan.status, LoanStatus::Borrowed);
        assert!(outcome.value.loan.borrowed_date.is_some());
        assert_eq!(outcome.value.loan.librarian_id, Some(f.librarian));
        let copy = f.store.get_copy(f.copies[0].id).await.unwrap();
        assert_eq!(copy.status, CopyStatus::Borrowed);
    }

    #[tokio::test]
    async fn resubmitting_a_status_does_not_repeat_side_effects() {
        let f = fixture().await;
        let loan = f
            .services
            .loans
            .create_loan(f.librarian, request(f.student, &f.copies[0], None))
            .await
            .unwrap()
            .value
            .loan;

        let issue = LoanPatch {
            status: Some(LoanStatus::Borrowed),
            ..Default::default()
        };
        f.services.loans.update_loan(f.librarian, loan.id, issue.clone()).await.unwrap();
        let audits = f.store.audit_logs().await.len();
        let notifications = f.store.notifications().await.len();

        f.services.loans.update_loan(f.librarian, loan.id, issue).await.unwrap();
        assert_eq!(f.store.audit_logs().await.len(), audits);
        assert_eq!(f.store.notifications().await.len(), notifications);
        let copy = f.store.get_copy(f.copies[0].id).await.unwrap();
        assert_eq!(copy.status, CopyStatus::Borrowed);
    }

    #[tokio::test]
    async fn returned_loan_cannot_be_reopened() {
        let f = fixture().await;
        let loan = f
            .services
            .loans
            .create_loan(f.librarian, request(f.student, &f.copies[0], Some(LoanStatus::Borrowed)))
            .await
            .unwrap()
            .value
            .loan;
        f.services
            .loans
            .update_loan(
                f.librarian,
                loan.id,
                LoanPatch {
                    status: Some(LoanStatus::Returned),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = f
            .services
            .loans
            .update_loan(
                f.librarian,
                loan.id,
                LoanPatch {
                    status: Some(LoanStatus::Borrowed),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn setting_overdue_is_rejected() {
        let f = fixture().await;
        let loan = f
            .services
            .loans
            .create_loan(f.librarian, request(f.student, &f.copies[0], None))
            .await
            .unwrap()
            .value
            .loan;
        let err = f
            .services
            .loans
            .update_loan(
                f.librarian,
                loan.id,
                LoanPatch {
                    status: Some(LoanStatus::Overdue),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn renewal_is_bounded() {
        let f = fixture().await;
        let loan = f
            .services
            .loans
            .create_loan(f.librarian, request(f.student, &f.copies[0], Some(LoanStatus::Borrowed)))
            .await
            .unwrap()
            .value
            .loan;

        let max = LendingConfig::default().max_renewals;
        for _ in 0..max {
            f.services
                .loans
                .renew_loan(f.librarian, loan.id, RenewLoan::default())
                .await
                .unwrap();
        }
        let renewed = f.services.loans.get_loan(loan.id).await.unwrap().loan;
        assert_eq!(renewed.renewal_count, max);
        assert_eq!(
            renewed.due_date,
            loan.due_date + Duration::days(LendingConfig::default().loan_duration_days * i64::from(max))
        );

        let err = f
            .services
            .loans
            .renew_loan(f.librarian, loan.id, RenewLoan::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn pending_loan_cannot_be_renewed() {
        let f = fixture().await;
        let loan = f
            .services
            .loans
            .create_loan(f.librarian, request(f.student, &f.copies[0], None))
            .await
            .unwrap()
            .value
            .loan;
        let err = f
            .services
            .loans
            .renew_loan(f.librarian, loan.id, RenewLoan::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleting_an_issued_loan_releases_the_copy() {
        let f = fixture().await;
        let loan = f
            .services
            .loans
            .create_loan(f.librarian, request(f.student, &f.copies[0], Some(LoanStatus::Borrowed)))
            .await
            .unwrap()
            .value
            .loan;

        f.services.loans.delete_loan(f.librarian, loan.id).await.unwrap();

        let copy = f.store.get_copy(f.copies[0].id).await.unwrap();
        assert_eq!(copy.status, CopyStatus::Available);
        assert!(f.services.loans.get_loan(loan.id).await.unwrap_err().is_not_found());
        let last = f.store.audit_logs().await.pop().unwrap();
        assert_eq!(last.action, AuditAction::Delete);
    }

    /// Stores an `overdue` loan on the first copy, as imported data would
    async fn seed_overdue(f: &Fixture) -> Loan {
        let copy = &f.copies[0];
        f.store
            .update_copy(copy.id, &CopyPatch::status(CopyStatus::Borrowed))
            .await
            .unwrap();
        let now = Utc::now();
        let loan = Loan {
            id: Uuid::new_v4(),
            user_id: f.student,
            book_id: copy.book_id,
            book_copy_id: copy.id,
            librarian_id: Some(f.librarian),
            borrowed_date: Some(now - Duration::days(21)),
            due_date: now - Duration::days(7),
            returned_date: None,
            renewal_count: 0,
            status: LoanStatus::Overdue,
            is_active: true,
            remarks: None,
            created_at: now - Duration::days(21),
            updated_at: now - Duration::days(7),
        };
        f.store.insert_loan(loan.clone()).await;
        loan
    }

    #[tokio::test]
    async fn returning_an_overdue_loan_releases_the_copy() {
        let f = fixture().await;
        let loan = seed_overdue(&f).await;

        let outcome = f
            .services
            .loans
            .update_loan(
                f.librarian,
                loan.id,
                LoanPatch {
                    status: Some(LoanStatus::Returned),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.value.loan.status, LoanStatus::Returned);
        assert!(outcome.value.loan.returned_date.is_some());
        let copy = f.store.get_copy(f.copies[0].id).await.unwrap();
        assert_eq!(copy.status, CopyStatus::Available);
        assert_eq!(f.services.availability.available_copies(copy.book_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn deleting_an_overdue_loan_releases_the_copy() {
        let f = fixture().await;
        let loan = seed_overdue(&f).await;

        f.services.loans.delete_loan(f.librarian, loan.id).await.unwrap();

        let copy = f.store.get_copy(f.copies[0].id).await.unwrap();
        assert_eq!(copy.status, CopyStatus::Available);
    }

    #[tokio::test]
    async fn side_effect_failures_do_not_fail_the_loan() {
        let f = fixture_with(|stores| {
            let mut audit_logs = MockAuditLogStore::new();
            audit_logs
                .expect_append_audit_log()
                .returning(|_| Err(AppError::Internal("audit store down".to_string())));
            let mut notifications = MockNotificationStore::new();
            notifications
                .expect_append_notification()
                .returning(|_| Err(AppError::Internal("notification store down".to_string())));
            Stores {
                audit_logs: Arc::new(audit_logs),
                notifications: Arc::new(notifications),
                ..stores
            }
        })
        .await;

        let outcome = f
            .services
            .loans
            .create_loan(f.librarian, request(f.student, &f.copies[0], None))
            .await
            .unwrap();

        assert_eq!(outcome.warnings.len(), 2);
        let stored = f.services.loans.get_loan(outcome.value.loan.id).await.unwrap();
        assert_eq!(stored.loan.status, LoanStatus::Pending);
    }
}
