//! Lending workflow tests over the in-memory store

use std::sync::Arc;

use chrono::{Duration, DurationRound, Utc};
use uuid::Uuid;

use lms_server::{
    config::LendingConfig,
    error::AppError,
    models::{
        book::CreateBook, loan::CreateLoan, AuditAction, BookCopy, CopyStatus, LoanPatch,
        LoanStatus, User, UserRole,
    },
    repository::{memory::InMemoryStore, Stores},
    services::Services,
};

struct Library {
    store: InMemoryStore,
    services: Services,
    librarian: User,
    student: User,
}

impl Library {
    async fn new() -> Self {
        let store = InMemoryStore::new();
        let services = Services::new(
            Stores::from_store(Arc::new(store.clone())),
            LendingConfig::default(),
        );
        let librarian = store.insert_user("librarian", UserRole::Librarian).await;
        let student = store.insert_user("u1", UserRole::Student).await;
        Self {
            store,
            services,
            librarian,
            student,
        }
    }

    /// "Intro to Algorithms" with copies 001..=003
    async fn algorithms(&self) -> (Uuid, Vec<BookCopy>) {
        let created = self
            .services
            .books
            .create_book(
                self.librarian.id,
                CreateBook {
                    title: "Intro to Algorithms".to_string(),
                    author: "Cormen".to_string(),
                    category_id: None,
                    total_copies: Some(3),
                    start_accession_number: Some(1),
                    end_accession_number: Some(3),
                },
            )
            .await
            .unwrap()
            .value;
        (created.book.book.id, created.copies.created)
    }

    async fn available(&self, book_id: Uuid) -> u32 {
        self.services
            .availability
            .available_copies(book_id)
            .await
            .unwrap()
    }

    async fn copy_status(&self, copy_id: Uuid) -> CopyStatus {
        self.services.copies.get_copy(copy_id).await.unwrap().status
    }

    fn request(&self, copy: &BookCopy) -> CreateLoan {
        CreateLoan {
            user_id: Some(self.student.id),
            book_copy_id: Some(copy.id),
            due_date: Some(Utc::now() + Duration::days(7)),
            status: None,
            remarks: None,
        }
    }

    async fn set_status(&self, loan_id: Uuid, status: LoanStatus) {
        self.services
            .loans
            .update_loan(
                self.librarian.id,
                loan_id,
                LoanPatch {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn request_issue_return_cycle() {
    let library = Library::new().await;

    // Book created from an accession range
    let (book_id, copies) = library.algorithms().await;
    let numbers: Vec<&str> = copies.iter().map(|c| c.accession_number.as_str()).collect();
    assert_eq!(numbers, vec!["001", "002", "003"]);
    assert!(copies.iter().all(|c| c.status == CopyStatus::Available));
    assert_eq!(library.available(book_id).await, 3);

    // A request does not consume a copy
    let loan = library
        .services
        .loans
        .create_loan(library.librarian.id, library.request(&copies[0]))
        .await
        .unwrap()
        .value
        .loan;
    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(library.copy_status(copies[0].id).await, CopyStatus::Available);
    assert_eq!(library.available(book_id).await, 3);

    // Issuing
    library.set_status(loan.id, LoanStatus::Borrowed).await;
    let issued = library.services.loans.get_loan(loan.id).await.unwrap().loan;
    assert_eq!(issued.status, LoanStatus::Borrowed);
    assert!(issued.borrowed_date.is_some());
    assert_eq!(library.copy_status(copies[0].id).await, CopyStatus::Borrowed);
    assert_eq!(library.available(book_id).await, 2);

    // Same user, same book, other copy
    let err = library
        .services
        .loans
        .create_loan(library.librarian.id, library.request(&copies[1]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref msg) if msg == "book already borrowed"));

    // Returning
    library.set_status(loan.id, LoanStatus::Returned).await;
    let returned = library.services.loans.get_loan(loan.id).await.unwrap().loan;
    assert_eq!(returned.status, LoanStatus::Returned);
    assert!(returned.returned_date.is_some());
    assert_eq!(library.copy_status(copies[0].id).await, CopyStatus::Available);
    assert_eq!(library.available(book_id).await, 3);

    // Copy without open loans can go
    let outcome = library
        .services
        .copies
        .delete_copy(library.librarian.id, copies[0].id)
        .await
        .unwrap();
    assert!(outcome.is_clean());
    let deletes = library
        .store
        .audit_logs()
        .await
        .into_iter()
        .filter(|log| log.action == AuditAction::Delete)
        .count();
    assert_eq!(deletes, 1);
}

#[tokio::test]
async fn created_loan_reads_back_unchanged() {
    let library = Library::new().await;
    let (_, copies) = library.algorithms().await;

    // Stores may truncate below microseconds
    let due = (Utc::now() + Duration::days(10))
        .duration_trunc(Duration::seconds(1))
        .unwrap();
    let mut request = library.request(&copies[2]);
    request.due_date = Some(due);

    let created = library
        .services
        .loans
        .create_loan(library.librarian.id, request)
        .await
        .unwrap()
        .value
        .loan;
    let fetched = library.services.loans.get_loan(created.id).await.unwrap().loan;

    assert_eq!(fetched.user_id, library.student.id);
    assert_eq!(fetched.book_copy_id, copies[2].id);
    assert_eq!(fetched.due_date, due);
    assert_eq!(fetched.status, LoanStatus::Pending);
}

#[tokio::test]
async fn copy_deletion_blocked_by_pending_and_borrowed_loans() {
    let library = Library::new().await;
    let (_, copies) = library.algorithms().await;

    let loan = library
        .services
        .loans
        .create_loan(library.librarian.id, library.request(&copies[0]))
        .await
        .unwrap()
        .value
        .loan;

    for status in [None, Some(LoanStatus::Borrowed)] {
        if let Some(status) = status {
            library.set_status(loan.id, status).await;
        }
        let err = library
            .services
            .copies
            .delete_copy(library.librarian.id, copies[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    library.set_status(loan.id, LoanStatus::Returned).await;
    library
        .services
        .copies
        .delete_copy(library.librarian.id, copies[0].id)
        .await
        .unwrap();
}

#[tokio::test]
async fn book_deletion_requires_no_copies() {
    let library = Library::new().await;
    let (book_id, copies) = library.algorithms().await;

    let loan = library
        .services
        .loans
        .create_loan(library.librarian.id, library.request(&copies[0]))
        .await
        .unwrap()
        .value
        .loan;
    library.set_status(loan.id, LoanStatus::Borrowed).await;

    let err = library
        .services
        .books
        .delete_book(library.librarian.id, book_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    library.set_status(loan.id, LoanStatus::Returned).await;
    let err = library
        .services
        .books
        .delete_book(library.librarian.id, book_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref msg) if msg.contains("has copies")));

    for copy in &copies {
        library
            .services
            .copies
            .delete_copy(library.librarian.id, copy.id)
            .await
            .unwrap();
    }
    library
        .services
        .books
        .delete_book(library.librarian.id, book_id)
        .await
        .unwrap();
    assert!(matches!(
        library.services.books.get_book(book_id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn availability_stays_within_bounds() {
    let library = Library::new().await;
    let (book_id, copies) = library.algorithms().await;

    let mut borrowers = Vec::new();
    for (i, copy) in copies.iter().enumerate() {
        let user = library
            .store
            .insert_user(&format!("reader{i}"), UserRole::Student)
            .await;
        let mut request = library.request(copy);
        request.user_id = Some(user.id);
        request.status = Some(LoanStatus::Borrowed);
        let loan = library
            .services
            .loans
            .create_loan(library.librarian.id, request)
            .await
            .unwrap()
            .value
            .loan;
        borrowers.push(loan.id);
        assert_eq!(library.available(book_id).await, (copies.len() - i - 1) as u32);
    }

    for (i, loan_id) in borrowers.iter().enumerate() {
        library.set_status(*loan_id, LoanStatus::Returned).await;
        assert_eq!(library.available(book_id).await, (i + 1) as u32);
    }
}

#[tokio::test]
async fn user_with_borrowed_book_cannot_be_deleted() {
    let library = Library::new().await;
    let (_, copies) = library.algorithms().await;

    let mut request = library.request(&copies[0]);
    request.status = Some(LoanStatus::Borrowed);
    let loan = library
        .services
        .loans
        .create_loan(library.librarian.id, request)
        .await
        .unwrap()
        .value
        .loan;

    let err = library
        .services
        .users
        .delete_user(library.librarian.id, library.student.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    library.set_status(loan.id, LoanStatus::Returned).await;
    library
        .services
        .users
        .delete_user(library.librarian.id, library.student.id)
        .await
        .unwrap();
}

#[tokio::test]
async fn every_transition_notifies_the_borrower() {
    let library = Library::new().await;
    let (_, copies) = library.algorithms().await;

    let loan = library
        .services
        .loans
        .create_loan(library.librarian.id, library.request(&copies[0]))
        .await
        .unwrap()
        .value
        .loan;
    library.set_status(loan.id, LoanStatus::Borrowed).await;
    library.set_status(loan.id, LoanStatus::Returned).await;

    let actions: Vec<AuditAction> = library
        .store
        .notifications()
        .await
        .into_iter()
        .filter(|n| n.user_id == library.student.id)
        .map(|n| n.action)
        .collect();
    assert_eq!(
        actions,
        vec![AuditAction::Create, AuditAction::Issue, AuditAction::Return]
    );
}
