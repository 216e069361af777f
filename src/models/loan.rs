//! Loan (borrowed book) model and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::SortDirection;

/// Loan status as persisted in `borrowed_books.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    #[default]
    Pending,
    Borrowed,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
        }
    }

    /// Statuses that keep a copy, book or user from being deleted
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            LoanStatus::Pending | LoanStatus::Borrowed | LoanStatus::Overdue
        )
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LoanStatus::Pending),
            "borrowed" => Ok(LoanStatus::Borrowed),
            "returned" => Ok(LoanStatus::Returned),
            "overdue" => Ok(LoanStatus::Overdue),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

text_enum!(LoanStatus);

/// Loan row from `borrowed_books`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub book_copy_id: Uuid,
    pub librarian_id: Option<Uuid>,
    pub borrowed_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub returned_date: Option<DateTime<Utc>>,
    pub renewal_count: i32,
    pub status: LoanStatus,
    pub is_active: bool,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// A loan is open until its return timestamp is set
    pub fn is_open(&self) -> bool {
        self.returned_date.is_none()
    }

    /// Issued and not yet returned: the copy is physically out
    ///
    /// A loan stored as `overdue` still holds its copy.
    pub fn is_issued(&self) -> bool {
        matches!(self.status, LoanStatus::Borrowed | LoanStatus::Overdue) && self.is_open()
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            LoanStatus::Overdue => self.is_open(),
            LoanStatus::Borrowed => self.is_open() && self.due_date < now,
            _ => false,
        }
    }

    /// Status as reported to readers, with overdue derived from the due date
    pub fn effective_status(&self, now: DateTime<Utc>) -> LoanStatus {
        if self.is_overdue_at(now) {
            LoanStatus::Overdue
        } else {
            self.status
        }
    }
}

/// Loan to insert
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub book_copy_id: Uuid,
    pub librarian_id: Option<Uuid>,
    pub borrowed_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub status: LoanStatus,
    pub remarks: Option<String>,
}

/// Loan as returned by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanResponse {
    #[serde(flatten)]
    pub loan: Loan,
    pub effective_status: LoanStatus,
    pub is_overdue: bool,
}

impl LoanResponse {
    pub fn at(loan: Loan, now: DateTime<Utc>) -> Self {
        Self {
            effective_status: loan.effective_status(now),
            is_overdue: loan.is_overdue_at(now),
            loan,
        }
    }
}

/// Create loan request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub user_id: Option<Uuid>,
    pub book_copy_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    /// `pending` (default) or `borrowed`
    pub status: Option<LoanStatus>,
    #[validate(length(max = 500))]
    pub remarks: Option<String>,
}

/// Partial loan update
///
/// Empty strings and a zero renewal count are treated as absent. The book is
/// fixed by the loan's copy and cannot be patched; unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoanPatch {
    pub user_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub librarian_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub remarks: Option<String>,
    pub returned_date: Option<DateTime<Utc>>,
    pub renewal_count: Option<i32>,
    pub status: Option<LoanStatus>,
}

impl LoanPatch {
    /// Applies present fields; a status change stamps the matching timestamp
    pub fn apply(&self, loan: &mut Loan, now: DateTime<Utc>) {
        if let Some(user_id) = self.user_id.filter(|id| !id.is_nil()) {
            loan.user_id = user_id;
        }
        if let Some(due_date) = self.due_date {
            loan.due_date = due_date;
        }
        if let Some(librarian_id) = self.librarian_id.filter(|id| !id.is_nil()) {
            loan.librarian_id = Some(librarian_id);
        }
        if let Some(remarks) = self.remarks.as_deref().filter(|r| !r.is_empty()) {
            loan.remarks = Some(remarks.to_string());
        }
        if let Some(returned_date) = self.returned_date {
            loan.returned_date = Some(returned_date);
        }
        if let Some(renewal_count) = self.renewal_count.filter(|n| *n != 0) {
            loan.renewal_count = renewal_count;
        }
        if let Some(status) = self.status {
            if status != loan.status {
                match status {
                    LoanStatus::Borrowed => loan.borrowed_date = Some(now),
                    LoanStatus::Returned => {
                        loan.returned_date.get_or_insert(now);
                    }
                    _ => {}
                }
            }
            loan.status = status;
        }
        loan.updated_at = now;
    }
}

/// Renew request; without a due date the loan is extended by the configured duration
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RenewLoan {
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanSortColumn {
    #[default]
    CreatedAt,
    DueDate,
    BorrowedDate,
    Status,
}

impl LoanSortColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LoanSortColumn::CreatedAt => "created_at",
            LoanSortColumn::DueDate => "due_date",
            LoanSortColumn::BorrowedDate => "borrowed_date",
            LoanSortColumn::Status => "status",
        }
    }
}

/// Query parameters for loan listings
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub user_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    /// `overdue` also matches open borrowed loans past their due date
    pub status: Option<LoanStatus>,
    pub borrowed_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Free text; loans whose remarks match are sorted first
    pub query: Option<String>,
    /// Page number (1-based, default 1)
    pub page: Option<i64>,
    /// Page size (default 10)
    pub size: Option<i64>,
    pub sort_column: Option<LoanSortColumn>,
    pub sort_direction: Option<SortDirection>,
}
