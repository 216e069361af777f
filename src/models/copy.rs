//! Book copy (physical instance) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::SortDirection;
use crate::error::{AppError, AppResult};

/// Copy status as persisted in `book_copies.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    #[default]
    Available,
    Borrowed,
    Reserved,
    Damaged,
    Lost,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Available => "available",
            CopyStatus::Borrowed => "borrowed",
            CopyStatus::Reserved => "reserved",
            CopyStatus::Damaged => "damaged",
            CopyStatus::Lost => "lost",
        }
    }
}

impl std::str::FromStr for CopyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(CopyStatus::Available),
            "borrowed" => Ok(CopyStatus::Borrowed),
            "reserved" => Ok(CopyStatus::Reserved),
            "damaged" => Ok(CopyStatus::Damaged),
            "lost" => Ok(CopyStatus::Lost),
            _ => Err(format!("Invalid copy status: {}", s)),
        }
    }
}

text_enum!(CopyStatus);

/// Physical copy of a book
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookCopy {
    pub id: Uuid,
    pub book_id: Uuid,
    pub accession_number: String,
    pub status: CopyStatus,
    pub labels: Option<String>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Copy to insert
#[derive(Debug, Clone)]
pub struct NewBookCopy {
    pub book_id: Uuid,
    pub accession_number: String,
    pub status: CopyStatus,
    pub remarks: Option<String>,
}

/// Partial copy update: only `Some` fields are written
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CopyPatch {
    pub status: Option<CopyStatus>,
    #[validate(length(min = 1, max = 50, message = "accession number must be 1-50 characters"))]
    pub accession_number: Option<String>,
    pub labels: Option<String>,
    pub remarks: Option<String>,
}

impl CopyPatch {
    pub fn status(status: CopyStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.accession_number.is_none()
            && self.labels.is_none()
            && self.remarks.is_none()
    }

    pub fn apply(&self, copy: &mut BookCopy, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            copy.status = status;
        }
        if let Some(ref accession_number) = self.accession_number {
            copy.accession_number = accession_number.clone();
        }
        if let Some(ref labels) = self.labels {
            copy.labels = Some(labels.clone());
        }
        if let Some(ref remarks) = self.remarks {
            copy.remarks = Some(remarks.clone());
        }
        copy.updated_at = now;
    }
}

/// How accession numbers are generated for a batch of new copies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Inclusive numeric range, each member zero-padded
    Range { start: u32, end: u32 },
    /// `n` copies numbered from zero
    Count(u32),
}

impl CopyMode {
    /// Number of copies the mode describes
    pub fn copy_count(&self) -> u64 {
        match *self {
            CopyMode::Range { start, end } if end >= start => u64::from(end - start) + 1,
            CopyMode::Range { .. } => 0,
            CopyMode::Count(n) => u64::from(n),
        }
    }

    /// Zero-padded accession numbers, refusing batches larger than `max_batch`
    pub fn accession_numbers(&self, width: usize, max_batch: u32) -> AppResult<Vec<String>> {
        let numbers = match *self {
            CopyMode::Range { start, end } if end < start => {
                return Err(AppError::Validation(format!(
                    "end accession number {} is smaller than start {}",
                    end, start
                )));
            }
            CopyMode::Count(0) => {
                return Err(AppError::Validation("copy count must be positive".to_string()));
            }
            _ if self.copy_count() > u64::from(max_batch) => {
                return Err(AppError::Validation(format!(
                    "{} copies requested, at most {} per batch",
                    self.copy_count(),
                    max_batch
                )));
            }
            CopyMode::Range { start, end } => start..=end,
            CopyMode::Count(n) => 0..=n - 1,
        };

        Ok(numbers
            .map(|n| format!("{:0width$}", n, width = width))
            .collect())
    }
}

/// Add copies to an existing book
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddCopiesRequest {
    #[validate(range(min = 1, message = "add_copies must be positive"))]
    pub add_copies: Option<u32>,
    pub start_accession_number: Option<u32>,
    pub end_accession_number: Option<u32>,
    pub remarks: Option<String>,
}

impl AddCopiesRequest {
    /// Range when a start is given (ending at `end_accession_number` or after `add_copies`), count otherwise
    pub fn mode(&self) -> AppResult<CopyMode> {
        match (self.start_accession_number, self.end_accession_number, self.add_copies) {
            (Some(start), Some(end), _) => Ok(CopyMode::Range { start, end }),
            (Some(start), None, Some(n)) => Ok(CopyMode::Range {
                start,
                end: start.saturating_add(n.saturating_sub(1)),
            }),
            (None, None, Some(n)) => Ok(CopyMode::Count(n)),
            _ => Err(AppError::Validation(
                "accession range or add_copies is required".to_string(),
            )),
        }
    }
}

/// A copy that could not be created as part of a batch
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FailedCopy {
    pub accession_number: String,
    pub reason: String,
}

/// Result of a batch creation: partial success is reported, never rolled back
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct CopyBatch {
    pub created: Vec<BookCopy>,
    pub failed: Vec<FailedCopy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CopySortColumn {
    #[default]
    CreatedAt,
    AccessionNumber,
    Status,
}

impl CopySortColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CopySortColumn::CreatedAt => "created_at",
            CopySortColumn::AccessionNumber => "accession_number",
            CopySortColumn::Status => "status",
        }
    }
}

/// Query parameters for copy listings
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct CopyQuery {
    pub book_id: Option<Uuid>,
    pub accession_number: Option<String>,
    pub status: Option<CopyStatus>,
    /// Free text; matching accession numbers are sorted first
    pub query: Option<String>,
    /// Page number (1-based, default 1)
    pub page: Option<i64>,
    /// Page size (default 10)
    pub size: Option<i64>,
    pub sort_column: Option<CopySortColumn>,
    pub sort_direction: Option<SortDirection>,
}
