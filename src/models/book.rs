//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::copy::{CopyBatch, CopyMode};
use super::SortDirection;
use crate::error::{AppError, AppResult};

/// Book row from `books`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub category_id: Option<Uuid>,
    pub total_copies: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Book with its derived availability
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookResponse {
    #[serde(flatten)]
    pub book: Book,
    pub available_copies: u32,
}

/// Book to insert
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub category_id: Option<Uuid>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "author is required"))]
    pub author: String,
    pub category_id: Option<Uuid>,
    /// Number of copies when no accession range is given
    pub total_copies: Option<u32>,
    pub start_accession_number: Option<u32>,
    pub end_accession_number: Option<u32>,
}

impl CreateBook {
    /// Copies to create alongside the book, if any
    pub fn copy_mode(&self) -> AppResult<Option<CopyMode>> {
        match (self.start_accession_number, self.end_accession_number, self.total_copies) {
            (Some(start), Some(end), _) => Ok(Some(CopyMode::Range { start, end })),
            (Some(_), None, _) | (None, Some(_), _) => Err(AppError::Validation(
                "accession range needs both start and end".to_string(),
            )),
            (None, None, Some(0)) | (None, None, None) => Ok(None),
            (None, None, Some(n)) => Ok(Some(CopyMode::Count(n))),
        }
    }
}

/// Book creation result with its initial copy batch
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedBook {
    pub book: BookResponse,
    pub copies: CopyBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookSortColumn {
    #[default]
    CreatedAt,
    Title,
    Author,
}

impl BookSortColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BookSortColumn::CreatedAt => "created_at",
            BookSortColumn::Title => "title",
            BookSortColumn::Author => "author",
        }
    }
}

/// Query parameters for book listings
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Case-insensitive substring of the title
    pub query: Option<String>,
    pub author: Option<String>,
    pub category_id: Option<Uuid>,
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort_column: Option<BookSortColumn>,
    pub sort_direction: Option<SortDirection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateBook {
        CreateBook {
            title: "Intro to Algorithms".to_string(),
            author: "Cormen".to_string(),
            category_id: None,
            total_copies: None,
            start_accession_number: None,
            end_accession_number: None,
        }
    }

    #[test]
    fn range_takes_precedence_over_count() {
        let req = CreateBook {
            total_copies: Some(9),
            start_accession_number: Some(1),
            end_accession_number: Some(3),
            ..request()
        };
        assert_eq!(req.copy_mode().unwrap(), Some(CopyMode::Range { start: 1, end: 3 }));
    }

    #[test]
    fn half_open_range_is_rejected() {
        let req = CreateBook { start_accession_number: Some(1), ..request() };
        assert!(req.copy_mode().is_err());
    }

    #[test]
    fn no_copies_requested() {
        assert_eq!(request().copy_mode().unwrap(), None);
    }
}
