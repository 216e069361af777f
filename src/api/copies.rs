//! Book copy endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        copy::{AddCopiesRequest, CopyBatch, CopyQuery},
        BookCopy, CopyPatch,
    },
    services::Outcome,
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

/// List copies across all books
#[utoipa::path(
    get,
    path = "/copies",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(CopyQuery),
    responses(
        (status = 200, description = "List of copies", body = PaginatedResponse<BookCopy>)
    )
)]
pub async fn list_copies(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<CopyQuery>,
) -> AppResult<Json<PaginatedResponse<BookCopy>>> {
    let (copies, total) = state.services.copies.list_copies(&query).await?;
    Ok(Json(PaginatedResponse::new(copies, total, query.page, query.size)))
}

/// List the copies of a book
#[utoipa::path(
    get,
    path = "/books/{id}/copies",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID"),
        CopyQuery
    ),
    responses(
        (status = 200, description = "Copies of the book", body = PaginatedResponse<BookCopy>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn list_copies_for_book(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
    Query(query): Query<CopyQuery>,
) -> AppResult<Json<PaginatedResponse<BookCopy>>> {
    let (copies, total) = state
        .services
        .copies
        .list_copies_for_book(book_id, &query)
        .await?;
    Ok(Json(PaginatedResponse::new(copies, total, query.page, query.size)))
}

/// Add copies to a book, by accession range or count
#[utoipa::path(
    post,
    path = "/books/{id}/copies",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    request_body = AddCopiesRequest,
    responses(
        (status = 201, description = "Copies created, failures listed; body is `{ data, warnings }`", body = CopyBatch),
        (status = 400, description = "Invalid accession range"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn create_copies(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
    Json(request): Json<AddCopiesRequest>,
) -> AppResult<(StatusCode, Json<Outcome<CopyBatch>>)> {
    claims.require_staff()?;
    request.validate()?;

    let mode = request.mode()?;
    let outcome = state
        .services
        .copies
        .create_copies(claims.user_id, book_id, mode, request.remarks)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Get a copy by ID
#[utoipa::path(
    get,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Copy details", body = BookCopy),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn get_copy(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookCopy>> {
    let copy = state.services.copies.get_copy(id).await?;
    Ok(Json(copy))
}

/// Update copy fields (status, accession number, labels, remarks)
#[utoipa::path(
    put,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    request_body = CopyPatch,
    responses(
        (status = 200, description = "Copy updated; body is `{ data, warnings }`", body = BookCopy),
        (status = 404, description = "Copy not found"),
        (status = 409, description = "Accession number already used")
    )
)]
pub async fn update_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<CopyPatch>,
) -> AppResult<Json<Outcome<BookCopy>>> {
    claims.require_staff()?;

    let outcome = state
        .services
        .copies
        .update_copy(claims.user_id, id, patch)
        .await?;
    Ok(Json(outcome))
}

/// Delete a copy with no active loans
#[utoipa::path(
    delete,
    path = "/copies/{id}",
    tag = "copies",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Copy deleted"),
        (status = 404, description = "Copy not found"),
        (status = 409, description = "Copy has active loans")
    )
)]
pub async fn delete_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Outcome<()>>> {
    claims.require_staff()?;

    let outcome = state.services.copies.delete_copy(claims.user_id, id).await?;
    Ok(Json(outcome))
}
