//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{CreateLoan, LoanQuery, RenewLoan},
        LoanPatch, LoanResponse, LoanStatus,
    },
    services::Outcome,
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

/// List loans; students only see their own
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "List of loans", body = PaginatedResponse<LoanResponse>)
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(mut query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanResponse>>> {
    if !claims.is_staff() {
        query.user_id = Some(claims.user_id);
    }

    let (loans, total) = state.services.loans.list_loans(&query).await?;
    Ok(Json(PaginatedResponse::new(loans, total, query.page, query.size)))
}

/// Get loan details by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanResponse),
        (status = 403, description = "Loan belongs to another user"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LoanResponse>> {
    let loan = state.services.loans.get_loan(id).await?;
    claims.require_self_or_staff(loan.loan.user_id)?;
    Ok(Json(loan))
}

/// Get all loans of a user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's loans", body = Vec<LoanResponse>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<LoanResponse>>> {
    claims.require_self_or_staff(user_id)?;

    let loans = state.services.loans.get_loans_for_user(user_id).await?;
    Ok(Json(loans))
}

/// Request a loan, or issue a copy directly
///
/// Students may only file pending requests for themselves.
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created; body is `{ data, warnings }`", body = LoanResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "User, book or copy not found"),
        (status = 409, description = "Copy already borrowed or unavailable")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(mut request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<Outcome<LoanResponse>>)> {
    if !claims.is_staff() {
        let user_id = *request.user_id.get_or_insert(claims.user_id);
        claims.require_self_or_staff(user_id)?;
        if request.status.unwrap_or_default() != LoanStatus::Pending {
            return Err(AppError::Authorization(
                "Only librarians can issue copies".to_string(),
            ));
        }
    }

    let outcome = state.services.loans.create_loan(claims.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Update a loan (issue, return, change due date or remarks)
#[utoipa::path(
    put,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    request_body = LoanPatch,
    responses(
        (status = 200, description = "Loan updated; body is `{ data, warnings }`", body = LoanResponse),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn update_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<LoanPatch>,
) -> AppResult<Json<Outcome<LoanResponse>>> {
    claims.require_staff()?;

    let outcome = state
        .services
        .loans
        .update_loan(claims.user_id, id, patch)
        .await?;
    Ok(Json(outcome))
}

/// Renew a borrowed loan
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    request_body = RenewLoan,
    responses(
        (status = 200, description = "Loan renewed; body is `{ data, warnings }`", body = LoanResponse),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan not renewable or maximum renewals reached")
    )
)]
pub async fn renew_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RenewLoan>,
) -> AppResult<Json<Outcome<LoanResponse>>> {
    claims.require_staff()?;

    let outcome = state
        .services
        .loans
        .renew_loan(claims.user_id, id, request)
        .await?;
    Ok(Json(outcome))
}

/// Delete a loan record; an issued copy is released
#[utoipa::path(
    delete,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan deleted"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn delete_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Outcome<()>>> {
    claims.require_staff()?;

    let outcome = state.services.loans.delete_loan(claims.user_id, id).await?;
    Ok(Json(outcome))
}
