//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, copies, health, loans, notifications, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LMS Lending API",
        version = "1.0.0",
        description = "Library lending and inventory REST API. Mutations answer `{ data, warnings }`; \
                       `warnings` lists audit or notification writes that failed after the change was stored."
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::delete_book,
        // Copies
        copies::list_copies,
        copies::list_copies_for_book,
        copies::create_copies,
        copies::get_copy,
        copies::update_copy,
        copies::delete_copy,
        // Loans
        loans::list_loans,
        loans::get_loan,
        loans::get_user_loans,
        loans::create_loan,
        loans::update_loan,
        loans::renew_loan,
        loans::delete_loan,
        // Users
        users::get_user,
        users::delete_user,
        // Notifications & audit
        notifications::list_notifications,
        notifications::mark_all_read,
        notifications::list_audit_logs,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::BookResponse,
            crate::models::book::CreateBook,
            crate::models::book::CreatedBook,
            crate::models::book::BookSortColumn,
            // Copies
            crate::models::copy::BookCopy,
            crate::models::copy::CopyStatus,
            crate::models::copy::CopyPatch,
            crate::models::copy::AddCopiesRequest,
            crate::models::copy::CopyBatch,
            crate::models::copy::FailedCopy,
            crate::models::copy::CopySortColumn,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanResponse,
            crate::models::loan::CreateLoan,
            crate::models::loan::LoanPatch,
            crate::models::loan::RenewLoan,
            crate::models::loan::LoanSortColumn,
            // Users
            crate::models::user::User,
            crate::models::user::UserRole,
            // Notifications & audit
            crate::models::notification::Notification,
            crate::models::notification::MarkedRead,
            crate::models::audit_log::AuditLog,
            crate::models::audit_log::AuditAction,
            crate::services::SideEffectWarning,
            crate::services::side_effects::SideEffectKind,
            crate::models::SortDirection,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book catalog"),
        (name = "copies", description = "Physical copy inventory"),
        (name = "loans", description = "Loan lifecycle"),
        (name = "users", description = "User lookups"),
        (name = "notifications", description = "Notifications and audit trail")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_lending_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/books", "/books/{id}/copies", "/loans/{id}/renew", "/audit-logs"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
