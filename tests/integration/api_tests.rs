//! API integration tests
//!
//! Drive the router in-process over the in-memory store with signed bearer tokens.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use lms_server::{
    api,
    config::{AppConfig, LendingConfig},
    models::{User, UserClaims, UserRole},
    repository::{memory::InMemoryStore, Stores},
    services::Services,
    AppState,
};

struct TestApp {
    router: Router,
    store: InMemoryStore,
    secret: String,
}

impl TestApp {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let config = AppConfig::default();
        let secret = config.auth.jwt_secret.clone();
        let services = Services::new(
            Stores::from_store(Arc::new(store.clone())),
            LendingConfig::default(),
        );
        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(services),
            repository: None,
        };

        Self {
            router: api::router(state),
            store,
            secret,
        }
    }

    fn token(&self, user: &User) -> String {
        UserClaims::new(user.id, &user.username, user.role, Duration::hours(1))
            .create_token(&self.secret)
            .expect("token")
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Creates a book with copies 001..=`copies` and returns its JSON
    async fn book_with_copies(&self, token: &str, copies: u32) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/v1/books",
                Some(token),
                Some(json!({
                    "title": "Clean Code",
                    "author": "Robert C. Martin",
                    "start_accession_number": 1,
                    "end_accession_number": copies
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }
}

fn due_in(days: i64) -> String {
    (Utc::now() + Duration::days(days)).to_rfc3339()
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/api/v1/books", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");

    let (status, _) = app
        .send(Method::GET, "/api/v1/books", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_book_with_copies() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;
    let token = app.token(&librarian);

    let created = app.book_with_copies(&token, 3).await;
    assert_eq!(created["book"]["total_copies"], 3);
    assert_eq!(created["book"]["available_copies"], 3);
    let accession: Vec<&str> = created["copies"]["created"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["accession_number"].as_str().unwrap())
        .collect();
    assert_eq!(accession, vec!["001", "002", "003"]);

    let book_id = created["book"]["id"].as_str().unwrap();
    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/v1/books/{}/copies", book_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 1);
}

#[tokio::test]
async fn test_students_cannot_create_books() {
    let app = TestApp::new();
    let student = app.store.insert_user("student", UserRole::Student).await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/books",
            Some(&app.token(&student)),
            Some(json!({ "title": "SICP", "author": "Abelson" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_book_validation() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/books",
            Some(&app.token(&librarian)),
            Some(json!({ "title": "", "author": "Nobody" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_oversized_copy_batch_is_rejected() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/books",
            Some(&app.token(&librarian)),
            Some(json!({
                "title": "Clean Code",
                "author": "Robert C. Martin",
                "total_copies": 4_000_000_000u32
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (_, body) = app
        .send(Method::GET, "/api/v1/books", Some(&app.token(&librarian)), None)
        .await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_huge_page_number_returns_empty_page() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;
    let staff = app.token(&librarian);
    app.book_with_copies(&staff, 2).await;

    let (status, body) = app
        .send(
            Method::GET,
            "/api/v1/copies?page=100000000000000000&size=100",
            Some(&staff),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"], json!([]));
}

#[tokio::test]
async fn test_issue_and_return_flow() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;
    let student = app.store.insert_user("student", UserRole::Student).await;
    let staff = app.token(&librarian);

    let created = app.book_with_copies(&staff, 1).await;
    let book_id = created["book"]["id"].as_str().unwrap().to_string();
    let copy_id = created["copies"]["created"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/loans",
            Some(&staff),
            Some(json!({
                "user_id": student.id,
                "book_copy_id": copy_id,
                "due_date": due_in(14),
                "status": "borrowed"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let loan_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "borrowed");
    assert!(body.get("warnings").is_none());

    let (_, copy) = app
        .send(Method::GET, &format!("/api/v1/copies/{}", copy_id), Some(&staff), None)
        .await;
    assert_eq!(copy["status"], "borrowed");

    let (_, book) = app
        .send(Method::GET, &format!("/api/v1/books/{}", book_id), Some(&staff), None)
        .await;
    assert_eq!(book["available_copies"], 0);

    let (status, body) = app
        .send(
            Method::PUT,
            &format!("/api/v1/loans/{}", loan_id),
            Some(&staff),
            Some(json!({ "status": "returned" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "returned");
    assert!(body["data"]["returned_date"].is_string());

    let (_, copy) = app
        .send(Method::GET, &format!("/api/v1/copies/{}", copy_id), Some(&staff), None)
        .await;
    assert_eq!(copy["status"], "available");

    let (_, book) = app
        .send(Method::GET, &format!("/api/v1/books/{}", book_id), Some(&staff), None)
        .await;
    assert_eq!(book["available_copies"], 1);
}

#[tokio::test]
async fn test_duplicate_open_loan_conflicts() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;
    let student = app.store.insert_user("student", UserRole::Student).await;
    let staff = app.token(&librarian);

    let created = app.book_with_copies(&staff, 2).await;
    let copies = created["copies"]["created"].as_array().unwrap().clone();

    let request = |copy: &Value| {
        json!({
            "user_id": student.id,
            "book_copy_id": copy["id"],
            "due_date": due_in(7)
        })
    };

    let (status, _) = app
        .send(Method::POST, "/api/v1/loans", Some(&staff), Some(request(&copies[0])))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::POST, "/api/v1/loans", Some(&staff), Some(request(&copies[1])))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "book already borrowed");
}

#[tokio::test]
async fn test_student_requests_only_for_themselves() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;
    let student = app.store.insert_user("student", UserRole::Student).await;
    let other = app.store.insert_user("other", UserRole::Student).await;
    let staff = app.token(&librarian);
    let token = app.token(&student);

    let created = app.book_with_copies(&staff, 1).await;
    let copy_id = created["copies"]["created"][0]["id"].clone();

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/loans",
            Some(&token),
            Some(json!({ "user_id": other.id, "book_copy_id": copy_id, "due_date": due_in(7) })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/loans",
            Some(&token),
            Some(json!({ "book_copy_id": copy_id, "due_date": due_in(7), "status": "borrowed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/loans",
            Some(&token),
            Some(json!({ "book_copy_id": copy_id, "due_date": due_in(7) })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["user_id"], json!(student.id));

    let (status, body) = app
        .send(Method::GET, "/api/v1/notifications", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = app
        .send(Method::PUT, "/api/v1/notifications/read-all", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);
}

#[tokio::test]
async fn test_students_only_list_their_own_loans() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;
    let alice = app.store.insert_user("alice", UserRole::Student).await;
    let bob = app.store.insert_user("bob", UserRole::Student).await;
    let staff = app.token(&librarian);

    let created = app.book_with_copies(&staff, 2).await;
    let copies = created["copies"]["created"].as_array().unwrap().clone();
    for (user, copy) in [(&alice, &copies[0]), (&bob, &copies[1])] {
        let (status, _) = app
            .send(
                Method::POST,
                "/api/v1/loans",
                Some(&staff),
                Some(json!({ "user_id": user.id, "book_copy_id": copy["id"], "due_date": due_in(7) })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = app
        .send(Method::GET, "/api/v1/loans", Some(&app.token(&alice)), None)
        .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["user_id"], json!(alice.id));

    let (_, body) = app.send(Method::GET, "/api/v1/loans", Some(&staff), None).await;
    assert_eq!(body["total"], 2);

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/api/v1/users/{}/loans", bob.id),
            Some(&app.token(&alice)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_copy_with_active_loan_conflicts() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;
    let student = app.store.insert_user("student", UserRole::Student).await;
    let staff = app.token(&librarian);

    let created = app.book_with_copies(&staff, 1).await;
    let book_id = created["book"]["id"].as_str().unwrap().to_string();
    let copy_id = created["copies"]["created"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/loans",
            Some(&staff),
            Some(json!({
                "user_id": student.id,
                "book_copy_id": copy_id,
                "due_date": due_in(7),
                "status": "borrowed"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/v1/copies/{}", copy_id), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/v1/books/{}", book_id), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_loan_is_not_found() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/v1/loans/{}", uuid::Uuid::new_v4()),
            Some(&app.token(&librarian)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchData");
}

#[tokio::test]
async fn test_audit_logs_are_staff_only() {
    let app = TestApp::new();
    let librarian = app.store.insert_user("librarian", UserRole::Librarian).await;
    let student = app.store.insert_user("student", UserRole::Student).await;
    let staff = app.token(&librarian);

    app.book_with_copies(&staff, 2).await;

    let (status, _) = app
        .send(Method::GET, "/api/v1/audit-logs", Some(&app.token(&student)), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::GET, "/api/v1/audit-logs?action=create", Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total"].as_i64().unwrap() >= 1);
}
