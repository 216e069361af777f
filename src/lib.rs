//! Library lending and inventory server
//!
//! Tracks books and their physical copies, runs the loan lifecycle
//! (request, issue, return, with overdue derived on read) and records an audit
//! trail and user notifications for every change, behind a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    /// Database handle for readiness checks; `None` when tests drive the router over the in-memory store
    pub repository: Option<repository::Repository>,
}
