//! # HTTP Service
//!
//! Routes:
//!
//! - `GET /health`: liveness message
//! - `POST /process`: multipart `data_file` + `template_file`, answers with an archive
//!   of filled template workbooks
//! - `POST /merge`: multipart `file` holding a zip or 7z archive, answers with one
//!   merged workbook
//!
//! Failures are answered as `{"kind": ..., "message": ...}`.
mod error;
mod form;
mod handlers;

use crate::config::Settings;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared by all handlers, read-only
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) settings: Arc<Settings>,
}

/// Builds the application with permissive CORS, request tracing and no body limit.
pub fn router(settings: Settings) -> Router {
    let state = AppState { settings: Arc::new(settings) };
    Router::new()
        .route("/health", get(handlers::health))
        .route("/process", post(handlers::process))
        .route("/merge", post(handlers::merge))
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
