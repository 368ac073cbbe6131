//! Route definitions for the upload HTTP API.
//!
//! The router receives `AppState` and passes it to all handlers via Axum's `State` extractor.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the Axum router with the upload and health routes.
///
/// The upload route accepts `POST` only; any other method is answered
/// with a request validation failure before any session is touched.
pub fn build_router(state: AppState) -> Router {
    let max_chunk = usize::try_from(state.config.upload.max_chunk_size_bytes).unwrap_or(usize::MAX);
    let upload_path = state.config.server.upload_path.clone();

    Router::new()
        .route(
            &upload_path,
            post(handlers::upload::upload_chunk).fallback(handlers::upload::reject_method),
        )
        .route("/health", get(handlers::health::health))
        .layer(DefaultBodyLimit::max(max_chunk))
        .layer(axum_middleware::from_fn(
            middleware::logging::request_logging,
        ))
        .with_state(state)
}
