//! # resumable-api
//!
//! HTTP API layer for the resumable upload server built on Axum.
//!
//! Provides the chunk upload endpoint, the health endpoint, middleware
//! (request logging, CORS), the chunk header extractor and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use state::AppState;
