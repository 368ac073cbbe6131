//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use resumable_core::config::AppConfig;
use resumable_storage::{ChunkIngestionEngine, SessionStore};

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are `Arc`-wrapped for cheap cloning across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Active upload sessions
    pub sessions: Arc<SessionStore>,
    /// Chunk ingestion engine
    pub engine: Arc<ChunkIngestionEngine>,
}

impl AppState {
    /// Build the state from configuration and a session store. The engine
    /// shares the store with whoever else holds it, such as the sweeper.
    pub fn new(config: AppConfig, sessions: Arc<SessionStore>) -> Self {
        let engine = Arc::new(ChunkIngestionEngine::new(
            &config.upload,
            Arc::clone(&sessions),
        ));
        Self {
            config: Arc::new(config),
            sessions,
            engine,
        }
    }
}
