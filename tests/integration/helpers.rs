//! Shared test helpers for integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use http::{HeaderMap, Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use resumable_api::{AppState, build_app};
use resumable_core::config::AppConfig;
use resumable_storage::SessionStore;

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Session store shared with the router
    pub sessions: Arc<SessionStore>,
    /// Application config
    pub config: AppConfig,
    /// Owns the temporary and destination roots
    _dir: TempDir,
}

impl TestApp {
    /// Create a test application over fresh temporary roots
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a test application, adjusting the configuration first
    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut config = AppConfig::default();
        config.upload.temp_root = dir.path().join("tmp").display().to_string();
        config.upload.destination_root = dir.path().join("files").display().to_string();
        adjust(&mut config);

        let sessions = Arc::new(SessionStore::new());
        let router = build_app(AppState::new(config.clone(), Arc::clone(&sessions)));

        Self {
            router,
            sessions,
            config,
            _dir: dir,
        }
    }

    /// Path of a session's temporary file
    pub fn temp_file(&self, session_id: &str) -> PathBuf {
        self.config.upload.temp_root_path().join(session_id)
    }

    /// Path of a published file
    pub fn destination(&self, file_name: &str) -> PathBuf {
        self.config.upload.destination_root_path().join(file_name)
    }

    /// Send a chunk to the upload endpoint
    pub async fn upload(&self, chunk: Chunk) -> TestResponse {
        let mut req = Request::builder()
            .method(chunk.method)
            .uri(&self.config.server.upload_path);

        if let Some(id) = chunk.session_id {
            req = req.header("Session-ID", id);
        }
        if let Some(range) = chunk.range {
            req = req.header("Content-Range", range);
        }
        if let Some(name) = chunk.file_name {
            req = req.header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", name),
            );
        }

        let req = req
            .body(Body::from(chunk.body))
            .expect("Failed to build request");
        self.send(req).await
    }

    /// Send an arbitrary request
    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        TestResponse {
            status,
            headers,
            text: String::from_utf8_lossy(&body_bytes).into_owned(),
        }
    }
}

/// One chunk request under construction
#[derive(Debug, Clone)]
pub struct Chunk {
    method: &'static str,
    session_id: Option<String>,
    range: Option<String>,
    file_name: Option<String>,
    body: Vec<u8>,
}

impl Chunk {
    /// A POST chunk with session id and range
    pub fn new(session_id: &str, range: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST",
            session_id: Some(session_id.to_string()),
            range: Some(range.to_string()),
            file_name: None,
            body: body.into(),
        }
    }

    /// Attach a Content-Disposition file name
    pub fn file_name(mut self, name: &str) -> Self {
        self.file_name = Some(name.to_string());
        self
    }

    /// Drop the Session-ID header
    pub fn without_session_id(mut self) -> Self {
        self.session_id = None;
        self
    }

    /// Drop the Content-Range header
    pub fn without_range(mut self) -> Self {
        self.range = None;
        self
    }

    /// Use another HTTP method
    pub fn method(mut self, method: &'static str) -> Self {
        self.method = method;
        self
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body text
    pub text: String,
}

impl TestResponse {
    /// Body parsed as JSON, or `Null`
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap_or(Value::Null)
    }

    /// Error code of a JSON error body
    pub fn error_code(&self) -> String {
        self.json()["error"].as_str().unwrap_or_default().to_string()
    }

    /// A header as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
