//! Extractor for the upload protocol headers of a chunk request.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use resumable_core::error::AppError;

use crate::error::ApiError;

/// Client-chosen id shared by every chunk of one transfer.
pub const SESSION_ID: &str = "session-id";

/// Protocol headers of one chunk request.
#[derive(Debug, Clone)]
pub struct ChunkHeaders {
    /// `Session-ID` value.
    pub session_id: String,
    /// `Content-Range` value.
    pub content_range: String,
    /// `Content-Disposition` value, only needed on the first chunk.
    pub content_disposition: Option<String>,
}

impl<S> FromRequestParts<S> for ChunkHeaders
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let session_id = required(headers, SESSION_ID)?;
        let content_range = required(headers, axum::http::header::CONTENT_RANGE.as_str())?;
        let content_disposition =
            optional(headers, axum::http::header::CONTENT_DISPOSITION.as_str())?;

        Ok(Self {
            session_id,
            content_range,
            content_disposition,
        })
    }
}

fn required(headers: &HeaderMap, name: &str) -> Result<String, AppError> {
    optional(headers, name)?
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::request_validation(format!("Missing '{name}' header")))
}

/// Header values are read as UTF-8 so a quoted non-ASCII file name survives.
fn optional(headers: &HeaderMap, name: &str) -> Result<Option<String>, AppError> {
    headers
        .get(name)
        .map(|value| {
            std::str::from_utf8(value.as_bytes())
                .map(|v| v.trim().to_string())
                .map_err(|_| {
                    AppError::request_validation(format!("Header '{name}' is not valid UTF-8"))
                })
        })
        .transpose()
}
