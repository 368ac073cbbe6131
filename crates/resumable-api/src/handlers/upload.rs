//! Chunk upload handler.

use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use resumable_core::error::AppError;
use resumable_storage::{ChunkOutcome, ChunkReceipt, ChunkRequest};

use crate::error::ApiError;
use crate::extractors::ChunkHeaders;
use crate::state::AppState;

/// Number of body bytes the chunk contributed.
pub const UPLOAD_CHUNK_LENGTH: HeaderName = HeaderName::from_static("upload-chunk-length");

/// Present with value `true` on the response to the completing chunk.
pub const UPLOAD_COMPLETE: HeaderName = HeaderName::from_static("upload-complete");

/// POST {upload_path}: append one chunk to its session.
pub async fn upload_chunk(
    State(state): State<AppState>,
    headers: ChunkHeaders,
    body: Bytes,
) -> Result<Response, ApiError> {
    let receipt = state
        .engine
        .handle_chunk(ChunkRequest {
            session_id: headers.session_id,
            content_range: headers.content_range,
            content_disposition: headers.content_disposition,
            body,
        })
        .await?;

    Ok(chunk_response(&receipt))
}

/// Any other method on the upload path.
pub async fn reject_method() -> ApiError {
    ApiError(AppError::request_validation("Invalid request."))
}

/// Success response for an accepted chunk: the descriptor echoed in the
/// body and in `Range`, with the connection closed afterwards.
pub fn chunk_response(receipt: &ChunkReceipt) -> Response {
    let status = match receipt.outcome {
        ChunkOutcome::Created => StatusCode::CREATED,
        ChunkOutcome::Accepted => StatusCode::OK,
    };
    let descriptor = receipt.content_range.to_string();

    let mut response = (
        status,
        [
            (header::RANGE, descriptor.clone()),
            (header::CONNECTION, "close".to_string()),
            (UPLOAD_CHUNK_LENGTH, receipt.accepted_bytes.to_string()),
        ],
        descriptor,
    )
        .into_response();

    if receipt.is_complete() {
        response
            .headers_mut()
            .insert(UPLOAD_COMPLETE, HeaderValue::from_static("true"));
    }

    response
}
