//! Chunked file upload CLI command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::output::{self, OutputFormat};
use resumable_core::error::AppError;
use resumable_storage::chunked::range;

/// Default chunk size (5 MB).
const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Arguments for the upload command
#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Path to the file to upload
    pub file: PathBuf,

    /// Upload endpoint
    #[arg(short, long, default_value = "http://localhost:8080/upload")]
    pub url: String,

    /// Chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Session id to use (generated when omitted)
    #[arg(short, long)]
    pub session_id: Option<String>,

    /// How many times a failed chunk is resent
    #[arg(short, long, default_value_t = 3)]
    pub retries: u32,

    /// Override the destination file name
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Result of a finished upload.
#[derive(Debug, Serialize)]
pub struct UploadSummary {
    /// Session id used for the transfer.
    pub session_id: String,
    /// Destination file name.
    pub file_name: String,
    /// Bytes sent.
    pub total_size: u64,
    /// Number of chunks sent.
    pub chunks: u64,
    /// Last range acknowledged by the server.
    pub last_range: String,
}

/// Execute the upload command
pub async fn execute(args: &UploadArgs, format: OutputFormat) -> Result<(), AppError> {
    if args.chunk_size == 0 {
        return Err(AppError::request_validation("--chunk-size must be greater than zero"));
    }

    let file_name = file_name_for(&args.file, args.name.as_deref())?;
    let session_id = args
        .session_id
        .clone()
        .unwrap_or_else(generate_session_id);

    let mut file = tokio::fs::File::open(&args.file).await.map_err(|e| {
        AppError::internal(format!("Failed to open '{}': {}", args.file.display(), e))
    })?;
    let total_size = file
        .metadata()
        .await
        .map_err(|e| AppError::internal(format!("Failed to read file metadata: {}", e)))?
        .len();

    tracing::info!(
        session_id = %session_id,
        file_name = %file_name,
        total_size,
        chunk_size = args.chunk_size,
        "Starting upload"
    );

    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;
    let uploader = ChunkUploader {
        client,
        url: args.url.clone(),
        session_id: session_id.clone(),
        retries: args.retries,
    };

    let chunks = chunk_count(total_size, args.chunk_size);
    let mut buf = Vec::new();
    let mut last_range = String::new();

    for index in 0..chunks {
        buf.clear();
        let read = (&mut file)
            .take(args.chunk_size)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| AppError::internal(format!("Failed to read file: {}", e)))?;

        let descriptor = range::encode(index, args.chunk_size, read as u64, total_size);
        let disposition = (index == 0).then(|| content_disposition(&file_name));
        let last = index + 1 == chunks;

        last_range = uploader
            .send_with_retry(&descriptor, disposition.as_deref(), &buf, last)
            .await?;
        tracing::debug!(index, range = %last_range, "Chunk acknowledged");
    }

    output::print_success(&format!(
        "Uploaded '{}' ({} bytes in {} chunks)",
        file_name, total_size, chunks
    ));
    output::print_item(
        &UploadSummary {
            session_id,
            file_name,
            total_size,
            chunks,
            last_range,
        },
        format,
    );

    Ok(())
}

/// Sends chunks of one session.
struct ChunkUploader {
    client: reqwest::Client,
    url: String,
    session_id: String,
    retries: u32,
}

impl ChunkUploader {
    /// Send one chunk, resending on transport errors and server failures.
    ///
    /// A transport error may hide a chunk the server stored before the
    /// connection broke. If the resend is then refused as out of order or
    /// duplicate (or as unknown, for the last chunk), the chunk counts as
    /// acknowledged.
    async fn send_with_retry(
        &self,
        descriptor: &str,
        disposition: Option<&str>,
        body: &[u8],
        last: bool,
    ) -> Result<String, AppError> {
        let mut attempt = 0;
        let mut maybe_applied = false;
        loop {
            let failure = match self.send(descriptor, disposition, body).await {
                Ok(reply) => {
                    let code = reply.error_code();
                    match classify(reply.status, code.as_deref(), maybe_applied, last) {
                        Verdict::Acknowledged => {
                            let ack = range::decode(&reply.text)?;
                            return Ok(ack.to_string());
                        }
                        Verdict::AlreadyApplied => {
                            output::print_warning(&format!(
                                "Chunk '{}' was already stored by the server",
                                descriptor
                            ));
                            return Ok(descriptor.to_string());
                        }
                        Verdict::Retry => reply.into_error(),
                        Verdict::Fail => return Err(reply.into_error()),
                    }
                }
                Err(e) => {
                    maybe_applied = true;
                    e
                }
            };

            if attempt >= self.retries {
                return Err(failure);
            }
            attempt += 1;
            output::print_warning(&format!(
                "Chunk '{}' failed ({}), retry {}/{}",
                descriptor, failure.message, attempt, self.retries
            ));
            tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
        }
    }

    /// Post one chunk. Only transport failures are errors here.
    async fn send(
        &self,
        descriptor: &str,
        disposition: Option<&str>,
        body: &[u8],
    ) -> Result<Reply, AppError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Session-ID", &self.session_id)
            .header("Content-Range", descriptor)
            .body(body.to_vec());
        if let Some(disposition) = disposition {
            request = request.header("Content-Disposition", disposition);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::internal(format!("Request failed: {}", e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::internal(format!("Failed to read response: {}", e)))?;

        Ok(Reply { status, text })
    }
}

/// A response from the upload endpoint.
struct Reply {
    status: StatusCode,
    text: String,
}

/// JSON error body of a rejected chunk.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl Reply {
    fn error_code(&self) -> Option<String> {
        serde_json::from_str::<ErrorBody>(&self.text)
            .ok()
            .map(|body| body.error)
    }

    fn into_error(self) -> AppError {
        AppError::internal(format!(
            "Server answered {}: {}",
            self.status,
            self.text.trim()
        ))
    }
}

/// What to do with a chunk response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Acknowledged,
    AlreadyApplied,
    Retry,
    Fail,
}

/// Decide how to handle a response. `maybe_applied` is set once an earlier
/// attempt for the same chunk ended in a transport error.
fn classify(status: StatusCode, code: Option<&str>, maybe_applied: bool, last: bool) -> Verdict {
    if status.is_success() {
        return Verdict::Acknowledged;
    }
    if status.is_server_error() {
        return Verdict::Retry;
    }
    if maybe_applied {
        match (status, code) {
            (StatusCode::CONFLICT, Some("OUT_OF_ORDER_CHUNK" | "DUPLICATE_SESSION")) => {
                return Verdict::AlreadyApplied;
            }
            (StatusCode::NOT_FOUND, Some("UNKNOWN_SESSION")) if last => {
                return Verdict::AlreadyApplied;
            }
            _ => {}
        }
    }
    Verdict::Fail
}

/// Number of requests needed for `total_size` bytes. An empty file still
/// takes one request so the server creates and finalizes it.
fn chunk_count(total_size: u64, chunk_size: u64) -> u64 {
    total_size.div_ceil(chunk_size).max(1)
}

/// 16 uppercase hex digits.
fn generate_session_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..16].to_ascii_uppercase()
}

fn file_name_for(path: &Path, name: Option<&str>) -> Result<String, AppError> {
    match name {
        Some(name) => Ok(name.to_string()),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| {
                AppError::request_validation(format!(
                    "Cannot derive a file name from '{}'",
                    path.display()
                ))
            }),
    }
}

/// `filename` carries an ASCII fallback; `filename*` carries the exact name
/// percent-encoded as UTF-8 and takes precedence on the server.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect();
    let escaped = fallback.replace('\\', "\\\\").replace('"', "\\\"");
    let encoded = utf8_percent_encode(file_name, NON_ALPHANUMERIC);
    format!("attachment; filename=\"{escaped}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use resumable_storage::chunked::disposition::parse_file_name;

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 10), 1);
        assert_eq!(chunk_count(10, 10), 1);
        assert_eq!(chunk_count(11, 10), 2);
        assert_eq!(chunk_count(250, 100), 3);
    }

    #[test]
    fn test_generated_session_id() {
        let id = generate_session_id();
        assert_eq!(id.len(), 16);
        assert!(id.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b)));
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn test_content_disposition_round_trips_through_server_parser() {
        for name in ["report.pdf", "with space.txt", "quote\"d.txt", "résumé.txt", "日本.bin"] {
            let header = content_disposition(name);
            assert!(header.is_ascii(), "{header}");
            assert_eq!(parse_file_name(&header).unwrap(), name);
        }
    }

    #[test]
    fn test_content_disposition_fallback() {
        assert_eq!(
            content_disposition("résumé.txt"),
            "attachment; filename=\"r_sum_.txt\"; filename*=UTF-8''r%C3%A9sum%C3%A9%2Etxt"
        );
    }

    #[test]
    fn test_classify_first_attempt() {
        assert_eq!(classify(StatusCode::OK, None, false, false), Verdict::Acknowledged);
        assert_eq!(classify(StatusCode::CREATED, None, false, true), Verdict::Acknowledged);
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, Some("WRITE_FAILURE"), false, false),
            Verdict::Retry
        );
        assert_eq!(
            classify(StatusCode::CONFLICT, Some("OUT_OF_ORDER_CHUNK"), false, false),
            Verdict::Fail
        );
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, Some("MALFORMED_RANGE"), false, false),
            Verdict::Fail
        );
    }

    #[test]
    fn test_classify_resend_after_lost_ack() {
        assert_eq!(
            classify(StatusCode::CONFLICT, Some("OUT_OF_ORDER_CHUNK"), true, false),
            Verdict::AlreadyApplied
        );
        assert_eq!(
            classify(StatusCode::CONFLICT, Some("DUPLICATE_SESSION"), true, false),
            Verdict::AlreadyApplied
        );
        assert_eq!(
            classify(StatusCode::NOT_FOUND, Some("UNKNOWN_SESSION"), true, true),
            Verdict::AlreadyApplied
        );
        // Only the last chunk can have retired the session.
        assert_eq!(
            classify(StatusCode::NOT_FOUND, Some("UNKNOWN_SESSION"), true, false),
            Verdict::Fail
        );
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, Some("MALFORMED_RANGE"), true, false),
            Verdict::Fail
        );
        assert_eq!(
            classify(StatusCode::CONFLICT, None, true, false),
            Verdict::Fail
        );
    }

    #[test]
    fn test_reply_error_code() {
        let reply = Reply {
            status: StatusCode::CONFLICT,
            text: r#"{"error":"OUT_OF_ORDER_CHUNK","message":"expects offset 100"}"#.into(),
        };
        assert_eq!(reply.error_code().as_deref(), Some("OUT_OF_ORDER_CHUNK"));

        let plain = Reply {
            status: StatusCode::BAD_GATEWAY,
            text: "upstream down".into(),
        };
        assert_eq!(plain.error_code(), None);
        assert!(plain.into_error().message.contains("502"));
    }

    #[test]
    fn test_file_name_for() {
        let path = Path::new("/data/archive.tar.gz");
        assert_eq!(file_name_for(path, None).unwrap(), "archive.tar.gz");
        assert_eq!(file_name_for(path, Some("x.bin")).unwrap(), "x.bin");
        assert!(file_name_for(Path::new("/"), None).is_err());
    }
}
