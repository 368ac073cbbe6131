//! Chunk ingestion engine: validates one chunk request, appends it to its
//! session's temporary file and finalizes the upload when it completes.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info};

use resumable_core::config::UploadConfig;
use resumable_core::error::AppError;
use resumable_core::result::AppResult;

use super::disposition::parse_file_name;
use super::finalizer::Finalizer;
use super::range::{self, ContentRange};
use super::session::{UploadSession, UploadStatus};
use super::store::{Claim, SessionHandle, SessionStore};

/// Longest accepted session identifier.
const MAX_SESSION_ID_LEN: usize = 128;

/// How often a first chunk re-claims an id whose session vanished while
/// the request waited for its lock.
const CLAIM_ATTEMPTS: usize = 3;

/// One chunk-upload request, already stripped of its transport.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    /// Value of the `Session-ID` header.
    pub session_id: String,
    /// Raw `Content-Range` descriptor.
    pub content_range: String,
    /// Raw `Content-Disposition` value, required on the first chunk.
    pub content_disposition: Option<String>,
    /// Chunk bytes.
    pub body: Bytes,
}

/// Whether a chunk opened a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The chunk created the session.
    Created,
    /// The chunk continued (or replayed into) an existing session.
    Accepted,
}

/// Acknowledgement of an accepted chunk.
#[derive(Debug, Clone)]
pub struct ChunkReceipt {
    /// Created or accepted.
    pub outcome: ChunkOutcome,
    /// The decoded descriptor, echoed back to the client.
    pub content_range: ContentRange,
    /// Body bytes appended by this chunk.
    pub accepted_bytes: u64,
    /// Session progress after this chunk.
    pub transferred: u64,
    /// Declared final size.
    pub total_size: u64,
    /// Where the file was published, when this chunk completed it.
    pub completed_path: Option<PathBuf>,
}

impl ChunkReceipt {
    /// Whether this chunk finished the upload.
    pub fn is_complete(&self) -> bool {
        self.completed_path.is_some()
    }
}

/// Handles chunk-upload requests against a shared session store.
#[derive(Debug, Clone)]
pub struct ChunkIngestionEngine {
    /// Directory holding the per-session temporary files.
    temp_root: PathBuf,
    /// Largest chunk body accepted.
    max_chunk_size: u64,
    /// Active sessions.
    store: Arc<SessionStore>,
    /// Publishes completed files.
    finalizer: Finalizer,
}

impl ChunkIngestionEngine {
    /// Create an engine over `store` using the upload settings.
    pub fn new(config: &UploadConfig, store: Arc<SessionStore>) -> Self {
        Self {
            temp_root: config.temp_root_path(),
            max_chunk_size: config.max_chunk_size_bytes,
            store,
            finalizer: Finalizer::new(config.destination_root_path()),
        }
    }

    /// The session store this engine mutates.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The temporary-storage root.
    pub fn temp_root(&self) -> &PathBuf {
        &self.temp_root
    }

    /// Handle one chunk-upload request.
    ///
    /// Nothing is written unless the request passes validation. Every
    /// request touching a session holds that session's lock from lookup
    /// until the response is decided, so chunks for one session never
    /// interleave.
    ///
    /// The work runs on its own task. Dropping the returned future (client
    /// disconnect, request timeout) does not interrupt a write halfway: the
    /// chunk is either fully appended and recorded or not applied at all.
    pub async fn handle_chunk(&self, request: ChunkRequest) -> AppResult<ChunkReceipt> {
        let engine = self.clone();
        tokio::spawn(async move { engine.process(request).await })
            .await
            .map_err(|e| AppError::internal(format!("Chunk task failed: {e}")))?
    }

    async fn process(&self, request: ChunkRequest) -> AppResult<ChunkReceipt> {
        validate_session_id(&request.session_id)?;

        let len = request.body.len() as u64;
        if len > self.max_chunk_size {
            return Err(AppError::request_validation(format!(
                "Chunk of {len} bytes exceeds the {} byte limit",
                self.max_chunk_size
            )));
        }

        let range = range::decode(&request.content_range)?;
        if range.from > range.to {
            return Err(AppError::malformed_range(format!(
                "Range '{range}' starts after it ends"
            )));
        }
        if range.from.saturating_add(len) > range.total {
            return Err(AppError::malformed_range(format!(
                "Chunk of {len} bytes at offset {} overruns total size {}",
                range.from, range.total
            )));
        }

        if range.from == 0 {
            self.handle_first_chunk(&request, range).await
        } else {
            self.handle_continuation(&request, range).await
        }
    }

    async fn handle_first_chunk(
        &self,
        request: &ChunkRequest,
        range: ContentRange,
    ) -> AppResult<ChunkReceipt> {
        let id = request.session_id.as_str();

        for _ in 0..CLAIM_ATTEMPTS {
            let claim = self.store.claim(id, || {
                let disposition = request.content_disposition.as_deref().ok_or_else(|| {
                    AppError::missing_file_name(
                        "The first chunk must carry a Content-Disposition file name",
                    )
                })?;
                let file_name = parse_file_name(disposition)?;
                Ok(UploadSession::new(id, file_name, &self.temp_root, range.total))
            })?;

            match claim {
                Claim::Created { handle, mut guard } => {
                    if let Err(e) = guard.open().await {
                        self.store.delete_if_current(id, &handle);
                        return Err(e);
                    }
                    info!(
                        session_id = %id,
                        file_name = %guard.file_name,
                        total_size = guard.total_size,
                        "Upload session created"
                    );
                    return self
                        .ingest(&handle, guard, range, &request.body, ChunkOutcome::Created)
                        .await;
                }
                Claim::Existing(handle) => {
                    let mut guard = Arc::clone(&handle).lock_owned().await;
                    if guard.status == UploadStatus::Completed || guard.received > 0 {
                        return Err(AppError::duplicate_session(format!(
                            "Session '{id}' already holds {} bytes",
                            guard.received
                        )));
                    }
                    if !self.store.is_current(id, &handle) {
                        debug!(session_id = %id, "Session aborted while waiting, claiming again");
                        continue;
                    }
                    check_total(&guard, range)?;
                    guard.reset().await?;
                    debug!(session_id = %id, "First chunk replayed");
                    return self
                        .ingest(&handle, guard, range, &request.body, ChunkOutcome::Accepted)
                        .await;
                }
            }
        }

        Err(AppError::duplicate_session(format!(
            "Session '{id}' is being created by another request"
        )))
    }

    async fn handle_continuation(
        &self,
        request: &ChunkRequest,
        range: ContentRange,
    ) -> AppResult<ChunkReceipt> {
        let id = request.session_id.as_str();
        let unknown = || AppError::unknown_session(format!("Session '{id}' does not exist"));

        let handle = self.store.get(id).ok_or_else(unknown)?;
        let guard = Arc::clone(&handle).lock_owned().await;
        if !self.store.is_current(id, &handle) {
            return Err(unknown());
        }

        check_total(&guard, range)?;
        if range.from != guard.received {
            return Err(AppError::out_of_order(format!(
                "Session '{id}' expects offset {}, got {}",
                guard.received, range.from
            )));
        }

        self.ingest(&handle, guard, range, &request.body, ChunkOutcome::Accepted)
            .await
    }

    /// Append `body`, record progress and finalize on completion.
    async fn ingest(
        &self,
        handle: &SessionHandle,
        mut guard: OwnedMutexGuard<UploadSession>,
        range: ContentRange,
        body: &[u8],
        outcome: ChunkOutcome,
    ) -> AppResult<ChunkReceipt> {
        let len = body.len() as u64;
        if guard.received.saturating_add(len) > guard.total_size {
            return Err(AppError::malformed_range(format!(
                "Chunk of {len} bytes at offset {} overruns total size {}",
                guard.received, guard.total_size
            )));
        }

        guard.append(body).await?;
        guard.record_chunk(range.to, len);
        debug!(
            session_id = %guard.id,
            range = %range,
            transferred = guard.transferred,
            "Chunk appended"
        );

        let completed_path = if guard.is_complete(range.to) {
            Some(self.complete(handle, &mut guard).await?)
        } else {
            None
        };

        Ok(ChunkReceipt {
            outcome,
            content_range: range,
            accepted_bytes: len,
            transferred: guard.transferred,
            total_size: guard.total_size,
            completed_path,
        })
    }

    /// Retire the session and publish its file. The session leaves the
    /// store whether or not the move succeeds.
    async fn complete(
        &self,
        handle: &SessionHandle,
        session: &mut UploadSession,
    ) -> AppResult<PathBuf> {
        session.close();
        self.store.delete_if_current(&session.id, handle);

        match self
            .finalizer
            .finalize(&session.temp_path, &session.file_name)
            .await
        {
            Ok(path) => {
                session.status = UploadStatus::Completed;
                info!(
                    session_id = %session.id,
                    path = %path.display(),
                    total_size = session.total_size,
                    "Upload completed"
                );
                Ok(path)
            }
            Err(e) => {
                error!(
                    session_id = %session.id,
                    temp_path = %session.temp_path.display(),
                    error = %e,
                    "Upload finalization failed, temporary file kept"
                );
                Err(e)
            }
        }
    }
}

fn check_total(session: &UploadSession, range: ContentRange) -> AppResult<()> {
    if range.total != session.total_size {
        return Err(AppError::malformed_range(format!(
            "Session '{}' was declared with total size {}, got {}",
            session.id, session.total_size, range.total
        )));
    }
    Ok(())
}

/// Session ids name files in the temporary root, so only a conservative
/// character set is accepted.
fn validate_session_id(id: &str) -> AppResult<()> {
    if id.is_empty() || id.len() > MAX_SESSION_ID_LEN {
        return Err(AppError::request_validation(format!(
            "Session-ID must be 1 to {MAX_SESSION_ID_LEN} characters"
        )));
    }
    if id.starts_with('.')
        || !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return Err(AppError::request_validation(format!(
            "Session-ID '{id}' contains unsupported characters"
        )));
    }
    Ok(())
}
