//! Upload session state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use resumable_core::error::AppError;
use resumable_core::result::AppResult;

/// Lifecycle of an upload session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Registered; the temporary file is being prepared.
    Created,
    /// At least one chunk has been appended.
    Uploading,
    /// Finalized and removed from the store.
    Completed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Uploading => write!(f, "uploading"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// One in-progress file transfer.
///
/// The open handle is owned exclusively by the session until it is closed
/// on completion, expiry or a failed creation.
#[derive(Debug)]
pub struct UploadSession {
    /// Client-supplied session identifier.
    pub id: String,
    /// Destination base name from the first chunk.
    pub file_name: String,
    /// Write-ahead temporary file, named after the session id.
    pub temp_path: PathBuf,
    /// Declared final size, fixed by the first chunk.
    pub total_size: u64,
    /// Highest acknowledged end offset, clamped to `total_size`.
    pub transferred: u64,
    /// Bytes appended to the temporary file so far; the next expected offset.
    pub received: u64,
    /// Lifecycle status.
    pub status: UploadStatus,
    /// When the session was registered.
    pub created_at: DateTime<Utc>,
    last_activity: Instant,
    file: Option<File>,
}

impl UploadSession {
    /// Register a new session whose temporary file lives in `temp_root`.
    pub fn new(id: &str, file_name: String, temp_root: &Path, total_size: u64) -> Self {
        Self {
            id: id.to_string(),
            file_name,
            temp_path: temp_root.join(id),
            total_size,
            transferred: 0,
            received: 0,
            status: UploadStatus::Created,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            file: None,
        }
    }

    /// Create the temporary file and keep it open for appends.
    ///
    /// A file already at the temp path (kept after a failed finalization, or
    /// left by an earlier process) is renamed to `<id>.<millis>.stale` rather
    /// than overwritten. The sweeper purges it once it outlives the TTL.
    pub async fn open(&mut self) -> AppResult<()> {
        if let Some(parent) = self.temp_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::write_failure(
                    format!("Failed to create temp root '{}'", parent.display()),
                    e,
                )
            })?;
        }

        let aside = self.stale_path();
        match tokio::fs::rename(&self.temp_path, &aside).await {
            Ok(()) => {
                tracing::warn!(
                    session_id = %self.id,
                    moved_to = %aside.display(),
                    "Moved existing temp file aside"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AppError::write_failure(
                    format!(
                        "Failed to move existing temp file '{}' aside",
                        self.temp_path.display()
                    ),
                    e,
                ));
            }
        }

        self.file = Some(self.open_for_append().await?);
        Ok(())
    }

    fn stale_path(&self) -> PathBuf {
        self.temp_path.with_file_name(format!(
            "{}.{}.stale",
            self.id,
            Utc::now().timestamp_millis()
        ))
    }

    async fn open_for_append(&self) -> AppResult<File> {
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.temp_path)
            .await
            .map_err(|e| {
                AppError::write_failure(
                    format!("Failed to open temp file '{}'", self.temp_path.display()),
                    e,
                )
            })
    }

    /// Whether the temporary file is open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Append a chunk and sync it to durable storage.
    ///
    /// The file is first cut back to `received`, dropping bytes of an earlier
    /// write whose request never got acknowledged. On failure it is cut back
    /// again through a fresh handle, which replaces the failed one, so the
    /// client can resend the same chunk.
    pub async fn append(&mut self, data: &[u8]) -> AppResult<()> {
        let received = self.received;
        let path = self.temp_path.display().to_string();
        let file = self.file.as_mut().ok_or_else(|| {
            AppError::write_failure(
                format!("Temp file '{path}' is not open"),
                std::io::Error::new(std::io::ErrorKind::NotFound, "file handle closed"),
            )
        })?;

        let written = async {
            file.set_len(received).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            self.roll_back().await;
            return Err(AppError::write_failure(
                format!("Failed to append chunk to '{path}'"),
                e,
            ));
        }

        Ok(())
    }

    /// Truncate the temp file to `received` and reopen it. Best effort.
    async fn roll_back(&mut self) {
        let reopened = async {
            let file = self.open_for_append().await?;
            file.set_len(self.received)
                .await
                .map_err(|e| AppError::write_failure("Failed to truncate temp file", e))?;
            Ok::<_, AppError>(file)
        }
        .await;

        match reopened {
            Ok(file) => self.file = Some(file),
            Err(e) => tracing::warn!(
                session_id = %self.id,
                error = %e,
                "Failed to roll back partial chunk write"
            ),
        }
    }

    /// Discard everything written so far (replayed first chunk).
    pub async fn reset(&mut self) -> AppResult<()> {
        let path = self.temp_path.display().to_string();
        let file = self.file.as_mut().ok_or_else(|| {
            AppError::write_failure(
                format!("Temp file '{path}' is not open"),
                std::io::Error::new(std::io::ErrorKind::NotFound, "file handle closed"),
            )
        })?;
        file.set_len(0)
            .await
            .map_err(|e| AppError::write_failure(format!("Failed to truncate '{path}'"), e))?;

        self.received = 0;
        self.transferred = 0;
        Ok(())
    }

    /// Record an accepted chunk of `len` bytes ending at declared offset `to`.
    pub fn record_chunk(&mut self, to: u64, len: u64) {
        self.status = UploadStatus::Uploading;
        self.received += len;
        self.transferred = self.transferred.max(to.min(self.total_size));
        self.last_activity = Instant::now();
    }

    /// Whether a chunk ending at `to` finishes the file. Either the declared
    /// end reaches the total or every declared byte is on disk.
    pub fn is_complete(&self, to: u64) -> bool {
        to >= self.total_size || self.received >= self.total_size
    }

    /// Close the file handle. Further appends fail.
    pub fn close(&mut self) {
        self.file.take();
    }

    /// Time since the last accepted chunk (or creation).
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}
