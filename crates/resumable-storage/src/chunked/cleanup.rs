//! Idle session expiry and orphan temp-file cleanup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use resumable_core::config::UploadConfig;
use resumable_core::error::{AppError, ErrorKind};
use resumable_core::result::AppResult;

use super::store::SessionStore;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions expired for inactivity.
    pub expired: usize,
    /// Temporary files removed that belonged to no session.
    pub orphans: usize,
}

/// Periodically retires abandoned upload sessions.
#[derive(Debug, Clone)]
pub struct SessionSweeper {
    /// Active sessions.
    store: Arc<SessionStore>,
    /// Directory holding the per-session temporary files.
    temp_root: PathBuf,
    /// Idle timeout; `None` disables expiry.
    ttl: Option<Duration>,
    /// Time between sweeps.
    interval: Duration,
}

impl SessionSweeper {
    /// Create a sweeper over `store` using the upload settings.
    pub fn new(store: Arc<SessionStore>, config: &UploadConfig) -> Self {
        Self {
            store,
            temp_root: config.temp_root_path(),
            ttl: config.session_ttl(),
            interval: config.sweep_interval(),
        }
    }

    /// Run one sweep with the configured timeout.
    pub async fn sweep(&self) -> AppResult<SweepReport> {
        let Some(ttl) = self.ttl else {
            return Ok(SweepReport::default());
        };
        Ok(SweepReport {
            expired: self.expire_idle(ttl).await,
            orphans: self.purge_orphans(ttl).await?,
        })
    }

    /// Expire every session idle for at least `ttl`.
    ///
    /// Sessions locked by an in-flight request are skipped. An expired
    /// session leaves the store, its handle is closed and its temporary
    /// file deleted. Returns the number of sessions expired.
    pub async fn expire_idle(&self, ttl: Duration) -> usize {
        let mut expired = 0;

        for (id, handle) in self.store.entries() {
            let Ok(mut session) = Arc::clone(&handle).try_lock_owned() else {
                continue;
            };
            if session.idle_for() < ttl {
                continue;
            }
            if !self.store.delete_if_current(&id, &handle) {
                continue;
            }

            session.close();
            remove_temp_file(&session.temp_path).await;
            tracing::info!(
                session_id = %id,
                file_name = %session.file_name,
                transferred = session.transferred,
                total_size = session.total_size,
                "Expired idle upload session"
            );
            expired += 1;
        }

        expired
    }

    /// Delete files in the temporary root that belong to no session and were
    /// last modified at least `ttl` ago. Such files are left behind by a
    /// failed finalization or by an earlier process.
    pub async fn purge_orphans(&self, ttl: Duration) -> AppResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.temp_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Internal,
                    format!("Failed to list temp root '{}'", self.temp_root.display()),
                    e,
                ));
            }
        };

        let mut purged = 0;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if self.store.contains(&name) {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .unwrap_or_default();
            if age < ttl {
                continue;
            }

            // A session may have claimed the name meanwhile.
            if self.store.contains(&name) {
                continue;
            }
            remove_temp_file(&entry.path()).await;
            tracing::debug!(file = %name, age_seconds = age.as_secs(), "Purged orphan temp file");
            purged += 1;
        }

        Ok(purged)
    }

    /// Sweep on every interval tick until `cancel` turns `true`.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        if self.ttl.is_none() {
            tracing::info!("Session expiry disabled");
            return;
        }

        tracing::info!(
            interval_seconds = self.interval.as_secs(),
            "Session sweeper started"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!("Session sweeper shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if report != SweepReport::default() => {
                            tracing::info!(
                                expired = report.expired,
                                orphans = report.orphans,
                                "Session sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
                    }
                }
            }
        }
    }
}

async fn remove_temp_file(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove temp file"
        ),
    }
}
