//! Chunked upload storage configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where in-progress and completed uploads live, and how long an idle
/// session is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory holding one temporary file per in-progress session.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,
    /// Directory receiving completed files.
    #[serde(default = "default_destination_root")]
    pub destination_root: String,
    /// Largest accepted chunk body in bytes (default 64 MB).
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size_bytes: u64,
    /// Idle time after which a session is expired. `0` disables expiry.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
    /// Interval between expiry sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl UploadConfig {
    /// Temporary-storage root as a path.
    pub fn temp_root_path(&self) -> PathBuf {
        PathBuf::from(&self.temp_root)
    }

    /// Destination root as a path.
    pub fn destination_root_path(&self) -> PathBuf {
        PathBuf::from(&self.destination_root)
    }

    /// Session idle timeout, or `None` when expiry is disabled.
    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_seconds > 0).then(|| Duration::from_secs(self.session_ttl_seconds))
    }

    /// Interval between expiry sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
            destination_root: default_destination_root(),
            max_chunk_size_bytes: default_max_chunk_size(),
            session_ttl_seconds: default_session_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_temp_root() -> String {
    ".tmp".to_string()
}

fn default_destination_root() -> String {
    "./files".to_string()
}

fn default_max_chunk_size() -> u64 {
    67_108_864 // 64 MB
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}
