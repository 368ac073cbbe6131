//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files and
//! environment variables via the `config` crate. Each sub-module represents
//! a logical configuration section, and every field carries a default so
//! an empty configuration is valid.

pub mod app;
pub mod logging;
pub mod upload;

use serde::{Deserialize, Serialize};

pub use self::app::{CorsConfig, ServerConfig};
pub use self::logging::LoggingConfig;
pub use self::upload::UploadConfig;

use crate::error::AppError;

/// Prefix for environment variable overrides, e.g. `RESUMABLE_SERVER__PORT`.
pub const ENV_PREFIX: &str = "RESUMABLE";

/// Root application configuration.
///
/// Top-level deserialization target for the merged configuration
/// (default.toml + environment overlay + environment variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Chunked upload storage settings.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration for the given environment name.
    ///
    /// Merges `config/default`, the environment-specific overlay
    /// `config/{env}` and environment variables prefixed with `RESUMABLE_`.
    /// Missing files are skipped.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false));

        Self::finish(builder)
    }

    /// Load configuration from an explicit file, still honoring environment
    /// variable overrides.
    pub fn load_file(path: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(true));

        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.upload.temp_root.trim().is_empty() {
            return Err(AppError::configuration("upload.temp_root must not be empty"));
        }
        if self.upload.destination_root.trim().is_empty() {
            return Err(AppError::configuration(
                "upload.destination_root must not be empty",
            ));
        }
        if self.upload.max_chunk_size_bytes == 0 {
            return Err(AppError::configuration(
                "upload.max_chunk_size_bytes must be greater than zero",
            ));
        }
        if self.upload.session_ttl_seconds > 0 && self.upload.sweep_interval_seconds == 0 {
            return Err(AppError::configuration(
                "upload.sweep_interval_seconds must be greater than zero when expiry is enabled",
            ));
        }
        if !self.server.upload_path.starts_with('/') {
            return Err(AppError::configuration(
                "server.upload_path must start with '/'",
            ));
        }
        if self.server.upload_path == "/health" {
            return Err(AppError::configuration(
                "server.upload_path must not shadow the health endpoint",
            ));
        }
        Ok(())
    }
}
