//! CLI command definitions and dispatch.

pub mod config;
pub mod upload;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use resumable_core::config::AppConfig;
use resumable_core::error::AppError;

/// Resumable: chunked file upload client
#[derive(Debug, Parser)]
#[command(name = "resumable", version, about, long_about = None)]
pub struct Cli {
    /// Path to a configuration file (defaults to config/default + config/$RESUMABLE_ENV)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload a file in chunks
    Upload(upload::UploadArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Upload(args) => upload::execute(args, self.format).await,
            Commands::Config(args) => {
                config::execute(args, self.config.as_deref(), self.format).await
            }
        }
    }
}

/// Helper: load configuration from an explicit file or the environment layers
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, AppError> {
    match config_path {
        Some(path) => AppConfig::load_file(path),
        None => {
            let env = std::env::var("RESUMABLE_ENV").unwrap_or_else(|_| "development".into());
            AppConfig::load(&env)
        }
    }
}
