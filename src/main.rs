//! Resumable upload server.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use resumable_api::{AppState, build_app};
use resumable_core::config::AppConfig;
use resumable_core::error::AppError;
use resumable_storage::{SessionStore, SessionSweeper};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment.
///
/// `RESUMABLE_CONFIG` names an explicit file; otherwise `config/default`
/// and `config/$RESUMABLE_ENV` are layered.
fn load_configuration() -> Result<AppConfig, AppError> {
    match std::env::var("RESUMABLE_CONFIG") {
        Ok(path) => AppConfig::load_file(&path),
        Err(_) => {
            let env = std::env::var("RESUMABLE_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting resumable upload server v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Create upload directories ────────────────────────
    create_upload_directories(&config).await?;

    // ── Step 2: Session store and sweeper ────────────────────────
    let sessions = Arc::new(SessionStore::new());
    let sweeper = SessionSweeper::new(Arc::clone(&sessions), &config.upload);

    // Temp files left by an earlier process belong to no session.
    match sweeper.sweep().await {
        Ok(report) if report.orphans > 0 => {
            tracing::info!(orphans = report.orphans, "Purged stale temp files");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Initial sweep failed: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(shutdown_rx).await;
    });

    // ── Step 3: Build and start HTTP server ──────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let upload_path = config.server.upload_path.clone();
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);

    let app = build_app(AppState::new(config, Arc::clone(&sessions)));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Listening on {} (uploads at {})", addr, upload_path);

    // ── Step 4: Graceful shutdown ────────────────────────────────
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    // ── Step 5: Wait for background tasks ────────────────────────
    if tokio::time::timeout(grace, sweeper_handle).await.is_err() {
        tracing::warn!("Session sweeper did not stop within {:?}", grace);
    }

    if !sessions.is_empty() {
        tracing::warn!(
            active_sessions = sessions.len(),
            "Shutting down with uploads in progress; their temp files are kept"
        );
    }

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Create the temporary and destination roots
async fn create_upload_directories(config: &AppConfig) -> Result<(), AppError> {
    let dirs = [
        config.upload.temp_root_path(),
        config.upload.destination_root_path(),
    ];

    for dir in &dirs {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AppError::internal(format!("Failed to create dir '{}': {}", dir.display(), e))
        })?;
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
