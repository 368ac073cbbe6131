//! Publishes a completed temporary file to its destination.

use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use tracing::info;

use resumable_core::error::AppError;
use resumable_core::result::AppResult;

/// Moves completed uploads into the destination root.
#[derive(Debug, Clone)]
pub struct Finalizer {
    /// Directory receiving completed files.
    destination_root: PathBuf,
}

impl Finalizer {
    /// Create a finalizer publishing into `destination_root`.
    pub fn new(destination_root: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
        }
    }

    /// The destination root.
    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    /// Compute where `file_name` should land.
    ///
    /// `<root>/<file_name>` when free, otherwise `<root>/<timestamp>-<file_name>`
    /// with an RFC 3339 local timestamp. Two finalizations of the same name
    /// within the same second are not told apart.
    pub async fn resolve_target(&self, file_name: &str) -> AppResult<PathBuf> {
        let target = self.destination_root.join(file_name);
        if !path_exists(&target).await? {
            return Ok(target);
        }

        let stamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(self.destination_root.join(format!("{stamp}-{file_name}")))
    }

    /// Rename `temp_path` to its destination and return the final path.
    ///
    /// The move is a rename, never a copy. On failure the temporary file is
    /// left where it is.
    pub async fn finalize(&self, temp_path: &Path, file_name: &str) -> AppResult<PathBuf> {
        tokio::fs::create_dir_all(&self.destination_root)
            .await
            .map_err(|e| {
                AppError::finalization_failure(
                    format!(
                        "Failed to create destination root '{}'",
                        self.destination_root.display()
                    ),
                    e,
                )
            })?;

        let target = self.resolve_target(file_name).await?;

        tokio::fs::rename(temp_path, &target).await.map_err(|e| {
            AppError::finalization_failure(
                format!(
                    "Failed to move '{}' to '{}'",
                    temp_path.display(),
                    target.display()
                ),
                e,
            )
        })?;

        info!(
            temp_path = %temp_path.display(),
            target = %target.display(),
            "Upload finalized"
        );

        Ok(target)
    }
}

async fn path_exists(path: &Path) -> AppResult<bool> {
    tokio::fs::try_exists(path).await.map_err(|e| {
        AppError::finalization_failure(format!("Failed to inspect '{}'", path.display()), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use resumable_core::error::ErrorKind;

    #[tokio::test]
    async fn test_finalize_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("abc");
        tokio::fs::write(&temp, b"payload").await.unwrap();

        let finalizer = Finalizer::new(dir.path().join("files"));
        let target = finalizer.finalize(&temp, "report.pdf").await.unwrap();

        assert_eq!(target, dir.path().join("files").join("report.pdf"));
        assert!(!temp.exists());
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_collision_gets_timestamp_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let files = dir.path().join("files");
        tokio::fs::create_dir_all(&files).await.unwrap();
        tokio::fs::write(files.join("report.pdf"), b"original")
            .await
            .unwrap();

        let temp = dir.path().join("abc");
        tokio::fs::write(&temp, b"second").await.unwrap();

        let target = Finalizer::new(&files)
            .finalize(&temp, "report.pdf")
            .await
            .unwrap();

        assert_ne!(target, files.join("report.pdf"));
        let name = target.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("-report.pdf"));
        assert!(name.len() > "-report.pdf".len());
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"second");
        assert_eq!(
            tokio::fs::read(files.join("report.pdf")).await.unwrap(),
            b"original"
        );
    }

    #[tokio::test]
    async fn test_missing_temp_file_is_finalization_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = Finalizer::new(dir.path().join("files"))
            .finalize(&dir.path().join("missing"), "x.bin")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FinalizationFailure);
    }
}
