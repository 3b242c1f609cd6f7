//! Temporary chunk artifacts and their cleanup.
//!
//! [`TempArtifactStore`] hands out uniquely-named files in a temp directory.
//! [`TempArtifactRegistry`] records them in fetch order, which is the order
//! they are merged in, and deletes them all in [`TempArtifactRegistry::release_all`].
//! The registry is created empty before any fallible step and releases on
//! drop as well, so cleanup always has a well-defined set of files to remove.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::AppError;

/// Filename prefix for chunk artifacts.
const ARTIFACT_PREFIX: &str = "hive-chunk-";

/// One temp file holding a serialized chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Allocates temp artifacts in one directory.
#[derive(Debug, Clone)]
pub struct TempArtifactStore {
    dir: PathBuf,
}

impl TempArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates a new, empty, uniquely-named `.csv` file.
    ///
    /// The file is created on disk so the name cannot be handed out twice.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Artifact` if the directory or file cannot be created.
    pub fn allocate(&self) -> Result<TempArtifact, AppError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::Artifact(format!(
                "Failed to create temp directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let temp = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .suffix(".csv")
            .tempfile_in(&self.dir)
            .map_err(|e| AppError::Artifact(format!("Failed to create temp artifact: {}", e)))?;

        let path = temp
            .into_temp_path()
            .keep()
            .map_err(|e| AppError::Artifact(format!("Failed to keep temp artifact: {}", e)))?;

        Ok(TempArtifact { path })
    }
}

/// Outcome of a cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Artifacts deleted.
    pub removed: usize,
    /// Per-file failures; logged, never raised.
    pub failures: Vec<AppError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Temp artifacts in fetch order.
#[derive(Debug, Default)]
pub struct TempArtifactRegistry {
    artifacts: Vec<TempArtifact>,
    released: bool,
}

impl TempArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, artifact: TempArtifact) {
        self.artifacts.push(artifact);
    }

    pub fn artifacts(&self) -> &[TempArtifact] {
        &self.artifacts
    }

    /// Artifact paths in registration order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Deletes every registered artifact.
    ///
    /// A file that cannot be removed is logged and recorded in the report;
    /// the remaining files are still attempted. An already-missing file
    /// counts as removed. Only the first call does any work.
    pub fn release_all(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        for artifact in self.artifacts.drain(..) {
            match std::fs::remove_file(&artifact.path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.removed += 1,
                Err(e) => {
                    warn!(
                        "[CLEANUP] Failed to delete temporary file {}: {}",
                        artifact.path.display(),
                        e
                    );
                    report.failures.push(AppError::Cleanup {
                        path: artifact.path,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            "[CLEANUP] Removed {} temporary file(s), {} failure(s)",
            report.removed,
            report.failures.len()
        );
        report
    }
}

impl Drop for TempArtifactRegistry {
    fn drop(&mut self) {
        if !self.released {
            self.release_all();
        }
    }
}
