//! Atomic output file with automatic cleanup on failure.
//!
//! Writes to a temporary file in the same directory as the destination,
//! then atomically replaces the destination on `finish()`. If dropped
//! before finishing, the temporary file is automatically cleaned up, so a
//! failed export never leaves a truncated file that looks complete.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::AppError;

/// Buffer size for the output writer (64 KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// An output file that only appears at its final path once complete.
pub struct AtomicOutput {
    writer: BufWriter<NamedTempFile>,
    final_path: PathBuf,
}

impl AtomicOutput {
    /// Creates a new atomic writer targeting the specified path.
    ///
    /// The temporary file is created in the same directory as `final_path`
    /// so the final rename stays on one filesystem. A missing parent
    /// directory is created.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Artifact` if the parent directory cannot be
    /// determined or the temporary file cannot be created.
    pub fn new(final_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let final_path = final_path.as_ref().to_path_buf();

        let parent_dir = match final_path.parent() {
            Some(p) if p.as_os_str().is_empty() => Path::new("."),
            Some(p) => p,
            None => {
                return Err(AppError::Artifact(format!(
                    "Cannot determine parent directory for: {}",
                    final_path.display()
                )))
            }
        };

        std::fs::create_dir_all(parent_dir).map_err(|e| {
            AppError::Artifact(format!(
                "Failed to create output directory {}: {}",
                parent_dir.display(),
                e
            ))
        })?;

        let temp_file = tempfile::Builder::new()
            .prefix(".hive-extract-")
            .suffix(".part")
            .tempfile_in(parent_dir)
            .map_err(|e| AppError::Artifact(format!("Failed to create temporary file: {}", e)))?;

        Ok(Self {
            writer: BufWriter::with_capacity(BUFFER_SIZE, temp_file),
            final_path,
        })
    }

    /// Flushes all buffers and atomically persists the file to the final path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Artifact` if flushing or persisting fails.
    /// On error, the temporary file is cleaned up automatically.
    pub fn finish(self) -> Result<PathBuf, AppError> {
        let named_temp = self.writer.into_inner().map_err(|e| {
            AppError::Artifact(format!("Failed to flush buffer: {}", e.error()))
        })?;

        named_temp.persist(&self.final_path).map_err(|e| {
            AppError::Artifact(format!(
                "Failed to persist file to {}: {}",
                self.final_path.display(),
                e.error
            ))
        })?;

        Ok(self.final_path)
    }
}

impl Write for AtomicOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
