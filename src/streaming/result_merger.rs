//! Merging of chunk artifacts into one CSV file.
//!
//! Each chunk artifact carries its own header line. The merge copies the
//! first artifact verbatim and every later artifact without its first line,
//! so the output has exactly one header followed by all data rows in
//! artifact order.
//!
//! Key features:
//! - Streaming merge (never loads full files into memory)
//! - Header comparison with BOM/CRLF normalization; mismatch fails fast
//! - Newline boundary handling to prevent row gluing
//! - Atomic output: the destination only appears once the merge succeeds

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::AppError;
use crate::streaming::atomic_writer::AtomicOutput;
use crate::streaming::temp_store::TempArtifact;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// UTF-8 BOM bytes.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Buffer size for reading (64 KB).
const BUFFER_SIZE: usize = 64 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// What a merge wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStats {
    /// The merged file.
    pub output_path: PathBuf,
    /// Artifacts that contributed at least a header.
    pub artifacts_merged: usize,
    /// Total bytes written to the output.
    pub bytes_written: u64,
}

/// Merges `artifacts`, in order, into `output_path`.
///
/// Runs the file work on the blocking pool.
///
/// # Errors
///
/// - `AppError::SchemaMismatch` - an artifact's header differs from the first one
/// - `AppError::Artifact` - an artifact cannot be read or the output cannot be written
pub async fn merge(artifacts: &[TempArtifact], output_path: &Path) -> Result<MergeStats, AppError> {
    let paths: Vec<PathBuf> = artifacts.iter().map(|a| a.path().to_path_buf()).collect();
    let output_path = output_path.to_owned();

    tokio::task::spawn_blocking(move || merge_artifacts(&paths, &output_path))
        .await
        .map_err(|e| AppError::Internal(format!("Merge task panicked: {}", e)))?
}

/// Blocking merge of `paths` into `output_path`.
///
/// Empty artifacts are skipped. With no non-empty artifact the output is an
/// empty file.
pub fn merge_artifacts(paths: &[PathBuf], output_path: &Path) -> Result<MergeStats, AppError> {
    let mut out = AtomicOutput::new(output_path)?;
    let mut written: u64 = 0;

    let mut canonical_header: Option<Vec<u8>> = None;
    let mut last_ended_with_newline = true;
    let mut artifacts_merged = 0;

    for path in paths {
        let file = File::open(path).map_err(|e| {
            AppError::Artifact(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);

        let mut header_buf: Vec<u8> = Vec::new();
        let header_bytes = reader.read_until(b'\n', &mut header_buf).map_err(|e| {
            AppError::Artifact(format!("Failed to read header of {}: {}", path.display(), e))
        })?;

        if header_bytes == 0 {
            continue;
        }

        let normalized = normalize_header(&header_buf);

        match &canonical_header {
            None => {
                // First header is copied verbatim.
                write_bytes(&mut out, &header_buf, &mut written)?;
                last_ended_with_newline = header_buf.ends_with(b"\n");
                canonical_header = Some(normalized);
            }
            Some(canonical) => {
                if &normalized != canonical {
                    return Err(AppError::SchemaMismatch {
                        location: path.display().to_string(),
                        expected: String::from_utf8_lossy(canonical).into_owned(),
                        found: String::from_utf8_lossy(&normalized).into_owned(),
                    });
                }
            }
        }
        artifacts_merged += 1;

        let has_rows = !reader
            .fill_buf()
            .map_err(|e| AppError::Artifact(format!("Failed to read: {}", e)))?
            .is_empty();

        if has_rows {
            // Ensure newline boundary before appending rows
            if !last_ended_with_newline {
                write_bytes(&mut out, b"\n", &mut written)?;
            }
            copy_remaining(&mut reader, &mut out, &mut written, &mut last_ended_with_newline)?;
        }
    }

    let output_path = out.finish()?;

    info!(
        "[MERGE] Merged {} artifact(s) into {} ({} bytes)",
        artifacts_merged,
        output_path.display(),
        written
    );

    Ok(MergeStats {
        output_path,
        artifacts_merged,
        bytes_written: written,
    })
}

/// Normalizes a header line for comparison.
///
/// - Strips a leading UTF-8 BOM
/// - Removes trailing newline characters (\n and \r)
fn normalize_header(header: &[u8]) -> Vec<u8> {
    let mut data = header;

    if data.starts_with(UTF8_BOM) {
        data = &data[UTF8_BOM.len()..];
    }
    if data.ends_with(b"\n") {
        data = &data[..data.len() - 1];
    }
    if data.ends_with(b"\r") {
        data = &data[..data.len() - 1];
    }

    data.to_vec()
}

fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8], written: &mut u64) -> Result<(), AppError> {
    writer
        .write_all(bytes)
        .map_err(|e| AppError::Artifact(format!("Failed to write output: {}", e)))?;
    *written += bytes.len() as u64;
    Ok(())
}

/// Copies remaining content from reader to writer, tracking newline state.
fn copy_remaining<R: Read, W: Write>(
    reader: &mut BufReader<R>,
    writer: &mut W,
    written: &mut u64,
    last_ended_with_newline: &mut bool,
) -> Result<(), AppError> {
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut last_byte: Option<u8> = None;

    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| AppError::Artifact(format!("Failed to read: {}", e)))?;

        if n == 0 {
            break;
        }

        write_bytes(writer, &buf[..n], written)?;
        last_byte = Some(buf[n - 1]);
    }

    if let Some(b) = last_byte {
        *last_ended_with_newline = b == b'\n';
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
