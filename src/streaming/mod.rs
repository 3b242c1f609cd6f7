//! Chunked streaming export.
//!
//! This module provides the temp artifact lifecycle (allocation, ordered
//! registration, guaranteed cleanup), the header-deduplicating merge of chunk
//! artifacts into one CSV file, and atomic output writing so a failed export
//! never leaves a complete-looking file behind.

pub mod atomic_writer;
pub mod exporter;
pub mod result_merger;
pub mod temp_store;

pub use atomic_writer::AtomicOutput;
pub use exporter::{ChunkedStreamExporter, ExportSummary};
pub use result_merger::{merge, merge_artifacts, MergeStats};
pub use temp_store::{CleanupReport, TempArtifact, TempArtifactRegistry, TempArtifactStore};
