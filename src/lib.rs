//! Extraction of large SQL result sets into a single CSV file.
//!
//! Two independent strategies are provided:
//!
//! - [`PartitionedQueryExecutor`] counts the rows of a query, splits the
//!   row-id space into contiguous ranges and runs the query once per range,
//!   concatenating the results in range order.
//! - [`ChunkedStreamExporter`] streams one query in fixed-size chunks to
//!   temporary files, merges them into one output with a single header line,
//!   and always removes the temporary files.
//!
//! The engine itself is reached through the [`Connector`] trait; this crate
//! ships no driver.

pub mod config;
pub mod connector;
pub mod error;
pub mod partition;
pub mod sql;
pub mod streaming;
pub mod table;

pub use config::ExportConfig;
pub use connector::{AuthMechanism, ChunkStream, Connector, Credentials, Session};
pub use error::AppError;
pub use partition::{PartitionedQueryExecutor, PartitionBoundary, PartitionPlan};
pub use streaming::{ChunkedStreamExporter, ExportSummary};
pub use table::{Row, TabularResult};
