use std::path::PathBuf;

use thiserror::Error;

/// Patterns (lowercase) that indicate a driver message may carry credentials.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &["password=", "passwd=", "pwd=", "authorization:"];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a driver message before it is stored in an error.
/// If sensitive content is detected, returns the fallback instead.
pub(crate) fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Caller input ──────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // ── Remote engine ─────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {message}")]
    QueryFailed { sql: String, message: String },

    #[error("Partition {index} [{low}, {high}) failed: {source}")]
    Partition {
        index: usize,
        low: u64,
        high: u64,
        #[source]
        source: Box<AppError>,
    },

    #[error("Chunk {index} failed: {source}")]
    Chunk {
        index: usize,
        #[source]
        source: Box<AppError>,
    },

    // ── Artifacts ─────────────────────────────────────────────────────────────
    #[error("Schema mismatch in {location}: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        location: String,
        expected: String,
        found: String,
    },

    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Best-effort cleanup failure. Reported, never returned as `Err`.
    #[error("Failed to remove {}: {message}", .path.display())]
    Cleanup { path: PathBuf, message: String },

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds a `QueryFailed` from a driver message, keeping the statement.
    pub fn query_failed(sql: &str, message: impl AsRef<str>) -> Self {
        AppError::QueryFailed {
            sql: sql.to_string(),
            message: sanitize_message(message.as_ref(), "The engine rejected the statement."),
        }
    }

    /// Builds a `ConnectionFailed` from a driver message.
    pub fn connection_failed(message: impl AsRef<str>) -> Self {
        AppError::ConnectionFailed(sanitize_message(
            message.as_ref(),
            "Could not open a session to the engine.",
        ))
    }

    /// Returns the SQL statement attached to this error, looking through
    /// partition and chunk wrappers.
    pub fn failing_sql(&self) -> Option<&str> {
        match self {
            AppError::QueryFailed { sql, .. } => Some(sql),
            AppError::Partition { source, .. } | AppError::Chunk { source, .. } => {
                source.failing_sql()
            }
            _ => None,
        }
    }

    /// True for failures raised by the remote engine rather than local I/O.
    pub fn is_remote(&self) -> bool {
        match self {
            AppError::ConnectionFailed(_) | AppError::QueryFailed { .. } => true,
            AppError::Partition { source, .. } | AppError::Chunk { source, .. } => {
                source.is_remote()
            }
            _ => false,
        }
    }
}
