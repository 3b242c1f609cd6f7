//! Partitioned execution of one logical query.
//!
//! The row count is taken first, then the query is re-issued once per row-id
//! range from the [`planner`](super::planner) and the partition results are
//! concatenated in partition order. Each statement runs on its own session.
//! Partitions are independent and read-only, so up to
//! `max_concurrent_partitions` may be in flight; results are still assembled
//! strictly by partition index. After a failure no further partition is
//! started, and those already running finish and close their sessions before
//! the error is returned.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::info;

use crate::config::ExportConfig;
use crate::connector::{close_quietly, Connector, Credentials};
use crate::error::AppError;
use crate::partition::planner::{self, PartitionBoundary};
use crate::sql::{log_statement, make_count_sql, parse_row_count, with_rowid_range};
use crate::streaming::atomic_writer::AtomicOutput;
use crate::table::{Row, TabularResult};

/// Result of writing a partitioned query to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionedExport {
    pub output_path: PathBuf,
    pub partitions: usize,
    pub rows: usize,
}

/// Runs a query as a sequence of row-id bounded partitions.
pub struct PartitionedQueryExecutor {
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    config: ExportConfig,
}

impl PartitionedQueryExecutor {
    pub fn new(connector: Arc<dyn Connector>, credentials: Credentials, config: ExportConfig) -> Self {
        Self {
            connector,
            credentials,
            config,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Executes `base_sql` in `partitions` partitions, deriving the counting
    /// query from `base_sql` itself.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidArgument` - bad partition count, negative row
    ///   count, or a query shape whose count cannot be derived
    /// - `AppError::ConnectionFailed` / `AppError::QueryFailed` - counting query failed
    /// - `AppError::Partition` - partition `index` failed
    /// - `AppError::SchemaMismatch` - partitions returned different columns
    pub async fn execute(&self, base_sql: &str, partitions: i64) -> Result<TabularResult, AppError> {
        let count_sql = make_count_sql(base_sql)?.ok_or_else(|| {
            AppError::InvalidArgument(
                "Cannot derive a counting query for this query shape; supply one explicitly"
                    .into(),
            )
        })?;
        self.execute_with_count(&count_sql, base_sql, partitions).await
    }

    /// Executes `base_sql` in `partitions` partitions, using `count_sql`
    /// (a query returning one cell) for the row count.
    pub async fn execute_with_count(
        &self,
        count_sql: &str,
        base_sql: &str,
        partitions: i64,
    ) -> Result<TabularResult, AppError> {
        if partitions <= 0 {
            return Err(AppError::InvalidArgument(format!(
                "Partition count must be at least 1, got {}",
                partitions
            )));
        }

        let row_count = self.count_rows(count_sql).await?;
        let plan = planner::plan(row_count, partitions)?;

        info!("[PARTITION] Number of partitions: {}", plan.len());
        info!("[PARTITION] Number of rows per partition: {}", plan.factor());

        let concurrency = self.config.max_concurrent_partitions.max(1);
        let failed = AtomicBool::new(false);
        let failed = &failed;
        let mut results = stream::iter(plan.boundaries().iter().copied().enumerate())
            .map(move |(index, boundary)| async move {
                if failed.load(Ordering::SeqCst) {
                    return None;
                }
                Some(self.run_partition(index, boundary, base_sql).await)
            })
            .buffered(concurrency);

        let mut columns: Option<Vec<String>> = None;
        let mut rows: Vec<Row> = Vec::new();
        let mut first_error: Option<AppError> = None;
        let mut index = 0;

        // Drained to the end so in-flight partitions release their sessions.
        while let Some(result) = results.next().await {
            let outcome = match result {
                Some(outcome) if first_error.is_none() => outcome,
                _ => continue,
            };
            match self.accept_partition(index, outcome, &mut columns, &mut rows) {
                Ok(()) => index += 1,
                Err(e) => {
                    failed.store(true, Ordering::SeqCst);
                    first_error = Some(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        TabularResult::new(columns.unwrap_or_default(), rows)
    }

    /// Appends one partition's rows after checking its columns against the
    /// partitions before it.
    fn accept_partition(
        &self,
        index: usize,
        outcome: Result<TabularResult, AppError>,
        columns: &mut Option<Vec<String>>,
        rows: &mut Vec<Row>,
    ) -> Result<(), AppError> {
        let result = outcome?;

        if let Some(expected) = columns.as_ref() {
            if expected.as_slice() != result.columns() {
                return Err(AppError::SchemaMismatch {
                    location: format!("partition {}", index),
                    expected: expected.join(","),
                    found: result.columns().join(","),
                });
            }
        }
        *columns = Some(result.columns().to_vec());

        let skip = usize::from(self.config.legacy_skip_first_row);
        rows.extend(result.into_rows().into_iter().skip(skip));
        Ok(())
    }

    /// Executes the partitioned query and writes it to `output_path` as CSV.
    /// The file only appears once fully written.
    pub async fn export_to_csv(
        &self,
        base_sql: &str,
        partitions: i64,
        output_path: impl AsRef<Path>,
    ) -> Result<PartitionedExport, AppError> {
        let table = self.execute(base_sql, partitions).await?;
        let output_path = output_path.as_ref().to_owned();
        let rows = table.len();

        let output_path = tokio::task::spawn_blocking(move || {
            let mut out = AtomicOutput::new(&output_path)?;
            table.write_csv(&mut out)?;
            out.finish()
        })
        .await
        .map_err(|e| AppError::Internal(format!("CSV write task panicked: {}", e)))??;

        info!(
            "[PARTITION] Wrote {} rows to {}",
            rows,
            output_path.display()
        );

        Ok(PartitionedExport {
            output_path,
            partitions: partitions as usize,
            rows,
        })
    }

    /// Runs the counting query on its own session.
    async fn count_rows(&self, count_sql: &str) -> Result<i64, AppError> {
        log_statement(self.config.log_sql, "count", count_sql);
        let result = self.run_statement(count_sql).await?;
        parse_row_count(count_sql, &result)
    }

    async fn run_partition(
        &self,
        index: usize,
        boundary: PartitionBoundary,
        base_sql: &str,
    ) -> Result<TabularResult, AppError> {
        let wrap = |e: AppError| AppError::Partition {
            index,
            low: boundary.low,
            high: boundary.high,
            source: Box::new(e),
        };

        info!(
            "[PARTITION] Execute partition #{} - from {} to {}",
            index + 1,
            boundary.low,
            boundary.high
        );

        let sql = with_rowid_range(base_sql, &self.config.rowid_column, boundary.low, boundary.high)
            .map_err(wrap)?;
        log_statement(self.config.log_sql, "partition", &sql);

        self.run_statement(&sql).await.map_err(wrap)
    }

    /// Opens a session, executes one statement, closes the session.
    async fn run_statement(&self, sql: &str) -> Result<TabularResult, AppError> {
        let mut session = self.connector.open(&self.credentials).await?;
        let result = session.execute(sql).await;
        close_quietly(session).await;
        result
    }
}
