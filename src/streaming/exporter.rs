//! Chunked export of one large query to a single CSV file.
//!
//! The query is streamed from one session in chunks of `chunk_size` rows.
//! Each chunk is written, header included, to its own temp artifact; once
//! the stream is drained and the session closed, the artifacts are merged in
//! fetch order into the output file and then deleted. Peak memory is about
//! one chunk regardless of the total result size.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::info;

use crate::config::ExportConfig;
use crate::connector::{close_quietly, Connector, Credentials, Session};
use crate::error::AppError;
use crate::sql::log_statement;
use crate::streaming::result_merger::{self, MergeStats};
use crate::streaming::temp_store::{CleanupReport, TempArtifactRegistry, TempArtifactStore};
use crate::table::TabularResult;

/// Result of a successful chunked export.
#[derive(Debug)]
pub struct ExportSummary {
    /// The merged output file.
    pub output_path: PathBuf,
    /// Chunks fetched, which is also the number of temp artifacts created.
    pub chunk_count: usize,
    /// Data rows across all chunks.
    pub total_rows: u64,
    /// Bytes in the output file.
    pub bytes_written: u64,
    /// Temp artifact cleanup outcome.
    pub cleanup: CleanupReport,
}

/// Streams a query to temp artifacts and merges them into one file.
pub struct ChunkedStreamExporter {
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    config: ExportConfig,
    store: TempArtifactStore,
}

impl ChunkedStreamExporter {
    pub fn new(connector: Arc<dyn Connector>, credentials: Credentials, config: ExportConfig) -> Self {
        let store = TempArtifactStore::new(config.temp_dir());
        Self {
            connector,
            credentials,
            config,
            store,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Exports the full result of `sql` to `output_path`.
    ///
    /// Temp artifacts are deleted exactly once whether the export succeeds
    /// or fails; cleanup problems are reported in the summary and logged,
    /// never returned. On failure the output path is not written.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidArgument` - `chunk_size` is zero
    /// - `AppError::ConnectionFailed` - the session cannot be opened
    /// - `AppError::Chunk` - fetching or writing chunk `index` failed
    /// - `AppError::SchemaMismatch` - chunks disagree on columns
    /// - `AppError::Artifact` - the output file cannot be written
    pub async fn export_large(
        &self,
        sql: &str,
        output_path: impl AsRef<Path>,
    ) -> Result<ExportSummary, AppError> {
        if self.config.chunk_size == 0 {
            return Err(AppError::InvalidArgument(
                "Chunk size must be at least 1".into(),
            ));
        }
        let output_path = output_path.as_ref();

        // Registry exists before any fallible step so cleanup always has a defined set.
        let mut registry = TempArtifactRegistry::new();
        let outcome = self.fetch_and_merge(sql, output_path, &mut registry).await;
        let cleanup = registry.release_all();

        let (total_rows, chunk_count, merge) = outcome?;
        Ok(ExportSummary {
            output_path: merge.output_path,
            chunk_count,
            total_rows,
            bytes_written: merge.bytes_written,
            cleanup,
        })
    }

    async fn fetch_and_merge(
        &self,
        sql: &str,
        output_path: &Path,
        registry: &mut TempArtifactRegistry,
    ) -> Result<(u64, usize, MergeStats), AppError> {
        let mut session = self.connector.open(&self.credentials).await?;
        let fetched = self.fetch_chunks(session.as_mut(), sql, registry).await;
        close_quietly(session).await;
        let total_rows = fetched?;

        let merge = result_merger::merge(registry.artifacts(), output_path).await?;
        Ok((total_rows, registry.len(), merge))
    }

    /// Drains the chunk stream, one temp artifact per chunk.
    async fn fetch_chunks(
        &self,
        session: &mut dyn Session,
        sql: &str,
        registry: &mut TempArtifactRegistry,
    ) -> Result<u64, AppError> {
        let chunk_size = self.config.chunk_size;
        log_statement(self.config.log_sql, "stream", sql);

        let mut stream = session.stream(sql, chunk_size);
        let mut returned: u64 = 0;
        let mut index = 0;

        while let Some(next) = stream.next().await {
            let wrap = |e: AppError| AppError::Chunk {
                index,
                source: Box::new(e),
            };
            let chunk = next.map_err(wrap)?;

            // Registered before writing so a half-written file is still cleaned up.
            let artifact = self.store.allocate().map_err(wrap)?;
            registry.register(artifact.clone());

            let rows = write_chunk(artifact.path().to_path_buf(), chunk)
                .await
                .map_err(wrap)?;
            returned += rows as u64;

            info!(
                "[EXPORT] Chunk {}: requested {} rows, received {}, total {}",
                index, chunk_size, rows, returned
            );
            index += 1;
        }

        Ok(returned)
    }
}

/// Writes one chunk, header first, to `path` on the blocking pool.
/// Returns the number of data rows written.
async fn write_chunk(path: PathBuf, chunk: TabularResult) -> Result<usize, AppError> {
    tokio::task::spawn_blocking(move || {
        let file = File::create(&path).map_err(|e| {
            AppError::Artifact(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        chunk.write_csv(&mut writer)?;
        writer
            .flush()
            .map_err(|e| AppError::Artifact(format!("Failed to flush {}: {}", path.display(), e)))?;
        Ok(chunk.len())
    })
    .await
    .map_err(|e| AppError::Internal(format!("Chunk write task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::connector::fake::{credentials, numbered_table, table, FakeConnector};

    const SQL: &str = "SELECT id, name FROM events";

    fn exporter(connector: &FakeConnector, temp_dir: &Path, chunk_size: usize) -> ChunkedStreamExporter {
        let config = ExportConfig::default()
            .with_chunk_size(chunk_size)
            .with_temp_dir(temp_dir);
        ChunkedStreamExporter::new(Arc::new(connector.clone()), credentials(), config)
    }

    fn dir_is_empty(dir: &Path) -> bool {
        !dir.exists() || fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_three_chunks_merged_and_cleaned_up() {
        let work = TempDir::new().unwrap();
        let temp_dir = work.path().join("tmp");
        let output = work.path().join("out").join("events.csv");
        let source = numbered_table(120_000);
        let connector = FakeConnector::builder().stream_source(source.clone()).build();

        let summary = exporter(&connector, &temp_dir, 50_000)
            .export_large(SQL, &output)
            .await
            .expect("Export should succeed");

        assert_eq!(summary.chunk_count, 3);
        assert_eq!(summary.total_rows, 120_000);
        assert_eq!(summary.cleanup.removed, 3);
        assert!(summary.cleanup.is_clean());
        assert!(dir_is_empty(&temp_dir), "temp artifacts should be gone");

        // Output equals the whole source written at once.
        let mut expected = Vec::new();
        source.write_csv(&mut expected).unwrap();
        let actual = fs::read(&output).unwrap();
        assert_eq!(actual, expected);
        assert_eq!(summary.bytes_written, actual.len() as u64);

        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 1);
        assert_eq!(connector.executed(), vec![SQL.to_string()]);
    }

    #[tokio::test]
    async fn test_failure_mid_stream_cleans_up_and_leaves_no_output() {
        let work = TempDir::new().unwrap();
        let temp_dir = work.path().join("tmp");
        let output = work.path().join("events.csv");
        let connector = FakeConnector::builder()
            .stream_source(numbered_table(120_000))
            .fail_stream_after(2)
            .build();

        let err = exporter(&connector, &temp_dir, 50_000)
            .export_large(SQL, &output)
            .await
            .expect_err("Export should fail");

        match &err {
            AppError::Chunk { index, .. } => assert_eq!(*index, 2),
            other => panic!("Expected Chunk error, got {:?}", other),
        }
        assert_eq!(err.failing_sql(), Some(SQL));
        assert!(err.is_remote());

        assert!(dir_is_empty(&temp_dir), "registered artifacts should be deleted");
        assert!(!output.exists(), "no output on failure");
        assert_eq!(connector.closed(), 1, "session closed on failure too");
    }

    #[tokio::test]
    async fn test_rerun_is_byte_identical() {
        let work = TempDir::new().unwrap();
        let temp_dir = work.path().join("tmp");
        let connector = FakeConnector::builder()
            .stream_source(table(
                &["id", "note"],
                &[&["1", "a,b"], &["2", "say \"hi\""], &["3", ""], &["4", "x"]],
            ))
            .build();
        let exporter = exporter(&connector, &temp_dir, 3);

        let first = work.path().join("first.csv");
        let second = work.path().join("second.csv");
        exporter.export_large(SQL, &first).await.unwrap();
        exporter.export_large(SQL, &second).await.unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
        assert_eq!(
            fs::read_to_string(&first).unwrap(),
            "id,note\n1,\"a,b\"\n2,\"say \"\"hi\"\"\"\n3,\n4,x\n"
        );
    }

    #[tokio::test]
    async fn test_empty_result_writes_empty_file() {
        let work = TempDir::new().unwrap();
        let output = work.path().join("events.csv");
        let connector = FakeConnector::builder()
            .stream_source(table(&["id"], &[]))
            .build();

        let summary = exporter(&connector, &work.path().join("tmp"), 10)
            .export_large(SQL, &output)
            .await
            .unwrap();

        assert_eq!(summary.chunk_count, 0);
        assert_eq!(summary.total_rows, 0);
        assert_eq!(fs::read(&output).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected_before_connecting() {
        let work = TempDir::new().unwrap();
        let connector = FakeConnector::builder().build();

        let result = exporter(&connector, work.path(), 0)
            .export_large(SQL, work.path().join("out.csv"))
            .await;

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
        assert_eq!(connector.opened(), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_propagates() {
        let work = TempDir::new().unwrap();
        let temp_dir = work.path().join("tmp");
        let output = work.path().join("out.csv");
        let connector = FakeConnector::builder().fail_open().build();

        let result = exporter(&connector, &temp_dir, 10)
            .export_large(SQL, &output)
            .await;

        assert!(matches!(result, Err(AppError::ConnectionFailed(_))));
        assert!(dir_is_empty(&temp_dir));
        assert!(!output.exists());
    }
}
