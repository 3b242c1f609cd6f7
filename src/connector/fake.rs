//! Scripted connector for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};

use super::{ChunkStream, Connector, Credentials, Session};
use crate::error::AppError;
use crate::table::{Row, TabularResult};

type Responder = Box<dyn Fn(&str) -> Result<TabularResult, AppError> + Send + Sync>;

struct Inner {
    responder: Responder,
    stream_source: Option<TabularResult>,
    fail_stream_after: Option<usize>,
    fail_open: bool,
    opened: AtomicUsize,
    closed: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

#[derive(Clone)]
pub(crate) struct FakeConnector {
    inner: Arc<Inner>,
}

impl FakeConnector {
    pub(crate) fn builder() -> FakeConnectorBuilder {
        FakeConnectorBuilder {
            responder: None,
            stream_source: None,
            fail_stream_after: None,
            fail_open: false,
        }
    }

    pub(crate) fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.inner.executed.lock().unwrap().clone()
    }
}

pub(crate) struct FakeConnectorBuilder {
    responder: Option<Responder>,
    stream_source: Option<TabularResult>,
    fail_stream_after: Option<usize>,
    fail_open: bool,
}

impl FakeConnectorBuilder {
    /// Answers `execute` calls.
    pub(crate) fn respond<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<TabularResult, AppError> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    /// Table that `stream` splits into chunks.
    pub(crate) fn stream_source(mut self, table: TabularResult) -> Self {
        self.stream_source = Some(table);
        self
    }

    /// Makes `stream` fail after yielding `n` chunks.
    pub(crate) fn fail_stream_after(mut self, n: usize) -> Self {
        self.fail_stream_after = Some(n);
        self
    }

    pub(crate) fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub(crate) fn build(self) -> FakeConnector {
        FakeConnector {
            inner: Arc::new(Inner {
                responder: self.responder.unwrap_or_else(|| {
                    Box::new(|sql: &str| Err(AppError::query_failed(sql, "no responder")))
                }),
                stream_source: self.stream_source,
                fail_stream_after: self.fail_stream_after,
                fail_open: self.fail_open,
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                executed: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Connector for FakeConnector {
    fn open<'a>(
        &'a self,
        _credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<Box<dyn Session>, AppError>> {
        Box::pin(async move {
            if self.inner.fail_open {
                return Err(AppError::connection_failed("authentication rejected"));
            }
            self.inner.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                inner: Arc::clone(&self.inner),
            }) as Box<dyn Session>)
        })
    }
}

struct FakeSession {
    inner: Arc<Inner>,
}

impl Session for FakeSession {
    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<TabularResult, AppError>> {
        Box::pin(async move {
            self.inner.executed.lock().unwrap().push(sql.to_string());
            (self.inner.responder)(sql)
        })
    }

    fn stream<'a>(&'a mut self, sql: &'a str, chunk_size: usize) -> ChunkStream<'a> {
        self.inner.executed.lock().unwrap().push(sql.to_string());

        let source = match &self.inner.stream_source {
            Some(table) => table.clone(),
            None => {
                return stream::iter(vec![Err(AppError::query_failed(sql, "no stream source"))])
                    .boxed()
            }
        };

        let columns = source.columns().to_vec();
        let rows: Vec<Row> = source.into_rows();
        let mut items: Vec<Result<TabularResult, AppError>> = rows
            .chunks(chunk_size)
            .map(|chunk| TabularResult::new(columns.clone(), chunk.to_vec()))
            .collect();

        if let Some(n) = self.inner.fail_stream_after {
            items.truncate(n);
            items.push(Err(AppError::query_failed(sql, "connection reset during fetch")));
        }

        stream::iter(items).boxed()
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), AppError>> {
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

/// Builds a table from string slices.
pub(crate) fn table(columns: &[&str], rows: &[&[&str]]) -> TabularResult {
    TabularResult::new(
        columns.iter().map(|s| s.to_string()).collect(),
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect(),
    )
    .unwrap()
}

/// Builds a two-column table of `n` rows numbered from 1.
pub(crate) fn numbered_table(n: usize) -> TabularResult {
    let rows = (1..=n)
        .map(|i| vec![i.to_string(), format!("name-{}", i)])
        .collect();
    TabularResult::new(vec!["id".into(), "name".into()], rows).unwrap()
}

pub(crate) fn credentials() -> Credentials {
    Credentials::new("etl", "s3cret", "localhost", 21050)
}
