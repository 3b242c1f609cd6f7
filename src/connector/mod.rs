//! Seam to the remote SQL engine.
//!
//! This crate does not speak any wire protocol. A driver implements
//! [`Connector`] to open authenticated sessions; each [`Session`] can execute
//! a statement into a materialized [`TabularResult`] or stream it back in
//! bounded chunks. Tests provide a scripted implementation instead.
//!
//! Drivers should map authentication and transport failures to
//! `AppError::ConnectionFailed` and engine-side faults to
//! `AppError::QueryFailed` (see [`AppError::query_failed`]).

#[cfg(test)]
pub(crate) mod fake;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::table::TabularResult;

/// Lazy, non-restartable sequence of chunks in fetch order.
pub type ChunkStream<'a> = BoxStream<'a, Result<TabularResult, AppError>>;

/// SASL mechanism used to authenticate the session.
///
/// Drivers pick the handshake from this; in config files it is written the
/// way the engine names it (`"PLAIN"`, `"LDAP"`, `"GSSAPI"`, `"NOSASL"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthMechanism {
    /// Plaintext username/password, expected over TLS.
    #[default]
    Plain,
    Ldap,
    Gssapi,
    NoSasl,
}

/// Connection parameters for one engine endpoint.
///
/// # Security
/// The password is held in a `SecretString`; its `Debug` output is redacted.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    pub auth_mechanism: AuthMechanism,
}

impl Credentials {
    /// Creates credentials with TLS enabled and PLAIN authentication.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            user: user.into(),
            password: SecretString::from(password.into()),
            host: host.into(),
            port,
            use_ssl: true,
            auth_mechanism: AuthMechanism::Plain,
        }
    }

    /// Parses a port given as text, as it often arrives from config or env.
    pub fn parse_port(port: &str) -> Result<u16, AppError> {
        port.trim()
            .parse::<u16>()
            .map_err(|_| AppError::InvalidArgument(format!("Invalid port: {:?}", port)))
    }

    /// `host:port`, for log lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Opens sessions against the engine.
pub trait Connector: Send + Sync {
    /// Opens and authenticates a new session.
    fn open<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<Box<dyn Session>, AppError>>;
}

/// One open session. Closed explicitly with [`Session::close`].
pub trait Session: Send {
    /// Executes a statement and materializes the full result.
    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<TabularResult, AppError>>;

    /// Executes a statement and yields its result in chunks of at most
    /// `chunk_size` rows. Each chunk carries the column names.
    fn stream<'a>(&'a mut self, sql: &'a str, chunk_size: usize) -> ChunkStream<'a>;

    /// Closes the session.
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), AppError>>;
}

/// Closes a session, logging rather than failing if the engine complains.
/// The work done on the session has already completed at this point.
pub(crate) async fn close_quietly(session: Box<dyn Session>) {
    if let Err(e) = session.close().await {
        tracing::warn!("[SESSION] Failed to close session: {}", e);
    }
}
