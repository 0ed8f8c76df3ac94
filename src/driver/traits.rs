//! Core driver trait and error types.

use thiserror::Error;

use crate::driver::types::QueryResult;

/// Errors that can occur while talking to a backend.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A statement failed against the backend. Carries the backend's native
    /// error message verbatim.
    #[error("{0}")]
    Execution(String),

    /// Connection setup or handshake failed.
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        DriverError::Execution(err.to_string())
    }
}

impl From<libsql::Error> for DriverError {
    fn from(err: libsql::Error) -> Self {
        DriverError::Execution(err.to_string())
    }
}

/// Stable backend-kind name, used to pick the matching editor theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Sqlite,
    Turso,
    Mysql,
    Postgres,
}

impl DriverKind {
    /// URL suffix appended to the studio base URL.
    ///
    /// Turso shares the SQLite editor since both speak the SQLite dialect.
    pub fn studio_suffix(&self) -> &'static str {
        match self {
            DriverKind::Sqlite | DriverKind::Turso => "sqlite",
            DriverKind::Mysql => "mysql",
            DriverKind::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DriverKind::Sqlite => "sqlite",
            DriverKind::Turso => "turso",
            DriverKind::Mysql => "mysql",
            DriverKind::Postgres => "postgres",
        };
        write!(f, "{name}")
    }
}

/// Capability set every backend adapter implements.
///
/// One driver instance exists per running process. It is created by the
/// resolver at startup, shared by all concurrent requests, and closed once
/// on shutdown. Whether concurrent statements are serialized or parallel is
/// the underlying client library's business; the proxy adds no locking.
///
/// There are no retry, timeout or cancellation semantics: a hung statement
/// hangs its request indefinitely.
#[async_trait::async_trait]
pub trait Driver: std::fmt::Debug + Send + Sync + 'static {
    /// Which backend this adapter speaks to.
    fn kind(&self) -> DriverKind;

    /// Human-readable label for the active connection, used as page title.
    fn connection_name(&self) -> String;

    /// Handshake/setup that must complete before queries can run (ping,
    /// opening attachments). Launched without blocking the HTTP listener;
    /// failures surface through subsequent request errors.
    async fn init(&self) -> Result<(), DriverError>;

    /// Execute exactly one statement.
    async fn query(&self, statement: &str) -> Result<QueryResult, DriverError>;

    /// Execute all statements as one logical unit against a single
    /// connection. Any failure fails the whole batch with one error; callers
    /// never see partial results.
    async fn batch(&self, statements: &[String]) -> Result<Vec<QueryResult>, DriverError>;

    /// Force-close the underlying connection or pool. Invoked exactly once
    /// by the shutdown routine.
    async fn close(&self);
}
