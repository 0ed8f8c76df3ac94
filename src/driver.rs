//! Driver Layer
//!
//! Backend abstraction for the query gateway. Every supported database is
//! wrapped in a thin adapter implementing the [`Driver`] trait, so the HTTP
//! proxy only ever sees one contract: execute a statement (or a batch) and
//! get back the canonical result model.
//!
//! # Components
//!
//! - [`Driver`]: core trait implemented by every backend adapter
//! - [`QueryResult`] / [`ResultHeader`] / [`ColumnType`]: canonical result model
//! - [`SqliteDriver`]: embedded SQLite files (sqlx, single-connection pool)
//! - [`TursoDriver`]: managed libsql/Turso edge databases
//! - [`MySqlDriver`] / [`PostgresDriver`]: client/server engines (sqlx pools)

pub mod mysql;
pub mod postgres;
pub mod sqlite;
mod traits;
pub mod turso;
mod types;

pub use mysql::{MySqlDriver, MySqlParams};
pub use postgres::{PostgresDriver, PostgresParams};
pub use sqlite::SqliteDriver;
pub use traits::{Driver, DriverError, DriverKind};
pub use turso::TursoDriver;
pub use types::{ColumnType, QueryResult, QueryStat, ResultHeader, Row};
