//! SQLite file adapter using sqlx.
//!
//! Uses a single-connection lazy pool so named attachments installed on
//! connect stay visible for the process lifetime, and so a batch and its
//! transaction always share one connection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::TryStreamExt;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Column, Either, Executor, Row as SqlxRow, TypeInfo, ValueRef};

use crate::driver::types::{ColumnType, QueryResult, QueryStat, ResultHeader, Row};
use crate::driver::{Driver, DriverError, DriverKind};

/// Map a SQLite declared type to a canonical bucket, following SQLite's
/// type-affinity keyword rules. Unrecognized declarations fall back to TEXT.
pub(crate) fn declared_type_to_canonical(declared: &str) -> ColumnType {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("INT") {
        ColumnType::Integer
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        ColumnType::Text
    } else if upper == "BLOB" || upper.is_empty() {
        ColumnType::Blob
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        ColumnType::Real
    } else {
        ColumnType::Text
    }
}

/// Quote a string as a SQL single-quoted literal.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a string as a SQL double-quoted identifier.
pub(crate) fn quote_ident(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Adapter for an embedded SQLite database file.
pub struct SqliteDriver {
    pool: SqlitePool,
    file: PathBuf,
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

impl SqliteDriver {
    /// Open a database file, with optional named attachments opened as
    /// additional schemas.
    ///
    /// The pool is lazy: nothing touches the filesystem until `init` or the
    /// first statement runs. Attachments are installed by an `after_connect`
    /// hook so they survive pool reconnects.
    pub fn open(file: impl Into<PathBuf>, attach: BTreeMap<String, PathBuf>) -> Self {
        let file = file.into();
        let options = SqliteConnectOptions::new()
            .filename(&file)
            .create_if_missing(true);

        let attachments: Vec<(String, PathBuf)> = attach.into_iter().collect();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .after_connect(move |conn, _meta| {
                let attachments = attachments.clone();
                Box::pin(async move {
                    for (alias, path) in &attachments {
                        let sql = format!(
                            "ATTACH DATABASE {} AS {}",
                            quote_literal(&path.to_string_lossy()),
                            quote_ident(alias),
                        );
                        conn.execute(sql.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_lazy_with(options);

        Self { pool, file }
    }

    /// In-memory database, used by tests.
    pub fn memory() -> Self {
        Self::open(Path::new(":memory:"), BTreeMap::new())
    }
}

/// Execute one statement against any SQLite executor (pool or transaction).
async fn run_statement<'e, E>(executor: E, statement: &str) -> Result<QueryResult, DriverError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut stream = executor.fetch_many(statement);

    let mut headers: Vec<ResultHeader> = Vec::new();
    let mut rows: Vec<Row> = Vec::new();
    let mut rows_affected = 0u64;
    let mut last_insert_rowid = None;

    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => {
                rows_affected += done.rows_affected();
                if done.rows_affected() > 0 {
                    last_insert_rowid = Some(done.last_insert_rowid());
                }
            }
            Either::Right(row) => {
                if headers.is_empty() {
                    headers = row
                        .columns()
                        .iter()
                        .map(|col| {
                            let native = col.type_info().name().to_string();
                            ResultHeader::new(
                                col.name(),
                                Some(native.clone()),
                                declared_type_to_canonical(&native),
                            )
                        })
                        .collect();
                }
                rows.push(decode_row(&row));
            }
        }
    }

    // A statement that produced a result set affected nothing; SQLite's
    // changes counter would otherwise leak the previous write's count.
    if !rows.is_empty() || !headers.is_empty() {
        rows_affected = 0;
        last_insert_rowid = None;
    }

    Ok(QueryResult {
        rows,
        headers,
        stat: QueryStat::affected(rows_affected),
        last_insert_rowid,
    })
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Row {
    let mut out = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        out.insert(col.name().to_string(), decode_cell(row, i));
    }
    out
}

/// Decode one cell by its runtime value type. SQLite types values, not
/// columns, so each cell is probed independently.
fn decode_cell(row: &sqlx::sqlite::SqliteRow, index: usize) -> serde_json::Value {
    if let Ok(value) = row.try_get_raw(index) {
        if value.is_null() {
            return serde_json::Value::Null;
        }
    }

    row.try_get::<i64, _>(index)
        .map(serde_json::Value::from)
        .or_else(|_| row.try_get::<f64, _>(index).map(serde_json::Value::from))
        .or_else(|_| row.try_get::<String, _>(index).map(serde_json::Value::from))
        .or_else(|_| row.try_get::<Vec<u8>, _>(index).map(serde_json::Value::from))
        .unwrap_or(serde_json::Value::Null)
}

#[async_trait::async_trait]
impl Driver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn connection_name(&self) -> String {
        self.file.to_string_lossy().into_owned()
    }

    async fn init(&self) -> Result<(), DriverError> {
        // Forces the first connection, which opens the file and installs
        // attachments.
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn query(&self, statement: &str) -> Result<QueryResult, DriverError> {
        run_statement(&self.pool, statement).await
    }

    async fn batch(&self, statements: &[String]) -> Result<Vec<QueryResult>, DriverError> {
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            match run_statement(&mut *tx, statement).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    tx.rollback().await.ok();
                    return Err(err);
                }
            }
        }
        tx.commit().await?;
        Ok(results)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
