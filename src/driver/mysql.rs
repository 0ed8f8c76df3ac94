//! MySQL adapter using sqlx.

use futures::TryStreamExt;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{Column, Either, Executor, Row as SqlxRow, TypeInfo, ValueRef};

use crate::driver::types::{ColumnType, QueryResult, QueryStat, ResultHeader, Row};
use crate::driver::{Driver, DriverError, DriverKind};

/// Connection parameters for a MySQL server.
#[derive(Debug, Clone)]
pub struct MySqlParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Map a MySQL native type name onto a canonical bucket.
/// Unrecognized native types default to TEXT.
fn canonical_type(native: &str) -> ColumnType {
    let upper = native.to_ascii_uppercase();
    if upper.contains("INT") || upper == "BIT" || upper == "YEAR" || upper == "BOOLEAN" {
        ColumnType::Integer
    } else if upper.contains("FLOAT") || upper.contains("DOUBLE") || upper.contains("DECIMAL") {
        ColumnType::Real
    } else if upper.contains("BLOB") || upper.contains("BINARY") {
        ColumnType::Blob
    } else {
        ColumnType::Text
    }
}

/// Adapter for a client/server MySQL engine.
pub struct MySqlDriver {
    pool: MySqlPool,
    params: MySqlParams,
}

impl std::fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("host", &self.params.host)
            .field("database", &self.params.database)
            .finish_non_exhaustive()
    }
}

impl MySqlDriver {
    /// Build a lazy pool; the server is first contacted by `init` or the
    /// first statement.
    pub fn open(params: MySqlParams) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.user)
            .password(&params.password)
            .database(&params.database);
        let pool = MySqlPoolOptions::new().connect_lazy_with(options);
        Self { pool, params }
    }
}

async fn run_statement<'e, E>(executor: E, statement: &str) -> Result<QueryResult, DriverError>
where
    E: Executor<'e, Database = MySql>,
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
                if done.last_insert_id() != 0 {
                    last_insert_rowid = Some(done.last_insert_id() as i64);
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
                                canonical_type(&native),
                            )
                        })
                        .collect();
                }
                rows.push(decode_row(&row));
            }
        }
    }

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

fn decode_row(row: &sqlx::mysql::MySqlRow) -> Row {
    let mut out = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        out.insert(col.name().to_string(), decode_cell(row, i));
    }
    out
}

/// Ordered fallback chain over the decodable MySQL types. Numerics first,
/// then text, temporal types rendered as strings, JSON passed through, and
/// binary payloads as byte arrays.
fn decode_cell(row: &sqlx::mysql::MySqlRow, index: usize) -> serde_json::Value {
    if let Ok(value) = row.try_get_raw(index) {
        if value.is_null() {
            return serde_json::Value::Null;
        }
    }

    row.try_get::<i64, _>(index)
        .map(serde_json::Value::from)
        .or_else(|_| row.try_get::<u64, _>(index).map(serde_json::Value::from))
        .or_else(|_| row.try_get::<f64, _>(index).map(serde_json::Value::from))
        .or_else(|_| {
            row.try_get::<sqlx::types::Decimal, _>(index)
                .map(|d| serde_json::Value::from(d.to_string()))
        })
        .or_else(|_| row.try_get::<String, _>(index).map(serde_json::Value::from))
        .or_else(|_| {
            row.try_get::<chrono::NaiveDateTime, _>(index)
                .map(|t| serde_json::Value::from(t.to_string()))
        })
        .or_else(|_| {
            row.try_get::<chrono::NaiveDate, _>(index)
                .map(|t| serde_json::Value::from(t.to_string()))
        })
        .or_else(|_| {
            row.try_get::<chrono::NaiveTime, _>(index)
                .map(|t| serde_json::Value::from(t.to_string()))
        })
        .or_else(|_| row.try_get::<serde_json::Value, _>(index))
        .or_else(|_| row.try_get::<Vec<u8>, _>(index).map(serde_json::Value::from))
        .unwrap_or(serde_json::Value::Null)
}

#[async_trait::async_trait]
impl Driver for MySqlDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Mysql
    }

    fn connection_name(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.params.user, self.params.host, self.params.port, self.params.database
        )
    }

    async fn init(&self) -> Result<(), DriverError> {
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
