//! PostgreSQL adapter using sqlx.

use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, Postgres};
use sqlx::{Column, Either, Executor, Row as SqlxRow, TypeInfo, ValueRef};

use crate::driver::types::{ColumnType, QueryResult, QueryStat, ResultHeader, Row};
use crate::driver::{Driver, DriverError, DriverKind};

/// Connection parameters for a PostgreSQL server.
///
/// Every field is optional; unset fields fall back to libpq-style defaults
/// (localhost, 5432, `postgres`, database named after the user).
#[derive(Debug, Clone, Default)]
pub struct PostgresParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

/// Map a PostgreSQL native type name onto a canonical bucket.
/// Unrecognized native types default to TEXT.
fn canonical_type(native: &str) -> ColumnType {
    match native.to_ascii_uppercase().as_str() {
        "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "BIGINT" | "SMALLSERIAL"
        | "SERIAL" | "BIGSERIAL" | "OID" | "BOOL" | "BOOLEAN" => ColumnType::Integer,
        "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE PRECISION" | "NUMERIC" | "MONEY" => {
            ColumnType::Real
        }
        "BYTEA" => ColumnType::Blob,
        _ => ColumnType::Text,
    }
}

/// Adapter for a client/server PostgreSQL engine.
pub struct PostgresDriver {
    pool: PgPool,
    params: PostgresParams,
}

impl std::fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("host", &self.params.host)
            .field("database", &self.params.database)
            .finish_non_exhaustive()
    }
}

impl PostgresDriver {
    /// Build a lazy pool; the server is first contacted by `init` or the
    /// first statement. Unset parameters keep sqlx's libpq-compatible
    /// defaults (including `PG*` environment variables).
    pub fn open(params: PostgresParams) -> Self {
        let mut options = PgConnectOptions::new();
        if let Some(host) = &params.host {
            options = options.host(host);
        }
        if let Some(port) = params.port {
            options = options.port(port);
        }
        if let Some(user) = &params.user {
            options = options.username(user);
        }
        if let Some(password) = &params.password {
            options = options.password(password);
        }
        if let Some(database) = &params.database {
            options = options.database(database);
        }
        let pool = PgPoolOptions::new().connect_lazy_with(options);
        Self { pool, params }
    }
}

async fn run_statement<'e, E>(executor: E, statement: &str) -> Result<QueryResult, DriverError>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut stream = executor.fetch_many(statement);

    let mut headers: Vec<ResultHeader> = Vec::new();
    let mut rows: Vec<Row> = Vec::new();
    let mut rows_affected = 0u64;

    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => {
                rows_affected += done.rows_affected();
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

    // Postgres reports the row count of a SELECT in its command tag; the
    // contract reserves rowsAffected for writes.
    if !rows.is_empty() || !headers.is_empty() {
        rows_affected = 0;
    }

    Ok(QueryResult {
        rows,
        headers,
        stat: QueryStat::affected(rows_affected),
        last_insert_rowid: None,
    })
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Row {
    let mut out = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        out.insert(col.name().to_string(), decode_cell(row, i));
    }
    out
}

/// Ordered fallback chain over the decodable PostgreSQL types. Postgres
/// decoding is strict per OID, so each width is probed separately.
fn decode_cell(row: &sqlx::postgres::PgRow, index: usize) -> serde_json::Value {
    if let Ok(value) = row.try_get_raw(index) {
        if value.is_null() {
            return serde_json::Value::Null;
        }
    }

    row.try_get::<bool, _>(index)
        .map(serde_json::Value::from)
        .or_else(|_| row.try_get::<i16, _>(index).map(serde_json::Value::from))
        .or_else(|_| row.try_get::<i32, _>(index).map(serde_json::Value::from))
        .or_else(|_| row.try_get::<i64, _>(index).map(serde_json::Value::from))
        .or_else(|_| row.try_get::<f32, _>(index).map(serde_json::Value::from))
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
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)
                .map(|t| serde_json::Value::from(t.to_rfc3339()))
        })
        .or_else(|_| {
            row.try_get::<chrono::NaiveDate, _>(index)
                .map(|t| serde_json::Value::from(t.to_string()))
        })
        .or_else(|_| {
            row.try_get::<chrono::NaiveTime, _>(index)
                .map(|t| serde_json::Value::from(t.to_string()))
        })
        .or_else(|_| {
            row.try_get::<sqlx::types::Uuid, _>(index)
                .map(|u| serde_json::Value::from(u.to_string()))
        })
        .or_else(|_| row.try_get::<serde_json::Value, _>(index))
        .or_else(|_| row.try_get::<Vec<u8>, _>(index).map(serde_json::Value::from))
        .unwrap_or(serde_json::Value::Null)
}

#[async_trait::async_trait]
impl Driver for PostgresDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Postgres
    }

    fn connection_name(&self) -> String {
        let user = self.params.user.as_deref().unwrap_or("postgres");
        let host = self.params.host.as_deref().unwrap_or("localhost");
        let port = self.params.port.unwrap_or(5432);
        let database = self.params.database.as_deref().unwrap_or(user);
        format!("{user}@{host}:{port}/{database}")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_type_mapping() {
        assert_eq!(canonical_type("INT4"), ColumnType::Integer);
        assert_eq!(canonical_type("INT8"), ColumnType::Integer);
        assert_eq!(canonical_type("BOOL"), ColumnType::Integer);
        assert_eq!(canonical_type("FLOAT8"), ColumnType::Real);
        assert_eq!(canonical_type("NUMERIC"), ColumnType::Real);
        assert_eq!(canonical_type("BYTEA"), ColumnType::Blob);
        assert_eq!(canonical_type("TEXT"), ColumnType::Text);
        assert_eq!(canonical_type("VARCHAR"), ColumnType::Text);
        assert_eq!(canonical_type("JSONB"), ColumnType::Text);
        assert_eq!(canonical_type("TSVECTOR"), ColumnType::Text);
    }

    #[test]
    fn test_connection_name_defaults() {
        let driver = PostgresDriver::open(PostgresParams::default());
        assert_eq!(driver.connection_name(), "postgres@localhost:5432/postgres");
        assert_eq!(driver.kind(), DriverKind::Postgres);
    }

    #[test]
    fn test_connection_name_explicit() {
        let driver = PostgresDriver::open(PostgresParams {
            host: Some("db.internal".to_string()),
            port: Some(5433),
            user: Some("app".to_string()),
            password: Some("secret".to_string()),
            database: Some("warehouse".to_string()),
        });
        assert_eq!(driver.connection_name(), "app@db.internal:5433/warehouse");
    }
}
