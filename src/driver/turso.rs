//! Managed libsql/Turso edge database adapter.
//!
//! Connects lazily: the libsql client is built on first use (or on `init`),
//! so the resolver stays synchronous and the HTTP listener never waits on a
//! remote handshake.

use std::collections::BTreeMap;

use tokio::sync::OnceCell;

use crate::driver::sqlite::{declared_type_to_canonical, quote_ident, quote_literal};
use crate::driver::types::{ColumnType, QueryResult, QueryStat, ResultHeader, Row};
use crate::driver::{Driver, DriverError, DriverKind};

struct RemoteConn {
    // The database handle owns the client; keep it alive with the connection.
    _db: libsql::Database,
    conn: libsql::Connection,
}

/// Adapter for a managed libsql/Turso database.
pub struct TursoDriver {
    url: String,
    token: Option<String>,
    attach: BTreeMap<String, String>,
    remote: OnceCell<RemoteConn>,
}

impl std::fmt::Debug for TursoDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TursoDriver")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl TursoDriver {
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        attach: BTreeMap<String, String>,
    ) -> Self {
        Self {
            url: url.into(),
            token,
            attach,
            remote: OnceCell::new(),
        }
    }

    async fn conn(&self) -> Result<&libsql::Connection, DriverError> {
        let remote = self
            .remote
            .get_or_try_init(|| async {
                let db = libsql::Builder::new_remote(
                    self.url.clone(),
                    self.token.clone().unwrap_or_default(),
                )
                .build()
                .await?;
                let conn = db.connect()?;
                Ok::<_, DriverError>(RemoteConn { _db: db, conn })
            })
            .await?;
        Ok(&remote.conn)
    }
}

/// Infer a canonical type from the first value seen in a column, for result
/// columns without a declared type (expressions, aggregates).
fn value_canonical_type(value: &libsql::Value) -> Option<ColumnType> {
    match value {
        libsql::Value::Integer(_) => Some(ColumnType::Integer),
        libsql::Value::Real(_) => Some(ColumnType::Real),
        libsql::Value::Text(_) => Some(ColumnType::Text),
        libsql::Value::Blob(_) => Some(ColumnType::Blob),
        libsql::Value::Null => None,
    }
}

fn value_to_json(value: libsql::Value) -> serde_json::Value {
    match value {
        libsql::Value::Null => serde_json::Value::Null,
        libsql::Value::Integer(i) => serde_json::Value::from(i),
        libsql::Value::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        libsql::Value::Text(s) => serde_json::Value::from(s),
        libsql::Value::Blob(b) => serde_json::Value::from(b),
    }
}

/// Execute one statement on a connection (or a transaction derefing to one).
async fn run_statement(
    conn: &libsql::Connection,
    statement: &str,
) -> Result<QueryResult, DriverError> {
    let mut stmt = conn.prepare(statement).await?;
    let columns: Vec<(String, Option<String>)> = stmt
        .columns()
        .iter()
        .map(|col| {
            (
                col.name().to_string(),
                col.decl_type().map(|decl| decl.to_string()),
            )
        })
        .collect();

    if columns.is_empty() {
        // No result columns: a write or DDL statement.
        let affected = stmt.execute(()).await? as u64;
        let last_insert_rowid = (affected > 0).then(|| conn.last_insert_rowid());
        return Ok(QueryResult::write(affected, last_insert_rowid));
    }

    let mut rows = stmt.query(()).await?;
    let mut out_rows: Vec<Row> = Vec::new();
    let mut inferred: Vec<Option<ColumnType>> = vec![None; columns.len()];

    while let Some(row) = rows.next().await? {
        let mut out = Row::new();
        for (i, (name, _)) in columns.iter().enumerate() {
            let value = row.get_value(i as i32)?;
            if inferred[i].is_none() {
                inferred[i] = value_canonical_type(&value);
            }
            out.insert(name.clone(), value_to_json(value));
        }
        out_rows.push(out);
    }

    let headers = columns
        .into_iter()
        .zip(inferred)
        .map(|((name, decl), inferred)| {
            let column_type = match &decl {
                Some(decl) => declared_type_to_canonical(decl),
                None => inferred.unwrap_or(ColumnType::Text),
            };
            ResultHeader::new(name, decl, column_type)
        })
        .collect();

    Ok(QueryResult {
        rows: out_rows,
        headers,
        stat: QueryStat::affected(0),
        last_insert_rowid: None,
    })
}

#[async_trait::async_trait]
impl Driver for TursoDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Turso
    }

    fn connection_name(&self) -> String {
        self.url.clone()
    }

    async fn init(&self) -> Result<(), DriverError> {
        let conn = self.conn().await?;
        for (alias, name) in &self.attach {
            let sql = format!(
                "ATTACH DATABASE {} AS {}",
                quote_literal(name),
                quote_ident(alias),
            );
            conn.execute(&sql, ()).await?;
        }
        Ok(())
    }

    async fn query(&self, statement: &str) -> Result<QueryResult, DriverError> {
        let conn = self.conn().await?;
        run_statement(conn, statement).await
    }

    async fn batch(&self, statements: &[String]) -> Result<Vec<QueryResult>, DriverError> {
        let conn = self.conn().await?;
        let tx = conn.transaction().await?;
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            match run_statement(&tx, statement).await {
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
        // libsql connections close on drop; nothing to flush.
    }
}
