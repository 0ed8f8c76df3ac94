//! Canonical result model shared by every backend adapter.
//!
//! The editor UI speaks one wire shape regardless of backend: rows as
//! name → value maps, column headers with a canonical type, and an execution
//! stat block. Fields the backend does not report are `null`, never guessed.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Canonical column type exposed across all backends.
///
/// Serialized as its numeric value; the editor UI keys its cell renderers
/// off these four buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text = 1,
    Integer = 2,
    Real = 3,
    Blob = 4,
}

impl Serialize for ColumnType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            1 => Ok(ColumnType::Text),
            2 => Ok(ColumnType::Integer),
            3 => Ok(ColumnType::Real),
            4 => Ok(ColumnType::Blob),
            other => Err(de::Error::custom(format!(
                "invalid column type: {other}"
            ))),
        }
    }
}

/// Column metadata for one result column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultHeader {
    /// Column name as returned by the backend.
    pub name: String,
    /// Name shown in the editor UI.
    pub display_name: String,
    /// Backend-native type name, kept for display only.
    pub original_type: Option<String>,
    /// Canonical type bucket.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ResultHeader {
    pub fn new(
        name: impl Into<String>,
        original_type: Option<String>,
        column_type: ColumnType,
    ) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            original_type,
            column_type,
        }
    }
}

/// Execution statistics for one statement.
///
/// `rows_read`, `rows_written` and `query_duration_ms` are `None` when the
/// backend does not instrument them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStat {
    pub rows_affected: u64,
    pub rows_read: Option<u64>,
    pub rows_written: Option<u64>,
    pub query_duration_ms: Option<u64>,
}

impl QueryStat {
    /// Stat block for a statement that affected `rows_affected` rows and
    /// reported nothing else.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }
}

/// One row: ordered column name → JSON value mapping.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Uniform result of executing one statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub headers: Vec<ResultHeader>,
    pub stat: QueryStat,
    #[serde(
        rename = "lastInsertRowid",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub last_insert_rowid: Option<i64>,
}

impl QueryResult {
    /// Result of a statement that returned no rows (DDL, DML).
    pub fn write(rows_affected: u64, last_insert_rowid: Option<i64>) -> Self {
        Self {
            rows: Vec::new(),
            headers: Vec::new(),
            stat: QueryStat::affected(rows_affected),
            last_insert_rowid,
        }
    }
}
