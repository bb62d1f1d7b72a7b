//! DuckDB execution engine for Insights relations

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use duckdb::types::ValueRef;
use duckdb::Connection;
use insights_expr::{
    wrap_sql, CachePolicy, ExecutionEngine, Relation, ResultSet, SchemaError, SchemaProvider, TableSchema,
};
use insights_ir::{Column, DataType};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};

mod cache;

pub use cache::{CacheStats, ResultCache};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Connection lock poisoned")]
    Poisoned,
}

/// One DuckDB connection shared behind a mutex, plus a result cache
pub struct DuckEngine {
    conn: Mutex<Connection>,
    cache: ResultCache,
}

impl DuckEngine {
    /// In-memory database
    pub fn new() -> Result<Self, ExecutionError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            cache: ResultCache::default(),
        }
    }

    pub fn with_cache_capacity(mut self, max_entries: usize) -> Self {
        self.cache = ResultCache::new(max_entries);
        self
    }

    /// Run raw SQL statements, e.g. to seed fixtures
    pub fn execute_batch(&self, sql: &str) -> Result<(), ExecutionError> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, ExecutionError> {
        self.conn.lock().map_err(|_| ExecutionError::Poisoned)
    }

    fn fetch(&self, sql: &str, width: usize) -> Result<Vec<Vec<JsonValue>>, ExecutionError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let mut result_rows = Vec::new();
        while let Some(row) = rows.next()? {
            let mut json_row = Vec::with_capacity(width);
            for i in 0..width {
                json_row.push(to_json(row.get_ref(i)?));
            }
            result_rows.push(json_row);
        }
        Ok(result_rows)
    }
}

impl ExecutionEngine for DuckEngine {
    type Error = ExecutionError;

    fn execute(
        &self,
        rel: &Relation,
        limit: Option<u64>,
        cache: CachePolicy,
    ) -> Result<(ResultSet, Duration), ExecutionError> {
        let casts: Vec<Option<DataType>> = rel.schema().columns.iter().map(|c| transport_cast(c.data_type)).collect();
        let sql = wrap_sql(rel, &casts, limit);
        let key = ResultCache::key(&sql, limit);

        if cache.enabled {
            if let Some(hit) = self.cache.get(&key) {
                return Ok(hit);
            }
        }

        debug!(sql = %sql, "Executing");
        let start = Instant::now();
        let rows = self.fetch(&sql, rel.schema().len())?;
        let elapsed = start.elapsed();

        let result = ResultSet {
            columns: rel.schema().names().into_iter().map(String::from).collect(),
            rows,
        };
        info!(rows = result.row_count(), elapsed_ms = elapsed.as_millis() as u64, "Query executed");

        if cache.enabled {
            self.cache.put(key, result.clone(), elapsed, cache.ttl);
        }
        Ok((result, elapsed))
    }
}

impl SchemaProvider for DuckEngine {
    fn get_table_schema(&self, table_name: &str) -> Result<TableSchema, SchemaError> {
        let lookup = |e: ExecutionError| SchemaError::Lookup(Box::new(e));
        let conn = self.connection().map_err(lookup)?;
        let mut stmt = conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_name = ? ORDER BY ordinal_position",
            )
            .map_err(|e| lookup(e.into()))?;

        let columns = stmt
            .query_map([table_name], |row| {
                let name: String = row.get(0)?;
                let type_name: String = row.get(1)?;
                Ok(Column::new(name, duck_type(&type_name)))
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| lookup(e.into()))?;

        if columns.is_empty() {
            return Err(SchemaError::TableNotFound(table_name.to_string()));
        }
        Ok(TableSchema::new(table_name, columns))
    }
}

/// Outer cast applied before rows leave the engine, so every cell arrives as a
/// boolean, BIGINT, DOUBLE or text value
fn transport_cast(data_type: DataType) -> Option<DataType> {
    match data_type {
        DataType::Integer => Some(DataType::Integer),
        DataType::Decimal => Some(DataType::Decimal),
        DataType::Boolean | DataType::String | DataType::Text => None,
        DataType::Date | DataType::Datetime | DataType::Time | DataType::Json | DataType::Unknown => {
            Some(DataType::String)
        }
    }
}

/// Semantic type for a DuckDB column type name
pub fn duck_type(type_name: &str) -> DataType {
    let upper = type_name.trim().to_ascii_uppercase();
    let base = upper.split('(').next().unwrap_or("").trim();
    match base {
        "VARCHAR" | "CHAR" | "BPCHAR" | "TEXT" | "STRING" | "UUID" => DataType::String,
        "TINYINT" | "SMALLINT" | "INTEGER" | "INT" | "BIGINT" | "HUGEINT" | "UTINYINT" | "USMALLINT"
        | "UINTEGER" | "UBIGINT" | "UHUGEINT" => DataType::Integer,
        "FLOAT" | "REAL" | "DOUBLE" | "DECIMAL" | "NUMERIC" => DataType::Decimal,
        "BOOLEAN" | "BOOL" => DataType::Boolean,
        "DATE" => DataType::Date,
        "DATETIME" => DataType::Datetime,
        "JSON" => DataType::Json,
        t if t.starts_with("TIMESTAMP") => DataType::Datetime,
        t if t.starts_with("TIME") => DataType::Time,
        _ => DataType::Unknown,
    }
}

fn to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Boolean(b) => JsonValue::Bool(b),
        ValueRef::TinyInt(i) => JsonValue::from(i),
        ValueRef::SmallInt(i) => JsonValue::from(i),
        ValueRef::Int(i) => JsonValue::from(i),
        ValueRef::BigInt(i) => JsonValue::from(i),
        ValueRef::UTinyInt(i) => JsonValue::from(i),
        ValueRef::USmallInt(i) => JsonValue::from(i),
        ValueRef::UInt(i) => JsonValue::from(i),
        ValueRef::UBigInt(i) => JsonValue::from(i),
        ValueRef::Float(f) => serde_json::json!(f),
        ValueRef::Double(f) => serde_json::json!(f),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        _ => JsonValue::Null,
    }
}
