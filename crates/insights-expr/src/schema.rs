//! Schema provider trait and types for raw table metadata lookup

use std::collections::HashMap;

use insights_ir::{Column, Schema};
use thiserror::Error;

/// Ordered columns of a raw table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn to_schema(&self) -> Schema {
        Schema::new(self.columns.clone())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Schema lookup failed: {0}")]
    Lookup(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Resolves raw table schemas at build time
pub trait SchemaProvider {
    fn get_table_schema(&self, table_name: &str) -> Result<TableSchema, SchemaError>;
}

/// In-memory schema provider for tests and offline builds
#[derive(Debug, Default)]
pub struct MockSchemaProvider {
    tables: HashMap<String, TableSchema>,
}

impl MockSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name.clone(), schema);
    }

    pub fn with_table(mut self, name: &str, columns: Vec<Column>) -> Self {
        self.add_table(TableSchema::new(name, columns));
        self
    }
}

impl SchemaProvider for MockSchemaProvider {
    fn get_table_schema(&self, table_name: &str) -> Result<TableSchema, SchemaError> {
        self.tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| SchemaError::TableNotFound(table_name.to_string()))
    }
}
