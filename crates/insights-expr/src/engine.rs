//! Execution engine contract

use std::time::Duration;

use insights_ir::Schema;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::Relation;

/// Whether and for how long an execution result may be served from cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl: Duration,
}

impl CachePolicy {
    pub fn ttl(ttl: Duration) -> Self {
        Self { enabled: true, ttl }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ttl: Duration::ZERO,
        }
    }
}

/// Tabular result of one execution, rows aligned with `columns`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn first_value(&self) -> Option<&JsonValue> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Rows as `column → value` objects
    pub fn records(&self) -> Vec<Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<String, JsonValue>>()
            })
            .collect()
    }
}

pub trait ExecutionEngine {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run `rel`, returning at most `limit` rows and the time the engine spent on it
    fn execute(
        &self,
        rel: &Relation,
        limit: Option<u64>,
        cache: CachePolicy,
    ) -> Result<(ResultSet, Duration), Self::Error>;

    fn to_sql(&self, rel: &Relation) -> String {
        crate::sql::to_sql(rel)
    }

    fn schema(&self, rel: &Relation) -> Schema {
        rel.schema().clone()
    }
}
