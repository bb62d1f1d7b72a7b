//! Query facade: build, execute and inspect stored queries by name

use std::time::Duration;

use insights_expr::{CachePolicy, ExecutionEngine, Relation, ResultSet, SchemaProvider};
use insights_ir::Column;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};

use crate::compiler::{FilterOverrides, PipelineCompiler};
use crate::{csv, DocumentStore, Query, QueryError, QUERY_DOCTYPE};

/// Limits and cache lifetimes used by the facade; TTLs are in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    pub default_row_limit: u64,
    pub execute_cache_ttl: u64,
    pub count_cache_ttl: u64,
    pub distinct_cache_ttl: u64,
    pub download_row_limit: u64,
    pub distinct_default_limit: u64,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            default_row_limit: 100,
            execute_cache_ttl: 600,
            count_cache_ttl: 300,
            distinct_cache_ttl: 86_400,
            download_row_limit: 1_000_000,
            distinct_default_limit: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteResult {
    pub sql: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Map<String, JsonValue>>,
    /// Seconds
    pub time_taken: f64,
}

pub struct QueryService<S, E> {
    store: S,
    engine: E,
    config: FacadeConfig,
}

impl<S, E> QueryService<S, E>
where
    S: DocumentStore,
    E: ExecutionEngine + SchemaProvider,
{
    pub fn new(store: S, engine: E) -> Self {
        Self {
            store,
            engine,
            config: FacadeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: FacadeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    pub fn get_query(&self, name: &str) -> Result<Query, QueryError> {
        let doc = self.store.get(QUERY_DOCTYPE, name)?;
        Query::from_document(&doc)
    }

    pub fn build(
        &self,
        name: &str,
        active_operation_idx: Option<i64>,
        filters: &FilterOverrides,
    ) -> Result<Relation, QueryError> {
        let query = self.get_query(name)?;
        self.build_query(&query, active_operation_idx, filters)
    }

    /// Build an already loaded query; only the override for this query's own
    /// name is applied
    pub fn build_query(
        &self,
        query: &Query,
        active_operation_idx: Option<i64>,
        filters: &FilterOverrides,
    ) -> Result<Relation, QueryError> {
        PipelineCompiler::new(&self.store, &self.engine).compile(
            query,
            active_operation_idx,
            filters.for_query(&query.name),
        )
    }

    pub fn to_sql(
        &self,
        name: &str,
        active_operation_idx: Option<i64>,
        filters: &FilterOverrides,
    ) -> Result<String, QueryError> {
        let rel = self.build(name, active_operation_idx, filters)?;
        Ok(self.engine.to_sql(&rel))
    }

    pub fn execute(
        &self,
        name: &str,
        active_operation_idx: Option<i64>,
        filters: &FilterOverrides,
    ) -> Result<ExecuteResult, QueryError> {
        let query = self.get_query(name)?;
        let rel = self.build_query(&query, active_operation_idx, filters)?;

        // the cap comes from the stored pipeline, whatever the preview index
        let limit = query.pipeline.first_limit().unwrap_or(self.config.default_row_limit);
        let policy = CachePolicy::ttl(Duration::from_secs(self.config.execute_cache_ttl));
        let (result, elapsed) = self
            .engine
            .execute(&rel, Some(limit), policy)
            .map_err(QueryError::engine)?;

        info!(
            query = name,
            rows = result.row_count(),
            limit,
            time_taken = elapsed.as_secs_f64(),
            "Executed query"
        );

        Ok(ExecuteResult {
            sql: self.engine.to_sql(&rel),
            columns: self.engine.schema(&rel).columns,
            rows: result.records(),
            time_taken: elapsed.as_secs_f64(),
        })
    }

    pub fn get_count(&self, name: &str, active_operation_idx: Option<i64>) -> Result<u64, QueryError> {
        let rel = self.build(name, active_operation_idx, &FilterOverrides::new())?;
        let policy = CachePolicy::ttl(Duration::from_secs(self.config.count_cache_ttl));
        let (result, _) = self
            .engine
            .execute(&rel.count_rows(), None, policy)
            .map_err(QueryError::engine)?;

        let count = count_value(&result)?;
        debug!(query = name, count, "Counted rows");
        Ok(count)
    }

    /// Full result as CSV, uncached
    pub fn download_results(&self, name: &str, active_operation_idx: Option<i64>) -> Result<String, QueryError> {
        let rel = self.build(name, active_operation_idx, &FilterOverrides::new())?;
        let (result, elapsed) = self
            .engine
            .execute(&rel, Some(self.config.download_row_limit), CachePolicy::disabled())
            .map_err(QueryError::engine)?;

        info!(
            query = name,
            rows = result.row_count(),
            time_taken = elapsed.as_secs_f64(),
            "Prepared download"
        );
        Ok(csv::to_csv(&result))
    }

    /// Distinct non-null values of `column`, optionally only those containing
    /// `search_term` (case-insensitive)
    pub fn get_distinct_column_values(
        &self,
        name: &str,
        column: &str,
        active_operation_idx: Option<i64>,
        search_term: Option<&str>,
        limit: Option<u64>,
    ) -> Result<Vec<JsonValue>, QueryError> {
        let limit = limit.unwrap_or(self.config.distinct_default_limit);
        let rel = self
            .build(name, active_operation_idx, &FilterOverrides::new())?
            .distinct_values(column, search_term, limit)
            .map_err(|e| QueryError::from(e).located(name, None))?;

        let policy = CachePolicy::ttl(Duration::from_secs(self.config.distinct_cache_ttl));
        let (result, _) = self
            .engine
            .execute(&rel, Some(limit), policy)
            .map_err(QueryError::engine)?;

        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    pub fn get_columns_for_selection(
        &self,
        name: &str,
        active_operation_idx: Option<i64>,
    ) -> Result<Vec<Column>, QueryError> {
        let rel = self.build(name, active_operation_idx, &FilterOverrides::new())?;
        Ok(self.engine.schema(&rel).columns)
    }

    /// Persist `query`, recomputing its linked queries first
    pub fn save_query(&self, mut query: Query) -> Result<Query, QueryError> {
        if query.name.is_empty() {
            query.name = self.store.new_document(QUERY_DOCTYPE).name;
        }
        query.set_linked_queries();
        let saved = self.store.save(query.to_document()?)?;
        info!(query = %saved.name, linked = ?query.linked_queries, "Saved query");
        Query::from_document(&saved)
    }

    /// Stored queries whose pipelines reference `name` directly
    pub fn dependent_queries(&self, name: &str) -> Result<Vec<String>, QueryError> {
        let mut dependents = Vec::new();
        for doc in self.store.list(QUERY_DOCTYPE)? {
            let query = Query::from_document(&doc)?;
            if query.linked_queries.iter().any(|linked| linked == name) {
                dependents.push(query.name);
            }
        }
        Ok(dependents)
    }
}

/// The single cell of a `count_rows` result
fn count_value(result: &ResultSet) -> Result<u64, QueryError> {
    match result.first_value() {
        Some(value) => value
            .as_u64()
            .ok_or_else(|| QueryError::Engine(format!("row count is not a non-negative integer: {}", value).into())),
        None => Err(QueryError::Engine("row count query returned no rows".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_value_rejects_malformed_results() {
        let ok = ResultSet {
            columns: vec!["count".to_string()],
            rows: vec![vec![json!(42)]],
        };
        assert_eq!(count_value(&ok).unwrap(), 42);

        let empty = ResultSet {
            columns: vec!["count".to_string()],
            rows: Vec::new(),
        };
        assert!(matches!(count_value(&empty), Err(QueryError::Engine(_))));

        let text = ResultSet {
            columns: vec!["count".to_string()],
            rows: vec![vec![json!("many")]],
        };
        let err = count_value(&text).unwrap_err();
        assert_eq!(err.kind(), "ExecutionError");
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: FacadeConfig = serde_json::from_str(r#"{"default_row_limit": 50}"#).unwrap();
        assert_eq!(config.default_row_limit, 50);
        assert_eq!(config.execute_cache_ttl, 600);
        assert_eq!(config.count_cache_ttl, 300);
        assert_eq!(config.distinct_cache_ttl, 86_400);
        assert_eq!(config.download_row_limit, 1_000_000);
        assert_eq!(config.distinct_default_limit, 20);
    }
}
