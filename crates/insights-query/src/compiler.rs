//! Pipeline compiler
//!
//! Folds a query's operations into one [`Relation`]. A `source`, `join` or
//! `union` that names another query compiles that query in the same session,
//! so each referenced query is built once per call and cycles are reported
//! instead of recursing forever.

use std::collections::HashMap;

use insights_expr::{translate, Relation, SchemaProvider, TableResolver};
use insights_ir::{FilterGroup, Operation, TableRef};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DocumentStore, Query, QueryError, QUERY_DOCTYPE};

/// Request-scoped ad-hoc filters keyed by query name. Each value is a
/// `filter_group` operation; anything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterOverrides(HashMap<String, Operation>);

impl FilterOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, query: impl Into<String>, filter: FilterGroup) {
        self.0.insert(query.into(), Operation::FilterGroup(filter));
    }

    pub fn with(mut self, query: impl Into<String>, filter: FilterGroup) -> Self {
        self.insert(query, filter);
        self
    }

    /// The non-empty filter group registered for `query`
    pub fn for_query(&self, query: &str) -> Option<&FilterGroup> {
        match self.0.get(query)? {
            Operation::FilterGroup(group) if !group.is_empty() => Some(group),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct PipelineCompiler<'a, S, P> {
    store: &'a S,
    schemas: &'a P,
}

impl<'a, S: DocumentStore, P: SchemaProvider> PipelineCompiler<'a, S, P> {
    pub fn new(store: &'a S, schemas: &'a P) -> Self {
        Self { store, schemas }
    }

    /// Compile `query`, truncated to `active_operation_idx` (inclusive) when it
    /// is in range, with `ephemeral_filter` appended after truncation.
    pub fn compile(
        &self,
        query: &Query,
        active_operation_idx: Option<i64>,
        ephemeral_filter: Option<&FilterGroup>,
    ) -> Result<Relation, QueryError> {
        let mut session = CompileSession {
            store: self.store,
            schemas: self.schemas,
            visiting: Vec::new(),
            compiled: HashMap::new(),
        };
        session.compile(query, active_operation_idx, ephemeral_filter)
    }
}

/// State for one top-level compile
struct CompileSession<'a, S, P> {
    store: &'a S,
    schemas: &'a P,
    /// Queries currently being compiled, outermost first
    visiting: Vec<String>,
    /// Full-pipeline builds of referenced queries
    compiled: HashMap<String, Relation>,
}

impl<'a, S: DocumentStore, P: SchemaProvider> CompileSession<'a, S, P> {
    fn compile(
        &mut self,
        query: &Query,
        active_operation_idx: Option<i64>,
        ephemeral_filter: Option<&FilterGroup>,
    ) -> Result<Relation, QueryError> {
        self.visiting.push(query.name.clone());
        let result = self.fold(query, active_operation_idx, ephemeral_filter);
        self.visiting.pop();
        result
    }

    fn fold(
        &mut self,
        query: &Query,
        active_operation_idx: Option<i64>,
        ephemeral_filter: Option<&FilterGroup>,
    ) -> Result<Relation, QueryError> {
        let mut operations = query.pipeline.prefix(active_operation_idx).to_vec();
        if operations.is_empty() {
            return Err(QueryError::EmptyPipeline {
                query: query.name.clone(),
            });
        }
        if !matches!(operations[0], Operation::Source { .. }) {
            return Err(QueryError::MissingSource {
                query: query.name.clone(),
            });
        }
        if let Some(filter) = ephemeral_filter.filter(|f| !f.is_empty()) {
            operations.push(Operation::FilterGroup(filter.clone()));
        }

        debug!(
            query = %query.name,
            operations = operations.len(),
            depth = self.visiting.len(),
            "Compiling pipeline"
        );

        let mut current = None;
        for (index, op) in operations.iter().enumerate() {
            let next = translate(op, current, self).map_err(|e| e.located(&query.name, Some(index)))?;
            current = Some(next);
        }
        current.ok_or_else(|| QueryError::BuildFailed {
            reason: "pipeline produced no relation".to_string(),
            query: Some(query.name.clone()),
        })
    }

    fn referenced(&mut self, name: &str) -> Result<Relation, QueryError> {
        if let Some(pos) = self.visiting.iter().position(|v| v == name) {
            let mut path = self.visiting[pos..].to_vec();
            path.push(name.to_string());
            return Err(QueryError::CyclicQueryReference { path });
        }
        if let Some(rel) = self.compiled.get(name) {
            return Ok(rel.clone());
        }

        let doc = self.store.get(QUERY_DOCTYPE, name)?;
        let query = Query::from_document(&doc)?;
        let rel = self.compile(&query, None, None)?;
        self.compiled.insert(name.to_string(), rel.clone());
        Ok(rel)
    }
}

impl<'a, S: DocumentStore, P: SchemaProvider> TableResolver for CompileSession<'a, S, P> {
    type Error = QueryError;

    fn resolve(&mut self, table: &TableRef) -> Result<Relation, QueryError> {
        match table {
            TableRef::Table { table_name, .. } => {
                let schema = self.schemas.get_table_schema(table_name)?;
                Ok(Relation::table(table_name.clone(), schema.to_schema()))
            }
            TableRef::Query { query_name, .. } => self.referenced(query_name),
        }
    }
}
