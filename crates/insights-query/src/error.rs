use insights_expr::{ExprError, SchemaError};
use thiserror::Error;

use crate::StoreError;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Malformed pipeline{}: {reason}", location(.query, .operation_index))]
    MalformedPipeline {
        reason: String,
        query: Option<String>,
        operation_index: Option<usize>,
    },

    #[error("Column '{column}' not found{}. Available columns: {available:?}", location(.query, .operation_index))]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
        query: Option<String>,
        operation_index: Option<usize>,
    },

    #[error("Unsupported operation: {operator} on ({}){}", .operand_types.join(", "), location(.query, .operation_index))]
    UnsupportedOperation {
        operator: String,
        operand_types: Vec<String>,
        query: Option<String>,
        operation_index: Option<usize>,
    },

    #[error("Query '{query}' does not start with a source operation")]
    MissingSource { query: String },

    #[error("Query '{query}' has no operations")]
    EmptyPipeline { query: String },

    #[error("Cyclic query reference: {}", .path.join(" -> "))]
    CyclicQueryReference { path: Vec<String> },

    #[error("Failed to build query{}: {reason}", location(.query, &None))]
    BuildFailed { reason: String, query: Option<String> },

    #[error("{doctype} '{name}' not found")]
    NotFound { doctype: String, name: String },

    #[error("Invalid query record '{name}': {reason}")]
    InvalidRecord { name: String, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(StoreError),

    /// Execution failure, passed through from the engine
    #[error("Execution failed: {0}")]
    Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn location(query: &Option<String>, operation_index: &Option<usize>) -> String {
    match (query, operation_index) {
        (Some(q), Some(i)) => format!(" in query '{}' at operation {}", q, i),
        (Some(q), None) => format!(" in query '{}'", q),
        (None, Some(i)) => format!(" at operation {}", i),
        (None, None) => String::new(),
    }
}

impl QueryError {
    /// Stable name of the condition, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::MalformedPipeline { .. } => "MalformedPipeline",
            QueryError::ColumnNotFound { .. } => "ColumnNotFound",
            QueryError::UnsupportedOperation { .. } => "UnsupportedOperation",
            QueryError::MissingSource { .. } => "MissingSource",
            QueryError::EmptyPipeline { .. } => "EmptyPipeline",
            QueryError::CyclicQueryReference { .. } => "CyclicQueryReference",
            QueryError::BuildFailed { .. } => "BuildFailed",
            QueryError::NotFound { .. } => "NotFound",
            QueryError::InvalidRecord { .. } => "InvalidRecord",
            QueryError::Schema(SchemaError::TableNotFound(_)) => "TableNotFound",
            QueryError::Schema(_) => "SchemaError",
            QueryError::Store(_) => "StoreError",
            QueryError::Engine(_) => "ExecutionError",
        }
    }

    /// Attach the query and operation index where they are not already known.
    /// Errors raised inside a referenced query keep that query's location.
    pub(crate) fn located(mut self, name: &str, index: Option<usize>) -> Self {
        match &mut self {
            QueryError::MalformedPipeline {
                query, operation_index, ..
            }
            | QueryError::ColumnNotFound {
                query, operation_index, ..
            }
            | QueryError::UnsupportedOperation {
                query, operation_index, ..
            } => {
                if query.is_none() {
                    *query = Some(name.to_string());
                    if operation_index.is_none() {
                        *operation_index = index;
                    }
                }
            }
            QueryError::BuildFailed { query, .. } => {
                if query.is_none() {
                    *query = Some(name.to_string());
                }
            }
            _ => {}
        }
        self
    }

    pub(crate) fn engine(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        QueryError::Engine(Box::new(err))
    }
}

impl From<ExprError> for QueryError {
    fn from(err: ExprError) -> Self {
        match err {
            ExprError::ColumnNotFound { column, available } => QueryError::ColumnNotFound {
                column,
                available,
                query: None,
                operation_index: None,
            },
            ExprError::UnsupportedOperation {
                operator,
                operand_types,
            } => QueryError::UnsupportedOperation {
                operator,
                operand_types,
                query: None,
                operation_index: None,
            },
            ExprError::Malformed { operation, reason } => QueryError::MalformedPipeline {
                reason: format!("{}: {}", operation, reason),
                query: None,
                operation_index: None,
            },
            other @ ExprError::MissingInput(_) => QueryError::BuildFailed {
                reason: other.to_string(),
                query: None,
            },
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { doctype, name } => QueryError::NotFound { doctype, name },
            other => QueryError::Store(other),
        }
    }
}
