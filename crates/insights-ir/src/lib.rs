//! Insights pipeline model
//!
//! Typed representation of a query pipeline: an ordered list of operations
//! stored as JSON. Every type here round-trips through serde, so a pipeline read
//! from storage serializes back to an equivalent document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

mod expression;
mod filter;
mod linked;
mod types;
mod value;

pub use expression::*;
pub use filter::*;
pub use linked::extract_linked_queries;
pub use types::*;
pub use value::Value;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed pipeline: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Ordered sequence of operations belonging to one query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    operations: Vec<Operation>,
}

impl Pipeline {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    /// Parse stored pipeline text. Blank or `null` text is an empty pipeline;
    /// any malformed entry rejects the whole pipeline.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, PipelineError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Operations visible when previewing up to `active_operation_idx` (inclusive).
    ///
    /// A negative or out-of-range index selects the whole pipeline.
    pub fn prefix(&self, active_operation_idx: Option<i64>) -> &[Operation] {
        match active_operation_idx {
            Some(idx) if idx >= 0 && (idx as usize) < self.operations.len() => {
                &self.operations[..=idx as usize]
            }
            _ => &self.operations,
        }
    }

    /// First `limit` operation with a non-zero value, scanning in order
    pub fn first_limit(&self) -> Option<u64> {
        self.operations.iter().find_map(|op| match op {
            Operation::Limit { limit } if *limit > 0 => Some(*limit),
            _ => None,
        })
    }

    pub fn referenced_queries(&self) -> Vec<String> {
        extract_linked_queries(&self.operations)
    }

    /// SHA-256 of the canonical JSON form
    pub fn fingerprint(&self) -> Result<String, PipelineError> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json()?.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl From<Vec<Operation>> for Pipeline {
    fn from(operations: Vec<Operation>) -> Self {
        Self::new(operations)
    }
}

/// Where a `source`, `join` or `union` reads its rows from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableRef {
    Table {
        table_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_source: Option<String>,
    },
    Query {
        query_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workbook: Option<String>,
    },
}

impl TableRef {
    pub fn table(name: impl Into<String>) -> Self {
        TableRef::Table {
            table_name: name.into(),
            data_source: None,
        }
    }

    pub fn query(name: impl Into<String>) -> Self {
        TableRef::Query {
            query_name: name.into(),
            workbook: None,
        }
    }
}

/// Pipeline operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Source {
        table: TableRef,
    },
    Join {
        table: TableRef,
        #[serde(default)]
        join_type: JoinType,
        join_condition: JoinCondition,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        select_columns: Option<Vec<String>>,
    },
    Union {
        table: TableRef,
        #[serde(default)]
        distinct: bool,
    },
    Filter {
        filter_expression: FilterNode,
    },
    FilterGroup(FilterGroup),
    Mutate {
        new_name: String,
        expression: Expression,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_type: Option<DataType>,
    },
    #[serde(alias = "summarize")]
    Aggregate {
        #[serde(default)]
        dimensions: Vec<Dimension>,
        #[serde(default)]
        measures: Vec<Measure>,
    },
    Select {
        column_names: Vec<String>,
    },
    Remove {
        column_names: Vec<String>,
    },
    Rename {
        column_name: String,
        new_name: String,
    },
    #[serde(alias = "order_by")]
    Sort {
        column_name: String,
        #[serde(default)]
        direction: SortDirection,
    },
    Limit {
        limit: u64,
    },
    #[serde(alias = "pivot_wider")]
    Pivot {
        rows: Vec<String>,
        column: String,
        values: Vec<Measure>,
        column_values: Vec<Value>,
    },
    Cast {
        column_name: String,
        data_type: DataType,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Source { .. } => "source",
            Operation::Join { .. } => "join",
            Operation::Union { .. } => "union",
            Operation::Filter { .. } => "filter",
            Operation::FilterGroup(_) => "filter_group",
            Operation::Mutate { .. } => "mutate",
            Operation::Aggregate { .. } => "aggregate",
            Operation::Select { .. } => "select",
            Operation::Remove { .. } => "remove",
            Operation::Rename { .. } => "rename",
            Operation::Sort { .. } => "sort",
            Operation::Limit { .. } => "limit",
            Operation::Pivot { .. } => "pivot",
            Operation::Cast { .. } => "cast",
        }
    }

    pub fn table_ref(&self) -> Option<&TableRef> {
        match self {
            Operation::Source { table }
            | Operation::Join { table, .. }
            | Operation::Union { table, .. } => Some(table),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left_column: String,
    pub right_column: String,
}

impl JoinCondition {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left_column: left.into(),
            right_column: right.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub column_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub fn name(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub measure_name: String,
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    CountDistinct,
    Sum,
    #[serde(alias = "mean")]
    Avg,
    Min,
    Max,
}

impl Aggregation {
    pub fn name(&self) -> &'static str {
        match self {
            Aggregation::Count => "count",
            Aggregation::CountDistinct => "count_distinct",
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_deterministic() {
        let pipeline = Pipeline::new(vec![Operation::Source {
            table: TableRef::table("users"),
        }]);
        assert_eq!(pipeline.fingerprint().unwrap(), pipeline.clone().fingerprint().unwrap());
        assert_eq!(pipeline.fingerprint().unwrap().len(), 64);
    }

    #[test]
    fn test_aliases_accepted() {
        let pipeline = Pipeline::from_value(json!([
            {"type": "source", "table": {"type": "table", "table_name": "orders"}},
            {"type": "order_by", "column_name": "created", "direction": "desc"},
            {"type": "summarize", "dimensions": [{"column_name": "status"}], "measures": []}
        ]))
        .unwrap();

        assert_eq!(pipeline.operations()[1].kind(), "sort");
        assert_eq!(pipeline.operations()[2].kind(), "aggregate");
    }

    #[test]
    fn test_one_bad_entry_rejects_pipeline() {
        let result = Pipeline::from_value(json!([
            {"type": "source", "table": {"type": "table", "table_name": "orders"}},
            {"type": "explode", "column_name": "tags"}
        ]));
        assert!(matches!(result, Err(PipelineError::Malformed(_))));

        let missing_field = Pipeline::from_value(json!([
            {"type": "limit"}
        ]));
        assert!(missing_field.is_err());
    }

    #[test]
    fn test_blank_text_is_empty_pipeline() {
        assert!(Pipeline::parse("").unwrap().is_empty());
        assert!(Pipeline::parse("null").unwrap().is_empty());
        assert!(Pipeline::parse("[]").unwrap().is_empty());
    }

    #[test]
    fn test_prefix_bounds() {
        let pipeline = Pipeline::new(vec![
            Operation::Source { table: TableRef::table("t") },
            Operation::Limit { limit: 5 },
            Operation::Select { column_names: vec!["a".to_string()] },
        ]);

        assert_eq!(pipeline.prefix(Some(0)).len(), 1);
        assert_eq!(pipeline.prefix(Some(1)).len(), 2);
        assert_eq!(pipeline.prefix(Some(2)).len(), 3);
        assert_eq!(pipeline.prefix(Some(3)).len(), 3);
        assert_eq!(pipeline.prefix(Some(-1)).len(), 3);
        assert_eq!(pipeline.prefix(None).len(), 3);
    }

    #[test]
    fn test_first_limit_skips_zero() {
        let pipeline = Pipeline::new(vec![
            Operation::Source { table: TableRef::table("t") },
            Operation::Limit { limit: 0 },
            Operation::Limit { limit: 7 },
            Operation::Limit { limit: 3 },
        ]);
        assert_eq!(pipeline.first_limit(), Some(7));
        assert_eq!(Pipeline::default().first_limit(), None);
    }
}
