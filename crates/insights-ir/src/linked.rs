//! Extraction of the queries a pipeline reads from

use crate::{Operation, TableRef};

/// Names of the queries referenced by `source`, `join` and `union` operations.
///
/// Order is first-seen and duplicates are kept, so the result can be stored
/// verbatim as a query's `linked_queries` field.
pub fn extract_linked_queries(operations: &[Operation]) -> Vec<String> {
    operations
        .iter()
        .filter_map(Operation::table_ref)
        .filter_map(|table| match table {
            TableRef::Query { query_name, .. } if !query_name.is_empty() => Some(query_name.clone()),
            _ => None,
        })
        .collect()
}
