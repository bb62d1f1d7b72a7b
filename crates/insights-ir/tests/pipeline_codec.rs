//! Stored-pipeline decoding and re-encoding

use insights_ir::*;
use serde_json::json;

fn full_pipeline() -> serde_json::Value {
    json!([
        {"type": "source", "table": {"type": "query", "query_name": "base_orders", "workbook": "sales"}},
        {
            "type": "join",
            "table": {"type": "table", "table_name": "customers", "data_source": "warehouse"},
            "join_type": "left",
            "join_condition": {"left_column": "customer_id", "right_column": "id"},
            "select_columns": ["name", "region"]
        },
        {"type": "union", "table": {"type": "query", "query_name": "archived_orders"}, "distinct": true},
        {
            "type": "filter",
            "filter_expression": {
                "logical_operator": "and",
                "operands": [
                    {"column": "amount", "operator": "greater_than", "value": 10.5},
                    {"column": "region", "operator": "in", "value": ["EU", "US"]},
                    {"column": "deleted_at", "operator": "is_null"}
                ]
            }
        },
        {
            "type": "filter_group",
            "logical_operator": "or",
            "filters": [{"column": "name", "operator": "contains", "value": "corp"}]
        },
        {
            "type": "mutate",
            "new_name": "amount_with_tax",
            "data_type": "Decimal",
            "expression": {
                "type": "binary",
                "op": "multiply",
                "left": {"type": "column", "column": "amount"},
                "right": {"type": "literal", "value": 1.2}
            }
        },
        {
            "type": "aggregate",
            "dimensions": [{"column_name": "created", "granularity": "month"}, {"column_name": "region"}],
            "measures": [
                {"measure_name": "total", "aggregation": "sum", "column_name": "amount_with_tax"},
                {"measure_name": "orders", "aggregation": "count"}
            ]
        },
        {"type": "select", "column_names": ["created", "region", "total"]},
        {"type": "remove", "column_names": ["region"]},
        {"type": "rename", "column_name": "total", "new_name": "revenue"},
        {"type": "sort", "column_name": "revenue", "direction": "desc"},
        {"type": "limit", "limit": 50},
        {
            "type": "pivot",
            "rows": ["created"],
            "column": "status",
            "values": [{"measure_name": "n", "aggregation": "count"}],
            "column_values": ["open", "closed"]
        },
        {"type": "cast", "column_name": "created", "data_type": "Date"}
    ])
}

#[test]
fn test_every_operation_kind_round_trips() {
    let pipeline = Pipeline::from_value(full_pipeline()).expect("pipeline should parse");
    assert_eq!(pipeline.len(), 14);

    let kinds: Vec<&str> = pipeline.operations().iter().map(Operation::kind).collect();
    assert_eq!(
        kinds,
        vec![
            "source", "join", "union", "filter", "filter_group", "mutate", "aggregate",
            "select", "remove", "rename", "sort", "limit", "pivot", "cast"
        ]
    );

    let reparsed = Pipeline::parse(&pipeline.to_json().unwrap()).expect("serialized pipeline should parse");
    assert_eq!(reparsed, pipeline);
    assert_eq!(reparsed.fingerprint().unwrap(), pipeline.fingerprint().unwrap());
}

#[test]
fn test_serialized_form_matches_stored_shape() {
    let pipeline = Pipeline::from_value(full_pipeline()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&pipeline.to_json().unwrap()).unwrap();
    assert_eq!(value, full_pipeline());
}

#[test]
fn test_referenced_queries_of_full_pipeline() {
    let pipeline = Pipeline::from_value(full_pipeline()).unwrap();
    assert_eq!(
        pipeline.referenced_queries(),
        vec!["base_orders".to_string(), "archived_orders".to_string()]
    );
}

#[test]
fn test_filter_condition_missing_column_is_malformed() {
    let result = Pipeline::from_value(json!([
        {"type": "source", "table": {"type": "table", "table_name": "t"}},
        {"type": "filter", "filter_expression": {"operator": "equals", "value": 1}}
    ]));
    assert!(matches!(result, Err(PipelineError::Malformed(_))));
}
