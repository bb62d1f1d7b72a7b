//! Filter trees used by `filter`, `filter_group` and ad-hoc filter overrides

use serde::{Deserialize, Serialize};

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[serde(alias = "And", alias = "AND")]
    And,
    #[serde(alias = "Or", alias = "OR")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[serde(alias = "=")]
    Equals,
    #[serde(alias = "!=")]
    NotEquals,
    #[serde(alias = ">")]
    GreaterThan,
    #[serde(alias = ">=")]
    GreaterThanOrEqual,
    #[serde(alias = "<")]
    LessThan,
    #[serde(alias = "<=")]
    LessThanOrEqual,
    #[serde(alias = "ilike")]
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    #[serde(alias = "is_not_set")]
    IsNull,
    #[serde(alias = "is_set")]
    IsNotNull,
    In,
    NotIn,
    Between,
}

impl FilterOperator {
    pub fn name(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::GreaterThanOrEqual => "greater_than_or_equal",
            FilterOperator::LessThan => "less_than",
            FilterOperator::LessThanOrEqual => "less_than_or_equal",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "not_contains",
            FilterOperator::StartsWith => "starts_with",
            FilterOperator::EndsWith => "ends_with",
            FilterOperator::IsNull => "is_null",
            FilterOperator::IsNotNull => "is_not_null",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::Between => "between",
        }
    }
}

/// Recursive filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group {
        logical_operator: LogicalOperator,
        operands: Vec<FilterNode>,
    },
    Condition {
        column: String,
        operator: FilterOperator,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        value: Value,
    },
}

impl FilterNode {
    pub fn condition(column: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        FilterNode::Condition {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Payload of a `filter_group` operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub filters: Vec<FilterNode>,
}

impl FilterGroup {
    pub fn and(filters: Vec<FilterNode>) -> Self {
        Self {
            logical_operator: LogicalOperator::And,
            filters,
        }
    }

    pub fn or(filters: Vec<FilterNode>) -> Self {
        Self {
            logical_operator: LogicalOperator::Or,
            filters,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
