//! Compiled relational expressions
//!
//! A [`Relation`] is an immutable tree of relational operators. Every node knows
//! its output schema and the ordering of its rows, so column references can be
//! resolved while the tree is being built rather than at execution time.

use std::sync::Arc;

use insights_ir::{Aggregation, ArithmeticOp, Column, DataType, Granularity, JoinType, ScalarFunction, Schema, Value};

use crate::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    node: RelNode,
    schema: Schema,
    ordering: Vec<SortKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelNode {
    Table {
        name: String,
    },
    Filter {
        input: Arc<Relation>,
        predicate: Scalar,
    },
    Project {
        input: Arc<Relation>,
        items: Vec<ProjectItem>,
        /// Input ordering applied by the projection itself, set when it drops a sort column
        order_by: Vec<SortKey>,
    },
    Aggregate {
        input: Arc<Relation>,
        groups: Vec<ProjectItem>,
        measures: Vec<MeasureItem>,
    },
    Join {
        left: Arc<Relation>,
        right: Arc<Relation>,
        kind: JoinType,
        left_key: String,
        right_key: String,
        /// (right-side column, output name)
        right_columns: Vec<(String, String)>,
    },
    Union {
        left: Arc<Relation>,
        right: Arc<Relation>,
        distinct: bool,
    },
    /// Marks a change of ordering; the keys live on the relation itself
    Sort {
        input: Arc<Relation>,
    },
    Limit {
        input: Arc<Relation>,
        count: u64,
    },
    Distinct {
        input: Arc<Relation>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectItem {
    pub expr: Scalar,
    pub alias: String,
}

impl ProjectItem {
    pub fn column(name: &str) -> Self {
        Self {
            expr: Scalar::Column(name.to_string()),
            alias: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureItem {
    pub call: AggCall,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggCall {
    pub func: Aggregation,
    /// `None` only for `count`, meaning every row
    pub arg: Option<Scalar>,
    pub filter: Option<Scalar>,
}

/// Engine-neutral scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Column(String),
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Scalar>,
        right: Box<Scalar>,
    },
    And(Vec<Scalar>),
    Or(Vec<Scalar>),
    Not(Box<Scalar>),
    IsNull(Box<Scalar>),
    IsNotNull(Box<Scalar>),
    InList {
        expr: Box<Scalar>,
        list: Vec<Value>,
        negated: bool,
    },
    Between {
        expr: Box<Scalar>,
        low: Value,
        high: Value,
    },
    /// Case-insensitive pattern match
    Like {
        expr: Box<Scalar>,
        pattern: String,
        negated: bool,
        /// Character that makes the following `%`, `_` or itself literal
        escape: Option<char>,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Scalar>,
        right: Box<Scalar>,
    },
    Function {
        func: ScalarFunction,
        args: Vec<Scalar>,
    },
    Cast {
        expr: Box<Scalar>,
        to: DataType,
    },
    DateTrunc {
        unit: Granularity,
        expr: Box<Scalar>,
        to: DataType,
    },
}

impl Scalar {
    pub fn column(name: &str) -> Self {
        Scalar::Column(name.to_string())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Scalar::Literal(value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Relation {
    /// Scan of a raw table with a known schema
    pub fn table(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            node: RelNode::Table { name: name.into() },
            schema,
            ordering: Vec::new(),
        }
    }

    pub fn node(&self) -> &RelNode {
        &self.node
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn ordering(&self) -> &[SortKey] {
        &self.ordering
    }

    pub(crate) fn lookup(&self, column: &str) -> Result<&Column, ExprError> {
        self.schema.find(column).ok_or_else(|| ExprError::ColumnNotFound {
            column: column.to_string(),
            available: self.schema.names().into_iter().map(String::from).collect(),
        })
    }

    pub(crate) fn filtered(self, predicate: Scalar) -> Self {
        let schema = self.schema.clone();
        let ordering = self.ordering.clone();
        Self {
            node: RelNode::Filter {
                input: Arc::new(self),
                predicate,
            },
            schema,
            ordering,
        }
    }

    /// Projection; `schema` must line up with `items`. Ordering follows
    /// columns passed through by name. If a sort column is dropped or rewritten,
    /// the projection sorts its input itself and the result carries no ordering.
    pub(crate) fn projected(self, items: Vec<ProjectItem>, schema: Schema) -> Self {
        let mut ordering = Vec::new();
        for key in &self.ordering {
            let passthrough = items
                .iter()
                .find(|item| matches!(&item.expr, Scalar::Column(c) if *c == key.column));
            match passthrough {
                Some(item) => ordering.push(SortKey {
                    column: item.alias.clone(),
                    descending: key.descending,
                }),
                None => break,
            }
        }
        let order_by = if ordering.len() < self.ordering.len() {
            ordering.clear();
            self.ordering.clone()
        } else {
            Vec::new()
        };
        Self {
            node: RelNode::Project {
                input: Arc::new(self),
                items,
                order_by,
            },
            schema,
            ordering,
        }
    }

    pub(crate) fn aggregated(self, groups: Vec<ProjectItem>, measures: Vec<MeasureItem>, schema: Schema) -> Self {
        Self {
            node: RelNode::Aggregate {
                input: Arc::new(self),
                groups,
                measures,
            },
            schema,
            ordering: Vec::new(),
        }
    }

    pub(crate) fn joined(
        self,
        right: Relation,
        kind: JoinType,
        left_key: String,
        right_key: String,
        right_columns: Vec<(String, String)>,
        schema: Schema,
    ) -> Self {
        let ordering = self.ordering.clone();
        Self {
            node: RelNode::Join {
                left: Arc::new(self),
                right: Arc::new(right),
                kind,
                left_key,
                right_key,
                right_columns,
            },
            schema,
            ordering,
        }
    }

    /// `schema` is the widened column set of both sides
    pub(crate) fn unioned(self, right: Relation, distinct: bool, schema: Schema) -> Self {
        Self {
            node: RelNode::Union {
                left: Arc::new(self),
                right: Arc::new(right),
                distinct,
            },
            schema,
            ordering: Vec::new(),
        }
    }

    /// Adds `key` as the lowest-priority sort key, replacing an existing key on the same column
    pub(crate) fn sorted(self, key: SortKey) -> Self {
        let schema = self.schema.clone();
        let mut ordering: Vec<SortKey> = self
            .ordering
            .iter()
            .filter(|k| k.column != key.column)
            .cloned()
            .collect();
        ordering.push(key);
        Self {
            node: RelNode::Sort { input: Arc::new(self) },
            schema,
            ordering,
        }
    }

    pub fn limited(self, count: u64) -> Self {
        let schema = self.schema.clone();
        let ordering = self.ordering.clone();
        Self {
            node: RelNode::Limit {
                input: Arc::new(self),
                count,
            },
            schema,
            ordering,
        }
    }

    pub(crate) fn distinct(self) -> Self {
        let schema = self.schema.clone();
        Self {
            node: RelNode::Distinct { input: Arc::new(self) },
            schema,
            ordering: Vec::new(),
        }
    }

    /// Single-row relation holding the number of rows, in a column named `count`
    pub fn count_rows(self) -> Self {
        let measures = vec![MeasureItem {
            call: AggCall {
                func: Aggregation::Count,
                arg: None,
                filter: None,
            },
            alias: "count".to_string(),
        }];
        let schema = Schema::new(vec![Column::new("count", DataType::Integer)]);
        self.aggregated(Vec::new(), measures, schema)
    }

    /// Distinct non-null values of one column, optionally restricted to values
    /// containing `search_term` (case-insensitive), capped at `limit` rows.
    pub fn distinct_values(self, column: &str, search_term: Option<&str>, limit: u64) -> Result<Self, ExprError> {
        let source = self.lookup(column)?.clone();
        let projected = self.projected(
            vec![ProjectItem::column(&source.name)],
            Schema::new(vec![source.clone()]),
        );

        let predicate = match search_term.filter(|term| !term.is_empty()) {
            Some(term) => {
                let expr = if source.data_type.is_textual() {
                    Scalar::column(&source.name)
                } else {
                    Scalar::Cast {
                        expr: Box::new(Scalar::column(&source.name)),
                        to: DataType::String,
                    }
                };
                Scalar::Like {
                    expr: Box::new(expr),
                    pattern: format!("%{}%", term),
                    negated: false,
                    escape: None,
                }
            }
            None => Scalar::IsNotNull(Box::new(Scalar::column(&source.name))),
        };

        Ok(projected.filtered(predicate).distinct().limited(limit))
    }
}
