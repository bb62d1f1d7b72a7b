//! Operation → relation translation
//!
//! [`translate`] applies one pipeline operation to the relation built so far.
//! Table-reading operations (`source`, `join`, `union`) go through a
//! [`TableResolver`] so the caller decides how a table or query reference becomes
//! a relation; everything else is a pure function of its input.

use std::collections::HashSet;
use std::sync::OnceLock;

use insights_ir::{
    Aggregation, ArithmeticOp, Column, DataType, Dimension, Expression, FilterNode, FilterOperator, JoinCondition,
    JoinType, LogicalOperator, Measure, Operation, Schema, SortDirection, TableRef, Value,
};
use tracing::trace;

use crate::functions::FunctionRegistry;
use crate::relation::{AggCall, CompareOp, MeasureItem, ProjectItem, Relation, Scalar, SortKey};
use crate::ExprError;

/// Turns a table reference into a relation
pub trait TableResolver {
    type Error: From<ExprError>;

    fn resolve(&mut self, table: &TableRef) -> Result<Relation, Self::Error>;
}

/// Apply `op` to `current`. `source` ignores `current` and produces the base
/// relation; every other operation requires one.
pub fn translate<R: TableResolver>(
    op: &Operation,
    current: Option<Relation>,
    resolver: &mut R,
) -> Result<Relation, R::Error> {
    trace!(kind = op.kind(), "Translating operation");

    if let Operation::Source { table } = op {
        return resolver.resolve(table);
    }

    let input = current.ok_or_else(|| ExprError::MissingInput(op.kind().to_string()))?;
    match op {
        Operation::Join {
            table,
            join_type,
            join_condition,
            select_columns,
        } => {
            let right = resolver.resolve(table)?;
            Ok(join(input, right, *join_type, join_condition, select_columns.as_deref())?)
        }
        Operation::Union { table, distinct } => {
            let right = resolver.resolve(table)?;
            Ok(union(input, right, *distinct)?)
        }
        other => Ok(apply(other, input)?),
    }
}

/// Apply an operation that does not read another table
pub fn apply(op: &Operation, input: Relation) -> Result<Relation, ExprError> {
    match op {
        Operation::Source { .. } | Operation::Join { .. } | Operation::Union { .. } => {
            Err(ExprError::malformed(op.kind(), "reads a table and needs a resolver"))
        }
        Operation::Filter { filter_expression } => {
            let predicate = filter_predicate(filter_expression, input.schema())?;
            Ok(match predicate {
                Some(predicate) => input.filtered(predicate),
                None => input,
            })
        }
        Operation::FilterGroup(group) => {
            let predicate = combine_filters(group.logical_operator, &group.filters, input.schema())?;
            Ok(match predicate {
                Some(predicate) => input.filtered(predicate),
                None => input,
            })
        }
        Operation::Mutate {
            new_name,
            expression,
            data_type,
        } => mutate(input, new_name, expression, *data_type),
        Operation::Aggregate { dimensions, measures } => aggregate(input, dimensions, measures),
        Operation::Select { column_names } => select(input, column_names),
        Operation::Remove { column_names } => remove(input, column_names),
        Operation::Rename { column_name, new_name } => rename(input, column_name, new_name),
        Operation::Sort {
            column_name,
            direction,
        } => {
            let column = input.lookup(column_name)?.name.clone();
            Ok(input.sorted(SortKey {
                column,
                descending: *direction == SortDirection::Desc,
            }))
        }
        // zero means no limit
        Operation::Limit { limit } if *limit == 0 => Ok(input),
        Operation::Limit { limit } => Ok(input.limited(*limit)),
        Operation::Pivot {
            rows,
            column,
            values,
            column_values,
        } => pivot(input, rows, column, values, column_values),
        Operation::Cast {
            column_name,
            data_type,
        } => cast(input, column_name, *data_type),
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Boolean predicate for a filter tree; `None` when the tree has no conditions
pub fn filter_predicate(node: &FilterNode, schema: &Schema) -> Result<Option<Scalar>, ExprError> {
    match node {
        FilterNode::Group {
            logical_operator,
            operands,
        } => combine_filters(*logical_operator, operands, schema),
        FilterNode::Condition {
            column,
            operator,
            value,
        } => condition(column, *operator, value, schema).map(Some),
    }
}

fn combine_filters(
    logical_operator: LogicalOperator,
    nodes: &[FilterNode],
    schema: &Schema,
) -> Result<Option<Scalar>, ExprError> {
    let mut parts = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Some(predicate) = filter_predicate(node, schema)? {
            parts.push(predicate);
        }
    }
    Ok(match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(match logical_operator {
            LogicalOperator::And => Scalar::And(parts),
            LogicalOperator::Or => Scalar::Or(parts),
        }),
    })
}

fn condition(column: &str, operator: FilterOperator, value: &Value, schema: &Schema) -> Result<Scalar, ExprError> {
    let col = find_column(schema, column)?;
    let col_type = col.data_type;
    let op_name = operator.name();

    let compare = |op: CompareOp| -> Result<Scalar, ExprError> {
        check_comparable(op_name, col_type, value)?;
        if col_type == DataType::Boolean && !matches!(op, CompareOp::Eq | CompareOp::Ne) {
            return Err(ExprError::unsupported(op_name, &[col_type.name(), value.type_name()]));
        }
        Ok(Scalar::Compare {
            op,
            left: Box::new(Scalar::column(&col.name)),
            right: Box::new(Scalar::Literal(value.clone())),
        })
    };
    let expr = Box::new(Scalar::column(&col.name));

    match operator {
        FilterOperator::Equals => compare(CompareOp::Eq),
        FilterOperator::NotEquals => compare(CompareOp::Ne),
        FilterOperator::GreaterThan => compare(CompareOp::Gt),
        FilterOperator::GreaterThanOrEqual => compare(CompareOp::Ge),
        FilterOperator::LessThan => compare(CompareOp::Lt),
        FilterOperator::LessThanOrEqual => compare(CompareOp::Le),
        FilterOperator::Contains
        | FilterOperator::NotContains
        | FilterOperator::StartsWith
        | FilterOperator::EndsWith => {
            let text = match value {
                Value::String(s) if col_type.is_textual() || col_type == DataType::Unknown => s,
                _ => return Err(ExprError::unsupported(op_name, &[col_type.name(), value.type_name()])),
            };
            let text = escape_like(text);
            let pattern = match operator {
                FilterOperator::StartsWith => format!("{}%", text),
                FilterOperator::EndsWith => format!("%{}", text),
                _ => format!("%{}%", text),
            };
            Ok(Scalar::Like {
                expr,
                pattern,
                negated: operator == FilterOperator::NotContains,
                escape: Some(LIKE_ESCAPE),
            })
        }
        FilterOperator::IsNull => Ok(Scalar::IsNull(expr)),
        FilterOperator::IsNotNull => Ok(Scalar::IsNotNull(expr)),
        FilterOperator::In | FilterOperator::NotIn => {
            let negated = operator == FilterOperator::NotIn;
            let Value::Array(items) = value else {
                return Err(ExprError::unsupported(op_name, &[col_type.name(), value.type_name()]));
            };
            for item in items {
                check_comparable(op_name, col_type, item)?;
            }
            if items.is_empty() {
                return Ok(Scalar::Literal(Value::Bool(negated)));
            }
            Ok(Scalar::InList {
                expr,
                list: items.clone(),
                negated,
            })
        }
        FilterOperator::Between => match value {
            Value::Array(bounds) if bounds.len() == 2 => {
                check_comparable(op_name, col_type, &bounds[0])?;
                check_comparable(op_name, col_type, &bounds[1])?;
                Ok(Scalar::Between {
                    expr,
                    low: bounds[0].clone(),
                    high: bounds[1].clone(),
                })
            }
            _ => Err(ExprError::unsupported(op_name, &[col_type.name(), value.type_name()])),
        },
    }
}

/// Whether a literal can be compared against a column of `col_type`
fn literal_compatible(col_type: DataType, value: &Value) -> bool {
    match value {
        Value::Null | Value::Array(_) => false,
        _ if col_type == DataType::Unknown => true,
        Value::Int(_) | Value::Float(_) => col_type.is_numeric(),
        Value::String(_) => col_type.is_textual() || col_type.is_temporal(),
        Value::Bool(_) => col_type == DataType::Boolean,
    }
}

fn check_comparable(operator: &str, col_type: DataType, value: &Value) -> Result<(), ExprError> {
    if literal_compatible(col_type, value) {
        Ok(())
    } else {
        Err(ExprError::unsupported(operator, &[col_type.name(), value.type_name()]))
    }
}

// ---------------------------------------------------------------------------
// Computed columns
// ---------------------------------------------------------------------------

fn registry() -> &'static FunctionRegistry {
    static REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Typed scalar for a `mutate` expression
pub fn scalar_expression(expr: &Expression, schema: &Schema) -> Result<(Scalar, DataType), ExprError> {
    match expr {
        Expression::Column { column } => {
            let col = find_column(schema, column)?;
            Ok((Scalar::column(&col.name), col.data_type))
        }
        Expression::Literal { value } => {
            let data_type = match value {
                Value::Null => DataType::Unknown,
                Value::Bool(_) => DataType::Boolean,
                Value::Int(_) => DataType::Integer,
                Value::Float(_) => DataType::Decimal,
                Value::String(_) => DataType::String,
                Value::Array(_) => return Err(ExprError::unsupported("literal", &["array"])),
            };
            Ok((Scalar::Literal(value.clone()), data_type))
        }
        Expression::Binary { op, left, right } => {
            let (left, left_type) = scalar_expression(left, schema)?;
            let (right, right_type) = scalar_expression(right, schema)?;
            let numeric = |t: DataType| t.is_numeric() || t == DataType::Unknown;
            if !numeric(left_type) || !numeric(right_type) {
                return Err(ExprError::unsupported(op.name(), &[left_type.name(), right_type.name()]));
            }
            let data_type = if *op == ArithmeticOp::Divide
                || left_type == DataType::Decimal
                || right_type == DataType::Decimal
            {
                DataType::Decimal
            } else {
                DataType::Integer
            };
            Ok((
                Scalar::Arithmetic {
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                data_type,
            ))
        }
        Expression::Function { function, args } => {
            let mut scalars = Vec::with_capacity(args.len());
            let mut types = Vec::with_capacity(args.len());
            for arg in args {
                let (scalar, data_type) = scalar_expression(arg, schema)?;
                scalars.push(scalar);
                types.push(data_type);
            }
            let data_type = registry().resolve(*function, &types)?;
            Ok((
                Scalar::Function {
                    func: *function,
                    args: scalars,
                },
                data_type,
            ))
        }
    }
}

fn mutate(input: Relation, new_name: &str, expression: &Expression, cast_to: Option<DataType>) -> Result<Relation, ExprError> {
    if new_name.is_empty() {
        return Err(ExprError::malformed("mutate", "new_name is empty"));
    }
    let (mut scalar, mut data_type) = scalar_expression(expression, input.schema())?;
    if let Some(target) = cast_to {
        check_cast_target(data_type, target)?;
        scalar = Scalar::Cast {
            expr: Box::new(scalar),
            to: target,
        };
        data_type = target;
    }

    let mut items: Vec<ProjectItem> = input.schema().columns.iter().map(|c| ProjectItem::column(&c.name)).collect();
    let mut columns = input.schema().columns.clone();
    let computed = ProjectItem {
        expr: scalar,
        alias: new_name.to_string(),
    };
    match input.schema().position(new_name) {
        Some(idx) => {
            items[idx] = computed;
            columns[idx] = Column::new(new_name, data_type);
        }
        None => {
            items.push(computed);
            columns.push(Column::new(new_name, data_type));
        }
    }
    Ok(input.projected(items, Schema::new(columns)))
}

const LIKE_ESCAPE: char = '\\';

/// Makes `%`, `_` and the escape character match themselves
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

fn check_cast_target(from: DataType, to: DataType) -> Result<(), ExprError> {
    if to == DataType::Unknown {
        return Err(ExprError::unsupported("cast", &[from.name(), to.name()]));
    }
    Ok(())
}

fn cast(input: Relation, column_name: &str, data_type: DataType) -> Result<Relation, ExprError> {
    let col = input.lookup(column_name)?.clone();
    check_cast_target(col.data_type, data_type)?;

    let mut items = Vec::with_capacity(input.schema().len());
    let mut columns = Vec::with_capacity(input.schema().len());
    for c in &input.schema().columns {
        if c.name == col.name {
            items.push(ProjectItem {
                expr: Scalar::Cast {
                    expr: Box::new(Scalar::column(&c.name)),
                    to: data_type,
                },
                alias: c.name.clone(),
            });
            columns.push(Column::new(c.name.clone(), data_type));
        } else {
            items.push(ProjectItem::column(&c.name));
            columns.push(c.clone());
        }
    }
    Ok(input.projected(items, Schema::new(columns)))
}

// ---------------------------------------------------------------------------
// Column selection
// ---------------------------------------------------------------------------

fn select(input: Relation, column_names: &[String]) -> Result<Relation, ExprError> {
    if column_names.is_empty() {
        return Err(ExprError::malformed("select", "no columns given"));
    }
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(column_names.len());
    for name in column_names {
        let col = input.lookup(name)?;
        if !seen.insert(name.as_str()) {
            return Err(ExprError::malformed("select", format!("column '{}' listed twice", name)));
        }
        columns.push(col.clone());
    }
    let items = columns.iter().map(|c| ProjectItem::column(&c.name)).collect();
    Ok(input.projected(items, Schema::new(columns)))
}

fn remove(input: Relation, column_names: &[String]) -> Result<Relation, ExprError> {
    if column_names.is_empty() {
        return Err(ExprError::malformed("remove", "no columns given"));
    }
    for name in column_names {
        input.lookup(name)?;
    }
    let columns: Vec<Column> = input
        .schema()
        .columns
        .iter()
        .filter(|c| !column_names.contains(&c.name))
        .cloned()
        .collect();
    if columns.is_empty() {
        return Err(ExprError::malformed("remove", "cannot remove every column"));
    }
    let items = columns.iter().map(|c| ProjectItem::column(&c.name)).collect();
    Ok(input.projected(items, Schema::new(columns)))
}

fn rename(input: Relation, column_name: &str, new_name: &str) -> Result<Relation, ExprError> {
    input.lookup(column_name)?;
    if new_name.is_empty() {
        return Err(ExprError::malformed("rename", "new_name is empty"));
    }
    if new_name == column_name {
        return Ok(input);
    }
    if input.schema().contains(new_name) {
        return Err(ExprError::malformed("rename", format!("column '{}' already exists", new_name)));
    }

    let mut items = Vec::with_capacity(input.schema().len());
    let mut columns = Vec::with_capacity(input.schema().len());
    for c in &input.schema().columns {
        let alias = if c.name == column_name { new_name } else { c.name.as_str() };
        items.push(ProjectItem {
            expr: Scalar::column(&c.name),
            alias: alias.to_string(),
        });
        columns.push(Column::new(alias, c.data_type));
    }
    Ok(input.projected(items, Schema::new(columns)))
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn aggregate(input: Relation, dimensions: &[Dimension], measures: &[Measure]) -> Result<Relation, ExprError> {
    if dimensions.is_empty() && measures.is_empty() {
        return Err(ExprError::malformed("aggregate", "requires at least one dimension or measure"));
    }

    let mut names = OutputNames::new("aggregate");
    let mut groups = Vec::with_capacity(dimensions.len());
    let mut columns = Vec::with_capacity(dimensions.len() + measures.len());

    for dim in dimensions {
        let col = input.lookup(&dim.column_name)?;
        let (expr, data_type) = match dim.granularity {
            None => (Scalar::column(&col.name), col.data_type),
            Some(unit) => {
                let to = match col.data_type {
                    DataType::Date => DataType::Date,
                    DataType::Datetime | DataType::Unknown => DataType::Datetime,
                    other => return Err(ExprError::unsupported(unit.name(), &[other.name()])),
                };
                (
                    Scalar::DateTrunc {
                        unit,
                        expr: Box::new(Scalar::column(&col.name)),
                        to,
                    },
                    to,
                )
            }
        };
        names.claim(&col.name)?;
        columns.push(Column::new(col.name.clone(), data_type));
        groups.push(ProjectItem {
            expr,
            alias: col.name.clone(),
        });
    }

    let mut items = Vec::with_capacity(measures.len());
    for measure in measures {
        let (call, data_type) = measure_call(measure, input.schema(), None)?;
        names.claim(&measure.measure_name)?;
        columns.push(Column::new(measure.measure_name.clone(), data_type));
        items.push(MeasureItem {
            call,
            alias: measure.measure_name.clone(),
        });
    }

    Ok(input.aggregated(groups, items, Schema::new(columns)))
}

fn measure_call(measure: &Measure, schema: &Schema, filter: Option<Scalar>) -> Result<(AggCall, DataType), ExprError> {
    if measure.measure_name.is_empty() {
        return Err(ExprError::malformed("aggregate", "measure_name is empty"));
    }
    let func = measure.aggregation;
    let column = match measure.column_name.as_deref().filter(|c| !c.is_empty()) {
        Some(name) => Some(find_column(schema, name)?),
        None if func == Aggregation::Count => None,
        None => {
            return Err(ExprError::malformed(
                "aggregate",
                format!("measure '{}' needs a column for {}", measure.measure_name, func.name()),
            ))
        }
    };

    let data_type = match (func, column) {
        (Aggregation::Count | Aggregation::CountDistinct, _) => DataType::Integer,
        (_, None) => DataType::Unknown,
        (Aggregation::Sum | Aggregation::Avg, Some(col))
            if !(col.data_type.is_numeric() || col.data_type == DataType::Unknown) =>
        {
            return Err(ExprError::unsupported(func.name(), &[col.data_type.name()]));
        }
        (Aggregation::Avg, Some(_)) => DataType::Decimal,
        (Aggregation::Sum | Aggregation::Min | Aggregation::Max, Some(col)) => col.data_type,
    };

    Ok((
        AggCall {
            func,
            arg: column.map(|c| Scalar::column(&c.name)),
            filter,
        },
        data_type,
    ))
}

fn pivot(
    input: Relation,
    rows: &[String],
    column: &str,
    values: &[Measure],
    column_values: &[Value],
) -> Result<Relation, ExprError> {
    let pivot_col = input.lookup(column)?.clone();
    if values.is_empty() {
        return Err(ExprError::malformed("pivot", "requires at least one value measure"));
    }
    if column_values.is_empty() {
        return Err(ExprError::malformed("pivot", "requires explicit column_values"));
    }

    let mut names = OutputNames::new("pivot");
    let mut groups = Vec::with_capacity(rows.len());
    let mut columns = Vec::new();
    for row in rows {
        let col = input.lookup(row)?;
        names.claim(&col.name)?;
        groups.push(ProjectItem::column(&col.name));
        columns.push(col.clone());
    }

    let mut measures = Vec::with_capacity(column_values.len() * values.len());
    for value in column_values {
        check_comparable("pivot", pivot_col.data_type, value)?;
        for measure in values {
            let filter = Scalar::Compare {
                op: CompareOp::Eq,
                left: Box::new(Scalar::column(&pivot_col.name)),
                right: Box::new(Scalar::Literal(value.clone())),
            };
            let (call, data_type) = measure_call(measure, input.schema(), Some(filter))?;
            let alias = if values.len() == 1 {
                value.label()
            } else {
                format!("{}_{}", value.label(), measure.measure_name)
            };
            names.claim(&alias)?;
            columns.push(Column::new(alias.clone(), data_type));
            measures.push(MeasureItem { call, alias });
        }
    }

    Ok(input.aggregated(groups, measures, Schema::new(columns)))
}

struct OutputNames {
    operation: &'static str,
    seen: HashSet<String>,
}

impl OutputNames {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            seen: HashSet::new(),
        }
    }

    fn claim(&mut self, name: &str) -> Result<(), ExprError> {
        if self.seen.insert(name.to_string()) {
            Ok(())
        } else {
            Err(ExprError::malformed(self.operation, format!("duplicate output column '{}'", name)))
        }
    }
}

// ---------------------------------------------------------------------------
// Joins and unions
// ---------------------------------------------------------------------------

/// Join `right` onto `left`. Right-side columns that collide with an existing
/// name get a `_right` suffix, numbered on further collisions.
pub fn join(
    left: Relation,
    right: Relation,
    kind: JoinType,
    condition: &JoinCondition,
    select_columns: Option<&[String]>,
) -> Result<Relation, ExprError> {
    let left_key = left.lookup(&condition.left_column)?.clone();
    let right_key = right.lookup(&condition.right_column)?.clone();
    if !left_key.data_type.is_comparable_with(&right_key.data_type) {
        return Err(ExprError::unsupported(
            "join",
            &[left_key.data_type.name(), right_key.data_type.name()],
        ));
    }

    let kept: Vec<Column> = match select_columns {
        Some(names) => names
            .iter()
            .map(|name| right.lookup(name).cloned())
            .collect::<Result<_, _>>()?,
        None => right.schema().columns.clone(),
    };

    let mut columns = left.schema().columns.clone();
    let mut taken: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
    let mut right_columns = Vec::with_capacity(kept.len());
    for col in kept {
        let alias = unique_name(&col.name, &taken);
        taken.insert(alias.clone());
        columns.push(Column::new(alias.clone(), col.data_type));
        right_columns.push((col.name, alias));
    }

    Ok(left.joined(right, kind, left_key.name, right_key.name, right_columns, Schema::new(columns)))
}

fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let base = format!("{}_right", name);
    if !taken.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Stack `right` under `left`; both sides need the same column names in the same order
pub fn union(left: Relation, right: Relation, distinct: bool) -> Result<Relation, ExprError> {
    let l = &left.schema().columns;
    let r = &right.schema().columns;
    let widened: Option<Vec<Column>> = if l.len() == r.len() {
        l.iter()
            .zip(r)
            .map(|(a, b)| {
                let data_type = if a.name == b.name { a.data_type.widened_with(&b.data_type) } else { None };
                data_type.map(|t| Column::new(a.name.clone(), t))
            })
            .collect()
    } else {
        None
    };
    let Some(columns) = widened else {
        let (l, r) = (describe(left.schema()), describe(right.schema()));
        return Err(ExprError::unsupported("union", &[l.as_str(), r.as_str()]));
    };
    Ok(left.unioned(right, distinct, Schema::new(columns)))
}

fn describe(schema: &Schema) -> String {
    let parts: Vec<String> = schema
        .columns
        .iter()
        .map(|c| format!("{}: {}", c.name, c.data_type))
        .collect();
    format!("[{}]", parts.join(", "))
}

fn find_column<'a>(schema: &'a Schema, name: &str) -> Result<&'a Column, ExprError> {
    schema.find(name).ok_or_else(|| ExprError::ColumnNotFound {
        column: name.to_string(),
        available: schema.names().into_iter().map(String::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_ir::{FilterGroup, Granularity};
    use serde_json::json;

    use crate::relation::RelNode;

    fn orders() -> Relation {
        Relation::table(
            "orders",
            Schema::new(vec![
                Column::new("id", DataType::Integer),
                Column::new("customer_id", DataType::Integer),
                Column::new("status", DataType::String),
                Column::new("amount", DataType::Decimal),
                Column::new("paid", DataType::Boolean),
                Column::new("created", DataType::Datetime),
            ]),
        )
    }

    fn op(value: serde_json::Value) -> Operation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_filter_on_missing_column() {
        let err = apply(
            &op(json!({"type": "filter", "filter_expression": {"column": "region", "operator": "=", "value": "EU"}})),
            orders(),
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::ColumnNotFound { ref column, .. } if column == "region"));
    }

    #[test]
    fn test_filter_type_mismatch() {
        let err = apply(
            &op(json!({"type": "filter", "filter_expression": {"column": "amount", "operator": "=", "value": "lots"}})),
            orders(),
        )
        .unwrap_err();
        assert_eq!(err, ExprError::unsupported("equals", &["Decimal", "string"]));

        let err = apply(
            &op(json!({"type": "filter", "filter_expression": {"column": "paid", "operator": ">", "value": true}})),
            orders(),
        )
        .unwrap_err();
        assert_eq!(err, ExprError::unsupported("greater_than", &["Boolean", "boolean"]));
    }

    #[test]
    fn test_null_comparison_is_unsupported() {
        let err = apply(
            &op(json!({"type": "filter", "filter_expression": {"column": "status", "operator": "equals"}})),
            orders(),
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_empty_filter_group_is_noop() {
        let rel = apply(&Operation::FilterGroup(FilterGroup::or(vec![])), orders()).unwrap();
        assert_eq!(rel, orders());
    }

    #[test]
    fn test_empty_in_list() {
        let rel = apply(
            &op(json!({"type": "filter", "filter_expression": {"column": "status", "operator": "in", "value": []}})),
            orders(),
        )
        .unwrap();
        match rel.node() {
            RelNode::Filter { predicate, .. } => assert_eq!(*predicate, Scalar::Literal(Value::Bool(false))),
            other => panic!("expected filter, got {:?}", other),
        }
    }

    #[test]
    fn test_between_requires_two_bounds() {
        let err = apply(
            &op(json!({"type": "filter", "filter_expression": {"column": "amount", "operator": "between", "value": [1]}})),
            orders(),
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::UnsupportedOperation { ref operator, .. } if operator == "between"));
    }

    #[test]
    fn test_contains_needs_text_column() {
        let err = apply(
            &op(json!({"type": "filter", "filter_expression": {"column": "amount", "operator": "contains", "value": "1"}})),
            orders(),
        )
        .unwrap_err();
        assert_eq!(err, ExprError::unsupported("contains", &["Decimal", "string"]));
    }

    #[test]
    fn test_pattern_operators_match_literal_text() {
        let rel = apply(
            &op(json!({"type": "filter", "filter_expression": {"column": "status", "operator": "starts_with", "value": "50%_a\\b"}})),
            orders(),
        )
        .unwrap();
        match rel.node() {
            RelNode::Filter { predicate, .. } => assert_eq!(
                *predicate,
                Scalar::Like {
                    expr: Box::new(Scalar::column("status")),
                    pattern: "50\\%\\_a\\\\b%".to_string(),
                    negated: false,
                    escape: Some('\\'),
                }
            ),
            other => panic!("expected filter, got {:?}", other),
        }
    }

    #[test]
    fn test_mutate_replaces_in_place() {
        let rel = apply(
            &op(json!({
                "type": "mutate",
                "new_name": "amount",
                "expression": {"type": "binary", "op": "multiply",
                               "left": {"type": "column", "column": "amount"},
                               "right": {"type": "literal", "value": 2}}
            })),
            orders(),
        )
        .unwrap();
        assert_eq!(rel.schema().names(), orders().schema().names());
        assert_eq!(rel.schema().find("amount").unwrap().data_type, DataType::Decimal);
    }

    #[test]
    fn test_mutate_appends_with_cast() {
        let rel = apply(
            &op(json!({
                "type": "mutate",
                "new_name": "label",
                "expression": {"type": "function", "function": "upper",
                               "args": [{"type": "column", "column": "status"}]},
                "data_type": "Text"
            })),
            orders(),
        )
        .unwrap();
        assert_eq!(rel.schema().columns.last().unwrap(), &Column::new("label", DataType::Text));
    }

    #[test]
    fn test_mutate_arithmetic_on_text() {
        let err = apply(
            &op(json!({
                "type": "mutate",
                "new_name": "x",
                "expression": {"type": "binary", "op": "add",
                               "left": {"type": "column", "column": "status"},
                               "right": {"type": "literal", "value": 1}}
            })),
            orders(),
        )
        .unwrap_err();
        assert_eq!(err, ExprError::unsupported("add", &["String", "Integer"]));
    }

    #[test]
    fn test_aggregate_schema_and_types() {
        let rel = apply(
            &Operation::Aggregate {
                dimensions: vec![
                    Dimension {
                        column_name: "status".to_string(),
                        granularity: None,
                    },
                    Dimension {
                        column_name: "created".to_string(),
                        granularity: Some(Granularity::Month),
                    },
                ],
                measures: vec![
                    Measure {
                        measure_name: "orders".to_string(),
                        aggregation: Aggregation::Count,
                        column_name: None,
                    },
                    Measure {
                        measure_name: "avg_amount".to_string(),
                        aggregation: Aggregation::Avg,
                        column_name: Some("amount".to_string()),
                    },
                    Measure {
                        measure_name: "max_id".to_string(),
                        aggregation: Aggregation::Max,
                        column_name: Some("id".to_string()),
                    },
                ],
            },
            orders(),
        )
        .unwrap();

        let types: Vec<(&str, DataType)> = rel
            .schema()
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type))
            .collect();
        assert_eq!(
            types,
            vec![
                ("status", DataType::String),
                ("created", DataType::Datetime),
                ("orders", DataType::Integer),
                ("avg_amount", DataType::Decimal),
                ("max_id", DataType::Integer),
            ]
        );
    }

    #[test]
    fn test_aggregate_requires_something() {
        let err = apply(
            &Operation::Aggregate {
                dimensions: vec![],
                measures: vec![],
            },
            orders(),
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::Malformed { .. }));
    }

    #[test]
    fn test_sum_of_text_is_unsupported() {
        let err = apply(
            &Operation::Aggregate {
                dimensions: vec![],
                measures: vec![Measure {
                    measure_name: "total".to_string(),
                    aggregation: Aggregation::Sum,
                    column_name: Some("status".to_string()),
                }],
            },
            orders(),
        )
        .unwrap_err();
        assert_eq!(err, ExprError::unsupported("sum", &["String"]));
    }

    #[test]
    fn test_granularity_on_text_is_unsupported() {
        let err = apply(
            &Operation::Aggregate {
                dimensions: vec![Dimension {
                    column_name: "status".to_string(),
                    granularity: Some(Granularity::Year),
                }],
                measures: vec![],
            },
            orders(),
        )
        .unwrap_err();
        assert_eq!(err, ExprError::unsupported("year", &["String"]));
    }

    #[test]
    fn test_select_remove_rename() {
        let selected = apply(
            &Operation::Select {
                column_names: vec!["status".to_string(), "id".to_string()],
            },
            orders(),
        )
        .unwrap();
        assert_eq!(selected.schema().names(), vec!["status", "id"]);

        let removed = apply(
            &Operation::Remove {
                column_names: vec!["paid".to_string(), "created".to_string()],
            },
            orders(),
        )
        .unwrap();
        assert_eq!(removed.schema().names(), vec!["id", "customer_id", "status", "amount"]);

        let renamed = apply(
            &Operation::Rename {
                column_name: "status".to_string(),
                new_name: "state".to_string(),
            },
            orders(),
        )
        .unwrap();
        assert_eq!(renamed.schema().columns[2], Column::new("state", DataType::String));

        let clash = apply(
            &Operation::Rename {
                column_name: "status".to_string(),
                new_name: "id".to_string(),
            },
            orders(),
        );
        assert!(matches!(clash, Err(ExprError::Malformed { .. })));
    }

    #[test]
    fn test_remove_everything_is_rejected() {
        let rel = Relation::table("t", Schema::new(vec![Column::new("a", DataType::String)]));
        let err = apply(
            &Operation::Remove {
                column_names: vec!["a".to_string()],
            },
            rel,
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::Malformed { .. }));
    }

    #[test]
    fn test_pivot_output_columns() {
        let rel = apply(
            &op(json!({
                "type": "pivot_wider",
                "rows": ["customer_id"],
                "column": "status",
                "values": [{"measure_name": "total", "aggregation": "sum", "column_name": "amount"}],
                "column_values": ["open", "closed"]
            })),
            orders(),
        )
        .unwrap();
        assert_eq!(rel.schema().names(), vec!["customer_id", "open", "closed"]);

        let multi = apply(
            &op(json!({
                "type": "pivot",
                "rows": [],
                "column": "status",
                "values": [
                    {"measure_name": "total", "aggregation": "sum", "column_name": "amount"},
                    {"measure_name": "n", "aggregation": "count"}
                ],
                "column_values": ["open"]
            })),
            orders(),
        )
        .unwrap();
        assert_eq!(multi.schema().names(), vec!["open_total", "open_n"]);
    }

    #[test]
    fn test_pivot_requires_values() {
        let err = apply(
            &op(json!({
                "type": "pivot",
                "rows": ["customer_id"],
                "column": "status",
                "values": [{"measure_name": "n", "aggregation": "count"}],
                "column_values": []
            })),
            orders(),
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::Malformed { ref operation, .. } if operation == "pivot"));
    }

    #[test]
    fn test_cast_to_unknown() {
        let err = apply(
            &Operation::Cast {
                column_name: "amount".to_string(),
                data_type: DataType::Unknown,
            },
            orders(),
        )
        .unwrap_err();
        assert_eq!(err, ExprError::unsupported("cast", &["Decimal", "Unknown"]));
    }

    #[test]
    fn test_limit_zero_is_noop() {
        assert_eq!(apply(&Operation::Limit { limit: 0 }, orders()).unwrap(), orders());
    }

    #[test]
    fn test_join_renames_collisions() {
        let customers = Relation::table(
            "customers",
            Schema::new(vec![
                Column::new("id", DataType::Integer),
                Column::new("status", DataType::String),
                Column::new("status_right", DataType::String),
            ]),
        );
        let rel = join(
            orders(),
            customers,
            JoinType::Left,
            &JoinCondition::new("customer_id", "id"),
            None,
        )
        .unwrap();
        assert_eq!(
            rel.schema().names(),
            vec![
                "id",
                "customer_id",
                "status",
                "amount",
                "paid",
                "created",
                "id_right",
                "status_right",
                "status_right_right",
            ]
        );
    }

    #[test]
    fn test_join_numbered_suffix() {
        let mut taken = HashSet::new();
        taken.insert("a".to_string());
        taken.insert("a_right".to_string());
        assert_eq!(unique_name("a", &taken), "a_right_2");
        taken.insert("a_right_2".to_string());
        assert_eq!(unique_name("a", &taken), "a_right_3");
    }

    #[test]
    fn test_join_key_type_mismatch() {
        let other = Relation::table("t", Schema::new(vec![Column::new("code", DataType::String)]));
        let err = join(orders(), other, JoinType::Inner, &JoinCondition::new("id", "code"), None).unwrap_err();
        assert_eq!(err, ExprError::unsupported("join", &["Integer", "String"]));
    }

    #[test]
    fn test_union_requires_aligned_schemas() {
        let a = Relation::table("a", Schema::new(vec![Column::new("x", DataType::Integer)]));
        let b = Relation::table("b", Schema::new(vec![Column::new("y", DataType::Integer)]));
        let c = Relation::table("c", Schema::new(vec![Column::new("x", DataType::Decimal)]));
        assert!(matches!(union(a.clone(), b, false), Err(ExprError::UnsupportedOperation { ref operator, .. }) if operator == "union"));
        assert_eq!(union(a, c, true).unwrap().schema().names(), vec!["x"]);
    }

    #[test]
    fn test_union_widens_column_types() {
        let a = Relation::table(
            "a",
            Schema::new(vec![Column::new("x", DataType::Integer), Column::new("label", DataType::Text)]),
        );
        let b = Relation::table(
            "b",
            Schema::new(vec![Column::new("x", DataType::Decimal), Column::new("label", DataType::String)]),
        );
        let rel = union(a, b, false).unwrap();
        assert_eq!(
            rel.schema().columns,
            vec![Column::new("x", DataType::Decimal), Column::new("label", DataType::String)]
        );
    }

    #[test]
    fn test_table_ops_need_input() {
        struct NoTables;
        impl TableResolver for NoTables {
            type Error = ExprError;
            fn resolve(&mut self, table: &TableRef) -> Result<Relation, ExprError> {
                Err(ExprError::malformed("source", format!("{:?}", table)))
            }
        }

        let err = translate(&Operation::Limit { limit: 3 }, None, &mut NoTables).unwrap_err();
        assert_eq!(err, ExprError::MissingInput("limit".to_string()));
    }
}
