//! SQL rendering for relations (DuckDB / ANSI)

use insights_ir::{Aggregation, ArithmeticOp, DataType, JoinType, Value};

use crate::relation::{AggCall, CompareOp, RelNode, Relation, Scalar, SortKey};

/// Render the full statement for `rel`, including its final ordering
pub fn to_sql(rel: &Relation) -> String {
    let mut renderer = SqlRenderer::new();
    let body = renderer.render(rel);
    if rel.ordering().is_empty() || matches!(rel.node(), RelNode::Limit { .. }) {
        return body;
    }
    let alias = renderer.alias();
    format!(
        "SELECT * FROM ({}) AS {} ORDER BY {}",
        body,
        alias,
        order_by(&alias, rel.ordering())
    )
}

/// Render `rel` wrapped in an outer projection, one entry per output column.
/// `casts[i]` optionally converts column `i` for transport; the ordering of
/// `rel` is re-applied on the original values.
pub fn wrap_sql(rel: &Relation, casts: &[Option<DataType>], limit: Option<u64>) -> String {
    let mut renderer = SqlRenderer::new();
    let body = renderer.render(rel);
    let alias = renderer.alias();

    let items: Vec<String> = rel
        .schema()
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let qualified = format!("{}.{}", alias, quote_ident(&col.name));
            match casts.get(i).copied().flatten() {
                Some(to) => format!("CAST({} AS {}) AS {}", qualified, sql_type(to), quote_ident(&col.name)),
                None => format!("{} AS {}", qualified, quote_ident(&col.name)),
            }
        })
        .collect();

    let mut sql = format!("SELECT {} FROM ({}) AS {}", select_list(items), body, alias);
    if !rel.ordering().is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_by(&alias, rel.ordering()));
    }
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }
    sql
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// DuckDB type used when casting to a semantic type
pub fn sql_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String | DataType::Text | DataType::Json | DataType::Unknown => "VARCHAR",
        DataType::Integer => "BIGINT",
        DataType::Decimal => "DOUBLE",
        DataType::Boolean => "BOOLEAN",
        DataType::Date => "DATE",
        DataType::Datetime => "TIMESTAMP",
        DataType::Time => "TIME",
    }
}

fn select_list(items: Vec<String>) -> String {
    if items.is_empty() {
        "*".to_string()
    } else {
        items.join(", ")
    }
}

fn order_by(alias: &str, keys: &[SortKey]) -> String {
    keys.iter()
        .map(|key| {
            let dir = if key.descending { " DESC" } else { "" };
            format!("{}.{}{}", alias, quote_ident(&key.column), dir)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Walks a relation tree, naming each subquery `t0`, `t1`, ... in visit order
struct SqlRenderer {
    next_alias: usize,
}

impl SqlRenderer {
    fn new() -> Self {
        Self { next_alias: 0 }
    }

    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// `FROM` target for a child relation, plus the alias it is bound to
    fn from(&mut self, rel: &Relation) -> (String, String) {
        match rel.node() {
            RelNode::Table { name } => {
                let alias = self.alias();
                (format!("{} AS {}", quote_ident(name), alias), alias)
            }
            _ => {
                let inner = self.render(rel);
                let alias = self.alias();
                (format!("({}) AS {}", inner, alias), alias)
            }
        }
    }

    fn render(&mut self, rel: &Relation) -> String {
        match rel.node() {
            RelNode::Table { name } => format!("SELECT * FROM {}", quote_ident(name)),
            RelNode::Filter { input, predicate } => {
                let (from, _) = self.from(input);
                format!("SELECT * FROM {} WHERE {}", from, scalar(predicate))
            }
            RelNode::Project { input, items, order_by: keys } => {
                let (from, alias) = self.from(input);
                let list: Vec<String> = items
                    .iter()
                    .map(|item| format!("{} AS {}", scalar(&item.expr), quote_ident(&item.alias)))
                    .collect();
                let mut sql = format!("SELECT {} FROM {}", select_list(list), from);
                if !keys.is_empty() {
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&order_by(&alias, keys));
                }
                sql
            }
            RelNode::Aggregate { input, groups, measures } => {
                let (from, _) = self.from(input);
                let mut list: Vec<String> = groups
                    .iter()
                    .map(|g| format!("{} AS {}", scalar(&g.expr), quote_ident(&g.alias)))
                    .collect();
                list.extend(
                    measures
                        .iter()
                        .map(|m| format!("{} AS {}", aggregate(&m.call), quote_ident(&m.alias))),
                );
                let mut sql = format!("SELECT {} FROM {}", select_list(list), from);
                if !groups.is_empty() {
                    let keys: Vec<String> = groups.iter().map(|g| scalar(&g.expr)).collect();
                    sql.push_str(" GROUP BY ");
                    sql.push_str(&keys.join(", "));
                }
                sql
            }
            RelNode::Join {
                left,
                right,
                kind,
                left_key,
                right_key,
                right_columns,
            } => {
                let (left_from, l) = self.from(left);
                let (right_from, r) = self.from(right);
                let mut list: Vec<String> = left
                    .schema()
                    .columns
                    .iter()
                    .map(|c| format!("{}.{} AS {}", l, quote_ident(&c.name), quote_ident(&c.name)))
                    .collect();
                list.extend(
                    right_columns
                        .iter()
                        .map(|(src, alias)| format!("{}.{} AS {}", r, quote_ident(src), quote_ident(alias))),
                );
                format!(
                    "SELECT {} FROM {} {} {} ON {}.{} = {}.{}",
                    select_list(list),
                    left_from,
                    join_keyword(*kind),
                    right_from,
                    l,
                    quote_ident(left_key),
                    r,
                    quote_ident(right_key),
                )
            }
            RelNode::Union { left, right, distinct } => {
                let (left_from, _) = self.from(left);
                let (right_from, _) = self.from(right);
                let keyword = if *distinct { "UNION" } else { "UNION ALL" };
                format!("SELECT * FROM {} {} SELECT * FROM {}", left_from, keyword, right_from)
            }
            // ordering is applied where it is observable: under a limit and at the top
            RelNode::Sort { input } => self.render(input),
            RelNode::Limit { input, count } => {
                let (from, alias) = self.from(input);
                let mut sql = format!("SELECT * FROM {}", from);
                if !rel.ordering().is_empty() {
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&order_by(&alias, rel.ordering()));
                }
                sql.push_str(&format!(" LIMIT {}", count));
                sql
            }
            RelNode::Distinct { input } => {
                let (from, _) = self.from(input);
                format!("SELECT DISTINCT * FROM {}", from)
            }
        }
    }
}

fn join_keyword(kind: JoinType) -> &'static str {
    match kind {
        JoinType::Inner => "INNER JOIN",
        JoinType::Left => "LEFT JOIN",
        JoinType::Right => "RIGHT JOIN",
        JoinType::Full => "FULL OUTER JOIN",
    }
}

fn aggregate(call: &AggCall) -> String {
    let arg = call.arg.as_ref().map(scalar);
    let mut sql = match (call.func, arg) {
        (Aggregation::Count | Aggregation::CountDistinct, None) => "count(*)".to_string(),
        (Aggregation::CountDistinct, Some(a)) => format!("count(DISTINCT {})", a),
        (func, Some(a)) => format!("{}({})", func.name(), a),
        (func, None) => format!("{}(*)", func.name()),
    };
    if let Some(filter) = &call.filter {
        sql.push_str(&format!(" FILTER (WHERE {})", scalar(filter)));
    }
    sql
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => format!("{:?}", f),
        Value::Float(f) => format!("CAST('{}' AS DOUBLE)", f),
        Value::String(s) => quote_literal(s),
        Value::Array(items) => format!("[{}]", items.iter().map(literal).collect::<Vec<_>>().join(", ")),
    }
}

fn scalar(expr: &Scalar) -> String {
    match expr {
        Scalar::Column(name) => quote_ident(name),
        Scalar::Literal(value) => literal(value),
        Scalar::Compare { op, left, right } => {
            let op = match op {
                CompareOp::Eq => "=",
                CompareOp::Ne => "<>",
                CompareOp::Gt => ">",
                CompareOp::Ge => ">=",
                CompareOp::Lt => "<",
                CompareOp::Le => "<=",
            };
            format!("({} {} {})", scalar(left), op, scalar(right))
        }
        Scalar::And(parts) => joined(parts, " AND "),
        Scalar::Or(parts) => joined(parts, " OR "),
        Scalar::Not(inner) => format!("(NOT {})", scalar(inner)),
        Scalar::IsNull(inner) => format!("({} IS NULL)", scalar(inner)),
        Scalar::IsNotNull(inner) => format!("({} IS NOT NULL)", scalar(inner)),
        Scalar::InList { expr, list, negated } => {
            let items: Vec<String> = list.iter().map(literal).collect();
            let keyword = if *negated { "NOT IN" } else { "IN" };
            format!("({} {} ({}))", scalar(expr), keyword, items.join(", "))
        }
        Scalar::Between { expr, low, high } => {
            format!("({} BETWEEN {} AND {})", scalar(expr), literal(low), literal(high))
        }
        Scalar::Like {
            expr,
            pattern,
            negated,
            escape,
        } => {
            let keyword = if *negated { "NOT ILIKE" } else { "ILIKE" };
            match escape {
                Some(c) => format!(
                    "({} {} {} ESCAPE {})",
                    scalar(expr),
                    keyword,
                    quote_literal(pattern),
                    quote_literal(&c.to_string())
                ),
                None => format!("({} {} {})", scalar(expr), keyword, quote_literal(pattern)),
            }
        }
        Scalar::Arithmetic { op, left, right } => {
            let op = match op {
                ArithmeticOp::Add => "+",
                ArithmeticOp::Subtract => "-",
                ArithmeticOp::Multiply => "*",
                ArithmeticOp::Divide => "/",
                ArithmeticOp::Modulo => "%",
            };
            format!("({} {} {})", scalar(left), op, scalar(right))
        }
        Scalar::Function { func, args } => {
            let args: Vec<String> = args.iter().map(scalar).collect();
            format!("{}({})", func.name(), args.join(", "))
        }
        Scalar::Cast { expr, to } => format!("CAST({} AS {})", scalar(expr), sql_type(*to)),
        Scalar::DateTrunc { unit, expr, to } => format!(
            "CAST(date_trunc({}, {}) AS {})",
            quote_literal(unit.name()),
            scalar(expr),
            sql_type(*to)
        ),
    }
}

fn joined(parts: &[Scalar], separator: &str) -> String {
    let rendered: Vec<String> = parts.iter().map(scalar).collect();
    format!("({})", rendered.join(separator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_ir::{Column, Schema};

    fn people() -> Relation {
        Relation::table(
            "people",
            Schema::new(vec![
                Column::new("name", DataType::String),
                Column::new("age", DataType::Integer),
            ]),
        )
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(literal(&Value::Float(2.0)), "2.0");
    }

    #[test]
    fn test_table_scan() {
        assert_eq!(to_sql(&people()), "SELECT * FROM \"people\"");
    }

    #[test]
    fn test_filter_and_sort() {
        let rel = people()
            .filtered(Scalar::Compare {
                op: CompareOp::Gt,
                left: Box::new(Scalar::column("age")),
                right: Box::new(Scalar::literal(30i64)),
            })
            .sorted(SortKey {
                column: "age".to_string(),
                descending: true,
            });
        assert_eq!(
            to_sql(&rel),
            "SELECT * FROM (SELECT * FROM \"people\" AS t0 WHERE (\"age\" > 30)) AS t1 ORDER BY t1.\"age\" DESC"
        );
    }

    #[test]
    fn test_limit_carries_its_ordering() {
        let rel = people()
            .sorted(SortKey {
                column: "name".to_string(),
                descending: false,
            })
            .limited(3);
        assert_eq!(
            to_sql(&rel),
            "SELECT * FROM (SELECT * FROM \"people\") AS t0 ORDER BY t0.\"name\" LIMIT 3"
        );
    }

    #[test]
    fn test_projection_dropping_sort_column_orders_input() {
        let rel = people()
            .sorted(SortKey {
                column: "age".to_string(),
                descending: true,
            })
            .projected(
                vec![crate::relation::ProjectItem::column("name")],
                Schema::new(vec![Column::new("name", DataType::String)]),
            );
        assert_eq!(
            to_sql(&rel),
            "SELECT \"name\" AS \"name\" FROM (SELECT * FROM \"people\") AS t0 ORDER BY t0.\"age\" DESC"
        );
    }

    #[test]
    fn test_wrap_with_casts() {
        let sql = wrap_sql(&people(), &[None, Some(DataType::Integer)], Some(10));
        assert_eq!(
            sql,
            "SELECT t0.\"name\" AS \"name\", CAST(t0.\"age\" AS BIGINT) AS \"age\" FROM (SELECT * FROM \"people\") AS t0 LIMIT 10"
        );
    }

    #[test]
    fn test_count_rows() {
        assert_eq!(
            to_sql(&people().count_rows()),
            "SELECT count(*) AS \"count\" FROM \"people\" AS t0"
        );
    }
}
