//! Computed-column expressions used by `mutate`

use serde::{Deserialize, Serialize};

use crate::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    Column {
        column: String,
    },
    Literal {
        value: Value,
    },
    Binary {
        op: ArithmeticOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Function {
        function: ScalarFunction,
        #[serde(default)]
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column { column: name.into() }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal { value: value.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl ArithmeticOp {
    pub fn name(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "subtract",
            ArithmeticOp::Multiply => "multiply",
            ArithmeticOp::Divide => "divide",
            ArithmeticOp::Modulo => "modulo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarFunction {
    Lower,
    Upper,
    Trim,
    Length,
    Concat,
    Coalesce,
    Abs,
    Round,
    Year,
    Month,
    Day,
}

impl ScalarFunction {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunction::Lower => "lower",
            ScalarFunction::Upper => "upper",
            ScalarFunction::Trim => "trim",
            ScalarFunction::Length => "length",
            ScalarFunction::Concat => "concat",
            ScalarFunction::Coalesce => "coalesce",
            ScalarFunction::Abs => "abs",
            ScalarFunction::Round => "round",
            ScalarFunction::Year => "year",
            ScalarFunction::Month => "month",
            ScalarFunction::Day => "day",
        }
    }
}
