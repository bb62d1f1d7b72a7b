use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("Column '{column}' not found. Available columns: {available:?}")]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    #[error("Unsupported operation: {operator} on ({})", .operand_types.join(", "))]
    UnsupportedOperation {
        operator: String,
        operand_types: Vec<String>,
    },

    #[error("Invalid {operation} operation: {reason}")]
    Malformed { operation: String, reason: String },

    #[error("Operation '{0}' has no input relation")]
    MissingInput(String),
}

impl ExprError {
    pub(crate) fn unsupported(operator: impl Into<String>, operand_types: &[&str]) -> Self {
        ExprError::UnsupportedOperation {
            operator: operator.into(),
            operand_types: operand_types.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub(crate) fn malformed(operation: &str, reason: impl Into<String>) -> Self {
        ExprError::Malformed {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}
