//! Semantic column types and schemas

use serde::{Deserialize, Serialize};

/// Semantic type of a column, independent of the backing engine's physical type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Datetime,
    Time,
    #[serde(rename = "JSON")]
    Json,
    Unknown,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Decimal)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, DataType::String | DataType::Text)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Datetime | DataType::Time)
    }

    /// Whether values of the two types can be compared with each other
    pub fn is_comparable_with(&self, other: &DataType) -> bool {
        self == other
            || (self.is_numeric() && other.is_numeric())
            || (self.is_textual() && other.is_textual())
            || *self == DataType::Unknown
            || *other == DataType::Unknown
    }

    /// Smallest type holding values of both, or `None` when they don't mix
    pub fn widened_with(&self, other: &DataType) -> Option<DataType> {
        if self == other {
            Some(*self)
        } else if self.is_numeric() && other.is_numeric() {
            Some(DataType::Decimal)
        } else if self.is_textual() && other.is_textual() {
            Some(DataType::String)
        } else if *self == DataType::Unknown || *other == DataType::Unknown {
            Some(DataType::Unknown)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "String",
            DataType::Text => "Text",
            DataType::Integer => "Integer",
            DataType::Decimal => "Decimal",
            DataType::Boolean => "Boolean",
            DataType::Date => "Date",
            DataType::Datetime => "Datetime",
            DataType::Time => "Time",
            DataType::Json => "JSON",
            DataType::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn find(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
