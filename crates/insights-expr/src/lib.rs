//! Compiled relational expressions for Insights pipelines
//!
//! Operations from `insights-ir` are translated into a typed [`Relation`] tree,
//! which an [`ExecutionEngine`] renders and runs.

mod error;
pub mod engine;
pub mod functions;
pub mod relation;
pub mod schema;
pub mod sql;
pub mod translate;

pub use engine::{CachePolicy, ExecutionEngine, ResultSet};
pub use error::ExprError;
pub use relation::{RelNode, Relation, Scalar, SortKey};
pub use schema::{MockSchemaProvider, SchemaError, SchemaProvider, TableSchema};
pub use sql::{to_sql, wrap_sql};
pub use translate::{apply, translate, TableResolver};
