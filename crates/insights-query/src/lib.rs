//! Stored Insights queries: records, compilation and the query facade

mod compiler;
pub mod csv;
mod error;
mod facade;
mod query;
mod store;

pub use compiler::{FilterOverrides, PipelineCompiler};
pub use error::QueryError;
pub use facade::{ExecuteResult, FacadeConfig, QueryService};
pub use query::{Query, QUERY_DOCTYPE};
pub use store::{Document, DocumentStore, InMemoryStore, StoreError};
