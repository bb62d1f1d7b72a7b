//! Mapping of query errors onto HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use insights_expr::SchemaError;
use insights_query::QueryError;
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "Internal",
            message: message.into(),
        }
    }
}

fn status_for(err: &QueryError) -> StatusCode {
    match err {
        QueryError::NotFound { .. } => StatusCode::NOT_FOUND,
        QueryError::MalformedPipeline { .. }
        | QueryError::ColumnNotFound { .. }
        | QueryError::UnsupportedOperation { .. }
        | QueryError::MissingSource { .. }
        | QueryError::EmptyPipeline { .. }
        | QueryError::CyclicQueryReference { .. }
        | QueryError::BuildFailed { .. }
        | QueryError::InvalidRecord { .. }
        | QueryError::Schema(SchemaError::TableNotFound(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        QueryError::Schema(_) | QueryError::Store(_) | QueryError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(kind = err.kind(), error = %err, "Request failed");
        } else {
            warn!(kind = err.kind(), error = %err, "Request rejected");
        }
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "kind": self.kind,
        }));
        (self.status, body).into_response()
    }
}
