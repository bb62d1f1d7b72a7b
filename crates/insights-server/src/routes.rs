//! HTTP handlers over the query facade
//!
//! The facade is synchronous and the engine serialises access to its
//! connection, so every call runs on the blocking pool.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use insights_duck::DuckEngine;
use insights_ir::Column;
use insights_query::{ExecuteResult, FilterOverrides, InMemoryStore, Query, QueryError, QueryService};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::error::ApiError;

pub type Service = QueryService<InMemoryStore, DuckEngine>;

type AppState = Arc<Service>;

/// Body of the build-and-run endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuildRequest {
    pub active_operation_idx: Option<i64>,
    /// Query name to `filter_group`; applies to this request only
    pub adhoc_filters: FilterOverrides,
}

#[derive(Debug, Deserialize)]
pub struct DistinctRequest {
    pub column_name: String,
    #[serde(default)]
    pub active_operation_idx: Option<i64>,
    #[serde(default)]
    pub search_term: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/queries/:name", get(get_query).put(save_query))
        .route("/api/queries/:name/dependents", get(dependents))
        .route("/api/queries/:name/execute", post(execute))
        .route("/api/queries/:name/sql", post(sql))
        .route("/api/queries/:name/count", post(count))
        .route("/api/queries/:name/download", post(download))
        .route("/api/queries/:name/distinct", post(distinct))
        .route("/api/queries/:name/columns", post(columns))
        .with_state(service)
}

async fn run<T, F>(service: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Service) -> Result<T, QueryError> + Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError::internal(format!("Worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

async fn get_query(State(service): State<AppState>, Path(name): Path<String>) -> Result<Json<Query>, ApiError> {
    let query = run(&service, move |s| s.get_query(&name)).await?;
    Ok(Json(query))
}

async fn save_query(
    State(service): State<AppState>,
    Path(name): Path<String>,
    Json(mut query): Json<Query>,
) -> Result<Json<Query>, ApiError> {
    query.name = name;
    let saved = run(&service, move |s| s.save_query(query)).await?;
    Ok(Json(saved))
}

async fn dependents(State(service): State<AppState>, Path(name): Path<String>) -> Result<Json<JsonValue>, ApiError> {
    let deps = run(&service, move |s| s.dependent_queries(&name)).await?;
    Ok(Json(json!({ "dependents": deps })))
}

async fn execute(
    State(service): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BuildRequest>,
) -> Result<Json<ExecuteResult>, ApiError> {
    debug!(query = %name, idx = ?req.active_operation_idx, filtered = !req.adhoc_filters.is_empty(), "execute");
    let result = run(&service, move |s| s.execute(&name, req.active_operation_idx, &req.adhoc_filters)).await?;
    Ok(Json(result))
}

async fn sql(
    State(service): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BuildRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let sql = run(&service, move |s| s.to_sql(&name, req.active_operation_idx, &req.adhoc_filters)).await?;
    Ok(Json(json!({ "sql": sql })))
}

async fn count(
    State(service): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BuildRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let count = run(&service, move |s| s.get_count(&name, req.active_operation_idx)).await?;
    Ok(Json(json!({ "count": count })))
}

async fn download(
    State(service): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BuildRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let filename = format!("attachment; filename=\"{}.csv\"", name.replace('"', ""));
    let csv = run(&service, move |s| s.download_results(&name, req.active_operation_idx)).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        csv,
    ))
}

async fn distinct(
    State(service): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DistinctRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let values = run(&service, move |s| {
        s.get_distinct_column_values(
            &name,
            &req.column_name,
            req.active_operation_idx,
            req.search_term.as_deref(),
            req.limit,
        )
    })
    .await?;
    Ok(Json(json!({ "values": values })))
}

async fn columns(
    State(service): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BuildRequest>,
) -> Result<Json<Vec<Column>>, ApiError> {
    let columns = run(&service, move |s| s.get_columns_for_selection(&name, req.active_operation_idx)).await?;
    Ok(Json(columns))
}
