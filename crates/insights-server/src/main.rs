//! Insights query server
//!
//! HTTP API over stored query pipelines, compiled and executed against DuckDB.

use std::sync::Arc;

use insights_duck::DuckEngine;
use insights_query::{InMemoryStore, QueryService};
use tracing::info;

mod config;
mod error;
mod logging;
mod routes;

use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path = std::env::var("INSIGHTS_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_path)?;
    logging::init(&config.logging);
    info!(config = %config_path, "Configuration loaded");

    let engine = match &config.engine.database {
        Some(path) => {
            info!(database = %path.display(), "Opening DuckDB database");
            DuckEngine::open(path)?
        }
        None => {
            info!("Using in-memory DuckDB database");
            DuckEngine::new()?
        }
    }
    .with_cache_capacity(config.engine.cache_max_entries);

    if let Some(script) = &config.engine.init_script {
        engine.execute_batch(&config::read_script(script)?)?;
        info!(script = %script.display(), "Ran init script");
    }

    let service = QueryService::new(InMemoryStore::new(), engine).with_config(config.execution.clone());

    if let Some(seed) = &config.store.seed_file {
        let queries = config::read_seed_queries(seed)?;
        let count = queries.len();
        for query in queries {
            service.save_query(query)?;
        }
        info!(seed = %seed.display(), queries = count, "Seeded query store");
    }

    let app = routes::router(Arc::new(service));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting Insights server on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
