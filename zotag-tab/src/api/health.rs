//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Entries in the query cache, absent if the cache could not be read
    pub cached_queries: Option<u64>,
    pub uptime_seconds: i64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let cached_queries = match state.aggregator.cache().len().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!("Health check could not read query cache: {}", e);
            None
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "zotag-tab".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cached_queries,
        uptime_seconds: (Utc::now() - state.startup_time).num_seconds(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
