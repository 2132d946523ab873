//! Cache purge endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiResult;
use crate::purge::PurgeSummary;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub status: String,
    pub queries_removed: u64,
    pub images_removed: u64,
}

impl From<PurgeSummary> for PurgeResponse {
    fn from(summary: PurgeSummary) -> Self {
        Self {
            status: "ok".to_string(),
            queries_removed: summary.queries,
            images_removed: summary.images,
        }
    }
}

/// POST /purge
///
/// Clears both the query cache and the rendered images
pub async fn purge_all(State(state): State<AppState>) -> ApiResult<Json<PurgeResponse>> {
    Ok(Json(state.purger.purge_all().await?.into()))
}

/// POST /purge/queries
pub async fn purge_queries(State(state): State<AppState>) -> ApiResult<Json<PurgeResponse>> {
    Ok(Json(state.purger.purge_queries().await?.into()))
}

/// POST /purge/images
pub async fn purge_images(State(state): State<AppState>) -> ApiResult<Json<PurgeResponse>> {
    Ok(Json(state.purger.purge_images().await?.into()))
}
