//! zotag-tab library - tag counts and cross-tabulations over a Zotero library
//!
//! Every cell of a result table is the size of one tag-set intersection,
//! resolved through a persistent query cache in front of the Zotero Web API.

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod chart;
pub mod client;
pub mod config;
pub mod error;
pub mod params;
pub mod percent;
pub mod purge;
pub mod table;
pub mod tags;

use aggregate::Aggregator;
use chart::ImageStore;
use purge::CachePurger;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub purger: Arc<CachePurger>,
    pub images: ImageStore,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state; the purger shares the aggregator's cache
    pub fn new(aggregator: Arc<Aggregator>, images: ImageStore) -> Self {
        let purger = Arc::new(CachePurger::new(
            aggregator.cache().clone(),
            images.clone(),
        ));
        Self {
            aggregator,
            purger,
            images,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};
    use tower_http::services::ServeDir;
    use tower_http::trace::TraceLayer;

    let image_url = state.images.url_prefix().to_string();
    let image_dir = state.images.dir().to_path_buf();

    Router::new()
        .route("/", get(api::serve_form))
        .route("/query", get(api::run_query))
        .route("/purge", post(api::purge_all))
        .route("/purge/queries", post(api::purge_queries))
        .route("/purge/images", post(api::purge_images))
        .merge(api::health_routes())
        .nest_service(&image_url, ServeDir::new(image_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
