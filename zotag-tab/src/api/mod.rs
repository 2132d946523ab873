//! HTTP API handlers for zotag-tab

pub mod health;
pub mod purge;
pub mod query;
pub mod ui;

pub use health::health_routes;
pub use purge::{purge_all, purge_images, purge_queries};
pub use query::run_query;
pub use ui::serve_form;
