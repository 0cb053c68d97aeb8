//! Router construction (spec.md §4.10's endpoint list).

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{crawl, health, scrape, search};
use crate::middleware::request_validation::request_validation_middleware;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health::health))
        .route("/scrape", post(scrape::scrape))
        .route("/batch/scrape", post(scrape::batch_scrape))
        .route("/search", post(search::search))
        .route("/crawl", post(crawl::create_crawl))
        .route("/crawl/ongoing", get(crawl::ongoing_crawls))
        .route("/crawl/:id", get(crawl::crawl_status).delete(crawl::cancel_crawl))
        .route("/crawl/:id/errors", get(crawl::crawl_errors))
        .layer(middleware::from_fn(request_validation_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
