//! HTTP surface (spec.md §4.10): request/response shapes, validation,
//! the Create-crawl kickoff orchestration, and the axum router.

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod orchestration;
pub mod routes;
pub mod state;
pub mod validation;

pub use routes::build_router;
pub use state::AppState;
