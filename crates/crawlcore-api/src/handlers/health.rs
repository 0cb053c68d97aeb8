//! Health/readiness endpoint (spec.md §4.10 "Health/readiness
//! endpoints"). Grounded on `riptide-api/src/handlers/health.rs`'s
//! shape, scaled down to this system's single real dependency (the KV
//! store).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

#[tracing::instrument(name = "health_check", skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let kv_healthy = tokio::time::timeout(Duration::from_secs(2), state.kv.get("healthz:probe"))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);

    let status = if kv_healthy { "healthy" } else { "degraded" };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
