//! `/scrape` and `/batch/scrape` handlers (spec.md §4.10, §4.7
//! "isSingleUrl").

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use crawlcore_events::EventType;
use crawlcore_types::model::ScrapeUnit;
use crawlcore_types::ports::external::FetchError;

use super::authenticate;
use crate::errors::{ApiError, ApiResult};
use crate::models::{BatchScrapeCreatedResponse, BatchScrapeRequestBody, PageResult, ScrapeRequestBody};
use crate::state::AppState;
use crate::validation::{build_scrape_options, validate_url, validate_urls};

/// A synchronous single-page scrape: no Job Queue round-trip, the
/// Fetcher is invoked directly and the result returned inline, honoring
/// the unit's own timeout.
#[tracing::instrument(name = "scrape", skip(state, headers, body), fields(url = %body.url))]
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ScrapeRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let auth = authenticate(&state, &headers).await?;
    validate_url(&body.url)?;

    let scrape_options = body
        .scrape_options
        .as_ref()
        .map(build_scrape_options)
        .transpose()?
        .unwrap_or_default();

    let (allowed, remaining) = state.billing.check_credits(&auth.team_id, 1).await?;
    if !allowed {
        return Err(ApiError::InsufficientCredits { requested: 1, remaining });
    }

    let timeout = Duration::from_millis(scrape_options.timeout_ms);
    let cancel = tokio_util::sync::CancellationToken::new();
    let fetch = state.fetcher.fetch(&body.url, &scrape_options, cancel.clone());

    let doc = match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(doc)) => doc,
        Ok(Err(FetchError::BadStatus(code))) => {
            return Err(ApiError::internal(format!("upstream {code}")));
        }
        Ok(Err(e)) => return Err(ApiError::internal(e.to_string())),
        Err(_) => {
            cancel.cancel();
            return Err(ApiError::RequestTimeout);
        }
    };

    state.billing.bill(&auth.team_id, 1).await?;

    Ok(Json(PageResult {
        url: Some(body.url),
        status: Some(doc.status),
        markdown: doc.markdown,
        html: doc.html,
        links: doc.links,
        metadata: serde_json::to_value(&doc.metadata).unwrap_or_default(),
    }))
}

/// Submits every URL as an independent, non-crawling `ScrapeUnit`
/// (spec.md §4.10: "like crawl but no link discovery").
#[tracing::instrument(name = "batch_scrape", skip(state, headers, body), fields(count = body.urls.len()))]
pub async fn batch_scrape(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BatchScrapeRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let auth = authenticate(&state, &headers).await?;
    validate_urls(&body.urls)?;

    let scrape_options = body
        .scrape_options
        .as_ref()
        .map(build_scrape_options)
        .transpose()?
        .unwrap_or_default();

    let (allowed, remaining) = state.billing.check_credits(&auth.team_id, body.urls.len() as u64).await?;
    if !allowed {
        return Err(ApiError::InsufficientCredits {
            requested: body.urls.len() as u64,
            remaining,
        });
    }

    let batch_id = uuid::Uuid::new_v4();
    for url in &body.urls {
        let mut unit = ScrapeUnit::new(url.clone(), auth.team_id.clone(), 10, scrape_options.clone());
        unit.webhook = body.webhook.clone();
        state.dispatcher.submit(unit).await?;
    }

    if let Some(webhook) = &body.webhook {
        state
            .webhooks
            .emit(webhook, EventType::BatchScrapeStarted, batch_id, serde_json::json!({ "url_count": body.urls.len() }))
            .await;
    }

    Ok(Json(BatchScrapeCreatedResponse {
        id: batch_id,
        url_count: body.urls.len(),
    }))
}
