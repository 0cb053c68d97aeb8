//! `/crawl*` handlers (spec.md §4.10).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crawlcore_types::model::{CrawlRecord, CrawlState};

use super::{authenticate, idempotency_header};
use crate::errors::{ApiError, ApiResult};
use crate::models::{
    CrawlCreatedResponse, CrawlErrorsResponse, CrawlRequestBody, CrawlStatusResponse,
    OngoingCrawlEntry, OngoingCrawlsResponse, PageResult, UnitErrorEntry,
};
use crate::orchestration::kickoff_crawl;
use crate::state::AppState;
use crate::validation::{build_crawl_options, build_scrape_options, require_flag_allows, validate_url};

const PAGE_SIZE: usize = 50;
const IDEMPOTENCY_RESULT_TTL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

#[tracing::instrument(name = "create_crawl", skip(state, headers, body), fields(url = %body.url))]
pub async fn create_crawl(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CrawlRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let auth = authenticate(&state, &headers).await?;
    validate_url(&body.url)?;
    require_flag_allows(&auth, body.zero_data_retention)?;

    let idempotency_key = body.idempotency.or(idempotency_header(&headers)?);
    let token = match idempotency_key {
        Some(key) => Some(
            state
                .idempotency
                .try_acquire(&key.to_string(), IDEMPOTENCY_RESULT_TTL)
                .await
                .map_err(|_| ApiError::IdempotencyConflict)?,
        ),
        None => None,
    };

    let crawl_options = body
        .crawler_options
        .as_ref()
        .map(build_crawl_options)
        .transpose()?
        .unwrap_or_default();
    let scrape_options = body
        .scrape_options
        .as_ref()
        .map(build_scrape_options)
        .transpose()?
        .unwrap_or_default();

    let (allowed, remaining) = state.billing.check_credits(&auth.team_id, 1).await?;
    if !allowed {
        return Err(ApiError::InsufficientCredits {
            requested: 1,
            remaining,
        });
    }

    let mut record = CrawlRecord::new(body.url.clone(), auth.team_id.clone(), crawl_options, scrape_options);
    record.zero_data_retention = body.zero_data_retention;

    let crawl_id = kickoff_crawl(&state, record, body.webhook.clone()).await?;

    if let Some(token) = token {
        let payload = serde_json::to_vec(&CrawlCreatedResponse {
            id: crawl_id,
            url: body.url.clone(),
        })
        .map_err(|e| ApiError::internal(e.to_string()))?;
        let _ = state.idempotency.store_result(&token.key, &payload, IDEMPOTENCY_RESULT_TTL).await;
    }

    Ok(Json(CrawlCreatedResponse {
        id: crawl_id,
        url: body.url,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub next: Option<String>,
}

#[tracing::instrument(name = "crawl_status", skip(state, headers))]
pub async fn crawl_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<impl IntoResponse> {
    let auth = authenticate(&state, &headers).await?;
    let record = load_owned_crawl(&state, &auth.team_id, id).await?;
    let counters = state.state_machine.counters(id).await?;

    let offset: usize = query
        .next
        .as_deref()
        .map(|raw| raw.parse().unwrap_or(0))
        .unwrap_or(0);
    let page_ids = &counters.job_ids[offset.min(counters.job_ids.len())..];
    let page_ids: Vec<Uuid> = page_ids.iter().copied().take(PAGE_SIZE).collect();

    let mut pages = Vec::new();
    for unit_id in &page_ids {
        if let Some(raw) = state.queue.get_result(*unit_id).await? {
            if let Ok(page) = serde_json::from_value::<PageResult>(raw) {
                pages.push(page);
            }
        }
    }

    let next = if offset + page_ids.len() < counters.job_ids.len() {
        Some((offset + page_ids.len()).to_string())
    } else {
        None
    };

    let (data, partial_data) = if record.state == CrawlState::Completed {
        (pages, Vec::new())
    } else {
        (Vec::new(), pages)
    };

    Ok(Json(CrawlStatusResponse {
        status: state_label(record.state).to_string(),
        total: counters.job_ids.len() as u64,
        completed: counters.done_count,
        credits_used: counters.credit_count,
        data,
        partial_data,
        next,
    }))
}

#[tracing::instrument(name = "crawl_errors", skip(state, headers))]
pub async fn crawl_errors(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let auth = authenticate(&state, &headers).await?;
    load_owned_crawl(&state, &auth.team_id, id).await?;

    let job_ids = state.state_machine.job_ids(id).await?;
    let mut errors = Vec::new();
    for unit_id in job_ids {
        if let Some(unit) = state.queue.get_unit(unit_id).await? {
            if let Some(reason) = unit.last_error {
                errors.push(UnitErrorEntry {
                    id: unit.id,
                    url: unit.url,
                    error: reason,
                });
            }
        }
    }

    Ok(Json(CrawlErrorsResponse { errors }))
}

#[tracing::instrument(name = "cancel_crawl", skip(state, headers))]
pub async fn cancel_crawl(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let auth = authenticate(&state, &headers).await?;
    load_owned_crawl(&state, &auth.team_id, id).await?;
    state.state_machine.cancel(id).await?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

#[tracing::instrument(name = "ongoing_crawls", skip(state, headers))]
pub async fn ongoing_crawls(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let auth = authenticate(&state, &headers).await?;
    let records = state.state_machine.ongoing_for_team(&auth.team_id).await?;
    let crawls = records
        .into_iter()
        .map(|r| OngoingCrawlEntry {
            id: r.id,
            url: r.origin_url,
        })
        .collect();
    Ok(Json(OngoingCrawlsResponse { crawls }))
}

async fn load_owned_crawl(state: &AppState, team_id: &str, id: Uuid) -> ApiResult<CrawlRecord> {
    let record = state
        .state_machine
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("crawl {id}")))?;
    if record.team_id != team_id {
        return Err(ApiError::not_found(format!("crawl {id}")));
    }
    Ok(record)
}

fn state_label(state: CrawlState) -> &'static str {
    match state {
        CrawlState::Scraping => "scraping",
        CrawlState::Completed => "completed",
        CrawlState::Failed => "failed",
        CrawlState::Cancelled => "cancelled",
    }
}
