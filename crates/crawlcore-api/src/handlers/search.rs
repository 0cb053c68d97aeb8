//! `/search` handler (spec.md §4.10: "delegates to external Search
//! provider; optionally fans out scrape units per result").

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use crawlcore_types::model::ScrapeUnit;
use crawlcore_types::ports::external::SearchOptions;

use super::authenticate;
use crate::errors::ApiResult;
use crate::models::{SearchRequestBody, SearchResponse, SearchResultBody};
use crate::state::AppState;
use crate::validation::{validate_search_limit, validate_search_query};

#[tracing::instrument(name = "search", skip(state, headers, body), fields(query = %body.query))]
pub async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SearchRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let auth = authenticate(&state, &headers).await?;
    validate_search_query(&body.query)?;
    let limit = validate_search_limit(body.limit)?;

    let options = SearchOptions {
        limit: Some(limit),
        country: body.country.clone(),
    };
    let results = state.search.search(&body.query, &options).await;

    for result in &results {
        let unit = ScrapeUnit::new(result.url.clone(), auth.team_id.clone(), 10, Default::default());
        let _ = state.dispatcher.submit(unit).await;
    }

    Ok(Json(SearchResponse {
        results: results
            .into_iter()
            .map(|r| SearchResultBody {
                title: r.title,
                url: r.url,
                description: r.description,
            })
            .collect(),
    }))
}
