//! HTTP-surface scenario tests (spec.md §8's S4/S5, plus round-trips
//! over the endpoint table), exercised against the real router via
//! `tower::ServiceExt::oneshot` — the same harness shape as
//! `riptide-api/tests/integration/test_handlers.rs`, but driving the
//! actual `build_router`/`AppState` rather than mock handlers, since
//! every port here is already swappable for an in-memory test double.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use async_trait::async_trait;
use crawlcore_api::{build_router, AppState};
use crawlcore_api::auth::{HeaderAuthAdapter, NullSearchProvider, UnlimitedBilling};
use crawlcore_crawl::state_machine::CrawlStateMachine;
use crawlcore_crawl::{Dispatcher, KvIdempotencyStore, WebhookDispatcher};
use crawlcore_kv::InMemoryKvStore;
use crawlcore_policy::{Blocklist, SitemapFetcher};
use crawlcore_queue::{KvConcurrencyLimiter, PlanLimits, RetryPolicy, ScrapeQueue};
use crawlcore_types::model::ScrapeOptions;
use crawlcore_types::ports::external::{Billing, FetchError, FetchedDocument, Fetcher, MockBilling};
use crawlcore_types::ports::kv::KvStore;

/// Stub `Fetcher`: always succeeds, counting calls so tests can assert
/// on how many pages actually ran through it.
struct StubFetcher {
    calls: AtomicU32,
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(
        &self,
        url: &str,
        _options: &ScrapeOptions,
        _cancel: tokio_util::sync::CancellationToken,
    ) -> Result<FetchedDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedDocument {
            status: 200,
            headers: HashMap::new(),
            html: Some("<html></html>".into()),
            markdown: Some(format!("# {url}")),
            raw_html: None,
            links: Vec::new(),
            screenshot: None,
            actions_output: Vec::new(),
            pdf_text: None,
            metadata: HashMap::new(),
        })
    }
}

fn test_state() -> Arc<AppState> {
    test_state_with_billing(Arc::new(UnlimitedBilling))
}

fn test_state_with_billing(billing: Arc<dyn Billing>) -> Arc<AppState> {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let queue = Arc::new(ScrapeQueue::new(kv.clone(), RetryPolicy::default()));
    let limiter = Arc::new(KvConcurrencyLimiter::new(
        kv.clone(),
        Arc::new(PlanLimits::new(10)),
        Duration::from_secs(600),
    ));
    let webhooks = Arc::new(WebhookDispatcher::new(kv.clone(), RetryPolicy::default()));
    let dispatcher = Arc::new(Dispatcher::new(limiter, queue.clone(), webhooks.clone()));
    let state_machine = Arc::new(CrawlStateMachine::new(kv.clone()));
    let idempotency = Arc::new(KvIdempotencyStore::new(kv.clone()));
    let blocklist = Arc::new(Blocklist::default());
    let sitemap = Arc::new(SitemapFetcher::new("crawlcore-test", Duration::from_secs(5)));

    Arc::new(AppState::new(
        kv,
        state_machine,
        queue,
        dispatcher,
        webhooks,
        idempotency,
        blocklist,
        sitemap,
        Arc::new(HeaderAuthAdapter),
        billing,
        Arc::new(StubFetcher { calls: AtomicU32::new(0) }),
        Arc::new(NullSearchProvider),
        "crawlcore-test".to_string(),
    ))
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, "Bearer team-scenario")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_crawl_then_status_round_trips() {
    let state = test_state();
    let router = build_router(state);

    let create = json_request(
        Method::POST,
        "/crawl",
        json!({ "url": "https://example.test/", "crawlerOptions": { "ignoreSitemap": true, "ignoreRobotsTxt": true } }),
    );
    let resp = router.clone().oneshot(create).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap();

    let status_req = Request::builder()
        .method(Method::GET)
        .uri(format!("/crawl/{id}"))
        .header(AUTHORIZATION, "Bearer team-scenario")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(status_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let status = body_json(resp).await;
    assert_eq!(status["total"].as_u64(), Some(1));
}

/// spec.md §8 S4: cancelling a crawl leaves `data` empty and moves
/// already-completed pages into `partial_data`.
#[tokio::test]
async fn cancel_crawl_preserves_partial_data() {
    let state = test_state();

    let create = json_request(
        Method::POST,
        "/crawl",
        json!({ "url": "https://example.test/", "crawlerOptions": { "ignoreSitemap": true, "ignoreRobotsTxt": true } }),
    );
    let resp = build_router(state.clone()).oneshot(create).await.unwrap();
    let created = body_json(resp).await;
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    // Simulate one page already completed before cancellation: stash a
    // result for the seed unit directly, the way the Worker would.
    let record = state.state_machine.get(id).await.unwrap().unwrap();
    let job_ids = state.state_machine.job_ids(id).await.unwrap();
    assert_eq!(job_ids.len(), 1);
    let seed_unit_id = job_ids[0];
    state
        .queue
        .complete(
            seed_unit_id,
            &json!({ "url": record.origin_url, "status": 200, "markdown": "# seed" }),
        )
        .await
        .unwrap();
    state.state_machine.increment_done(id).await.unwrap();

    let cancel_req = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/crawl/{id}"))
        .header(AUTHORIZATION, "Bearer team-scenario")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(state.clone()).oneshot(cancel_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let status_req = Request::builder()
        .method(Method::GET)
        .uri(format!("/crawl/{id}"))
        .header(AUTHORIZATION, "Bearer team-scenario")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(state).oneshot(status_req).await.unwrap();
    let status = body_json(resp).await;
    assert_eq!(status["status"], "cancelled");
    assert!(status["data"].as_array().unwrap().is_empty());
    assert_eq!(status["partial_data"].as_array().unwrap().len(), 1);
    assert_eq!(status["partial_data"][0]["markdown"], "# seed");
}

/// spec.md §8 S5: two `POST /crawl` with the same `x-idempotency-key`
/// — exactly one succeeds, the other gets 409 with the literal
/// expected error message.
#[tokio::test]
async fn idempotency_replay_rejects_second_request() {
    let state = test_state();
    let router = build_router(state);
    let key = Uuid::new_v4();

    let make_req = || {
        Request::builder()
            .method(Method::POST)
            .uri("/crawl")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, "Bearer team-scenario")
            .header("x-idempotency-key", key.to_string())
            .body(Body::from(
                json!({ "url": "https://example.test/", "crawlerOptions": { "ignoreSitemap": true, "ignoreRobotsTxt": true } })
                    .to_string(),
            ))
            .unwrap()
    };

    let first = router.clone().oneshot(make_req()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router.oneshot(make_req()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["error"]["message"], "Idempotency key already used");
}

#[tokio::test]
async fn scrape_rejects_invalid_url() {
    let state = test_state();
    let router = build_router(state);
    let req = json_request(Method::POST, "/scrape", json!({ "url": "not-a-url" }));
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scrape_returns_fetched_page() {
    let state = test_state();
    let router = build_router(state);
    let req = json_request(Method::POST, "/scrape", json!({ "url": "https://example.test/page" }));
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], 200);
    assert_eq!(body["markdown"], "# https://example.test/page");
}

#[tokio::test]
async fn missing_crawl_id_returns_404() {
    let state = test_state();
    let router = build_router(state);
    let req = Request::builder()
        .method(Method::GET)
        .uri(format!("/crawl/{}", Uuid::new_v4()))
        .header(AUTHORIZATION, "Bearer team-scenario")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_http_method_is_rejected_by_middleware() {
    let state = test_state();
    let router = build_router(state);
    let req = Request::builder()
        .method(Method::GET)
        .uri("/crawl")
        .header(AUTHORIZATION, "Bearer team-scenario")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn ongoing_crawls_lists_only_the_caller_teams_crawls() {
    let state = test_state();
    let router = build_router(state);

    let create_a = json_request(
        Method::POST,
        "/crawl",
        json!({ "url": "https://example.test/a", "crawlerOptions": { "ignoreSitemap": true, "ignoreRobotsTxt": true } }),
    );
    router.clone().oneshot(create_a).await.unwrap();

    let mut other_req = json_request(
        Method::POST,
        "/crawl",
        json!({ "url": "https://example.test/b", "crawlerOptions": { "ignoreSitemap": true, "ignoreRobotsTxt": true } }),
    );
    other_req.headers_mut().insert(AUTHORIZATION, "Bearer team-other".parse().unwrap());
    router.clone().oneshot(other_req).await.unwrap();

    let ongoing_req = Request::builder()
        .method(Method::GET)
        .uri("/crawl/ongoing")
        .header(AUTHORIZATION, "Bearer team-scenario")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(ongoing_req).await.unwrap();
    let body = body_json(resp).await;
    let crawls = body["crawls"].as_array().unwrap();
    assert_eq!(crawls.len(), 1);
    assert_eq!(crawls[0]["url"], "https://example.test/a");
}

/// A `Billing` collaborator that has already seen this team exhaust
/// its credits returns a 402 before any work is queued.
#[tokio::test]
async fn scrape_rejects_when_billing_denies_credits() {
    let mut billing = MockBilling::new();
    billing
        .expect_check_credits()
        .withf(|team_id: &str, n: &u64| team_id == "team-scenario" && *n == 1)
        .returning(|_, _| Ok((false, 0)));

    let state = test_state_with_billing(Arc::new(billing));
    let router = build_router(state);
    let req = json_request(Method::POST, "/scrape", json!({ "url": "https://example.test/page" }));
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
}
