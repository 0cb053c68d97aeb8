use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crawlcore_api::auth::{HeaderAuthAdapter, NullSearchProvider, UnlimitedBilling};
use crawlcore_api::{build_router, AppState};
use crawlcore_crawl::state_machine::CrawlStateMachine;
use crawlcore_crawl::{Dispatcher, KvIdempotencyStore, WebhookDispatcher};
use crawlcore_kv::{InMemoryKvStore, RedisKvStore};
use crawlcore_policy::{Blocklist, SitemapFetcher};
use crawlcore_queue::{KvConcurrencyLimiter, PlanLimits, RetryPolicy, ScrapeQueue};
use crawlcore_types::ports::kv::KvStore;
use crawlcore_worker::HttpFetcher;

const USER_AGENT: &str = "crawlcore/0.1";

#[derive(Parser)]
#[command(name = "crawlcore-api")]
#[command(about = "CrawlCore HTTP API")]
struct Args {
    #[arg(long, env = "CRAWLCORE_REDIS_URL")]
    redis_url: Option<String>,

    #[arg(long, default_value = "0.0.0.0:8080", env = "CRAWLCORE_BIND")]
    bind: SocketAddr,

    #[arg(long, default_value_t = 10)]
    plan_max_concurrency: u32,

    #[arg(long, default_value_t = 600)]
    lease_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %args.bind,
        redis = args.redis_url.is_some(),
        "starting crawlcore API service"
    );

    let kv: Arc<dyn KvStore> = match &args.redis_url {
        Some(url) => {
            tracing::info!(redis_url = %url, "connecting to redis-backed KV store");
            let cfg = deadpool_redis::Config::from_url(url);
            let pool = cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
            Arc::new(RedisKvStore::new(Arc::new(pool)))
        }
        None => {
            tracing::warn!("no --redis-url given, using in-memory KV store (single-process only)");
            Arc::new(InMemoryKvStore::new())
        }
    };

    let queue = Arc::new(ScrapeQueue::new(kv.clone(), RetryPolicy::default()));
    let limiter = Arc::new(KvConcurrencyLimiter::new(
        kv.clone(),
        Arc::new(PlanLimits::new(args.plan_max_concurrency)),
        Duration::from_secs(args.lease_ttl_secs * 2),
    ));
    let webhooks = Arc::new(WebhookDispatcher::new(kv.clone(), RetryPolicy::default()));
    let dispatcher = Arc::new(Dispatcher::new(limiter, queue.clone(), webhooks.clone()));
    let state_machine = Arc::new(CrawlStateMachine::new(kv.clone()));
    let idempotency = Arc::new(KvIdempotencyStore::new(kv.clone()));
    let blocklist = Arc::new(Blocklist::default());
    let sitemap = Arc::new(SitemapFetcher::new(USER_AGENT, Duration::from_secs(10)));

    let state = Arc::new(AppState::new(
        kv,
        state_machine,
        queue,
        dispatcher,
        webhooks,
        idempotency,
        blocklist,
        sitemap,
        Arc::new(HeaderAuthAdapter),
        Arc::new(UnlimitedBilling),
        Arc::new(HttpFetcher::new()),
        Arc::new(NullSearchProvider),
        USER_AGENT.to_string(),
    ));

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(args.bind).await?;

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
        tracing::info!("shutdown signal received");
    };

    tracing::info!(bind = %args.bind, "crawlcore API listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("crawlcore API service shutdown complete");
    Ok(())
}
