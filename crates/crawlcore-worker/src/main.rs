use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crawlcore_crawl::state_machine::CrawlStateMachine;
use crawlcore_crawl::{Dispatcher, WebhookDispatcher};
use crawlcore_kv::{InMemoryKvStore, RedisKvStore};
use crawlcore_policy::Blocklist;
use crawlcore_queue::{KvConcurrencyLimiter, PlanLimits, RetryPolicy, ScrapeQueue};
use crawlcore_types::ports::kv::KvStore;
use crawlcore_worker::{CrawlAwareProcessor, HttpFetcher, SingleUrlRetryProcessor, WorkerConfig, WorkerPool};

#[derive(Parser)]
#[command(name = "crawlcore-worker")]
#[command(about = "CrawlCore background scrape worker")]
struct Args {
    #[arg(long, env = "CRAWLCORE_REDIS_URL")]
    redis_url: Option<String>,

    #[arg(long, default_value_t = num_cpus::get().max(2))]
    worker_count: usize,

    #[arg(long, default_value_t = 4)]
    max_concurrent_jobs: usize,

    #[arg(long, default_value_t = 10)]
    plan_max_concurrency: u32,

    #[arg(long, default_value_t = 600)]
    job_timeout_secs: u64,

    #[arg(long, default_value_t = 5)]
    dispatcher_sweep_secs: u64,
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
        worker_count = args.worker_count,
        max_concurrent_jobs = args.max_concurrent_jobs,
        plan_max_concurrency = args.plan_max_concurrency,
        redis = args.redis_url.is_some(),
        "starting crawlcore worker service"
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
        Duration::from_secs(args.job_timeout_secs * 2),
    ));
    let webhooks = Arc::new(WebhookDispatcher::new(kv.clone(), RetryPolicy::default()));
    let dispatcher = Arc::new(Dispatcher::new(limiter, queue.clone(), webhooks.clone()));
    let _sweep_handle = dispatcher.clone().spawn_sweep_loop(Duration::from_secs(args.dispatcher_sweep_secs));

    let state_machine = Arc::new(CrawlStateMachine::new(kv.clone()));
    let blocklist = Arc::new(Blocklist::default());
    let fetcher = Arc::new(HttpFetcher::new());
    let processor = Arc::new(SingleUrlRetryProcessor::new(CrawlAwareProcessor::new(
        fetcher,
        state_machine.clone(),
        queue.clone(),
        webhooks.clone(),
        blocklist,
    )));

    let worker_config = WorkerConfig {
        worker_count: args.worker_count,
        max_concurrent_jobs: args.max_concurrent_jobs,
        job_timeout_secs: args.job_timeout_secs,
        ..WorkerConfig::default()
    };
    let pool = Arc::new(WorkerPool::new(
        worker_config,
        queue,
        dispatcher,
        processor,
        state_machine,
        webhooks,
    ));
    let shutdown = pool.shutdown_token();

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    };

    tokio::select! {
        _ = pool.run() => {
            tracing::info!("worker pool exited");
        }
        _ = shutdown_signal => {}
    }

    tracing::info!("crawlcore worker service shutdown complete");
    Ok(())
}
