use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use pow_lab::batch::BatchSearchEngine;
use pow_lab::client::CoordinatorClient;
use pow_lab::config::WorkerConfig;
use pow_lab::engine::SearchEngine;
use pow_lab::metrics::WorkerStats;
use pow_lab::types::Role;

#[derive(Parser, Debug)]
#[clap(about = "Searches a nonce space against a pow-lab coordinator")]
struct Cli {
    /// Coordinator base URL
    #[clap(long)]
    coordinator: Option<String>,

    /// Identity reported with every poll and submission
    #[clap(long)]
    miner_id: Option<String>,

    /// "sequential" or "batch"
    #[clap(long)]
    role: Option<String>,

    /// Nonces per batch (batch role only)
    #[clap(long)]
    batch_size: Option<u64>,

    /// Proactively refetch the template every N attempts (sequential) or
    /// N batches (batch); 0 relies on submission feedback alone
    #[clap(long)]
    refresh_interval: Option<u64>,

    #[clap(long)]
    max_retries: Option<u32>,

    #[clap(long)]
    retry_delay_ms: Option<u64>,

    #[clap(long)]
    stats_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = WorkerConfig::from_env()?;
    if let Some(url) = cli.coordinator {
        config.coordinator_url = url;
    }
    if let Some(miner_id) = cli.miner_id {
        config.miner_id = miner_id;
    }
    if let Some(role) = cli.role {
        config.role = role.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(refresh) = cli.refresh_interval {
        config.refresh_interval = refresh;
    }
    if let Some(max_retries) = cli.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(delay) = cli.retry_delay_ms {
        config.retry_delay_ms = delay;
    }
    if let Some(interval) = cli.stats_interval_secs {
        config.stats_interval_secs = interval;
    }
    config.validate()?;

    log::info!(
        "[{}] coordinator={} role={} refresh_interval={}",
        config.miner_id,
        config.coordinator_url,
        config.role,
        config.refresh_interval
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("stop requested, finishing the current probe");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let stats = Arc::new(WorkerStats::new());
    {
        let stats = Arc::clone(&stats);
        let miner_id = config.miner_id.clone();
        let mut tick = tokio::time::interval(config.stats_interval());
        tokio::spawn(async move {
            tick.tick().await; // the first tick fires immediately
            loop {
                tick.tick().await;
                let snap = stats.snapshot();
                log::info!(
                    "[{miner_id}] attempts={} ({:.0}/s) accepted={} stale={} invalid={} transport_errors={}",
                    snap.attempts,
                    snap.attempts_per_second,
                    snap.accepted,
                    snap.rejected_stale,
                    snap.rejected_invalid,
                    snap.transport_errors
                );
            }
        });
    }

    let client = CoordinatorClient::new(
        &config.coordinator_url,
        &config.miner_id,
        config.role,
        config.retry_config(),
    );

    match config.role {
        Role::Sequential => {
            SearchEngine::new(
                client,
                &config.miner_id,
                config.refresh_interval,
                stop,
                stats,
            )
            .run()
            .await
        }
        Role::Batch => {
            BatchSearchEngine::new(
                client,
                &config.miner_id,
                config.batch_size,
                config.refresh_interval,
                stop,
                stats,
            )
            .run()
            .await
        }
    }
}
