use std::sync::Arc;

use clap::Parser;

use pow_lab::config::CoordinatorConfig;
use pow_lab::coordinator::Coordinator;
use pow_lab::server::CoordinatorServer;

#[derive(Parser, Debug)]
#[clap(about = "Hands out hash-puzzle templates and arbitrates one winner per generation")]
struct Cli {
    /// Listen address, e.g. 127.0.0.1:8000
    #[clap(long)]
    bind: Option<String>,

    /// Required leading zero bits in a solution digest
    #[clap(long)]
    difficulty_bits: Option<u32>,

    /// How many closed generations the stats snapshot keeps visible
    #[clap(long)]
    recent_log_limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = CoordinatorConfig::from_env()?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(bits) = cli.difficulty_bits {
        config.difficulty_bits = bits;
    }
    if let Some(limit) = cli.recent_log_limit {
        config.recent_log_limit = limit;
    }
    config.validate()?;

    log::info!(
        "starting coordinator: difficulty_bits={} recent_log_limit={}",
        config.difficulty_bits,
        config.recent_log_limit
    );

    let coordinator = Arc::new(Coordinator::new(&config));
    CoordinatorServer::new(coordinator).serve(&config.bind_addr).await
}
