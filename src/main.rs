use anyhow::Result;
use clap::Parser;
use sputnik::runtime::runner::{run_session, ExitStatus};
use sputnik::runtime::shutdown::shutdown_on_signals;
use sputnik::runtime::telemetry::init_tracing;
use sputnik::{HttpFeedFetcher, JsonFileStore, ReconcilerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Re-synchronises a user's subscribed feeds against their persisted cursors.
#[derive(Parser, Debug)]
#[command(name = "sputnik", version)]
struct Cli {
    /// User identifier whose feed batch should be reconciled
    user_id: String,

    /// Directory holding per-user batch files (overrides SPUTNIK_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Maximum number of feeds fetched at once (overrides SPUTNIK_MAX_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-feed fetch timeout in seconds (overrides SPUTNIK_FETCH_TIMEOUT_SECS)
    #[arg(long)]
    fetch_timeout_secs: Option<u64>,
}

impl Cli {
    fn config(&self) -> Result<ReconcilerConfig> {
        let mut builder = ReconcilerConfig::builder().apply_env()?;
        if let Some(dir) = &self.data_dir {
            builder = builder.data_dir(dir.clone());
        }
        if let Some(count) = self.concurrency {
            builder = builder.max_concurrent_fetches(count);
        }
        if let Some(secs) = self.fetch_timeout_secs {
            builder = builder.fetch_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let status = run(cli).await;
    std::process::exit(status.code());
}

async fn run(cli: Cli) -> ExitStatus {
    let config = match cli.config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = ?err, "invalid configuration");
            return ExitStatus::Startup;
        }
    };
    let fetcher = match HttpFeedFetcher::from_config(&config) {
        Ok(fetcher) => fetcher,
        Err(err) => {
            tracing::error!(error = ?err, "failed to build feed fetcher");
            return ExitStatus::Startup;
        }
    };
    let store = JsonFileStore::new(config.data_dir());

    let (shutdown, signals) = shutdown_on_signals();
    let status = run_session(
        &cli.user_id,
        &store,
        Arc::new(fetcher),
        &config,
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    let _ = signals.await;
    status
}
