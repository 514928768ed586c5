mod args;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_api::HttpState;
use monitor_app::services::blocks;
use monitor_app::{
    AppError, LocalRepository, RemoteRepository, TrackerConfig, UsageRepository, parse_timezone,
};
use monitor_core::{Plan, UsageRecord};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LISTEN: &str = "127.0.0.1:4318";
const DEFAULT_DB_FILE: &str = "usage.db";
const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);
const MAX_PERSIST_BATCH: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = args::parse_args().map_err(|err| {
        eprintln!("{err}");
        args::print_help();
        io::Error::new(io::ErrorKind::InvalidInput, "invalid arguments")
    })?;

    let config = tracker_config(&args)?;
    let repository = build_repository(&args, config)?;

    let (intake, rx) = ingest::record_queue(ingest::QUEUE_CAPACITY);
    spawn_persist_consumer(repository.clone(), rx);
    spawn_block_summary(repository.clone());

    let state = HttpState::new(repository, intake);
    let router = http_api::router(state);

    let listen = args.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
    let addr: SocketAddr = listen
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid listen address: {listen}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn tracker_config(args: &args::CliArgs) -> Result<TrackerConfig, AppError> {
    let plan = match args.plan.as_deref() {
        Some(name) => Plan::from_name(name)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown plan: {name}")))?,
        None => Plan::Unset,
    };
    let timezone = match args.timezone.as_deref() {
        Some(name) => parse_timezone(name)?,
        None => chrono_tz::UTC,
    };
    let block_start_hour = match args.block_start.as_deref() {
        Some(raw) => parse_start_hour(raw)?,
        None => 0,
    };
    TrackerConfig::new(plan, block_start_hour, timezone, args.token_limit.unwrap_or(0))
}

/// Accepts both a bare 24-hour value and a clock label like `10am`.
fn parse_start_hour(raw: &str) -> Result<u32, AppError> {
    if let Ok(hour) = raw.trim().parse::<u32>() {
        if hour <= 23 {
            return Ok(hour);
        }
        return Err(AppError::InvalidInput(format!(
            "block start hour must be 0-23, got {hour}"
        )));
    }
    blocks::parse_clock_hour(raw)
}

fn build_repository(
    args: &args::CliArgs,
    config: TrackerConfig,
) -> Result<Arc<dyn UsageRepository>, AppError> {
    if let Some(url) = args.remote_url.as_deref() {
        tracing::info!(url, "answering queries from remote instance");
        return Ok(Arc::new(RemoteRepository::new(url)?));
    }

    let db_path = args.db_path.as_deref().unwrap_or(DEFAULT_DB_FILE);
    // An unusable store is a startup failure, not something to limp past.
    if args.read_only {
        monitor_db::Db::open_read_only(db_path)?;
    } else {
        monitor_db::Db::open(db_path)?.migrate()?;
    }
    tracing::info!(db_path, read_only = args.read_only, "using local store");
    Ok(Arc::new(LocalRepository::new(db_path, args.read_only, config)))
}

/// Drains the ingestion queue and persists records in batches, so a burst
/// of exports becomes one write transaction instead of many.
fn spawn_persist_consumer(
    repository: Arc<dyn UsageRepository>,
    mut rx: mpsc::Receiver<UsageRecord>,
) {
    tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            while batch.len() < MAX_PERSIST_BATCH {
                match rx.try_recv() {
                    Ok(record) => batch.push(record),
                    Err(_) => break,
                }
            }
            match repository.append_batch(batch).await {
                Ok(written) => tracing::debug!(written, "persisted usage records"),
                Err(err) => tracing::warn!(error = %err, "failed to persist usage records"),
            }
        }
    });
}

/// Periodic operator-facing digest of the active rate-limit block.
fn spawn_block_summary(repository: Arc<dyn UsageRepository>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);
        loop {
            ticker.tick().await;
            match repository.current_block_stats().await {
                Ok(block) => tracing::info!(
                    window = %block.window,
                    requests = block.stats.total_requests(),
                    tokens = block.stats.total_tokens().total(),
                    cost_usd = block.stats.total_cost_usd(),
                    progress_percent = block.progress_percent,
                    "block summary"
                ),
                Err(err) => tracing::warn!(error = %err, "failed to compute block summary"),
            }
        }
    });
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
