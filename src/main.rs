//! CLI entry point for the flight heatmap service.
//!
//! `serve` runs the OpenSky polling scheduler alongside the heatmap query
//! server; `fetch-once` runs a single ingestion cycle and exits.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use flight_heatmap::config::Config;
use flight_heatmap::fetch::BasicClient;
use flight_heatmap::fetch::token::ClientCredentials;
use flight_heatmap::geo::bounding_box;
use flight_heatmap::ingest::filter::FilterConfig;
use flight_heatmap::ingest::scheduler::{API_URL_STATES_ALL, CycleOutcome, Fetcher};
use flight_heatmap::server::router;
use flight_heatmap::store::SqliteStore;

#[derive(Parser)]
#[command(name = "flight_heatmap")]
#[command(about = "Polls OpenSky for aircraft positions near a reference point and serves a density heatmap", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling scheduler and the heatmap query server
    Serve {
        /// Address to bind the query server on
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,

        /// Seconds between ingestion cycles
        #[arg(long, default_value_t = 10)]
        poll_interval_secs: u64,
    },
    /// Run a single ingestion cycle and exit
    FetchOnce,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/flight_heatmap.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("flight_heatmap.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve {
            addr,
            poll_interval_secs,
        } => serve(config, &addr, poll_interval_secs).await,
        Commands::FetchOnce => fetch_once(config).await,
    }
}

/// Connects to the store, retrying so the service can come up before the
/// database is reachable.
async fn connect_with_retry(url: &str, max_retries: u32, delay: Duration) -> Result<SqliteStore> {
    let mut attempt = 0;
    loop {
        match SqliteStore::connect(url).await {
            Ok(store) => return Ok(store),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!(attempt, max_retries, error = %e, "store not ready, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "could not connect to store after {max_retries} retries: {e}"
                ));
            }
        }
    }
}

fn build_fetcher(
    config: &Config,
    store: Arc<SqliteStore>,
) -> Result<Fetcher<BasicClient, ClientCredentials, Arc<SqliteStore>>> {
    let bbox = bounding_box(config.center_lat, config.center_lon, config.radius_km);
    let filter = FilterConfig {
        reference_lat: config.center_lat,
        reference_lon: config.center_lon,
        max_distance_km: config.radius_km,
        max_altitude_m: config.max_altitude_m,
    };

    let fetcher = Fetcher::new(
        BasicClient::new()?,
        ClientCredentials::new(config.client_id.clone(), config.client_secret.clone())?,
        store,
        API_URL_STATES_ALL,
        bbox,
        filter,
    )?;

    Ok(fetcher)
}

async fn serve(config: Config, addr: &str, poll_interval_secs: u64) -> Result<()> {
    let store =
        Arc::new(connect_with_retry(&config.database_url, 10, Duration::from_secs(2)).await?);
    let mut fetcher = build_fetcher(&config, store.clone())?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    // The scheduler runs independently of request serving; the two share
    // only the store. An in-flight cycle always finishes before the loop
    // observes shutdown.
    let poll_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match fetcher.run_cycle().await {
                        Ok(CycleOutcome::Skipped { until }) => {
                            info!(%until, "cycle skipped, backoff active");
                        }
                        Ok(CycleOutcome::RateLimited { retry_secs }) => {
                            info!(retry_secs, "rate limited, next cycles will skip");
                        }
                        Ok(CycleOutcome::Completed(_)) => {}
                        Err(e) => error!(error = %e, "ingestion cycle failed"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("scheduler stopping");
                    break;
                }
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "query server listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    poll_task.await?;
    info!("shutdown complete");
    Ok(())
}

async fn fetch_once(config: Config) -> Result<()> {
    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    let mut fetcher = build_fetcher(&config, store)?;

    match fetcher.run_cycle().await? {
        CycleOutcome::Skipped { until } => info!(%until, "cycle skipped, backoff active"),
        CycleOutcome::RateLimited { retry_secs } => info!(retry_secs, "rate limited"),
        CycleOutcome::Completed(stats) => info!(?stats, "cycle complete"),
    }

    Ok(())
}
