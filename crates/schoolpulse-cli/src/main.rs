//! schoolpulse - command-line host for the school website data core.
//!
//! Loads the public content snapshot, watches polled endpoints, or keeps the
//! content store refreshing in the background and prints every change.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use schoolpulse_core::{
    spawn_auto_refresh, Config, ContentStore, HttpFetcher, PollResult, Poller, Subscription,
};

// ============================================================================
// Constants
// ============================================================================

/// Directory for daily rotated log files; file logging is off when unset
const LOG_DIR_ENV: &str = "SCHOOLPULSE_LOG_DIR";

const LOG_FILE_PREFIX: &str = "schoolpulse.log";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must outlive `main`'s work.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::load().context("Failed to load configuration")?;

    match args.first().map(String::as_str) {
        Some("content") => {
            let force = args[1..].iter().any(|arg| arg == "--force");
            show_content(&config, force).await
        }
        Some("watch") => watch(&config, &args[1..]).await,
        Some("serve-refresh") => serve_refresh(&config).await,
        Some("config") => {
            let write = args[1..].iter().any(|arg| arg == "--write");
            show_config(&config, write)
        }
        Some("help") | Some("--help") | Some("-h") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            anyhow::bail!("Unknown command: {}", other)
        }
    }
}

fn print_usage() {
    eprintln!("Usage: schoolpulse <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  content [--force]      Load public content once and print the snapshot");
    eprintln!("  watch [endpoint ...]   Poll endpoints and print every result until Ctrl-C");
    eprintln!("  serve-refresh          Keep public content refreshed and print each change");
    eprintln!("  config [--write]       Print the effective configuration, optionally saving it");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SCHOOLPULSE_API_URL    Backend base URL");
    eprintln!("  SCHOOLPULSE_LOG_DIR    Also write daily log files here");
    eprintln!("  RUST_LOG               Log filter (default: warn)");
}

fn http_fetcher(config: &Config) -> Result<Arc<HttpFetcher>> {
    let fetcher = HttpFetcher::new(config.api_base_url.as_str())
        .context("Failed to build HTTP client")?;
    Ok(Arc::new(fetcher))
}

async fn show_content(config: &Config, force: bool) -> Result<()> {
    let store = ContentStore::new(http_fetcher(config)?, config.content_store_config());
    let snapshot = store.load(force).await;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if let Some(age) = store.cache_age_display() {
        eprintln!("Cache: {}", age);
    }
    if let Some(error) = snapshot.error {
        anyhow::bail!(error);
    }
    Ok(())
}

fn print_result(endpoint: &str, result: PollResult) {
    match result {
        Ok(data) => println!("{} {}", endpoint, data),
        Err(e) => eprintln!("{} failed: {}", endpoint, e),
    }
}

async fn watch(config: &Config, endpoints: &[String]) -> Result<()> {
    let endpoints = if endpoints.is_empty() {
        config.watch_endpoints.clone()
    } else {
        endpoints.to_vec()
    };
    if endpoints.is_empty() {
        anyhow::bail!("No endpoints to watch. Pass some or set watch_endpoints in the config file.");
    }

    let poller = Poller::new(http_fetcher(config)?, config.poller_config());
    let subscriptions: Vec<Subscription> = endpoints
        .iter()
        .map(|endpoint| {
            let name = endpoint.clone();
            poller.subscribe(endpoint.as_str(), move |result| print_result(&name, result), None)
        })
        .collect();
    info!(endpoints = subscriptions.len(), "Watching, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    poller.stop_all();
    drop(subscriptions);
    Ok(())
}

async fn serve_refresh(config: &Config) -> Result<()> {
    let store = Arc::new(ContentStore::new(
        http_fetcher(config)?,
        config.content_store_config(),
    ));
    let mut changes = store.watch();
    let handle = spawn_auto_refresh(store.clone(), config.poll_interval());
    info!(interval_ms = config.poll_interval_ms, "Auto refresh running, press Ctrl-C to stop");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = changes.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&snapshot)?);
                if !snapshot.loading {
                    let cache_age = store
                        .cache_age_display()
                        .unwrap_or_else(|| "none".to_string());
                    info!(source = ?snapshot.source, cache_age = %cache_age, "Content settled");
                }
            }
        }
    }

    handle.stop().await.context("Auto refresh task failed")?;
    Ok(())
}

fn show_config(config: &Config, write: bool) -> Result<()> {
    let path = Config::config_path()?;
    if write {
        config.save().context("Failed to save configuration")?;
        eprintln!("Wrote {}", path.display());
    } else {
        eprintln!("Config file: {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
