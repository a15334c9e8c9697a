//! muninn - cached Gemini lookups from the command line.
//!
//! Reads one request per line from stdin (or takes them as arguments) and
//! prints one JSON object per answer. Requests run concurrently through a
//! shared [`RequestCache`](muninn::RequestCache), so repeated lines cost one
//! outbound call.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::info;

use muninn::config::{Config, api_key_from_env};
use muninn::{CachedFetcher, Fetcher, GeminiClient, RequestCache, RetryingFetcher, spawn_sweeper};

/// Cached Gemini lookups
#[derive(Parser)]
#[command(name = "muninn")]
#[command(version)]
#[command(about = "Single-flight cached Gemini lookups")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Requests to answer (omit to read lines from stdin).
    text: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let api_key = api_key_from_env()?;

    let client = match config.gemini.base_url {
        Some(ref base_url) => GeminiClient::with_base_url(api_key, base_url),
        None => GeminiClient::new(api_key),
    };
    let mut client = client
        .model(&config.gemini.model)
        .timeout(Duration::from_secs(config.gemini.timeout_secs));
    if let Some(ref template) = config.gemini.prompt_template {
        client = client.prompt_template(template);
    }

    let cache = Arc::new(RequestCache::new(config.cache.to_cache_config()));
    let sweeper = config
        .sweep
        .interval()
        .map(|period| spawn_sweeper(Arc::clone(&cache), period));

    let fetcher = Arc::new(CachedFetcher::new(
        RetryingFetcher::new(client, config.retry.to_retry_config()),
        Arc::clone(&cache),
    ));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.gemini.model,
        "muninn starting"
    );

    let mut tasks = JoinSet::new();
    let mut spawn = |text: String| {
        let fetcher = Arc::clone(&fetcher);
        tasks.spawn(async move {
            let line = match fetcher.fetch(&text).await {
                Ok(result) => json!({ "input": text, "result": result }),
                Err(e) => json!({ "input": text, "error": e.to_string() }),
            };
            println!("{line}");
        });
    };

    if args.text.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if !line.trim().is_empty() {
                spawn(line);
            }
        }
    } else {
        args.text.into_iter().for_each(&mut spawn);
    }

    while let Some(joined) = tasks.join_next().await {
        joined?;
    }

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!(cached = cache.len(), "muninn done");
    Ok(())
}
