//! larder command-line entry point.
//!
//! Runs URLs through the caching client backed by the SQLite store and
//! prints one JSON object per URL on stdout. Logging goes to stderr so the
//! output stays machine-readable.

use anyhow::Result;
use larder_client::{LarderBuilder, RequestOptions, Response, ResponseSource};
use larder_core::{AppConfig, Error, SqliteStore, TtlStore};
use serde::Serialize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod args;

use args::{Command, USAGE};

/// One line of output.
#[derive(Debug, Serialize)]
struct FetchLine {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<ResponseSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FetchLine {
    fn from_result(url: String, result: Result<Response, Error>) -> Self {
        match result {
            Ok(response) => Self {
                url,
                final_url: Some(response.url.to_string()),
                status: Some(response.status.as_u16()),
                source: Some(response.source),
                bytes: Some(response.body.len()),
                error: None,
            },
            Err(e) => Self { url, final_url: None, status: None, source: None, bytes: None, error: Some(e.to_string()) },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let command = args::parse(std::env::args().skip(1))?;
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = AppConfig::load()?;
    let store = SqliteStore::open(&config.db_path).await?;
    tracing::debug!(db_path = %config.db_path.display(), "opened store");

    match command {
        Command::Help => {}
        Command::Clear => {
            store.clear().await?;
            tracing::info!("store cleared");
        }
        Command::Fetch { head, urls } => {
            let purged = store.purge_expired().await?;
            let live = store.live_count().await?;
            tracing::info!(purged, live, "purged expired entries");

            let larder = LarderBuilder::from_config(&config).store(Arc::new(store)).build()?;

            let lines: Vec<FetchLine> = if head || urls.len() == 1 {
                let mut lines = Vec::with_capacity(urls.len());
                for url in urls {
                    let result = if head {
                        larder.head(&url, RequestOptions::default()).await
                    } else {
                        larder.get(&url, RequestOptions::default()).await
                    };
                    lines.push(FetchLine::from_result(url, result));
                }
                lines
            } else {
                let requests = urls.iter().map(|url| (url.clone(), RequestOptions::default())).collect();
                let results = larder.get_batch(requests).await;
                urls.into_iter().zip(results).map(|(url, result)| FetchLine::from_result(url, result)).collect()
            };

            for line in lines {
                println!("{}", serde_json::to_string(&line)?);
            }
        }
    }

    Ok(())
}
