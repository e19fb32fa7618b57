mod bloom;
mod config;
mod engine;
mod error;
mod frontier;
mod http_client;
mod metrics;
mod normalize;
mod parser;
mod rate_limiter;
mod store;
mod types;
mod writer;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{Cli, CrawlConfig};
use engine::Crawler;
use error::CrawlError;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match CrawlConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("crawl failed: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(config: CrawlConfig) -> anyhow::Result<()> {
    tracing::info!(
        starts = ?config.start_urls,
        allowed_domains = ?config.allowed_domains,
        max_pages = config.max_pages,
        max_depth = config.max_depth,
        concurrency = config.concurrency,
        "starting crawl"
    );

    let crawler = Crawler::build(config).await.map_err(anyhow_from_crawl_error)?;
    let summary = crawler.run().await.map_err(anyhow_from_crawl_error)?;
    tracing::info!(pages = summary.pages, errors = summary.errors, "done");
    Ok(())
}

fn anyhow_from_crawl_error(e: CrawlError) -> anyhow::Error {
    anyhow::Error::new(e)
}
