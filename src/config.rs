//! CLI surface and the validated configuration it produces. Mirrors
//! `extract_with_metrics.py::parse_args` + `crawlerlib/config.py::CrawlConfig`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::error::CrawlError;

pub const DEFAULT_USER_AGENT: &str =
    "politecrawl/1.0 (+https://example.com; contact: crawler@example.com)";

/// Domain-aware, robots-friendly web crawler.
#[derive(Debug, Parser)]
#[command(name = "politecrawl", version, about)]
pub struct Cli {
    /// One or more starting URLs.
    #[arg(long, required = true, num_args = 1..)]
    pub start: Vec<String>,

    /// Domains to allow (e.g. example.com). Defaults to the hosts of --start.
    #[arg(long = "allowed-domain", num_args = 1..)]
    pub allowed_domain: Vec<String>,

    /// Maximum number of pages to crawl.
    #[arg(long, default_value_t = 200)]
    pub max_pages: i64,

    /// Maximum crawl depth from any start URL.
    #[arg(long, default_value_t = 2)]
    pub max_depth: i64,

    /// Number of concurrent workers.
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Per-host politeness delay, in seconds.
    #[arg(long, default_value_t = 0.5)]
    pub delay: f64,

    /// HTTP read timeout, in seconds.
    #[arg(long, default_value_t = 15.0)]
    pub timeout: f64,

    /// User-Agent header to send.
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Path to the JSONL output file.
    #[arg(long = "out", default_value = "crawl.jsonl")]
    pub output_path: PathBuf,

    /// Ignore robots.txt (not recommended).
    #[arg(long)]
    pub ignore_robots: bool,

    /// Path to a SQLite DB for persistence.
    #[arg(long = "sqlite")]
    pub sqlite_path: Option<PathBuf>,

    /// Resume from the SQLite frontier (requires --sqlite).
    #[arg(long)]
    pub resume: bool,

    /// Seconds between perf logs (0 to disable).
    #[arg(long = "metrics-interval", default_value_t = 10.0)]
    pub metrics_interval: f64,

    /// Max connections per pool for the HTTP client.
    #[arg(long, default_value_t = 16)]
    pub max_connections: usize,
}

/// Immutable, validated configuration the engine is built from.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub start_urls: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub max_pages: i64,
    pub max_depth: i64,
    pub concurrency: usize,
    pub max_connections: usize,
    pub delay_seconds: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub obey_robots_txt: bool,
    pub output_path: PathBuf,
    pub sqlite_path: Option<PathBuf>,
    pub resume: bool,
    pub metrics_interval: Duration,
}

impl CrawlConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, CrawlError> {
        if cli.start.is_empty() {
            return Err(CrawlError::Config("at least one --start URL is required".into()));
        }

        let allowed_domains = if cli.allowed_domain.is_empty() {
            infer_allowed_domains(&cli.start)
        } else {
            cli.allowed_domain
                .iter()
                .map(|d| d.to_lowercase().trim_start_matches('.').to_string())
                .collect()
        };

        Ok(Self {
            start_urls: cli.start,
            allowed_domains,
            max_pages: cli.max_pages.max(1),
            max_depth: cli.max_depth.max(0),
            concurrency: cli.concurrency.max(1),
            max_connections: cli.max_connections.max(1),
            delay_seconds: Duration::from_secs_f64(cli.delay.max(0.0)),
            request_timeout: Duration::from_secs_f64(cli.timeout.max(1.0)),
            user_agent: cli.user_agent,
            obey_robots_txt: !cli.ignore_robots,
            output_path: cli.output_path,
            resume: cli.sqlite_path.is_some() && cli.resume,
            sqlite_path: cli.sqlite_path,
            metrics_interval: Duration::from_secs_f64(cli.metrics_interval.max(0.0)),
        })
    }
}

fn infer_allowed_domains(start_urls: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut domains = Vec::new();
    for u in start_urls {
        let candidate = if Url::parse(u).is_ok() {
            u.clone()
        } else {
            format!("https://{u}")
        };
        if let Ok(parsed) = Url::parse(&candidate) {
            if let Some(host) = parsed.host_str() {
                let host = host.to_lowercase();
                if seen.insert(host.clone()) {
                    domains.push(host);
                }
            }
        }
    }
    domains
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli(start: Vec<String>) -> Cli {
        Cli {
            start,
            allowed_domain: vec![],
            max_pages: 200,
            max_depth: 2,
            concurrency: 8,
            delay: 0.5,
            timeout: 15.0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            output_path: PathBuf::from("crawl.jsonl"),
            ignore_robots: false,
            sqlite_path: None,
            resume: false,
            metrics_interval: 10.0,
            max_connections: 16,
        }
    }

    #[test]
    fn infers_allowed_domains_from_start_urls() {
        let config = CrawlConfig::from_cli(base_cli(vec!["https://example.com/a".to_string()])).unwrap();
        assert_eq!(config.allowed_domains, vec!["example.com".to_string()]);
    }

    #[test]
    fn resume_requires_sqlite_path() {
        let mut cli = base_cli(vec!["https://example.com".to_string()]);
        cli.resume = true;
        cli.sqlite_path = None;
        let config = CrawlConfig::from_cli(cli).unwrap();
        assert!(!config.resume);
    }

    #[test]
    fn clamps_negative_and_zero_inputs() {
        let mut cli = base_cli(vec!["https://example.com".to_string()]);
        cli.max_pages = -5;
        cli.max_depth = -1;
        cli.timeout = 0.0;
        let config = CrawlConfig::from_cli(cli).unwrap();
        assert_eq!(config.max_pages, 1);
        assert_eq!(config.max_depth, 0);
        assert_eq!(config.request_timeout, Duration::from_secs_f64(1.0));
    }

    #[test]
    fn rejects_empty_start_list() {
        let cli = base_cli(vec![]);
        assert!(CrawlConfig::from_cli(cli).is_err());
    }
}
