use thiserror::Error;

/// Crate-wide error taxonomy. Only [`CrawlError::Config`] is fatal; every
/// other variant is constructed, logged, and handled locally by the
/// component that raised it (see the engine's worker loop).
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("robots.txt unavailable for {origin}, defaulting to allow")]
    RobotsUnavailable { origin: String },

    #[error("failed to extract content from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("store operation failed: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("failed to write JSONL record: {0}")]
    Sink(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
