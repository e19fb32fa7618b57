use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending visit request. `depth` is the shortest distance from any
/// start URL known at enqueue time; it is never updated on re-discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: i64,
}

/// Outcome of fetching a URL that produced an HTTP response. `text` is
/// truncated to at most 4,000 Unicode characters before it reaches here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub status: i64,
    pub content_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub text: String,
    pub num_links: usize,
    #[serde(skip_serializing, skip_deserializing, default)]
    pub depth: i64,
    #[serde(skip_serializing, skip_deserializing, default = "Utc::now")]
    pub crawled_at: DateTime<Utc>,
}

/// A directed edge observed in an HTML page, deduplicated on
/// `(from_url, to_url)` by the persistent store's unique index.
#[derive(Debug, Clone)]
pub struct LinkEdge {
    pub from_url: String,
    pub to_url: String,
}

/// Raw result of an HTTP fetch, before content-type based text decoding
/// decisions are baked into a [`PageRecord`].
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub content_type: String,
    pub text: String,
    pub size_bytes: usize,
}

/// Fields the extractor produces from an HTML document, plus the
/// absolute, fragment-stripped links it discovered.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    pub title: String,
    pub description: String,
    pub text: String,
    pub num_links: usize,
}
