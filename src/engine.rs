//! Worker pool, frontier lifecycle, and visit gating — the coordinator
//! that ties every other module together. Mirrors
//! `crawlerlib/engine.py::Crawler`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use url::Url;

use crate::bloom::BloomFilter;
use crate::config::CrawlConfig;
use crate::error::{CrawlError, Result};
use crate::frontier::Frontier;
use crate::http_client::{HttpClient, RobotsCache};
use crate::metrics::{Metrics, StatsLogger};
use crate::normalize::{is_allowed_domain, normalize_start};
use crate::parser;
use crate::rate_limiter::RateLimiter;
use crate::store::Store;
use crate::types::{ExtractedFields, FrontierEntry, PageRecord};
use crate::writer::JsonlSink;

const FRONTIER_POLL_TIMEOUT: Duration = Duration::from_millis(500);
const BLOOM_PRELOAD_BATCH: usize = 1_000;
const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;
const PROGRESS_LOG_EVERY: i64 = 10;

/// Duplicate-suppression state. With a store configured this is the
/// two-tier bloom+store check from the visited-gate design note (§9);
/// without one it falls back to a plain in-memory set.
enum VisitedGate {
    WithStore(Mutex<BloomFilter>),
    InMemory(Mutex<HashSet<String>>),
}

/// Totals handed back to the CLI entry point for the final summary log.
#[derive(Debug, Clone, Copy)]
pub struct CrawlSummary {
    pub pages: u64,
    pub bytes: u64,
    pub errors: u64,
    pub elapsed_secs: f64,
}

pub struct Crawler {
    config: CrawlConfig,
    http: Arc<HttpClient>,
    robots: RobotsCache,
    rate: RateLimiter,
    frontier: Frontier,
    store: Option<Store>,
    gate: VisitedGate,
    page_count: Mutex<i64>,
    sink: JsonlSink,
    metrics: Arc<Metrics>,
}

impl Crawler {
    /// Builds the engine and seeds its frontier, choosing the fresh or
    /// resume path per §4.6: resume requires a configured store and
    /// either an explicit `--resume` or a pre-existing output file.
    pub async fn build(config: CrawlConfig) -> Result<Self> {
        let http = Arc::new(
            HttpClient::new(&config.user_agent, config.request_timeout, config.max_connections)
                .map_err(|e| CrawlError::Config(format!("failed to construct http client: {e}")))?,
        );
        let robots = RobotsCache::new(config.user_agent.clone(), http.clone());
        let rate = RateLimiter::new(config.delay_seconds);
        let frontier = Frontier::new();

        let output_exists = config.output_path.exists();
        let resume_mode = config.sqlite_path.is_some() && (config.resume || output_exists);
        let append = config.resume || output_exists;

        let store = match &config.sqlite_path {
            Some(path) => Some(Store::open(path)?),
            None => None,
        };

        let sink = JsonlSink::open(&config.output_path, append).await?;

        let gate = match &store {
            Some(store) => {
                let capacity = config.max_pages.max(1) as u64;
                let mut bloom = BloomFilter::new(capacity, BLOOM_FALSE_POSITIVE_RATE);
                if resume_mode {
                    store.iter_pages_urls(BLOOM_PRELOAD_BATCH, |batch| bloom.add_batch(&batch))?;
                }
                VisitedGate::WithStore(Mutex::new(bloom))
            }
            None => VisitedGate::InMemory(Mutex::new(HashSet::new())),
        };

        let mut frontier_seeded = false;
        if resume_mode {
            let persisted = store
                .as_ref()
                .expect("resume mode implies a configured store")
                .load_frontier()?;
            if !persisted.is_empty() {
                for entry in persisted {
                    frontier.put(entry);
                }
                frontier_seeded = true;
            }
        }

        if !frontier_seeded {
            for url in normalize_start(&config.start_urls) {
                if let Some(store) = &store {
                    store.mark_enqueued(&url, 0)?;
                }
                frontier.put(FrontierEntry { url, depth: 0 });
            }
        }

        Ok(Self {
            config,
            http,
            robots,
            rate,
            frontier,
            store,
            gate,
            page_count: Mutex::new(0),
            sink,
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Spawns the worker pool, runs it to completion, stops the metrics
    /// ticker, and closes the JSONL sink. Consumes the crawler.
    pub async fn run(self) -> Result<CrawlSummary> {
        let crawler = Arc::new(self);

        let metrics_logger = if crawler.config.metrics_interval > Duration::ZERO {
            Some(StatsLogger::start(crawler.metrics.clone(), crawler.config.metrics_interval))
        } else {
            None
        };

        let mut workers = Vec::with_capacity(crawler.config.concurrency);
        for _ in 0..crawler.config.concurrency {
            let worker = crawler.clone();
            workers.push(tokio::spawn(async move { worker.worker_loop().await }));
        }
        for worker in workers {
            let _ = worker.await;
        }

        if let Some(logger) = metrics_logger {
            logger.stop().await;
        }

        let (totals, elapsed_secs) = crawler.metrics.snapshot();

        let crawler = Arc::try_unwrap(crawler)
            .unwrap_or_else(|_| panic!("worker tasks still hold a crawler reference after join"));
        crawler.sink.close().await?;

        tracing::info!(
            pages = totals.pages,
            errors = totals.errors,
            elapsed_secs = format!("{elapsed_secs:.1}"),
            "crawl finished"
        );

        Ok(CrawlSummary {
            pages: totals.pages,
            bytes: totals.bytes,
            errors: totals.errors,
            elapsed_secs,
        })
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            if self.at_capacity() {
                return;
            }
            let entry = match self.frontier.get(FRONTIER_POLL_TIMEOUT).await {
                Some(entry) => entry,
                None => return,
            };
            if self.at_capacity() {
                return;
            }
            match self.process_entry(entry).await {
                Ok(()) => {}
                // §7 SinkError policy: propagates to this worker, which
                // exits; other workers keep draining the frontier.
                Err(CrawlError::Sink(e)) => {
                    tracing::warn!(error = %e, "sink failure, worker exiting");
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "worker error processing an entry");
                }
            }
        }
    }

    /// Steps 4-10 of the worker loop (§4.6).
    async fn process_entry(&self, entry: FrontierEntry) -> Result<()> {
        let FrontierEntry { url, depth } = entry;

        if self.config.obey_robots_txt && !self.robots.can_fetch(&url).await {
            tracing::debug!(url = %url, "robots.txt disallows this url");
            if let Some(store) = &self.store {
                store.dequeue(&url)?;
            }
            return Ok(());
        }

        if !self.should_visit(&url)? {
            return Ok(());
        }

        if let Some(host) = host_of(&url) {
            self.rate.wait_turn(&host).await;
        }

        let started = std::time::Instant::now();
        let fetched = self.http.fetch(&url).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let fetched = match fetched {
            Some(f) => f,
            None => {
                tracing::debug!(url = %url, "fetch failed");
                self.metrics.record_fetch(false, 0, elapsed_ms);
                if let Some(store) = &self.store {
                    store.dequeue(&url)?;
                }
                return Ok(());
            }
        };

        let is_html = fetched.content_type.contains("text/html");
        let (fields, links) = if is_html && !fetched.text.is_empty() {
            parser::extract(&url, &fetched.text)
        } else {
            (ExtractedFields::default(), Vec::new())
        };

        if !links.is_empty() {
            self.enqueue_links(&links, depth)?;
        }

        let record = PageRecord {
            url: url.clone(),
            status: fetched.status as i64,
            content_type: fetched.content_type,
            title: fields.title,
            description: fields.description,
            text: fields.text,
            num_links: fields.num_links,
            depth,
            crawled_at: Utc::now(),
        };

        self.sink.write(record.clone())?;
        self.metrics.record_fetch(true, fetched.size_bytes, elapsed_ms);

        if let Some(store) = &self.store {
            store.save_page(&record)?;
            store.add_links(&url, &links)?;
            store.dequeue(&url)?;
        }

        let completed = self.increment_page_count();
        if completed % PROGRESS_LOG_EVERY == 0 {
            tracing::info!(pages = completed, url = %url, "crawl progress");
        }

        Ok(())
    }

    /// Two-tier visited gate (§4.6): bloom negative admits directly;
    /// a bloom positive falls back to the store's authoritative check
    /// for the rare false positive. Without a store, a plain set.
    fn should_visit(&self, url: &str) -> Result<bool> {
        if !is_allowed_domain(url, &self.config.allowed_domains) {
            return Ok(false);
        }
        match &self.gate {
            VisitedGate::WithStore(bloom) => {
                let store = self
                    .store
                    .as_ref()
                    .expect("store present whenever the bloom gate is active");
                let maybe_new = {
                    let mut bloom = bloom.lock().expect("bloom lock poisoned");
                    if bloom.contains(url) {
                        false
                    } else {
                        bloom.add(url);
                        true
                    }
                };
                if maybe_new {
                    return Ok(true);
                }
                if store.has_page(url)? {
                    return Ok(false);
                }
                bloom.lock().expect("bloom lock poisoned").add(url);
                Ok(true)
            }
            VisitedGate::InMemory(set) => Ok(set.lock().expect("visited set lock poisoned").insert(url.to_string())),
        }
    }

    /// Depth-bounded, domain-filtered enqueue of freshly discovered
    /// links (§4.6). An existing frontier entry's depth is never
    /// updated by re-discovery.
    fn enqueue_links(&self, links: &[String], current_depth: i64) -> Result<()> {
        let next_depth = current_depth + 1;
        if next_depth > self.config.max_depth {
            return Ok(());
        }
        for link in links {
            if !is_allowed_domain(link, &self.config.allowed_domains) {
                continue;
            }
            match &self.store {
                Some(store) => {
                    if !store.seen_url(link)? && store.mark_enqueued(link, next_depth)? {
                        self.frontier.put(FrontierEntry {
                            url: link.clone(),
                            depth: next_depth,
                        });
                    }
                }
                None => {
                    self.frontier.put(FrontierEntry {
                        url: link.clone(),
                        depth: next_depth,
                    });
                }
            }
        }
        Ok(())
    }

    fn at_capacity(&self) -> bool {
        *self.page_count.lock().expect("page count lock poisoned") >= self.config.max_pages
    }

    fn increment_page_count(&self) -> i64 {
        let mut count = self.page_count.lock().expect("page count lock poisoned");
        *count += 1;
        *count
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(
        start: Vec<String>,
        out: std::path::PathBuf,
        sqlite: Option<std::path::PathBuf>,
        resume: bool,
        max_pages: i64,
    ) -> CrawlConfig {
        CrawlConfig {
            start_urls: start,
            allowed_domains: vec![],
            max_pages,
            max_depth: 3,
            concurrency: 2,
            max_connections: 4,
            delay_seconds: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            user_agent: "test-agent".to_string(),
            obey_robots_txt: false,
            output_path: out,
            sqlite_path: sqlite,
            resume,
            metrics_interval: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn two_page_walk_discovers_and_crawls_both_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><a href=\"/b\">b</a></body></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>terminal</body></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jsonl");
        let config = test_config(vec![format!("{}/a", server.uri())], out.clone(), None, false, 10);

        let crawler = Crawler::build(config).await.unwrap();
        let summary = crawler.run().await.unwrap();
        assert!(summary.pages >= 2);

        let contents = tokio::fs::read_to_string(&out).await.unwrap();
        assert!(contents.contains("/a\""));
        assert!(contents.contains("/b\""));
    }

    #[tokio::test]
    async fn resume_picks_up_persisted_frontier_without_refetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><a href=\"/b\">b</a></body></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>terminal</body></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jsonl");
        let db = dir.path().join("crawl.db");

        let first = test_config(
            vec![format!("{}/a", server.uri())],
            out.clone(),
            Some(db.clone()),
            false,
            1,
        );
        Crawler::build(first).await.unwrap().run().await.unwrap();

        let second = test_config(vec![format!("{}/a", server.uri())], out.clone(), Some(db.clone()), true, 10);
        Crawler::build(second).await.unwrap().run().await.unwrap();

        let contents = tokio::fs::read_to_string(&out).await.unwrap();
        let a_count = contents.matches("/a\"").count();
        assert_eq!(a_count, 1);
        assert!(contents.contains("/b\""));
    }

    #[tokio::test]
    async fn depth_zero_discovers_links_but_does_not_enqueue_them() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><a href=\"/b\">b</a></body></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jsonl");
        let mut config = test_config(vec![format!("{}/a", server.uri())], out.clone(), None, false, 10);
        config.max_depth = 0;

        let crawler = Crawler::build(config).await.unwrap();
        let summary = crawler.run().await.unwrap();
        assert_eq!(summary.pages, 1);

        let contents = tokio::fs::read_to_string(&out).await.unwrap();
        let record: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(record["num_links"], 1);
    }
}
