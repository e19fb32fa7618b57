//! Counter aggregation and a periodic logger. Mirrors
//! `crawlerlib/metrics.py::Metrics`/`StatsLogger`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
    pub pages: u64,
    pub bytes: u64,
    pub errors: u64,
    pub fetch_ms_sum: f64,
}

pub struct Metrics {
    totals: Mutex<Totals>,
    start: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            totals: Mutex::new(Totals::default()),
            start: Instant::now(),
        }
    }

    pub fn record_fetch(&self, ok: bool, bytes_read: usize, fetch_ms: f64) {
        let mut totals = self.totals.lock().expect("metrics lock poisoned");
        totals.pages += 1;
        totals.bytes += bytes_read as u64;
        if !ok {
            totals.errors += 1;
        }
        totals.fetch_ms_sum += fetch_ms;
    }

    pub fn snapshot(&self) -> (Totals, f64) {
        let totals = *self.totals.lock().expect("metrics lock poisoned");
        let elapsed = self.start.elapsed().as_secs_f64().max(1e-6);
        (totals, elapsed)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic logger thread-equivalent: wakes on `interval` (clamped to a
/// 0.5s minimum), snapshots, derives pages/sec and average fetch ms, and
/// logs a line. Stops on [`StatsLogger::stop`].
pub struct StatsLogger {
    stop: std::sync::Arc<Notify>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl StatsLogger {
    pub fn start(metrics: std::sync::Arc<Metrics>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(500));
        let stop = std::sync::Arc::new(Notify::new());
        let stop_clone = stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_clone.notified() => break,
                }
                let (totals, elapsed) = metrics.snapshot();
                let pps = totals.pages as f64 / elapsed;
                let mb = totals.bytes as f64 / (1024.0 * 1024.0);
                let avg_ms = totals.fetch_ms_sum / (totals.pages.max(1) as f64);
                tracing::info!(
                    pages = totals.pages,
                    errors = totals.errors,
                    mb = format!("{mb:.2}"),
                    avg_fetch_ms = format!("{avg_ms:.1}"),
                    pages_per_sec = format!("{pps:.2}"),
                    "crawl performance snapshot"
                );
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub async fn stop(mut self) {
        self.stop.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
