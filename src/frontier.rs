//! Shared frontier queue: an MPMC blocking queue built from a
//! mutex-guarded deque plus a condition variable, per spec §9's design
//! note ("use a bounded MPMC channel or a mutex-guarded deque with a
//! condition variable"). Multiple workers enqueue (discovered links)
//! and dequeue (to fetch) concurrently; `get` blocks up to a timeout and
//! that bounded wait is the engine's termination signal.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use crate::types::FrontierEntry;

pub struct Frontier {
    queue: Mutex<VecDeque<FrontierEntry>>,
    notify: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn put(&self, entry: FrontierEntry) {
        self.queue.lock().expect("frontier lock poisoned").push_back(entry);
        self.notify.notify_one();
    }

    /// Blocks up to `timeout` for an entry to become available. Returns
    /// `None` on empty-timeout, which is the worker loop's exit signal.
    pub async fn get(&self, timeout: Duration) -> Option<FrontierEntry> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(entry) = self.queue.lock().expect("frontier lock poisoned").pop_front() {
                return Some(entry);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => return None,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("frontier lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let frontier = Frontier::new();
        frontier.put(FrontierEntry {
            url: "https://a.com".into(),
            depth: 0,
        });
        let entry = frontier.get(Duration::from_millis(100)).await.unwrap();
        assert_eq!(entry.url, "https://a.com");
    }

    #[tokio::test]
    async fn get_times_out_on_empty_queue() {
        let frontier = Frontier::new();
        let start = tokio::time::Instant::now();
        let result = frontier.get(Duration::from_millis(50)).await;
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn concurrent_put_wakes_a_blocked_getter() {
        use std::sync::Arc;
        let frontier = Arc::new(Frontier::new());
        let getter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.get(Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier.put(FrontierEntry {
            url: "https://a.com/late".into(),
            depth: 0,
        });
        let entry = getter.await.unwrap().unwrap();
        assert_eq!(entry.url, "https://a.com/late");
    }
}
