//! Append-only JSONL sink. Mirrors `crawlerlib/storage.py::JsonlWriter`:
//! one record per line, flushed to the OS after every write so results
//! are visible to concurrent readers and survive abrupt termination.
//! Adapted from the teacher's channel-owning writer task, but trading
//! its batched flush-on-size/interval policy for per-write flushing, per
//! spec §4.5.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};

use crate::error::{CrawlError, Result};
use crate::types::PageRecord;

pub struct JsonlSink {
    sender: mpsc::UnboundedSender<PageRecord>,
    done: oneshot::Receiver<()>,
    failure: Arc<Mutex<Option<String>>>,
}

impl JsonlSink {
    /// Opens `path` for append (`append = true`, used on resume or when
    /// the output already exists) or truncation (`append = false`),
    /// creating parent directories as needed, and spawns the task that
    /// owns the file handle.
    pub async fn open(path: impl AsRef<Path>, append: bool) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(append)
            .truncate(!append)
            .write(true)
            .open(path)
            .await?;
        let writer = BufWriter::new(file);

        let (sender, mut receiver) = mpsc::unbounded_channel::<PageRecord>();
        let (done_tx, done_rx) = oneshot::channel();
        let failure = Arc::new(Mutex::new(None));
        let task_failure = failure.clone();

        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(record) = receiver.recv().await {
                if let Err(e) = write_line(&mut writer, &record).await {
                    tracing::warn!(error = %e, "failed to write JSONL record");
                    *task_failure.lock().expect("sink failure lock poisoned") = Some(e.to_string());
                    break;
                }
            }
            let _ = writer.flush().await;
            let _ = done_tx.send(());
        });

        Ok(Self {
            sender,
            done: done_rx,
            failure,
        })
    }

    /// Enqueues `record` for serialization and an immediate flush.
    /// Per §7, a sink error propagates to the calling worker, which then
    /// exits: once the background task hits a write failure it records
    /// it and stops consuming, so this call (or the next one, since the
    /// failing write's own `write()` call has already returned) surfaces
    /// a `CrawlError::Sink` from then on, and also when the writer task
    /// has already exited for any other reason.
    pub fn write(&self, record: PageRecord) -> Result<()> {
        if let Some(reason) = self.failure.lock().expect("sink failure lock poisoned").clone() {
            return Err(CrawlError::Sink(std::io::Error::other(reason)));
        }
        self.sender
            .send(record)
            .map_err(|_| CrawlError::Sink(std::io::Error::other("JSONL writer task has exited")))
    }

    /// Drops the sender so the writer task drains and flushes, then
    /// waits for it to finish. Idempotent: calling it twice is safe
    /// since the second call observes an already-closed channel.
    /// Surfaces the same write failure `write()` would have, if one
    /// occurred after the caller's last successful check.
    pub async fn close(self) -> Result<()> {
        drop(self.sender);
        let _ = self.done.await;
        if let Some(reason) = self.failure.lock().expect("sink failure lock poisoned").clone() {
            return Err(CrawlError::Sink(std::io::Error::other(reason)));
        }
        Ok(())
    }
}

async fn write_line<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, record: &PageRecord) -> std::io::Result<()> {
    let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
