//! Durable frontier, pages, and link-graph tables backed by SQLite.
//! Mirrors `crawlerlib/storage.py::SqliteStore`. All statements are
//! serialized through a single exclusive lock around one logical
//! connection, matching §4.4 and §5's "single logical connection"
//! requirement; WAL + `synchronous=NORMAL` let external readers of the
//! same file observe committed rows without blocking writers.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::types::{FrontierEntry, PageRecord};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pages (
                 url TEXT PRIMARY KEY,
                 status INTEGER,
                 content_type TEXT,
                 title TEXT,
                 description TEXT,
                 text TEXT,
                 depth INTEGER,
                 crawled_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
             );
             CREATE TABLE IF NOT EXISTS frontier (
                 url TEXT PRIMARY KEY,
                 depth INTEGER
             );
             CREATE TABLE IF NOT EXISTS links (
                 from_url TEXT,
                 to_url TEXT,
                 UNIQUE(from_url, to_url)
             );
             CREATE INDEX IF NOT EXISTS idx_frontier_depth ON frontier(depth);
             CREATE INDEX IF NOT EXISTS idx_links_from ON links(from_url);",
        )?;
        Ok(())
    }

    /// Insert into `frontier` if absent. Returns true iff a row was
    /// newly inserted (i.e. the URL was not already enqueued).
    pub fn mark_enqueued(&self, url: &str, depth: i64) -> Result<bool> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let changed = conn.execute(
            "INSERT OR IGNORE INTO frontier(url, depth) VALUES (?1, ?2)",
            params![url, depth],
        )?;
        Ok(changed > 0)
    }

    pub fn dequeue(&self, url: &str) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute("DELETE FROM frontier WHERE url = ?1", params![url])?;
        Ok(())
    }

    /// True iff `url` exists in either `pages` or `frontier`.
    pub fn seen_url(&self, url: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let in_pages: Option<i64> = conn
            .query_row("SELECT 1 FROM pages WHERE url = ?1 LIMIT 1", params![url], |r| r.get(0))
            .optional()?;
        if in_pages.is_some() {
            return Ok(true);
        }
        let in_frontier: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM frontier WHERE url = ?1 LIMIT 1",
                params![url],
                |r| r.get(0),
            )
            .optional()?;
        Ok(in_frontier.is_some())
    }

    /// True iff `url` exists in `pages` (ignores the frontier).
    pub fn has_page(&self, url: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let row: Option<i64> = conn
            .query_row("SELECT 1 FROM pages WHERE url = ?1 LIMIT 1", params![url], |r| r.get(0))
            .optional()?;
        Ok(row.is_some())
    }

    /// All frontier rows, ordered by ascending depth.
    pub fn load_frontier(&self) -> Result<Vec<FrontierEntry>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare("SELECT url, depth FROM frontier ORDER BY depth ASC")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(FrontierEntry {
                    url: r.get(0)?,
                    depth: r.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Streams page URLs in batches of `batch_size`, invoking `on_batch`
    /// for each, so callers (bloom filter preload on resume) never hold
    /// more than one batch in memory at a time.
    pub fn iter_pages_urls(&self, batch_size: usize, mut on_batch: impl FnMut(Vec<String>)) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare("SELECT url FROM pages")?;
        let mut rows = stmt.query([])?;
        let mut batch = Vec::with_capacity(batch_size);
        while let Some(row) = rows.next()? {
            batch.push(row.get::<_, String>(0)?);
            if batch.len() >= batch_size {
                on_batch(std::mem::take(&mut batch));
            }
        }
        if !batch.is_empty() {
            on_batch(batch);
        }
        Ok(())
    }

    /// Upsert a page row (INSERT-OR-REPLACE: last writer wins).
    pub fn save_page(&self, record: &PageRecord) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO pages(url, status, content_type, title, description, text, depth) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.url,
                record.status,
                record.content_type,
                record.title,
                record.description,
                record.text,
                record.depth,
            ],
        )?;
        Ok(())
    }

    /// Bulk insert-or-ignore edges from `from_url` to each of `to_urls`.
    pub fn add_links(&self, from_url: &str, to_urls: &[String]) -> Result<()> {
        if to_urls.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO links(from_url, to_url) VALUES (?1, ?2)")?;
            for to_url in to_urls {
                stmt.execute(params![from_url, to_url])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
