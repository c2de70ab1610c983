//! Durable storage
//!
//! SQLite-backed persistence shared by the cache store and the replay queue.

pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::cache::CacheEntry;
use crate::models::ResponsePayload;
use crate::queue::QueuedRequest;

// == Storage Error ==
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Storage task failed: {0}")]
    Task(String),
}

type Result<T> = std::result::Result<T, StorageError>;

type Headers = Vec<(String, String)>;

// == Database ==
/// Database connection wrapper.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens or creates the database file, creating its parent directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private database that lives as long as this value.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    // == Cache Entries ==
    /// Inserts or replaces the row for the entry's (namespace, key).
    pub fn upsert_cache_entry(&self, entry: &CacheEntry) -> Result<()> {
        let headers = serde_json::to_string(&entry.payload.headers)?;

        self.conn()?.execute(
            "INSERT OR REPLACE INTO cache_entries
                (namespace, request_key, status, headers, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.namespace,
                entry.request_key,
                entry.payload.status,
                headers,
                entry.payload.body,
                entry.stored_at as i64,
            ],
        )?;

        Ok(())
    }

    pub fn delete_cache_entry(&self, namespace: &str, request_key: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND request_key = ?2",
            params![namespace, request_key],
        )?;
        Ok(())
    }

    /// Deletes every entry of a namespace, returning how many rows went.
    pub fn clear_cache_namespace(&self, namespace: &str) -> Result<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1",
            params![namespace],
        )?;
        Ok(removed)
    }

    /// Loads every stored entry, oldest first.
    pub fn load_cache_entries(&self) -> Result<Vec<CacheEntry>> {
        let rows: Vec<(String, String, u16, String, Vec<u8>, i64)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT namespace, request_key, status, headers, body, stored_at
                 FROM cache_entries ORDER BY stored_at ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?;
            let collected = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            collected
        };

        rows.into_iter()
            .map(|(namespace, request_key, status, headers, body, stored_at)| {
                let headers: Headers = serde_json::from_str(&headers)?;
                Ok(CacheEntry::new(
                    namespace,
                    request_key,
                    ResponsePayload::new(status, headers, body),
                    stored_at.max(0) as u64,
                ))
            })
            .collect()
    }

    // == Replay Queue ==
    /// Appends a mutation and returns it with its assigned id.
    pub fn insert_queued(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &[u8],
        enqueued_at: u64,
    ) -> Result<QueuedRequest> {
        let encoded = serde_json::to_string(headers)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO replay_queue (method, url, headers, body, enqueued_at, attempt_count)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![method, url, encoded, body, enqueued_at as i64],
        )?;

        Ok(QueuedRequest {
            id: conn.last_insert_rowid(),
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.to_vec(),
            body: body.to_vec(),
            enqueued_at,
            attempt_count: 0,
        })
    }

    /// Loads the queue in ascending id order.
    pub fn load_queue(&self) -> Result<Vec<QueuedRequest>> {
        let rows: Vec<(i64, String, String, String, Vec<u8>, i64, u32)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, method, url, headers, body, enqueued_at, attempt_count
                 FROM replay_queue ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?;
            let collected = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            collected
        };

        rows.into_iter()
            .map(
                |(id, method, url, headers, body, enqueued_at, attempt_count)| {
                    Ok(QueuedRequest {
                        id,
                        method,
                        url,
                        headers: serde_json::from_str(&headers)?,
                        body,
                        enqueued_at: enqueued_at.max(0) as u64,
                        attempt_count,
                    })
                },
            )
            .collect()
    }

    /// Removes a queued mutation. Returns false if it was already gone.
    pub fn delete_queued(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM replay_queue WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Bumps the attempt counter and returns the new value.
    pub fn record_failed_attempt(&self, id: i64) -> Result<Option<u32>> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE replay_queue SET attempt_count = attempt_count + 1 WHERE id = ?1",
            params![id],
        )?;

        let attempts = conn
            .query_row(
                "SELECT attempt_count FROM replay_queue WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(attempts)
    }

    pub fn count_queued(&self) -> Result<usize> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM replay_queue", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch_for_test(&self, sql: &str) {
        self.conn().unwrap().execute_batch(sql).unwrap();
    }

    /// Holds the connection lock for `duration`, signalling once it is taken.
    #[cfg(test)]
    pub(crate) fn hold_connection_for_test(
        &self,
        duration: std::time::Duration,
        locked: std::sync::mpsc::Sender<()>,
    ) {
        let _conn = self.conn().unwrap();
        locked.send(()).unwrap();
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, stored_at: u64) -> CacheEntry {
        CacheEntry::new(
            "assets",
            key,
            ResponsePayload::new(
                200,
                vec![("content-type".to_string(), "text/css".to_string())],
                "body{}",
            ),
            stored_at,
        )
    }

    #[test]
    fn test_cache_entries_roundtrip_oldest_first() {
        let db = Database::open_in_memory().unwrap();

        db.upsert_cache_entry(&entry("b", 20)).unwrap();
        db.upsert_cache_entry(&entry("a", 10)).unwrap();

        let loaded = db.load_cache_entries().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], entry("a", 10));
        assert_eq!(loaded[1].request_key, "b");
    }

    #[test]
    fn test_cache_upsert_replaces() {
        let db = Database::open_in_memory().unwrap();

        db.upsert_cache_entry(&entry("a", 10)).unwrap();
        db.upsert_cache_entry(&entry("a", 30)).unwrap();

        let loaded = db.load_cache_entries().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].stored_at, 30);
    }

    #[test]
    fn test_cache_delete_and_clear() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_cache_entry(&entry("a", 1)).unwrap();
        db.upsert_cache_entry(&entry("b", 2)).unwrap();

        db.delete_cache_entry("assets", "a").unwrap();
        assert_eq!(db.load_cache_entries().unwrap().len(), 1);

        assert_eq!(db.clear_cache_namespace("assets").unwrap(), 1);
        assert!(db.load_cache_entries().unwrap().is_empty());
    }

    #[test]
    fn test_queue_ids_are_monotonic() {
        let db = Database::open_in_memory().unwrap();

        let first = db.insert_queued("POST", "https://x/api/a", &[], b"1", 5).unwrap();
        let second = db.insert_queued("PUT", "https://x/api/b", &[], b"2", 6).unwrap();
        assert!(second.id > first.id);

        // Deleting the newest row must not let its id be reused
        db.delete_queued(second.id).unwrap();
        let third = db.insert_queued("DELETE", "https://x/api/c", &[], b"", 7).unwrap();
        assert!(third.id > second.id);

        let ids: Vec<i64> = db.load_queue().unwrap().iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![first.id, third.id]);
    }

    #[test]
    fn test_queue_attempts_and_count() {
        let db = Database::open_in_memory().unwrap();
        let headers = vec![("content-type".to_string(), "application/json".to_string())];
        let queued = db
            .insert_queued("POST", "https://x/api/bookings", &headers, b"{}", 42)
            .unwrap();

        assert_eq!(db.record_failed_attempt(queued.id).unwrap(), Some(1));
        assert_eq!(db.record_failed_attempt(queued.id).unwrap(), Some(2));
        assert_eq!(db.count_queued().unwrap(), 1);

        let loaded = db.load_queue().unwrap();
        assert_eq!(loaded[0].attempt_count, 2);
        assert_eq!(loaded[0].headers, headers);
        assert_eq!(loaded[0].enqueued_at, 42);

        assert!(db.delete_queued(queued.id).unwrap());
        assert!(!db.delete_queued(queued.id).unwrap());
        assert_eq!(db.record_failed_attempt(queued.id).unwrap(), None);
        assert_eq!(db.count_queued().unwrap(), 0);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.db");

        let db = Database::open(&path).unwrap();
        db.insert_queued("POST", "https://x/api", &[], b"", 1).unwrap();
        drop(db);

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.count_queued().unwrap(), 1);
    }
}
