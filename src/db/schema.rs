//! SQLite schema for the cache store and the replay queue.

pub const SCHEMA: &str = r#"
-- Stored responses, one row per (namespace, request key)
CREATE TABLE IF NOT EXISTS cache_entries (
    namespace TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at INTEGER NOT NULL,
    PRIMARY KEY (namespace, request_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_stored
    ON cache_entries(stored_at);

-- Mutations waiting for connectivity. AUTOINCREMENT keeps ids monotonic
-- even after the newest row is deleted, so id order is issue order.
CREATE TABLE IF NOT EXISTS replay_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    enqueued_at INTEGER NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0
);
"#;
