/// Schema for the local store.
pub const SCHEMA: &str = r#"
-- Cached responses, one row per (bucket, url)
CREATE TABLE IF NOT EXISTS cache_entries (
    bucket TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (bucket, url_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_url ON cache_entries(url_hash);

-- Small JSON documents stored under fixed keys (offline queue, sequences)
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
