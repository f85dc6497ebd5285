//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::db::Database;

use super::traits::CachedAsset;

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Look up a URL in the given buckets, returning the first hit in bucket order.
  fn get(&self, buckets: &[String], url: &str) -> Result<Option<CachedAsset>>;

  /// Store (or replace) an entry.
  fn put(&self, asset: &CachedAsset) -> Result<()>;

  /// Store a batch of entries. Either all of them land or none do.
  fn put_all(&self, assets: &[CachedAsset]) -> Result<()>;

  /// Names of all buckets currently holding entries.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Delete every bucket not listed in `keep`, atomically. Returns the deleted names.
  fn retain_buckets(&self, keep: &[String]) -> Result<Vec<String>>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _buckets: &[String], _url: &str) -> Result<Option<CachedAsset>> {
    Ok(None) // Always miss
  }

  fn put(&self, _asset: &CachedAsset) -> Result<()> {
    Ok(()) // Discard
  }

  fn put_all(&self, _assets: &[CachedAsset]) -> Result<()> {
    Ok(())
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn retain_buckets(&self, _keep: &[String]) -> Result<Vec<String>> {
    Ok(Vec::new())
  }
}

fn insert_entry(conn: &rusqlite::Connection, asset: &CachedAsset) -> Result<()> {
  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries (bucket, url_hash, url, status, content_type, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        asset.bucket,
        hash_url(&asset.url),
        asset.url,
        asset.status,
        asset.content_type,
        asset.body,
        asset.cached_at.to_rfc3339(),
      ],
    )
    .map_err(|e| eyre!("Failed to store cache entry for {}: {}", asset.url, e))?;

  Ok(())
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl CacheStorage for SqliteStorage {
  fn get(&self, buckets: &[String], url: &str) -> Result<Option<CachedAsset>> {
    let conn = self.db.lock()?;
    let url_hash = hash_url(url);

    let mut stmt = conn
      .prepare(
        "SELECT status, content_type, body, cached_at FROM cache_entries
         WHERE bucket = ? AND url_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    for bucket in buckets {
      let row: Option<(u16, Option<String>, Vec<u8>, String)> = stmt
        .query_row(params![bucket, url_hash], |row| {
          Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .optional()
        .map_err(|e| eyre!("Failed to query cache entry: {}", e))?;

      if let Some((status, content_type, body, cached_at)) = row {
        return Ok(Some(CachedAsset {
          url: url.to_string(),
          status,
          content_type,
          body,
          bucket: bucket.clone(),
          cached_at: parse_datetime(&cached_at)?,
        }));
      }
    }

    Ok(None)
  }

  fn put(&self, asset: &CachedAsset) -> Result<()> {
    insert_entry(&*self.db.lock()?, asset)
  }

  fn put_all(&self, assets: &[CachedAsset]) -> Result<()> {
    self.db.transaction(|tx| {
      for asset in assets {
        insert_entry(tx, asset)?;
      }
      Ok(())
    })
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT bucket FROM cache_entries ORDER BY bucket")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn retain_buckets(&self, keep: &[String]) -> Result<Vec<String>> {
    let stale: Vec<String> = self
      .bucket_names()?
      .into_iter()
      .filter(|name| !keep.contains(name))
      .collect();

    self.db.transaction(|tx| {
      for bucket in &stale {
        tx.execute("DELETE FROM cache_entries WHERE bucket = ?", params![bucket])
          .map_err(|e| eyre!("Failed to delete bucket {}: {}", bucket, e))?;
      }
      Ok(())
    })?;

    Ok(stale)
  }
}

/// SHA256 of the URL for stable, fixed-length keys
fn hash_url(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
