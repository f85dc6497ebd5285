//! Cache store that owns the bucket layout of the current deployment.

use color_eyre::Result;
use std::sync::Arc;

use super::storage::CacheStorage;
use super::traits::{AssetManifest, BucketKind, CachedAsset};
use crate::api::Response;

/// Cache store for intercepted responses.
///
/// Only the active static bucket and the dynamic bucket are ever read;
/// buckets left behind by older versions are invisible until `activate`
/// deletes them.
pub struct CacheStore {
  storage: Arc<dyn CacheStorage>,
  manifest: AssetManifest,
}

impl CacheStore {
  /// Create a new cache store with the given storage backend.
  pub fn new(storage: Arc<dyn CacheStorage>, manifest: AssetManifest) -> Self {
    Self { storage, manifest }
  }

  pub fn manifest(&self) -> &AssetManifest {
    &self.manifest
  }

  fn active_buckets(&self) -> [String; 2] {
    [self.manifest.static_bucket(), self.manifest.dynamic_bucket()]
  }

  /// Exact-URL lookup across the active buckets.
  pub fn lookup(&self, url: &str) -> Result<Option<CachedAsset>> {
    self.storage.get(&self.active_buckets(), url)
  }

  /// Bucket a URL is filed under when fetched.
  pub fn bucket_for(&self, url: &str) -> BucketKind {
    if self.manifest.is_static_asset(url) {
      BucketKind::Static
    } else {
      BucketKind::Dynamic
    }
  }

  /// Store a response under the given bucket.
  pub fn store(&self, kind: BucketKind, url: &str, response: &Response) -> Result<CachedAsset> {
    let asset = CachedAsset::from_response(url, &self.manifest.bucket_name(kind), response);
    self.storage.put(&asset)?;
    Ok(asset)
  }

  /// Store a batch of responses under one bucket in a single write.
  pub fn store_all<'a, I>(&self, kind: BucketKind, responses: I) -> Result<usize>
  where
    I: IntoIterator<Item = (&'a str, &'a Response)>,
  {
    let bucket = self.manifest.bucket_name(kind);
    let assets: Vec<CachedAsset> = responses
      .into_iter()
      .map(|(url, response)| CachedAsset::from_response(url, &bucket, response))
      .collect();
    self.storage.put_all(&assets)?;
    Ok(assets.len())
  }

  /// Delete every bucket that doesn't belong to the current manifest.
  ///
  /// Returns the names of the deleted buckets.
  pub fn activate(&self) -> Result<Vec<String>> {
    let deleted = self.storage.retain_buckets(&self.active_buckets())?;
    for bucket in &deleted {
      tracing::info!(bucket = %bucket, "Deleted stale cache bucket");
    }
    Ok(deleted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::db::Database;

  fn manifest(version: &str) -> AssetManifest {
    AssetManifest {
      prefix: "app".to_string(),
      version: version.to_string(),
      assets: vec!["http://a/".to_string(), "http://a/app.js".to_string()],
    }
  }

  fn ok(body: &str) -> Response {
    Response::new(200, Some("text/plain".to_string()), body.as_bytes().to_vec())
  }

  #[test]
  fn test_bucket_for_uses_manifest() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = CacheStore::new(Arc::new(SqliteStorage::new(db)), manifest("v1"));

    assert_eq!(store.bucket_for("http://a/app.js"), BucketKind::Static);
    assert_eq!(store.bucket_for("http://a/api/clientes"), BucketKind::Dynamic);
  }

  #[test]
  fn test_version_bump_hides_then_deletes_old_static_bucket() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::new(db));

    let v1 = CacheStore::new(Arc::clone(&storage), manifest("v1"));
    v1.store(BucketKind::Static, "http://a/app.js", &ok("v1 js")).unwrap();
    v1.store(BucketKind::Dynamic, "http://a/api/clientes", &ok("[]")).unwrap();

    let v2 = CacheStore::new(Arc::clone(&storage), manifest("v2"));
    // Old static entry is not visible to the new version
    assert!(v2.lookup("http://a/app.js").unwrap().is_none());
    // The dynamic bucket is unversioned and survives
    assert!(v2.lookup("http://a/api/clientes").unwrap().is_some());

    assert_eq!(v2.activate().unwrap(), vec!["app-static-v1".to_string()]);
    assert_eq!(
      storage.bucket_names().unwrap(),
      vec!["app-dynamic".to_string()]
    );
  }
}
