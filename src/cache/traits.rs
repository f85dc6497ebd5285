//! Core types for the cache store.

use chrono::{DateTime, Utc};

use crate::api::Response;

/// Which of the two logical buckets an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
  /// Versioned app shell assets
  Static,
  /// Opportunistically cached data responses
  Dynamic,
}

/// A cached response, keyed by its exact request URL.
#[derive(Debug, Clone)]
pub struct CachedAsset {
  pub url: String,
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  /// Name of the physical bucket holding this entry
  pub bucket: String,
  pub cached_at: DateTime<Utc>,
}

impl CachedAsset {
  pub fn from_response(url: &str, bucket: &str, response: &Response) -> Self {
    Self {
      url: url.to_string(),
      status: response.status,
      content_type: response.content_type.clone(),
      body: response.body.clone(),
      bucket: bucket.to_string(),
      cached_at: Utc::now(),
    }
  }

  pub fn into_response(self) -> Response {
    Response::new(self.status, self.content_type, self.body)
  }
}

/// A deployment's versioned set of static assets.
///
/// Installing a manifest precaches its assets into the versioned static
/// bucket; activating it discards every bucket from previous versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
  pub prefix: String,
  pub version: String,
  /// Absolute URLs of the static assets
  pub assets: Vec<String>,
}

impl AssetManifest {
  pub fn static_bucket(&self) -> String {
    format!("{}-static-{}", self.prefix, self.version)
  }

  pub fn dynamic_bucket(&self) -> String {
    format!("{}-dynamic", self.prefix)
  }

  pub fn bucket_name(&self, kind: BucketKind) -> String {
    match kind {
      BucketKind::Static => self.static_bucket(),
      BucketKind::Dynamic => self.dynamic_bucket(),
    }
  }

  pub fn is_static_asset(&self, url: &str) -> bool {
    self.assets.iter().any(|asset| asset == url)
  }
}
