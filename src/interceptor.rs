//! Network interceptor: cache-first GETs with network fallback.
//!
//! 1. Non-GET requests go straight to the transport
//! 2. A cached response for the exact URL is returned without touching the network
//! 3. Otherwise the network is tried; 200 same-origin responses are cached
//! 4. If the network is unavailable, navigations get the cached root document
//!    and everything else gets a synthetic 503

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::sync::Arc;
use url::Url;

use crate::api::{Request, Response, ResponseKind, Transport};
use crate::cache::{BucketKind, CacheStore};
use crate::connectivity::Connectivity;

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  Cache,
  Network,
  /// Cached root document served in place of an unreachable page
  Fallback,
  /// Synthetic offline notice
  Offline,
}

#[derive(Debug, Clone)]
pub struct Intercepted {
  pub response: Response,
  pub source: ResponseSource,
}

pub struct Interceptor {
  cache: CacheStore,
  transport: Arc<dyn Transport>,
  connectivity: Connectivity,
  origin: Url,
  root_document: String,
}

impl Interceptor {
  pub fn new(
    cache: CacheStore,
    transport: Arc<dyn Transport>,
    connectivity: Connectivity,
    origin: Url,
    root_document: &str,
  ) -> Result<Self> {
    let root_document = origin
      .join(root_document)
      .map_err(|e| eyre!("Invalid root document '{}': {}", root_document, e))?
      .to_string();

    Ok(Self {
      cache,
      transport,
      connectivity,
      origin,
      root_document,
    })
  }

  /// Resolve an app path (e.g. "/api/clientes") to an absolute URL.
  pub fn url(&self, path: &str) -> Result<String> {
    self
      .origin
      .join(path)
      .map(String::from)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }

  pub fn connectivity(&self) -> &Connectivity {
    &self.connectivity
  }

  /// Send a request through the interceptor.
  ///
  /// GETs never fail: they resolve to a cached, network, or offline response.
  /// Other methods return whatever the transport returns.
  pub async fn handle(&self, request: Request) -> Result<Response> {
    if request.method != Method::GET {
      return self.transport.send(request).await;
    }
    Ok(self.get(&request).await.response)
  }

  /// Cache-first GET.
  pub async fn get(&self, request: &Request) -> Intercepted {
    match self.cache.lookup(&request.url) {
      Ok(Some(asset)) => {
        tracing::debug!(
          url = %request.url,
          bucket = %asset.bucket,
          cached_at = %asset.cached_at,
          "Serving from cache"
        );
        return Intercepted {
          response: asset.into_response(),
          source: ResponseSource::Cache,
        };
      }
      Ok(None) => {}
      Err(e) => tracing::warn!(url = %request.url, "Cache lookup failed: {}", e),
    }

    if !self.connectivity.is_online() {
      tracing::debug!(url = %request.url, "Offline, skipping network");
      return self.fallback(request);
    }

    match self.transport.send(request.clone()).await {
      Ok(response) => {
        if response.status == 200 && response.kind == ResponseKind::Basic {
          let bucket = self.cache.bucket_for(&request.url);
          if let Err(e) = self.cache.store(bucket, &request.url, &response) {
            tracing::warn!(url = %request.url, "Failed to cache response: {}", e);
          }
        }
        Intercepted {
          response,
          source: ResponseSource::Network,
        }
      }
      Err(e) => {
        tracing::debug!(url = %request.url, "Network fetch failed: {}", e);
        self.fallback(request)
      }
    }
  }

  fn fallback(&self, request: &Request) -> Intercepted {
    if request.accepts_html() {
      match self.cache.lookup(&self.root_document) {
        Ok(Some(asset)) => {
          return Intercepted {
            response: asset.into_response(),
            source: ResponseSource::Fallback,
          }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Root document lookup failed: {}", e),
      }
    }

    Intercepted {
      response: Response::offline_notice(),
      source: ResponseSource::Offline,
    }
  }

  /// Precache every asset of the manifest into the static bucket.
  ///
  /// All assets are fetched before any is stored, and they are stored in one
  /// transaction. Any failure aborts the install and leaves the bucket empty.
  pub async fn install(&self) -> Result<usize> {
    let manifest = self.cache.manifest().clone();
    let mut fetched = Vec::with_capacity(manifest.assets.len());

    for url in &manifest.assets {
      let response = self
        .transport
        .send(Request::get(url.as_str()))
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", url, e))?;
      if response.status != 200 {
        return Err(eyre!(
          "Failed to precache {}: status {}",
          url,
          response.status
        ));
      }
      fetched.push((url, response));
    }

    let count = self.cache.store_all(
      BucketKind::Static,
      fetched.iter().map(|(url, response)| (url.as_str(), response)),
    )?;

    tracing::info!(
      bucket = %manifest.static_bucket(),
      count,
      "Installed static assets"
    );
    Ok(count)
  }

  /// Make the current manifest the only one on disk.
  pub fn activate(&self) -> Result<Vec<String>> {
    self.cache.activate()
  }
}
