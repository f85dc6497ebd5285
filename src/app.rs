use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::api::{DomainApi, HttpClient, Request, Submitted, Transport};
use crate::cache::{AssetManifest, CacheStorage, CacheStore, NoopStorage, SqliteStorage};
use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::db::Database;
use crate::event::{self, EventHandler, SyncEvent};
use crate::interceptor::{Interceptor, ResponseSource};
use crate::notify::ConsoleNotifier;
use crate::queue::{ActionKind, OfflineQueue, QueuedAction};
use crate::sync::{SyncOrchestrator, SyncOutcome, SyncState};

#[derive(Debug, Clone, Copy)]
pub struct Status {
  pub connectivity: ConnectivityState,
  pub sync: SyncState,
  pub pending: usize,
}

/// Wires the cache store, queue, interceptor and orchestrator together.
pub struct App {
  config: Config,
  transport: Arc<dyn Transport>,
  monitor: ConnectivityMonitor,
  events: EventHandler,
  interceptor: Arc<Interceptor>,
  api: DomainApi,
  orchestrator: Arc<SyncOrchestrator>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let transport: Arc<dyn Transport> = Arc::new(HttpClient::new(&config)?);
    let db = Arc::new(Database::open(&config.data_dir()?.join("paysync.db"))?);
    Self::with_parts(config, transport, db)
  }

  fn with_parts(config: Config, transport: Arc<dyn Transport>, db: Arc<Database>) -> Result<Self> {
    let origin = Url::parse(&config.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url '{}': {}", config.api.base_url, e))?;

    let events = EventHandler::new();
    // Offline until the first probe says otherwise, so that probe counts as a reconnect
    let (monitor, connectivity) = ConnectivityMonitor::new(false);
    let monitor = monitor.with_events(events.sender());

    let storage: Arc<dyn CacheStorage> = if config.cache.enabled {
      Arc::new(SqliteStorage::new(Arc::clone(&db)))
    } else {
      Arc::new(NoopStorage)
    };
    let cache = CacheStore::new(storage, manifest(&config, &origin)?);

    let interceptor = Arc::new(Interceptor::new(
      cache,
      Arc::clone(&transport),
      connectivity.clone(),
      origin,
      &config.cache.root_document,
    )?);
    let queue = OfflineQueue::new(db);
    let api = DomainApi::new(Arc::clone(&interceptor), queue.clone());
    let orchestrator = Arc::new(SyncOrchestrator::new(
      queue,
      Arc::new(api.clone()),
      connectivity,
      Arc::new(ConsoleNotifier),
    ));

    Ok(Self {
      config,
      transport,
      monitor,
      events,
      interceptor,
      api,
      orchestrator,
    })
  }

  fn health_url(&self) -> Result<String> {
    self.interceptor.url(&self.config.sync.health_path)
  }

  /// Probe the backend once and record the result.
  pub async fn check_connectivity(&self) -> Result<bool> {
    let online = event::probe(self.transport.as_ref(), &self.health_url()?).await;
    self.monitor.set_online(online);
    Ok(online)
  }

  /// Long-running mode: keep the cache current and drain the queue on every trigger.
  pub async fn run(self) -> Result<()> {
    let health_url = self.health_url()?;

    // Old buckets are only discarded once the new static bucket is complete
    match self.interceptor.install().await {
      Ok(_) => {
        if let Err(e) = self.interceptor.activate() {
          tracing::error!("Failed to discard old cache buckets: {}", e);
        }
      }
      Err(e) => tracing::warn!("Precache failed, old cache buckets kept: {}", e),
    }

    let queue = self.api.queue();
    if !queue.is_empty()? {
      tracing::info!(pending = queue.len()?, "Offline actions waiting for sync");
    }

    let Self {
      config,
      transport,
      monitor,
      events,
      orchestrator,
      ..
    } = self;

    events.spawn_probe(monitor, transport, health_url, config.sync.probe_interval());
    events.spawn_ticker(config.sync.interval());
    events.spawn_wake_listener();

    tracing::info!(
      interval_secs = config.sync.interval_secs,
      "Sync loop started"
    );
    tokio::select! {
      _ = orchestrator.run(events) => {}
      result = tokio::signal::ctrl_c() => {
        result.map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
        tracing::info!("Shutting down");
      }
    }

    Ok(())
  }

  /// Fetch a path through the interceptor.
  pub async fn get(&self, path: &str, html: bool) -> Result<(ResponseSource, Vec<u8>)> {
    self.check_connectivity().await?;

    let accept = if html { "text/html" } else { "application/json" };
    let request = Request::get(self.interceptor.url(path)?).with_header("Accept", accept);
    let result = self.interceptor.get(&request).await;
    Ok((result.source, result.response.body))
  }

  pub fn enqueue(&self, action: ActionKind, payload: Value) -> Result<QueuedAction> {
    self.api.enqueue(action, payload)
  }

  pub async fn submit(&self, action: ActionKind, payload: Value) -> Result<Submitted> {
    self.check_connectivity().await?;
    self.api.submit(action, payload).await
  }

  pub fn pending(&self) -> Result<Vec<QueuedAction>> {
    self.api.queue().pending()
  }

  pub fn clear_queue(&self) -> Result<usize> {
    let dropped = self.api.queue().len()?;
    self.api.queue().clear()?;
    tracing::warn!(dropped, "Offline queue cleared");
    Ok(dropped)
  }

  pub async fn clients(&self) -> Result<Vec<Value>> {
    self.check_connectivity().await?;
    self.api.list_clients().await
  }

  pub async fn payments(&self) -> Result<Vec<Value>> {
    self.check_connectivity().await?;
    self.api.list_payments().await
  }

  pub async fn status(&self) -> Result<Status> {
    self.check_connectivity().await?;
    Ok(Status {
      connectivity: self.interceptor.connectivity().state(),
      sync: self.orchestrator.state(),
      pending: self.api.queue().len()?,
    })
  }

  pub async fn sync_once(&self) -> Result<SyncOutcome> {
    self.check_connectivity().await?;
    Ok(self.orchestrator.trigger(SyncEvent::Visible).await)
  }
}

/// The static asset manifest for the configured deployment.
fn manifest(config: &Config, origin: &Url) -> Result<AssetManifest> {
  let assets = config
    .cache
    .static_assets
    .iter()
    .map(|path| {
      origin
        .join(path)
        .map(String::from)
        .map_err(|e| eyre!("Invalid static asset '{}': {}", path, e))
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(AssetManifest {
    prefix: config.cache.prefix.clone(),
    version: config.cache.version.clone(),
    assets,
  })
}
