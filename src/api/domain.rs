//! Client/payment backend routes on top of the interceptor.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

use crate::interceptor::{Interceptor, ResponseSource};
use crate::queue::{ActionApplier, ActionKind, OfflineQueue, QueuedAction};

use super::types::Request;

pub const CLIENTS_PATH: &str = "/api/clientes";
pub const PAYMENTS_PATH: &str = "/api/pagamentos";
pub const BACKUPS_PATH: &str = "/api/backups";

/// What happened to a submitted mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Submitted {
  /// The backend accepted it
  Applied,
  /// Recorded for replay once connectivity returns
  Queued(QueuedAction),
}

/// Backend API. Reads go through the cache; writes go to the network or,
/// when offline, into the queue.
#[derive(Clone)]
pub struct DomainApi {
  interceptor: Arc<Interceptor>,
  queue: OfflineQueue,
}

impl DomainApi {
  pub fn new(interceptor: Arc<Interceptor>, queue: OfflineQueue) -> Self {
    Self { interceptor, queue }
  }

  pub fn queue(&self) -> &OfflineQueue {
    &self.queue
  }

  /// Build the HTTP request that applies an action.
  pub fn request_for(&self, action: ActionKind, payload: &Value) -> Result<Request> {
    let request = match action {
      ActionKind::CreateClient => {
        Request::new(Method::POST, self.interceptor.url(CLIENTS_PATH)?).with_json(payload)
      }
      ActionKind::UpdateClient => {
        let path = format!("{}/{}", CLIENTS_PATH, entity_id(payload)?);
        Request::new(Method::PUT, self.interceptor.url(&path)?).with_json(payload)
      }
      ActionKind::DeleteClient => {
        let path = format!("{}/{}", CLIENTS_PATH, entity_id(payload)?);
        Request::new(Method::DELETE, self.interceptor.url(&path)?)
      }
      ActionKind::CreateBackup => {
        Request::new(Method::POST, self.interceptor.url(BACKUPS_PATH)?).with_json(payload)
      }
    };
    Ok(request)
  }

  /// Queue a mutation for the next sync. Payloads that could never be
  /// replayed (an update or delete without an `id`) are rejected.
  pub fn enqueue(&self, action: ActionKind, payload: Value) -> Result<QueuedAction> {
    self.request_for(action, &payload)?;
    self.queue.enqueue(action, payload)
  }

  /// Apply a mutation now if online, otherwise queue it.
  ///
  /// A network failure while online also queues the action. A rejection by
  /// the backend is returned as an error and nothing is queued.
  pub async fn submit(&self, action: ActionKind, payload: Value) -> Result<Submitted> {
    let request = self.request_for(action, &payload)?;
    if !self.interceptor.connectivity().is_online() {
      return Ok(Submitted::Queued(self.queue.enqueue(action, payload)?));
    }

    match self.interceptor.handle(request).await {
      Ok(response) if response.is_success() => Ok(Submitted::Applied),
      Ok(response) => Err(eyre!(
        "{} rejected with status {}: {}",
        action,
        response.status,
        response.text()
      )),
      Err(e) => {
        tracing::warn!(action = %action, "Network unavailable, queueing: {}", e);
        Ok(Submitted::Queued(self.queue.enqueue(action, payload)?))
      }
    }
  }

  pub async fn list_clients(&self) -> Result<Vec<Value>> {
    self.list(CLIENTS_PATH).await
  }

  pub async fn list_payments(&self) -> Result<Vec<Value>> {
    self.list(PAYMENTS_PATH).await
  }

  async fn list(&self, path: &str) -> Result<Vec<Value>> {
    let request = Request::get(self.interceptor.url(path)?).with_header("Accept", "application/json");
    let result = self.interceptor.get(&request).await;
    if result.source == ResponseSource::Offline {
      return Err(eyre!("{} is not available offline", path));
    }
    if !result.response.is_success() {
      return Err(eyre!("{} returned status {}", path, result.response.status));
    }

    serde_json::from_slice(&result.response.body)
      .map_err(|e| eyre!("Failed to parse {}: {}", path, e))
  }
}

#[async_trait]
impl ActionApplier for DomainApi {
  async fn apply(&self, action: &QueuedAction) -> Result<()> {
    let request = self.request_for(action.action, &action.payload)?;
    let response = self.interceptor.handle(request).await?;
    if !response.is_success() {
      return Err(eyre!(
        "{} #{} rejected with status {}",
        action.action,
        action.id,
        response.status
      ));
    }
    Ok(())
  }
}

fn entity_id(payload: &Value) -> Result<String> {
  match payload.get("id") {
    Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
    Some(Value::Number(id)) => Ok(id.to_string()),
    _ => Err(eyre!("Payload has no usable 'id' field")),
  }
}
