//! Offline action queue.
//!
//! Mutations attempted while disconnected are persisted as `QueuedAction`s
//! under a fixed key and replayed in insertion order by `drain`. An action
//! leaves the queue only after it has been applied successfully; failures
//! stay queued for the next drain with no backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use crate::db::{kv_get, kv_set, Database};

/// Key holding the JSON array of pending actions
pub const QUEUE_KEY: &str = "offline_actions";
/// Key holding the last allocated action id
pub const SEQUENCE_KEY: &str = "offline_actions_seq";

/// The mutations that can be recorded while offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
  CreateClient,
  UpdateClient,
  DeleteClient,
  CreateBackup,
}

impl ActionKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::CreateClient => "create-client",
      Self::UpdateClient => "update-client",
      Self::DeleteClient => "delete-client",
      Self::CreateBackup => "create-backup",
    }
  }
}

impl fmt::Display for ActionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ActionKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, String> {
    match s {
      "create-client" => Ok(Self::CreateClient),
      "update-client" => Ok(Self::UpdateClient),
      "delete-client" => Ok(Self::DeleteClient),
      "create-backup" => Ok(Self::CreateBackup),
      other => Err(format!(
        "unknown action '{}' (expected create-client, update-client, delete-client or create-backup)",
        other
      )),
    }
  }
}

/// A recorded mutation awaiting replay. Never modified once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
  pub id: u64,
  pub action: ActionKind,
  pub payload: Value,
  pub timestamp: DateTime<Utc>,
}

/// Applies one queued action against the backend.
#[async_trait]
pub trait ActionApplier: Send + Sync {
  async fn apply(&self, action: &QueuedAction) -> Result<()>;
}

/// Persistence for the queue.
pub trait QueueStorage: Send + Sync {
  /// All pending actions in insertion order.
  fn load(&self) -> Result<Vec<QueuedAction>>;

  /// Allocate an id and append an action atomically.
  fn append(
    &self,
    action: ActionKind,
    payload: Value,
    timestamp: DateTime<Utc>,
  ) -> Result<QueuedAction>;

  /// Remove an action by id. Returns `false` if it wasn't queued.
  fn remove(&self, id: u64) -> Result<bool>;

  fn clear(&self) -> Result<()>;
}

fn read_queue(conn: &rusqlite::Connection) -> Result<Vec<QueuedAction>> {
  match kv_get(conn, QUEUE_KEY)? {
    Some(json) => {
      serde_json::from_str(&json).map_err(|e| eyre!("Corrupt offline queue: {}", e))
    }
    None => Ok(Vec::new()),
  }
}

fn write_queue(conn: &rusqlite::Connection, actions: &[QueuedAction]) -> Result<()> {
  let json =
    serde_json::to_string(actions).map_err(|e| eyre!("Failed to serialize queue: {}", e))?;
  kv_set(conn, QUEUE_KEY, &json)
}

impl QueueStorage for Database {
  fn load(&self) -> Result<Vec<QueuedAction>> {
    read_queue(&*self.lock()?)
  }

  fn append(
    &self,
    action: ActionKind,
    payload: Value,
    timestamp: DateTime<Utc>,
  ) -> Result<QueuedAction> {
    self.transaction(|tx| {
      let last_id = match kv_get(tx, SEQUENCE_KEY)? {
        Some(s) => s
          .parse::<u64>()
          .map_err(|e| eyre!("Corrupt action sequence '{}': {}", s, e))?,
        None => 0,
      };
      let record = QueuedAction {
        id: last_id + 1,
        action,
        payload,
        timestamp,
      };

      let mut actions = read_queue(tx)?;
      actions.push(record.clone());
      write_queue(tx, &actions)?;
      kv_set(tx, SEQUENCE_KEY, &record.id.to_string())?;

      Ok(record)
    })
  }

  fn remove(&self, id: u64) -> Result<bool> {
    self.transaction(|tx| {
      let mut actions = read_queue(tx)?;
      let before = actions.len();
      actions.retain(|a| a.id != id);
      if actions.len() == before {
        return Ok(false);
      }
      write_queue(tx, &actions)?;
      Ok(true)
    })
  }

  fn clear(&self) -> Result<()> {
    write_queue(&*self.lock()?, &[])
  }
}

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub succeeded: usize,
  pub failed: usize,
  /// Actions still queued after the cycle (failures plus anything enqueued meanwhile)
  pub remaining: usize,
}

/// The offline queue manager. Sole owner of the persisted queue.
#[derive(Clone)]
pub struct OfflineQueue {
  storage: Arc<dyn QueueStorage>,
}

impl OfflineQueue {
  pub fn new(storage: Arc<dyn QueueStorage>) -> Self {
    Self { storage }
  }

  /// Record an action. On a storage failure the action is dropped and the
  /// error returned so the caller can ask the user to retry by hand.
  pub fn enqueue(&self, action: ActionKind, payload: Value) -> Result<QueuedAction> {
    match self.storage.append(action, payload, Utc::now()) {
      Ok(record) => {
        tracing::info!(id = record.id, action = %action, "Queued action for sync");
        Ok(record)
      }
      Err(e) => {
        tracing::error!(action = %action, "Failed to queue action, dropping it: {}", e);
        Err(e)
      }
    }
  }

  pub fn pending(&self) -> Result<Vec<QueuedAction>> {
    self.storage.load()
  }

  pub fn len(&self) -> Result<usize> {
    Ok(self.storage.load()?.len())
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  pub fn clear(&self) -> Result<()> {
    self.storage.clear()
  }

  /// Replay every queued action in insertion order.
  ///
  /// An action is removed only when `apply` resolves `Ok`. An `Err` or a
  /// panic counts as a failure for that action alone and iteration goes on.
  /// Each removal is persisted before the next action is attempted.
  pub async fn drain<F, Fut>(&self, mut apply: F) -> Result<DrainReport>
  where
    F: FnMut(QueuedAction) -> Fut,
    Fut: Future<Output = Result<()>>,
  {
    let snapshot = self.storage.load()?;
    let mut report = DrainReport::default();
    let mut still_queued = 0;

    for action in snapshot {
      let id = action.id;
      let kind = action.action;

      let result = match AssertUnwindSafe(apply(action)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(eyre!("apply panicked")),
      };

      match result {
        Ok(()) => match self.storage.remove(id) {
          Ok(_) => report.succeeded += 1,
          Err(e) => {
            // Applied but still queued: it will be replayed next cycle
            tracing::error!(id, action = %kind, "Failed to remove synced action: {}", e);
            report.failed += 1;
            still_queued += 1;
          }
        },
        Err(e) => {
          tracing::warn!(id, action = %kind, "Sync failed, keeping action queued: {}", e);
          report.failed += 1;
          still_queued += 1;
        }
      }
    }

    report.remaining = match self.storage.load() {
      Ok(actions) => actions.len(),
      Err(_) => still_queued,
    };

    tracing::debug!(
      succeeded = report.succeeded,
      failed = report.failed,
      remaining = report.remaining,
      "Drain finished"
    );
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::Mutex;

  fn queue() -> OfflineQueue {
    OfflineQueue::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[test]
  fn test_action_kind_wire_names() {
    assert_eq!(
      serde_json::to_value(ActionKind::CreateClient).unwrap(),
      json!("create-client")
    );
    assert_eq!(
      "delete-client".parse::<ActionKind>().unwrap(),
      ActionKind::DeleteClient
    );
    assert!("drop-table".parse::<ActionKind>().is_err());
  }

  #[test]
  fn test_enqueue_assigns_increasing_ids() {
    let queue = queue();
    let a = queue.enqueue(ActionKind::CreateClient, json!({"nome": "A"})).unwrap();
    let b = queue.enqueue(ActionKind::CreateBackup, json!({})).unwrap();

    assert!(b.id > a.id);
    assert_eq!(queue.pending().unwrap(), vec![a, b]);
  }

  #[tokio::test]
  async fn test_ids_are_not_reused_after_drain() {
    let queue = queue();
    let first = queue.enqueue(ActionKind::CreateClient, json!({})).unwrap();
    queue.drain(|_| async { Ok(()) }).await.unwrap();

    let second = queue.enqueue(ActionKind::CreateClient, json!({})).unwrap();
    assert!(second.id > first.id);
  }

  #[tokio::test]
  async fn test_drain_all_succeed_in_order() {
    let queue = queue();
    let mut expected = Vec::new();
    for i in 0..5 {
      expected.push(queue.enqueue(ActionKind::UpdateClient, json!({"id": i})).unwrap().id);
    }

    let seen = Mutex::new(Vec::new());
    let report = queue
      .drain(|action| {
        seen.lock().unwrap().push(action.id);
        async { Ok(()) }
      })
      .await
      .unwrap();

    assert_eq!(*seen.lock().unwrap(), expected);
    assert_eq!(
      report,
      DrainReport {
        succeeded: 5,
        failed: 0,
        remaining: 0
      }
    );
    assert!(queue.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_failed_subset_stays_in_order() {
    let queue = queue();
    for i in 0..6 {
      queue.enqueue(ActionKind::UpdateClient, json!({"id": i})).unwrap();
    }

    let report = queue
      .drain(|action| async move {
        if action.payload["id"].as_i64().unwrap() % 2 == 0 {
          Ok(())
        } else {
          Err(eyre!("rejected"))
        }
      })
      .await
      .unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 3);
    assert_eq!(report.remaining, 3);

    let left: Vec<i64> = queue
      .pending()
      .unwrap()
      .iter()
      .map(|a| a.payload["id"].as_i64().unwrap())
      .collect();
    assert_eq!(left, vec![1, 3, 5]);
  }

  #[tokio::test]
  async fn test_failed_drain_leaves_action_unchanged() {
    let queue = queue();
    let original = queue
      .enqueue(ActionKind::CreateClient, json!({"nome": "Maria", "telefone": "11999990000"}))
      .unwrap();

    let report = queue.drain(|_| async { Err(eyre!("offline")) }).await.unwrap();
    assert_eq!(report.failed, 1);

    assert_eq!(queue.pending().unwrap(), vec![original]);
  }

  #[tokio::test]
  async fn test_panicking_apply_does_not_abort_drain() {
    let queue = queue();
    queue.enqueue(ActionKind::CreateClient, json!({"n": 1})).unwrap();
    queue.enqueue(ActionKind::CreateClient, json!({"n": 2})).unwrap();

    let report = queue
      .drain(|action| async move {
        if action.payload["n"] == 1 {
          panic!("bad payload");
        }
        Ok(())
      })
      .await
      .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(queue.pending().unwrap()[0].payload["n"], 1);
  }

  #[tokio::test]
  async fn test_actions_enqueued_during_drain_are_kept() {
    let queue = queue();
    queue.enqueue(ActionKind::CreateClient, json!({"n": 1})).unwrap();

    let inner = queue.clone();
    let report = queue
      .drain(move |_| {
        inner.enqueue(ActionKind::CreateBackup, json!({})).unwrap();
        async { Ok(()) }
      })
      .await
      .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.remaining, 1);
    assert_eq!(queue.pending().unwrap()[0].action, ActionKind::CreateBackup);
  }

  struct FullStorage;

  impl QueueStorage for FullStorage {
    fn load(&self) -> Result<Vec<QueuedAction>> {
      Ok(Vec::new())
    }

    fn append(&self, _: ActionKind, _: Value, _: DateTime<Utc>) -> Result<QueuedAction> {
      Err(eyre!("quota exceeded"))
    }

    fn remove(&self, _: u64) -> Result<bool> {
      Ok(false)
    }

    fn clear(&self) -> Result<()> {
      Ok(())
    }
  }

  #[test]
  fn test_enqueue_failure_drops_action() {
    let queue = OfflineQueue::new(Arc::new(FullStorage));
    assert!(queue.enqueue(ActionKind::CreateBackup, json!({})).is_err());
    assert!(queue.is_empty().unwrap());
  }

  struct StuckStorage(Database);

  impl QueueStorage for StuckStorage {
    fn load(&self) -> Result<Vec<QueuedAction>> {
      self.0.load()
    }

    fn append(&self, action: ActionKind, payload: Value, at: DateTime<Utc>) -> Result<QueuedAction> {
      self.0.append(action, payload, at)
    }

    fn remove(&self, _: u64) -> Result<bool> {
      Err(eyre!("disk I/O error"))
    }

    fn clear(&self) -> Result<()> {
      QueueStorage::clear(&self.0)
    }
  }

  #[tokio::test]
  async fn test_unremovable_action_is_not_counted_as_synced() {
    let storage = StuckStorage(Database::open_in_memory().unwrap());
    let queue = OfflineQueue::new(Arc::new(storage));
    queue.enqueue(ActionKind::CreateClient, json!({"nome": "A"})).unwrap();

    let report = queue.drain(|_| async { Ok(()) }).await.unwrap();

    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.remaining, 1);
  }

  #[test]
  fn test_persisted_format() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let queue = OfflineQueue::new(db.clone());
    queue.enqueue(ActionKind::DeleteClient, json!({"id": "c1"})).unwrap();

    let raw = kv_get(&db.lock().unwrap(), QUEUE_KEY).unwrap().unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    let record = &value[0];
    assert_eq!(record["id"], 1);
    assert_eq!(record["action"], "delete-client");
    assert_eq!(record["payload"]["id"], "c1");
    assert!(record["timestamp"].is_string());
  }
}
