//! Sync orchestrator: decides when to drain the offline queue.
//!
//! `Idle → Draining` on an online, visible or tick event; back to `Idle`
//! once the drain resolves. Only one drain runs at a time and triggers that
//! arrive meanwhile are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connectivity::Connectivity;
use crate::event::{EventHandler, SyncEvent};
use crate::notify::Notifier;
use crate::queue::{ActionApplier, DrainReport, OfflineQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Idle,
  Draining,
}

/// Result of one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  /// A drain was already in flight
  Busy,
  /// Connectivity is down, nothing attempted
  Offline,
  Drained(DrainReport),
  /// The queue itself could not be read
  Failed,
}

/// Resets the single-flight flag when a drain ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct SyncOrchestrator {
  queue: OfflineQueue,
  applier: Arc<dyn ActionApplier>,
  connectivity: Connectivity,
  notifier: Arc<dyn Notifier>,
  draining: AtomicBool,
}

impl SyncOrchestrator {
  pub fn new(
    queue: OfflineQueue,
    applier: Arc<dyn ActionApplier>,
    connectivity: Connectivity,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    Self {
      queue,
      applier,
      connectivity,
      notifier,
      draining: AtomicBool::new(false),
    }
  }

  pub fn state(&self) -> SyncState {
    if self.draining.load(Ordering::Acquire) {
      SyncState::Draining
    } else {
      SyncState::Idle
    }
  }

  /// Run one sync cycle unless one is already in flight.
  pub async fn trigger(&self, reason: SyncEvent) -> SyncOutcome {
    if self
      .draining
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      tracing::debug!(?reason, "Sync already in progress, ignoring trigger");
      return SyncOutcome::Busy;
    }
    let _guard = DrainGuard(&self.draining);

    if !self.connectivity.is_online() {
      tracing::debug!(?reason, "Offline, skipping sync");
      return SyncOutcome::Offline;
    }

    tracing::debug!(?reason, "Draining offline queue");
    let applier = Arc::clone(&self.applier);
    let result = self
      .queue
      .drain(|action| {
        let applier = Arc::clone(&applier);
        async move { applier.apply(&action).await }
      })
      .await;

    match result {
      Ok(report) => {
        if report.succeeded > 0 {
          tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "Offline actions synced"
          );
          self.notifier.notify("Sync complete", &summary(&report));
        }
        SyncOutcome::Drained(report)
      }
      Err(e) => {
        tracing::error!("Failed to read offline queue: {}", e);
        SyncOutcome::Failed
      }
    }
  }

  /// Process events for the life of the process. The handler holds its own
  /// sender, so the loop only ends when the caller drops this future.
  ///
  /// Each trigger runs as its own task so that events arriving mid-drain hit
  /// the single-flight guard instead of piling up behind it.
  pub async fn run(self: Arc<Self>, mut events: EventHandler) {
    while let Some(event) = events.next().await {
      if event == SyncEvent::Offline {
        continue;
      }
      let this = Arc::clone(&self);
      tokio::spawn(async move {
        this.trigger(event).await;
      });
    }
  }
}

fn summary(report: &DrainReport) -> String {
  let noun = if report.succeeded == 1 {
    "action"
  } else {
    "actions"
  };
  format!("{} offline {} synced", report.succeeded, noun)
}
