//! Process-wide online/offline state.
//!
//! There is exactly one writer (`ConnectivityMonitor`) and any number of
//! readers (`Connectivity`). Transitions are forwarded to the sync event
//! channel when one is attached.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use crate::event::SyncEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
  pub online: bool,
  /// When the last transition happened
  pub since: DateTime<Utc>,
}

/// Read-only view of the connectivity state.
#[derive(Debug, Clone)]
pub struct Connectivity {
  rx: watch::Receiver<ConnectivityState>,
}

impl Connectivity {
  pub fn is_online(&self) -> bool {
    self.rx.borrow().online
  }

  pub fn state(&self) -> ConnectivityState {
    *self.rx.borrow()
  }
}

/// The single writer of the connectivity state.
pub struct ConnectivityMonitor {
  tx: watch::Sender<ConnectivityState>,
  events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl ConnectivityMonitor {
  /// Create a monitor and its reader, starting in the given state.
  pub fn new(online: bool) -> (Self, Connectivity) {
    let (tx, rx) = watch::channel(ConnectivityState {
      online,
      since: Utc::now(),
    });

    (Self { tx, events: None }, Connectivity { rx })
  }

  /// Forward transitions as `Online` / `Offline` events.
  pub fn with_events(mut self, events: mpsc::UnboundedSender<SyncEvent>) -> Self {
    self.events = Some(events);
    self
  }

  /// Record an observation. Returns `true` if it was a transition.
  pub fn set_online(&self, online: bool) -> bool {
    let changed = self.tx.send_if_modified(|state| {
      if state.online == online {
        return false;
      }
      *state = ConnectivityState {
        online,
        since: Utc::now(),
      };
      true
    });

    if changed {
      if online {
        tracing::info!("Connection restored");
      } else {
        tracing::warn!("Connection lost, working offline");
      }

      if let Some(events) = &self.events {
        let event = if online {
          SyncEvent::Online
        } else {
          SyncEvent::Offline
        };
        // Receiver gone means the event loop has shut down
        let _ = events.send(event);
      }
    }

    changed
  }
}
