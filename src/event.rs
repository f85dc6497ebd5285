use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::{Request, Transport};
use crate::connectivity::ConnectivityMonitor;

/// Sync trigger events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
  /// Connectivity came back
  Online,
  /// Connectivity was lost
  Offline,
  /// The host application was brought back to the foreground
  Visible,
  /// Periodic drain timer
  Tick,
}

/// Single dispatch point for sync events from timers, probes and signals
pub struct EventHandler {
  tx: mpsc::UnboundedSender<SyncEvent>,
  rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  /// Get a sender for pushing events from elsewhere
  pub fn sender(&self) -> mpsc::UnboundedSender<SyncEvent> {
    self.tx.clone()
  }

  /// Emit `Tick` every `period`, starting one period from now
  pub fn spawn_ticker(&self, period: Duration) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      loop {
        interval.tick().await;
        if tx.send(SyncEvent::Tick).is_err() {
          break;
        }
      }
    });
  }

  /// Probe the health endpoint every `period` and feed the result to the monitor.
  ///
  /// The monitor emits `Online` / `Offline` on transitions.
  pub fn spawn_probe(
    &self,
    monitor: ConnectivityMonitor,
    transport: Arc<dyn Transport>,
    health_url: String,
    period: Duration,
  ) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      loop {
        interval.tick().await;
        if tx.is_closed() {
          break;
        }
        let online = probe(transport.as_ref(), &health_url).await;
        monitor.set_online(online);
      }
    });
  }

  /// Emit `Visible` on SIGUSR1, sent by a host shell when the app returns to the foreground
  #[cfg(unix)]
  pub fn spawn_wake_listener(&self) {
    use tokio::signal::unix::{signal, SignalKind};

    let tx = self.tx.clone();
    tokio::spawn(async move {
      let mut wake = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
          tracing::warn!("Cannot listen for wake signal: {}", e);
          return;
        }
      };
      while wake.recv().await.is_some() {
        if tx.send(SyncEvent::Visible).is_err() {
          break;
        }
      }
    });
  }

  #[cfg(not(unix))]
  pub fn spawn_wake_listener(&self) {}

  /// Receive the next event
  pub async fn next(&mut self) -> Option<SyncEvent> {
    self.rx.recv().await
  }
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}

/// One connectivity probe. Any response at all means the backend is reachable.
pub async fn probe(transport: &dyn Transport, health_url: &str) -> bool {
  match transport.send(Request::get(health_url)).await {
    Ok(response) => {
      tracing::debug!(status = response.status, "Health probe answered");
      true
    }
    Err(e) => {
      tracing::debug!("Health probe failed: {}", e);
      false
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::MockTransport;

  #[tokio::test]
  async fn test_probe_reflects_transport() {
    let transport = MockTransport::new();
    transport.respond("http://a/api/health", 200, "ok");
    assert!(probe(&transport, "http://a/api/health").await);

    transport.set_offline(true);
    assert!(!probe(&transport, "http://a/api/health").await);
  }

  #[tokio::test(start_paused = true)]
  async fn test_probe_task_emits_transitions() {
    let mut events = EventHandler::new();
    let transport = Arc::new(MockTransport::new());
    transport.set_offline(true);

    let (monitor, reader) = ConnectivityMonitor::new(true);
    let monitor = monitor.with_events(events.sender());
    events.spawn_probe(
      monitor,
      transport.clone(),
      "http://a/api/health".to_string(),
      Duration::from_secs(30),
    );

    assert_eq!(events.next().await, Some(SyncEvent::Offline));
    assert!(!reader.is_online());

    transport.set_offline(false);
    assert_eq!(events.next().await, Some(SyncEvent::Online));
    assert!(reader.is_online());
  }

  #[tokio::test(start_paused = true)]
  async fn test_ticker() {
    let mut events = EventHandler::new();
    events.spawn_ticker(Duration::from_secs(60));

    assert_eq!(events.next().await, Some(SyncEvent::Tick));
    assert_eq!(events.next().await, Some(SyncEvent::Tick));
  }
}
