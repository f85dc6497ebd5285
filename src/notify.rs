/// User-facing notification sink.
pub trait Notifier: Send + Sync {
  fn notify(&self, title: &str, body: &str);
}

/// Prints notifications to the terminal
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  fn notify(&self, title: &str, body: &str) {
    tracing::info!(title, body, "Notification");
    println!("{}: {}", title, body);
  }
}
