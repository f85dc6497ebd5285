mod api;
mod app;
mod cache;
mod config;
mod connectivity;
mod db;
mod event;
mod interceptor;
mod notify;
mod queue;
mod sync;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::api::Submitted;
use crate::queue::ActionKind;
use crate::sync::SyncOutcome;

#[derive(Parser, Debug)]
#[command(name = "paysync")]
#[command(about = "Offline-first cache and action queue for the clientes/pagamentos backend")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/paysync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend URL, overrides api.base_url
  #[arg(long)]
  api_url: Option<String>,

  /// Data directory, overrides data_dir
  #[arg(long)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the app shell and sync queued actions whenever connectivity returns
  Run,
  /// Fetch a path cache-first and print the body
  Get {
    path: String,
    /// Request as a page navigation (falls back to the cached shell)
    #[arg(long)]
    html: bool,
  },
  /// Apply a mutation now, or queue it if the backend is unreachable
  Submit { action: ActionKind, payload: String },
  /// Queue a mutation for the next sync
  Enqueue { action: ActionKind, payload: String },
  /// Print queued actions as JSON
  Queue,
  /// Drop every queued action without applying it
  Clear,
  /// List clients (cache-first)
  Clients,
  /// List payments (cache-first)
  Payments,
  /// Show connectivity and queue state
  Status,
  /// Run one sync cycle now
  Sync,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.api.base_url = url;
  }
  if let Some(dir) = args.data_dir {
    config.data_dir = Some(dir);
  }

  let _log_guard = init_logging(&config.data_dir()?)?;

  let app = app::App::new(config)?;

  match args.command {
    Command::Run => app.run().await?,
    Command::Get { path, html } => {
      let (source, body) = app.get(&path, html).await?;
      eprintln!("source: {:?}", source);
      std::io::stdout()
        .write_all(&body)
        .map_err(|e| eyre!("Failed to write body: {}", e))?;
    }
    Command::Submit { action, payload } => {
      match app.submit(action, parse_payload(&payload)?).await? {
        Submitted::Applied => println!("{} applied", action),
        Submitted::Queued(record) => println!("{} queued as #{}", action, record.id),
      }
    }
    Command::Enqueue { action, payload } => {
      let record = app.enqueue(action, parse_payload(&payload)?)?;
      println!("{} queued as #{}", action, record.id);
    }
    Command::Queue => print_json(&app.pending()?)?,
    Command::Clear => println!("{} queued actions dropped", app.clear_queue()?),
    Command::Clients => print_json(&app.clients().await?)?,
    Command::Payments => print_json(&app.payments().await?)?,
    Command::Status => {
      let status = app.status().await?;
      let state = if status.connectivity.online {
        "online"
      } else {
        "offline"
      };
      println!(
        "{} since {}, sync {:?}, {} pending",
        state,
        status.connectivity.since.to_rfc3339(),
        status.sync,
        status.pending
      );
    }
    Command::Sync => match app.sync_once().await? {
      SyncOutcome::Drained(report) => println!(
        "{} synced, {} failed, {} remaining",
        report.succeeded, report.failed, report.remaining
      ),
      SyncOutcome::Offline => println!("Backend unreachable, nothing synced"),
      SyncOutcome::Busy => println!("A sync is already running"),
      SyncOutcome::Failed => return Err(eyre!("Could not read the offline queue")),
    },
  }

  Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  let json =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", json);
  Ok(())
}

fn parse_payload(payload: &str) -> Result<serde_json::Value> {
  serde_json::from_str(payload).map_err(|e| eyre!("Payload is not valid JSON: {}", e))
}

/// Log to a daily rolling file under `<data_dir>/logs`. Filter with PAYSYNC_LOG.
fn init_logging(data_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = data_dir.join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "paysync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("PAYSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
