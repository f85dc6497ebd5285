//! Shared test doubles.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::api::{Request, Response, ResponseKind, Transport};
use crate::cache::{AssetManifest, CacheStore, SqliteStorage};
use crate::db::Database;
use crate::notify::Notifier;

#[derive(Default)]
struct MockState {
  offline: bool,
  responses: HashMap<(Option<Method>, String), Response>,
  requests: Vec<Request>,
}

/// Scripted transport. Unknown URLs answer 404; offline mode fails every request.
#[derive(Default)]
pub struct MockTransport {
  state: Mutex<MockState>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_offline(&self, offline: bool) {
    self.state.lock().unwrap().offline = offline;
  }

  /// Answer any method on `url`
  pub fn respond(&self, url: &str, status: u16, body: &str) {
    self.insert(None, url, Response::new(status, Some("text/plain".to_string()), body.as_bytes().to_vec()));
  }

  /// Answer only `method` on `url`
  pub fn respond_to(&self, method: Method, url: &str, status: u16, body: &str) {
    self.insert(
      Some(method),
      url,
      Response::new(status, Some("application/json".to_string()), body.as_bytes().to_vec()),
    );
  }

  pub fn respond_with(&self, url: &str, response: Response) {
    self.insert(None, url, response);
  }

  fn insert(&self, method: Option<Method>, url: &str, response: Response) {
    self
      .state
      .lock()
      .unwrap()
      .responses
      .insert((method, url.to_string()), response);
  }

  pub fn requests(&self) -> Vec<Request> {
    self.state.lock().unwrap().requests.clone()
  }

  /// Number of requests sent for `method` `url`
  pub fn count(&self, method: &Method, url: &str) -> usize {
    self
      .requests()
      .iter()
      .filter(|r| &r.method == method && r.url == url)
      .count()
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn send(&self, request: Request) -> Result<Response> {
    let mut state = self.state.lock().unwrap();
    state.requests.push(request.clone());
    if state.offline {
      return Err(eyre!("network unreachable"));
    }

    let response = state
      .responses
      .get(&(Some(request.method.clone()), request.url.clone()))
      .or_else(|| state.responses.get(&(None, request.url.clone())))
      .cloned()
      .unwrap_or_else(|| Response {
        status: 404,
        content_type: None,
        body: Vec::new(),
        kind: ResponseKind::Basic,
      });
    Ok(response)
  }
}

/// Notifier that records what it was asked to show.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
  pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
  pub fn sent(&self) -> Vec<(String, String)> {
    self.sent.lock().unwrap().clone()
  }
}

impl Notifier for RecordingNotifier {
  fn notify(&self, title: &str, body: &str) {
    self
      .sent
      .lock()
      .unwrap()
      .push((title.to_string(), body.to_string()));
  }
}

pub const ORIGIN: &str = "http://app.test";

pub fn manifest(version: &str) -> AssetManifest {
  AssetManifest {
    prefix: "paysync".to_string(),
    version: version.to_string(),
    assets: vec![format!("{}/", ORIGIN), format!("{}/app.js", ORIGIN)],
  }
}

pub fn cache_store(db: &Arc<Database>, version: &str) -> CacheStore {
  CacheStore::new(Arc::new(SqliteStorage::new(Arc::clone(db))), manifest(version))
}
