//! Transport-level request and response types shared by the interceptor,
//! the cache and the domain API.

use reqwest::Method;

/// Response classification, mirroring fetch's `Response.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
  /// Same-origin response
  Basic,
  /// Cross-origin response
  Cors,
  /// Produced locally (offline notice), never from the network
  Synthetic,
}

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_json(mut self, value: &serde_json::Value) -> Self {
    self.body = Some(value.to_string().into_bytes());
    self.with_header("Content-Type", "application/json")
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Whether the caller will take an HTML page (i.e. this is a navigation).
  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .map(|accept| accept.contains("text/html"))
      .unwrap_or(false)
  }
}

/// A response as seen by callers of the interceptor.
#[derive(Debug, Clone)]
pub struct Response {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl Response {
  pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
    Self {
      status,
      content_type,
      body,
      kind: ResponseKind::Basic,
    }
  }

  /// The plain-text 503 served when neither cache nor network can answer.
  pub fn offline_notice() -> Self {
    Self {
      status: 503,
      content_type: Some("text/plain".to_string()),
      body: b"Offline: content not available".to_vec(),
      kind: ResponseKind::Synthetic,
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}
