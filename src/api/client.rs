use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use url::Url;

use crate::config::Config;

use super::types::{Request, Response, ResponseKind};

/// Anything that can put a request on the wire.
///
/// An `Err` means the request never produced a response (DNS, refused
/// connection, timeout). HTTP error statuses are `Ok` responses.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: Request) -> Result<Response>;
}

/// reqwest-backed transport for the backend
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  origin: Url,
  token: Option<String>,
}

impl HttpClient {
  pub fn new(config: &Config) -> Result<Self> {
    let origin = Url::parse(&config.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url '{}': {}", config.api.base_url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin,
      token: Config::get_api_token(),
    })
  }
}

#[async_trait]
impl Transport for HttpClient {
  async fn send(&self, request: Request) -> Result<Response> {
    let mut builder = self.client.request(request.method.clone(), &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(token) = &self.token {
      builder = builder.bearer_auth(token);
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("{} {} failed: {}", request.method, request.url, e))?;

    let kind = if response.url().origin() == self.origin.origin() {
      ResponseKind::Basic
    } else {
      ResponseKind::Cors
    };
    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    Ok(Response {
      status,
      content_type,
      body,
      kind,
    })
  }
}
