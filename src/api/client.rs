use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::error::RawFailure;
use super::types::unwrap_envelope;
use crate::config::Config;

/// HTTP client for the billing backend.
///
/// Failures come back as [`RawFailure`]; callers classify them.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    Self::with_base_url(
      config.base_url()?,
      Duration::from_millis(config.api.timeout_ms),
      Config::get_api_token(),
    )
  }

  pub fn with_base_url(base_url: Url, timeout: Duration, token: Option<String>) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      token,
    })
  }

  /// Build an endpoint URL under the base URL from path segments.
  ///
  /// Segments are percent-encoded, so user-supplied codes are safe to pass.
  pub fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, RawFailure> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| RawFailure::Connection(format!("Invalid base URL: {}", self.base_url)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  /// GET `url` and decode its payload.
  pub async fn get<T: DeserializeOwned>(&self, url: Url) -> std::result::Result<T, RawFailure> {
    self.send(self.request(Method::GET, url)).await
  }

  /// PATCH `url` with a JSON body and decode the payload of the response.
  pub async fn patch<B, T>(&self, url: Url, body: &B) -> std::result::Result<T, RawFailure>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    self.send(self.request(Method::PATCH, url).json(body)).await
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    debug!("{} {}", method, url);
    let request = self.http.request(method, url);
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn send<T: DeserializeOwned>(
    &self,
    request: RequestBuilder,
  ) -> std::result::Result<T, RawFailure> {
    let response = request.send().await.map_err(RawFailure::from)?;
    let status = response.status();
    let code = status.as_u16();

    let bytes = response.bytes().await.map_err(RawFailure::from)?;
    let body: Option<Value> = if bytes.is_empty() {
      None
    } else {
      serde_json::from_slice(&bytes).ok()
    };

    if !status.is_success() {
      return Err(RawFailure::Response { status: code, body });
    }

    let payload = match body {
      Some(value) => value,
      None if bytes.is_empty() => Value::Null,
      None => {
        return Err(RawFailure::Malformed {
          status: code,
          detail: "response body is not valid JSON".to_string(),
        })
      }
    };

    let data = unwrap_envelope(code, payload)?;
    serde_json::from_value(data).map_err(|e| RawFailure::Malformed {
      status: code,
      detail: e.to_string(),
    })
  }
}
