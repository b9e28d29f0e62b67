//! Reference data (option lists, company sizes) with transparent caching.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::client::ApiClient;
use super::error::{classify, ApiError};
use super::retry::{self, RetryContext};
use super::types::{CompanySize, SelectOption, UserSettingOptions};
use crate::cache::{CacheKey, ResourceCache};

/// User-settings option families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum OptionKind {
  Timezones,
  Languages,
  DateFormats,
  TimeFormats,
}

impl OptionKind {
  pub const ALL: [OptionKind; 4] = [
    OptionKind::Timezones,
    OptionKind::Languages,
    OptionKind::DateFormats,
    OptionKind::TimeFormats,
  ];

  /// Last path segment of `/user-settings/options/{kind}`.
  pub fn path_segment(self) -> &'static str {
    match self {
      OptionKind::Timezones => "timezones",
      OptionKind::Languages => "languages",
      OptionKind::DateFormats => "dateformats",
      OptionKind::TimeFormats => "timeformats",
    }
  }
}

// ============================================================================
// Cache keys
// ============================================================================

/// Keys for every cached reference resource.
#[derive(Clone, Debug)]
pub enum ReferenceKey {
  /// One user-settings option list
  Options(OptionKind),
  /// The full company size list
  CompanySizes,
  /// A single company size by code
  CompanySize { code: String },
  /// Company sizes matching a search query
  CompanySizeSearch { query: String },
}

impl CacheKey for ReferenceKey {
  fn cache_key(&self) -> String {
    match self {
      Self::Options(kind) => format!("options:{}", kind.path_segment()),
      Self::CompanySizes => "company_sizes".to_string(),
      Self::CompanySize { code } => format!("company_size:{}", code),
      Self::CompanySizeSearch { query } => {
        format!("company_size_search:{}", normalize_query(query))
      }
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Options(kind) => format!("{} options", kind.path_segment()),
      Self::CompanySizes => "company sizes".to_string(),
      Self::CompanySize { code } => format!("company size {}", code),
      Self::CompanySizeSearch { query } => format!("company sizes matching '{}'", query),
    }
  }
}

/// Normalize a search query for consistent cache keys.
/// Trims whitespace and lowercases for case-insensitive matching.
fn normalize_query(query: &str) -> String {
  query.trim().to_lowercase()
}

// ============================================================================
// Catalog
// ============================================================================

/// Application-scoped owner of the reference data caches.
///
/// Create one per session and share it by cloning (clones share the caches);
/// call [`clear`](ReferenceData::clear) on logout. Every fetch goes through
/// the retry policy and reaches callers as a classified [`ApiError`].
#[derive(Clone)]
pub struct ReferenceData {
  inner: ApiClient,
  retry: RetryContext,
  options: ResourceCache<Vec<SelectOption>>,
  company_sizes: ResourceCache<Vec<CompanySize>>,
  company_size: ResourceCache<CompanySize>,
}

impl ReferenceData {
  pub fn new(inner: ApiClient, retry: RetryContext) -> Self {
    Self {
      inner,
      retry,
      options: ResourceCache::new(),
      company_sizes: ResourceCache::new(),
      company_size: ResourceCache::new(),
    }
  }

  /// Build a fetch function for `segments` (plus an optional `query`
  /// parameter) that retries and classifies failures.
  fn fetcher<T>(
    &self,
    segments: &[&str],
    query: Option<&str>,
  ) -> impl FnOnce() -> BoxFuture<'static, Result<T, ApiError>>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let inner = self.inner.clone();
    let retry = self.retry.clone();
    let url = self.inner.endpoint(segments).map(|mut url| {
      if let Some(q) = query {
        url.query_pairs_mut().append_pair("query", q);
      }
      url
    });

    move || {
      async move {
        let url = url.map_err(|e| classify(&e))?;
        retry::execute(|| inner.get::<T>(url.clone()), &retry)
          .await
          .map_err(|e| classify(&e))
      }
      .boxed()
    }
  }

  /// One user-settings option list.
  pub async fn options(&self, kind: OptionKind) -> Result<Vec<SelectOption>, ApiError> {
    let key = ReferenceKey::Options(kind);
    self
      .options
      .get(
        &key,
        self.fetcher(&["user-settings", "options", kind.path_segment()], None),
      )
      .await
  }

  pub async fn timezones(&self) -> Result<Vec<SelectOption>, ApiError> {
    self.options(OptionKind::Timezones).await
  }

  pub async fn languages(&self) -> Result<Vec<SelectOption>, ApiError> {
    self.options(OptionKind::Languages).await
  }

  pub async fn date_formats(&self) -> Result<Vec<SelectOption>, ApiError> {
    self.options(OptionKind::DateFormats).await
  }

  pub async fn time_formats(&self) -> Result<Vec<SelectOption>, ApiError> {
    self.options(OptionKind::TimeFormats).await
  }

  /// Every option family at once, fetched concurrently.
  pub async fn user_setting_options(&self) -> Result<UserSettingOptions, ApiError> {
    let (timezones, languages, date_formats, time_formats) = futures::try_join!(
      self.timezones(),
      self.languages(),
      self.date_formats(),
      self.time_formats()
    )?;

    Ok(UserSettingOptions {
      timezones,
      languages,
      date_formats,
      time_formats,
    })
  }

  /// The full company size list.
  pub async fn company_sizes(&self) -> Result<Vec<CompanySize>, ApiError> {
    self
      .company_sizes
      .get(
        &ReferenceKey::CompanySizes,
        self.fetcher(&["company-sizes"], None),
      )
      .await
  }

  /// A single company size. Served from the full list when that is loaded.
  pub async fn company_size(&self, code: &str) -> Result<CompanySize, ApiError> {
    if let Some(list) = self.company_sizes.peek(&ReferenceKey::CompanySizes) {
      if let Some(size) = list.data.into_iter().find(|s| s.code == code) {
        debug!("company size {} served from cached list", code);
        return Ok(size);
      }
    }

    let key = ReferenceKey::CompanySize {
      code: code.to_string(),
    };
    self
      .company_size
      .get(&key, self.fetcher(&["company-sizes", code], None))
      .await
  }

  /// Company sizes matching `query`. An empty query returns the full list.
  pub async fn search_company_sizes(&self, query: &str) -> Result<Vec<CompanySize>, ApiError> {
    if query.trim().is_empty() {
      return self.company_sizes().await;
    }

    // The backend sees the same normalized query the cache is keyed on
    let query = normalize_query(query);
    let key = ReferenceKey::CompanySizeSearch {
      query: query.clone(),
    };
    self
      .company_sizes
      .get(&key, self.fetcher(&["company-sizes", "search"], Some(&query)))
      .await
  }

  /// Forget one resource so the next read refetches it.
  pub fn invalidate(&self, key: &ReferenceKey) {
    match key {
      ReferenceKey::Options(_) => self.options.invalidate(key),
      ReferenceKey::CompanySizes | ReferenceKey::CompanySizeSearch { .. } => {
        self.company_sizes.invalidate(key)
      }
      ReferenceKey::CompanySize { .. } => self.company_size.invalidate(key),
    }
  }

  /// Drop everything, e.g. on logout.
  pub fn clear(&self) {
    self.options.clear();
    self.company_sizes.clear();
    self.company_size.clear();
  }

  /// Cache keys that currently hold data.
  pub fn loaded_keys(&self) -> Vec<String> {
    let mut keys = self.options.loaded_keys();
    keys.extend(self.company_sizes.loaded_keys());
    keys.extend(self.company_size.loaded_keys());
    keys
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ErrorKind;
  use crate::cache::EntryStatus;
  use serde_json::json;
  use std::time::Duration;
  use url::Url;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn catalog(server: &MockServer, max_attempts: u32) -> ReferenceData {
    let base = Url::parse(&format!("{}/api/", server.uri())).unwrap();
    let client = ApiClient::with_base_url(base, Duration::from_secs(5), None).unwrap();
    ReferenceData::new(client, RetryContext::new(max_attempts, Duration::from_millis(10)))
  }

  fn options_body(values: &[&str]) -> serde_json::Value {
    let data: Vec<_> = values
      .iter()
      .map(|v| json!({ "value": v, "label": v }))
      .collect();
    json!({ "success": true, "data": data })
  }

  #[tokio::test]
  async fn test_concurrent_reads_hit_backend_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/user-settings/options/timezones"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(options_body(&["UTC", "Europe/Paris"]))
          .set_delay(Duration::from_millis(50)),
      )
      .expect(1)
      .mount(&server)
      .await;

    let data = catalog(&server, 3);
    let (a, b, c) = tokio::join!(data.timezones(), data.timezones(), data.timezones());

    assert_eq!(a.as_ref().unwrap().len(), 2);
    assert_eq!(a, b);
    assert_eq!(b, c);

    // served from cache afterwards
    data.timezones().await.unwrap();
    assert_eq!(data.loaded_keys(), vec!["options:timezones".to_string()]);
  }

  #[tokio::test]
  async fn test_all_option_families() {
    let server = MockServer::start().await;
    for kind in OptionKind::ALL {
      Mock::given(method("GET"))
        .and(path(format!("/api/user-settings/options/{}", kind.path_segment())))
        .respond_with(ResponseTemplate::new(200).set_body_json(options_body(&[kind.path_segment()])))
        .expect(1)
        .mount(&server)
        .await;
    }

    let data = catalog(&server, 1);
    let options = data.user_setting_options().await.unwrap();

    assert_eq!(options.timezones[0].value, "timezones");
    assert_eq!(options.languages[0].value, "languages");
    assert_eq!(options.date_formats[0].value, "dateformats");
    assert_eq!(options.time_formats[0].value, "timeformats");
  }

  #[tokio::test]
  async fn test_server_errors_retried_then_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/company-sizes"))
      .respond_with(ResponseTemplate::new(502))
      .up_to_n_times(2)
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/company-sizes"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!([{ "code": "1-10", "label": "1-10" }])),
      )
      .expect(1)
      .mount(&server)
      .await;

    let data = catalog(&server, 3);
    let sizes = data.company_sizes().await.unwrap();
    assert_eq!(sizes[0].code, "1-10");

    // second read is served from cache
    data.company_sizes().await.unwrap();
  }

  #[tokio::test]
  async fn test_not_found_surfaces_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/company-sizes/huge"))
      .respond_with(ResponseTemplate::new(404).set_body_json(json!({
        "success": false,
        "message": "No such company size"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let data = catalog(&server, 3);
    let error = data.company_size("huge").await.unwrap_err();

    assert_eq!(error.kind, ErrorKind::NotFound);
    assert_eq!(error.message, "No such company size");
    assert_eq!(
      data.company_size.status(&ReferenceKey::CompanySize {
        code: "huge".into()
      }),
      EntryStatus::Failed
    );
  }

  #[tokio::test]
  async fn test_company_size_served_from_loaded_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/company-sizes"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        { "code": "1-10", "label": "1-10" },
        { "code": "11-50", "label": "11-50" }
      ])))
      .expect(1)
      .mount(&server)
      .await;

    let data = catalog(&server, 1);
    data.company_sizes().await.unwrap();

    let size = data.company_size("11-50").await.unwrap();
    assert_eq!(size.label, "11-50");
  }

  #[tokio::test]
  async fn test_search_keys_are_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/company-sizes/search"))
      .and(query_param("query", "small"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!([{ "code": "1-10", "label": "Small" }])),
      )
      .expect(1)
      .mount(&server)
      .await;

    let data = catalog(&server, 1);
    let first = data.search_company_sizes(" SMALL").await.unwrap();
    let second = data.search_company_sizes("small ").await.unwrap();

    assert_eq!(first, second);
  }

  #[tokio::test]
  async fn test_invalidate_and_clear_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/user-settings/options/languages"))
      .respond_with(ResponseTemplate::new(200).set_body_json(options_body(&["en"])))
      .expect(3)
      .mount(&server)
      .await;

    let data = catalog(&server, 1);
    data.languages().await.unwrap();

    data.invalidate(&ReferenceKey::Options(OptionKind::Languages));
    data.languages().await.unwrap();

    data.clear();
    assert!(data.loaded_keys().is_empty());
    data.languages().await.unwrap();
  }

  #[test]
  fn test_cache_keys() {
    assert_eq!(
      ReferenceKey::Options(OptionKind::DateFormats).cache_key(),
      "options:dateformats"
    );
    assert_eq!(
      ReferenceKey::CompanySizeSearch {
        query: " Small ".into()
      }
      .cache_key(),
      "company_size_search:small"
    );
  }
}
