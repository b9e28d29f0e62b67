//! Backend persistence for notification preferences.

use async_trait::async_trait;
use serde_json::Value;

use super::client::ApiClient;
use super::error::{classify, ApiError};
use super::retry::{self, RetryContext};
use crate::preferences::{ChannelUpdate, PreferencePersister, PreferenceRecord};

/// Saves channel toggles with `PATCH /user-settings/notifications/{type}`
/// and reloads the collection from `GET /user-settings/notifications`.
///
/// The PATCH body only names one channel, so retrying it is safe.
#[derive(Clone)]
pub struct NotificationBackend {
  inner: ApiClient,
  retry: RetryContext,
}

impl NotificationBackend {
  pub fn new(inner: ApiClient, retry: RetryContext) -> Self {
    Self { inner, retry }
  }
}

#[async_trait]
impl PreferencePersister for NotificationBackend {
  async fn persist(&self, update: &ChannelUpdate) -> Result<(), ApiError> {
    let url = self
      .inner
      .endpoint(&[
        "user-settings",
        "notifications",
        update.notification_type.as_str(),
      ])
      .map_err(|e| classify(&e))?;

    retry::execute(
      || self.inner.patch::<_, Value>(url.clone(), update),
      &self.retry,
    )
    .await
    .map(|_| ())
    .map_err(|e| classify(&e))
  }

  async fn fetch_all(&self) -> Result<Vec<PreferenceRecord>, ApiError> {
    let url = self
      .inner
      .endpoint(&["user-settings", "notifications"])
      .map_err(|e| classify(&e))?;

    retry::execute(|| self.inner.get(url.clone()), &self.retry)
      .await
      .map_err(|e| classify(&e))
  }
}
