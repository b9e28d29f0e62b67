use color_eyre::Result;
use tracing::info;

use crate::api::{ApiClient, NotificationBackend, ReferenceData, RetryContext};
use crate::config::Config;
use crate::preferences::PreferenceStore;

/// Everything that lives for one signed-in session.
///
/// Built once at startup and handed to consumers by reference. Reference
/// data clones share their caches, so [`logout`](Session::logout) clears
/// them for every holder.
pub struct Session {
  pub reference: ReferenceData,
  pub preferences: PreferenceStore<NotificationBackend>,
}

impl Session {
  pub fn new(config: &Config) -> Result<Self> {
    let client = ApiClient::new(config)?;
    let retry = RetryContext::from(&config.retry);

    Ok(Self {
      reference: ReferenceData::new(client.clone(), retry.clone()),
      preferences: PreferenceStore::new(
        NotificationBackend::new(client, retry),
        &config.notifications,
      ),
    })
  }

  /// Tear the session down, dropping all cached data.
  pub fn logout(self) {
    self.reference.clear();
    info!("session closed, caches cleared");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RollbackPolicy;

  #[test]
  fn test_session_from_config() {
    let config = Config::parse(
      "api:\n  base_url: http://localhost:9/api\nnotifications:\n  rollback: keep\n",
    )
    .unwrap();

    let session = Session::new(&config).unwrap();
    assert_eq!(session.preferences.rollback_policy(), RollbackPolicy::Keep);
    assert!(session.preferences.snapshot().is_empty());

    let shared = session.reference.clone();
    session.logout();
    assert!(shared.loaded_keys().is_empty());
  }
}
