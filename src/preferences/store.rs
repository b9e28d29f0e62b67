//! Optimistic, channel-scoped updates to notification preferences.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::record::{Channel, ChannelUpdate, PreferenceRecord};
use crate::api::ApiError;
use crate::config::{NotificationsConfig, RollbackPolicy};

/// Where preference changes are saved and reloaded from.
#[async_trait]
pub trait PreferencePersister: Send + Sync {
  /// Save a single channel toggle.
  async fn persist(&self, update: &ChannelUpdate) -> Result<(), ApiError>;

  /// Load every record the backend knows about.
  async fn fetch_all(&self) -> Result<Vec<PreferenceRecord>, ApiError>;
}

/// Immutable view of the collection. Records that an update did not touch
/// keep their `Arc` identity across snapshots.
pub type PreferenceSnapshot = Arc<BTreeMap<String, Arc<PreferenceRecord>>>;

struct StoreState {
  records: PreferenceSnapshot,
  /// What the backend last accepted, per record
  confirmed: BTreeMap<String, PreferenceRecord>,
  /// Id of the write that last updated `confirmed` per (type, channel)
  confirmed_writes: HashMap<(String, Channel), u64>,
  /// Latest write issued per (type, channel), used to decide whether a
  /// failed write may still be rolled back
  latest_writes: HashMap<(String, Channel), u64>,
  next_write: u64,
}

/// Owner of the in-memory preference collection.
///
/// All writes go through [`set_channel`](PreferenceStore::set_channel),
/// which replaces exactly one record with a copy differing in exactly one
/// channel. Writes to the same channel are applied in call order.
pub struct PreferenceStore<P> {
  persister: P,
  state: Mutex<StoreState>,
  rollback: RollbackPolicy,
  in_app_defaults: BTreeSet<String>,
}

impl<P: PreferencePersister> PreferenceStore<P> {
  pub fn new(persister: P, config: &NotificationsConfig) -> Self {
    Self {
      persister,
      state: Mutex::new(StoreState {
        records: Arc::new(BTreeMap::new()),
        confirmed: BTreeMap::new(),
        confirmed_writes: HashMap::new(),
        latest_writes: HashMap::new(),
        next_write: 0,
      }),
      rollback: config.rollback,
      in_app_defaults: config.in_app_defaults.clone(),
    }
  }

  /// Seed the collection, e.g. from data the caller already has.
  pub fn with_records(self, records: impl IntoIterator<Item = PreferenceRecord>) -> Self {
    let records = index(records);
    let mut state = self.lock();
    state.confirmed = confirmed_copy(&records);
    state.records = Arc::new(records);
    drop(state);
    self
  }

  fn lock(&self) -> MutexGuard<'_, StoreState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn rollback_policy(&self) -> RollbackPolicy {
    self.rollback
  }

  /// The current collection.
  pub fn snapshot(&self) -> PreferenceSnapshot {
    Arc::clone(&self.lock().records)
  }

  /// The current record for `notification_type`, if one exists.
  pub fn record(&self, notification_type: &str) -> Option<Arc<PreferenceRecord>> {
    self.lock().records.get(notification_type).cloned()
  }

  /// The record a type starts with before the backend has told us anything.
  pub fn default_record(&self, notification_type: &str) -> PreferenceRecord {
    let in_app = self
      .in_app_defaults
      .contains(&notification_type.to_lowercase());
    PreferenceRecord::with_defaults(notification_type, in_app)
  }

  /// Replace the collection with the backend's records.
  ///
  /// The backend wins over any optimistic local state, and pending writes
  /// lose the right to roll back. The fetched records become the values a
  /// later failed write reverts to.
  pub async fn refresh(&self) -> Result<PreferenceSnapshot, ApiError> {
    let records = self.persister.fetch_all().await?;
    let count = records.len();
    let records = Arc::new(index(records));

    let mut state = self.lock();
    state.confirmed = confirmed_copy(&records);
    state.records = Arc::clone(&records);
    state.latest_writes.clear();
    info!("loaded {} notification preference records", count);
    Ok(records)
  }

  /// Set one channel of one record and persist it. Returns whether the
  /// backend accepted the change.
  pub async fn set_channel(&self, notification_type: &str, channel: Channel, enabled: bool) -> bool {
    self
      .try_set_channel(notification_type, channel, enabled)
      .await
      .is_ok()
  }

  /// Like [`set_channel`](Self::set_channel) but reports the classified error.
  ///
  /// On success returns the record as this update left it.
  pub async fn try_set_channel(
    &self,
    notification_type: &str,
    channel: Channel,
    enabled: bool,
  ) -> Result<PreferenceRecord, ApiError> {
    let (updated, previous, write_id) = {
      let mut state = self.lock();

      let current = match state.records.get(notification_type) {
        Some(record) => (**record).clone(),
        None => self.default_record(notification_type),
      };
      let previous = current.channel(channel);
      let updated = current.with_channel(channel, enabled);

      let mut records = (*state.records).clone();
      records.insert(notification_type.to_string(), Arc::new(updated.clone()));
      state.records = Arc::new(records);

      state.next_write += 1;
      let write_id = state.next_write;
      state
        .latest_writes
        .insert((notification_type.to_string(), channel), write_id);

      (updated, previous, write_id)
    };

    debug!(
      "{}.{}: {} -> {} (optimistic)",
      notification_type, channel, previous, enabled
    );

    let update = ChannelUpdate {
      notification_type: notification_type.to_string(),
      channel,
      enabled,
    };

    let outcome = self.persister.persist(&update).await;

    let mut state = self.lock();
    let key = (notification_type.to_string(), channel);
    let is_latest = state.latest_writes.get(&key) == Some(&write_id);
    if is_latest {
      state.latest_writes.remove(&key);
    }

    match outcome {
      Ok(()) => {
        // An older write finishing late must not overwrite a newer save
        let newer_saved = state
          .confirmed_writes
          .get(&key)
          .is_some_and(|&id| id > write_id);
        if !newer_saved {
          let base = match state.confirmed.get(notification_type) {
            Some(record) => record.clone(),
            None => self.default_record(notification_type),
          };
          state.confirmed.insert(
            notification_type.to_string(),
            base.with_channel(channel, enabled),
          );
          state.confirmed_writes.insert(key, write_id);
        }
        Ok(updated)
      }
      Err(e) => {
        warn!(
          "failed to save {}.{} = {}: {} ({})",
          notification_type, channel, enabled, e, e.kind
        );
        if self.rollback == RollbackPolicy::Revert && is_latest {
          let saved = match state.confirmed.get(notification_type) {
            Some(record) => record.channel(channel),
            None => self.default_record(notification_type).channel(channel),
          };
          revert(&mut state, notification_type, channel, saved);
        }
        Err(e)
      }
    }
  }
}

/// Put one channel back to its last saved value, leaving every other field
/// alone.
fn revert(state: &mut StoreState, notification_type: &str, channel: Channel, saved: bool) {
  let Some(record) = state.records.get(notification_type) else {
    return;
  };
  if record.channel(channel) == saved {
    return;
  }

  let reverted = record.with_channel(channel, saved);
  let mut records = (*state.records).clone();
  records.insert(notification_type.to_string(), Arc::new(reverted));
  state.records = Arc::new(records);
  debug!("{}.{} reverted to {}", notification_type, channel, saved);
}

fn confirmed_copy(records: &BTreeMap<String, Arc<PreferenceRecord>>) -> BTreeMap<String, PreferenceRecord> {
  records
    .iter()
    .map(|(key, record)| (key.clone(), (**record).clone()))
    .collect()
}

/// Key records by type. A later duplicate replaces an earlier one.
fn index(records: impl IntoIterator<Item = PreferenceRecord>) -> BTreeMap<String, Arc<PreferenceRecord>> {
  let mut map = BTreeMap::new();
  for record in records {
    let key = record.notification_type.clone();
    if map.insert(key, Arc::new(record)).is_some() {
      warn!("duplicate preference record for one type, keeping the last");
    }
  }
  map
}
