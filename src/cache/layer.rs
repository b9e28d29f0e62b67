//! Resource cache that coalesces concurrent fetches for the same key.

use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, EntryState};
use super::traits::{CacheKey, CachedValue, EntryStatus};
use crate::api::ApiError;

/// Cache for read-mostly reference data.
///
/// Each key moves through `Unfetched -> Loading -> Loaded | Failed`. The
/// transition to `Loading` happens under the map lock before anything is
/// awaited, so every caller that arrives while a fetch is running joins it
/// instead of starting another. Loaded data is kept until [`invalidate`] or
/// [`clear`]; a failed fetch is not cached and the next `get` starts over.
///
/// The cache never retries. Wrap the fetch function in a retry policy if
/// that is wanted.
///
/// [`invalidate`]: ResourceCache::invalidate
/// [`clear`]: ResourceCache::clear
pub struct ResourceCache<T> {
  entries: Arc<Mutex<HashMap<String, CacheEntry<T>>>>,
  /// Source of fetch generations; 0 is never handed out
  generations: Arc<AtomicU64>,
}

impl<T> ResourceCache<T>
where
  T: Clone + Send + Sync + 'static,
{
  /// Create an empty cache.
  pub fn new() -> Self {
    Self {
      entries: Arc::new(Mutex::new(HashMap::new())),
      generations: Arc::new(AtomicU64::new(1)),
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Get the value for `key`, calling `fetch` only if nothing is cached or
  /// in flight.
  ///
  /// `fetch` is called while the cache is locked and must only build the
  /// future, not run it.
  pub async fn get<K, F, Fut>(&self, key: &K, fetch: F) -> Result<T, ApiError>
  where
    K: CacheKey + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let cache_key = key.cache_key();

    let (in_flight, generation) = {
      let mut entries = self.lock();
      let entry = entries
        .entry(cache_key.clone())
        .or_insert_with(|| CacheEntry::new(cache_key.clone()));

      match &entry.state {
        EntryState::Loaded { data, .. } => {
          debug!("cache hit: {}", key.description());
          return Ok(data.clone());
        }
        EntryState::Loading { in_flight } => {
          debug!("joining in-flight fetch: {}", key.description());
          (in_flight.clone(), entry.generation)
        }
        EntryState::Unfetched | EntryState::Failed { .. } => {
          info!("fetching {}", key.description());
          let in_flight = fetch().boxed().shared();
          let generation = self.generations.fetch_add(1, Ordering::Relaxed);
          entry.start(in_flight.clone(), generation);
          (in_flight, generation)
        }
      }
    };

    let outcome = in_flight.await;

    let mut entries = self.lock();
    if let Some(entry) = entries.get_mut(&cache_key) {
      if entry.settle(generation, &outcome) {
        if let Err(e) = &outcome {
          warn!("fetch failed for {}: {} ({})", key.description(), e, e.kind);
        }
      }
    }

    outcome
  }

  /// Current lifecycle state of `key` without fetching.
  pub fn status<K: CacheKey + ?Sized>(&self, key: &K) -> EntryStatus {
    self
      .lock()
      .get(&key.cache_key())
      .map(CacheEntry::status)
      .unwrap_or(EntryStatus::Unfetched)
  }

  /// The loaded value for `key`, if any, without fetching.
  pub fn peek<K: CacheKey + ?Sized>(&self, key: &K) -> Option<CachedValue<T>> {
    match &self.lock().get(&key.cache_key())?.state {
      EntryState::Loaded { data, loaded_at } => Some(CachedValue {
        data: data.clone(),
        loaded_at: *loaded_at,
      }),
      _ => None,
    }
  }

  /// The error from the last fetch of `key`, if it failed.
  pub fn last_error<K: CacheKey + ?Sized>(&self, key: &K) -> Option<ApiError> {
    match &self.lock().get(&key.cache_key())?.state {
      EntryState::Failed { error } => Some(error.clone()),
      _ => None,
    }
  }

  /// Forget `key` so the next `get` fetches again.
  ///
  /// A fetch already in flight still resolves for the callers awaiting it,
  /// but its result is not stored.
  pub fn invalidate<K: CacheKey + ?Sized>(&self, key: &K) {
    if let Some(entry) = self.lock().get_mut(&key.cache_key()) {
      debug!("invalidating {}", key.description());
      entry.reset();
    }
  }

  /// Drop every entry, e.g. on logout.
  pub fn clear(&self) {
    self.lock().clear();
  }

  /// Number of keys the cache has seen since the last clear.
  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Keys currently holding loaded data.
  pub fn loaded_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self
      .lock()
      .values()
      .filter(|entry| entry.data().is_some())
      .map(|entry| entry.key.clone())
      .collect();
    keys.sort();
    keys
  }
}

impl<T> Default for ResourceCache<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Clone for ResourceCache<T> {
  fn clone(&self) -> Self {
    Self {
      entries: Arc::clone(&self.entries),
      generations: Arc::clone(&self.generations),
    }
  }
}
