//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};

/// Trait for values that identify a cached resource.
///
/// Two keys with the same `cache_key()` share one cache entry and one
/// in-flight request.
pub trait CacheKey {
  /// Stable identifier for the entry (e.g. "options:timezones")
  fn cache_key(&self) -> String;

  /// Human-readable description used in log messages.
  fn description(&self) -> String {
    self.cache_key()
  }
}

impl CacheKey for str {
  fn cache_key(&self) -> String {
    self.to_string()
  }
}

impl CacheKey for String {
  fn cache_key(&self) -> String {
    self.clone()
  }
}

/// Lifecycle of a cache entry, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// Never fetched, or invalidated
  Unfetched,
  /// A fetch is in flight; new callers join it
  Loading,
  /// Data is available and served without a network call
  Loaded,
  /// The last fetch failed; the next `get` starts over
  Failed,
}

/// Snapshot of a loaded entry, for inspection.
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
  pub data: T,
  /// When the fetch that produced `data` completed
  pub loaded_at: DateTime<Utc>,
}
