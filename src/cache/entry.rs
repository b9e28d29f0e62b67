//! Per-key state machine.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};

use super::traits::EntryStatus;
use crate::api::ApiError;

/// A fetch shared by every caller waiting on the same key.
pub type InFlight<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

/// The state of one entry. Data exists only in `Loaded`.
pub enum EntryState<T> {
  Unfetched,
  Loading { in_flight: InFlight<T> },
  Loaded { data: T, loaded_at: DateTime<Utc> },
  Failed { error: ApiError },
}

/// One cache slot.
///
/// `generation` identifies the fetch that owns the `Loading` state. Values are
/// unique per cache, so a fetch that finishes after its slot was invalidated
/// or cleared and restarted can tell it no longer owns the slot.
pub struct CacheEntry<T> {
  pub key: String,
  pub state: EntryState<T>,
  pub generation: u64,
}

impl<T> CacheEntry<T> {
  pub fn new(key: String) -> Self {
    Self {
      key,
      state: EntryState::Unfetched,
      generation: 0,
    }
  }

  pub fn status(&self) -> EntryStatus {
    match self.state {
      EntryState::Unfetched => EntryStatus::Unfetched,
      EntryState::Loading { .. } => EntryStatus::Loading,
      EntryState::Loaded { .. } => EntryStatus::Loaded,
      EntryState::Failed { .. } => EntryStatus::Failed,
    }
  }

  pub fn data(&self) -> Option<&T> {
    match &self.state {
      EntryState::Loaded { data, .. } => Some(data),
      _ => None,
    }
  }

  /// Mark the entry as loading on behalf of the fetch tagged `generation`.
  pub fn start(&mut self, in_flight: InFlight<T>, generation: u64) {
    self.generation = generation;
    self.state = EntryState::Loading { in_flight };
  }

  /// Record the outcome of the fetch started at `generation`.
  ///
  /// Returns false if the entry has moved on (invalidated or already settled
  /// by another joined caller).
  pub fn settle(&mut self, generation: u64, outcome: &Result<T, ApiError>) -> bool
  where
    T: Clone,
  {
    if self.generation != generation || !matches!(self.state, EntryState::Loading { .. }) {
      return false;
    }

    self.state = match outcome {
      Ok(data) => EntryState::Loaded {
        data: data.clone(),
        loaded_at: Utc::now(),
      },
      Err(error) => EntryState::Failed {
        error: error.clone(),
      },
    };
    true
  }

  /// Drop any data and forget the in-flight fetch.
  pub fn reset(&mut self) {
    self.generation = 0;
    self.state = EntryState::Unfetched;
  }
}
