//! In-memory caching of reference data with request coalescing.
//!
//! This module provides a backend-agnostic cache that:
//! - Serves loaded values without touching the network
//! - Lets concurrent callers for the same key share a single fetch
//! - Surfaces fetch failures to every waiting caller and forgets them
//! - Keeps values until explicitly invalidated or cleared

mod entry;
mod layer;
mod traits;

pub use layer::ResourceCache;
pub use traits::{CacheKey, CachedValue, EntryStatus};
