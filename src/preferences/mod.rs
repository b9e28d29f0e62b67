//! Notification preferences: per-type records with independent delivery channels.

mod record;
mod store;

pub use record::{Channel, ChannelUpdate, ParseChannelError, PreferenceRecord};
pub use store::{PreferencePersister, PreferenceSnapshot, PreferenceStore};
