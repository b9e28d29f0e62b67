//! Data-access core for the billing admin dashboard.
//!
//! - [`cache::ResourceCache`] coalesces concurrent reads of reference data
//! - [`api::classify`] maps transport failures onto [`api::ApiError`]
//! - [`api::retry`] retries transient failures with exponential backoff
//! - [`preferences::PreferenceStore`] applies channel-scoped preference updates

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod preferences;
