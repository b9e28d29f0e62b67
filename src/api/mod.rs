//! Backend access: transport, error classification, retries, and the
//! cached reference-data catalog built on top of them.

pub mod client;
pub mod error;
pub mod notifications;
pub mod reference;
pub mod retry;
pub mod types;

pub use client::ApiClient;
pub use error::{classify, ApiError, Classify, ErrorKind, FieldErrors, RawFailure};
pub use notifications::NotificationBackend;
pub use reference::{OptionKind, ReferenceData, ReferenceKey};
pub use retry::RetryContext;
pub use types::{CompanySize, SelectOption, UserSettingOptions};
