//! Error taxonomy for backend calls.
//!
//! Every failure the transport can produce is mapped onto one [`ApiError`]
//! by [`classify`]. The kind depends only on whether a response arrived and
//! on its status code; message text never influences it.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Per-field validation messages keyed by form field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Closed set of failure classes the rest of the application reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// No response was received (timeout, refused connection, DNS, abort)
  Network,
  /// 400 - the request was rejected, possibly with per-field detail
  Validation,
  /// 401 / 403
  Auth,
  /// 404
  NotFound,
  /// 5xx
  Server,
  /// Any other status, including a 2xx we could not use
  Unknown,
}

impl ErrorKind {
  /// Fallback message used when the backend did not supply one.
  pub fn default_message(self) -> &'static str {
    match self {
      ErrorKind::Network => "Network error. Please check your connection.",
      ErrorKind::Validation => "The request contains invalid data.",
      ErrorKind::Auth => "You are not authorized to perform this action.",
      ErrorKind::NotFound => "The requested resource was not found.",
      ErrorKind::Server => "Server error. Please try again later.",
      ErrorKind::Unknown => "An unexpected error occurred.",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::Network => "network",
      ErrorKind::Validation => "validation",
      ErrorKind::Auth => "auth",
      ErrorKind::NotFound => "not found",
      ErrorKind::Server => "server",
      ErrorKind::Unknown => "unknown",
    };
    f.write_str(name)
  }
}

/// A classified backend failure. This is the only error type the UI sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
  /// HTTP status, or 0 when no response was received
  pub status: u16,
  pub message: String,
  pub kind: ErrorKind,
  /// Only ever present for [`ErrorKind::Validation`]
  pub field_errors: Option<FieldErrors>,
}

impl ApiError {
  /// Build an error of the given kind with its fallback message.
  ///
  /// A network error never carries a status, so `status` is ignored for
  /// [`ErrorKind::Network`].
  pub fn new(kind: ErrorKind, status: u16) -> Self {
    let status = if kind == ErrorKind::Network { 0 } else { status };
    Self {
      status,
      message: kind.default_message().to_string(),
      kind,
      field_errors: None,
    }
  }

  /// Replace the message.
  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = message.into();
    self
  }

  pub fn is_network(&self) -> bool {
    self.kind == ErrorKind::Network
  }

  pub fn is_validation(&self) -> bool {
    self.kind == ErrorKind::Validation
  }

  pub fn is_auth(&self) -> bool {
    self.kind == ErrorKind::Auth
  }

  /// Messages attached to one form field, if any.
  pub fn field(&self, name: &str) -> Option<&[String]> {
    self
      .field_errors
      .as_ref()
      .and_then(|errors| errors.get(name))
      .map(Vec::as_slice)
  }
}

/// A failure as the transport saw it, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
  /// The request exceeded its timeout
  Timeout,
  /// Connection refused, DNS failure, TLS failure...
  Connection(String),
  /// The request was abandoned before a response arrived
  Aborted,
  /// The server answered with a non-success status or a `success: false` envelope
  Response { status: u16, body: Option<Value> },
  /// The server answered but the body could not be decoded
  Malformed { status: u16, detail: String },
}

impl fmt::Display for RawFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RawFailure::Timeout => write!(f, "request timed out"),
      RawFailure::Connection(detail) => write!(f, "connection failed: {}", detail),
      RawFailure::Aborted => write!(f, "request aborted"),
      RawFailure::Response { status, .. } => write!(f, "server responded with status {}", status),
      RawFailure::Malformed { status, detail } => {
        write!(f, "malformed response (status {}): {}", status, detail)
      }
    }
  }
}

impl std::error::Error for RawFailure {}

impl From<reqwest::Error> for RawFailure {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      return RawFailure::Timeout;
    }
    match err.status() {
      Some(status) if err.is_decode() => RawFailure::Malformed {
        status: status.as_u16(),
        detail: err.to_string(),
      },
      Some(status) => RawFailure::Response {
        status: status.as_u16(),
        body: None,
      },
      None => RawFailure::Connection(err.to_string()),
    }
  }
}

/// Anything the retry policy can turn into an [`ApiError`].
pub trait Classify {
  fn classify(&self) -> ApiError;
}

impl Classify for RawFailure {
  fn classify(&self) -> ApiError {
    classify(self)
  }
}

impl Classify for ApiError {
  fn classify(&self) -> ApiError {
    self.clone()
  }
}

/// Map a raw transport failure onto the error taxonomy.
pub fn classify(raw: &RawFailure) -> ApiError {
  match raw {
    RawFailure::Timeout => ApiError::new(ErrorKind::Network, 0).with_message("Request timeout"),
    RawFailure::Connection(_) | RawFailure::Aborted => ApiError::new(ErrorKind::Network, 0),
    RawFailure::Response { status, body } => {
      let kind = kind_for_status(*status);
      let mut error = ApiError::new(kind, *status);
      if let Some(body) = body {
        if let Some(message) = body_message(body) {
          error.message = message;
        }
        if kind == ErrorKind::Validation {
          error.field_errors = body_field_errors(body);
        }
      }
      error
    }
    RawFailure::Malformed { status, .. } => ApiError::new(kind_for_status(*status), *status),
  }
}

/// Status code to kind. Only meaningful when a response was received.
pub fn kind_for_status(status: u16) -> ErrorKind {
  match status {
    400 => ErrorKind::Validation,
    401 | 403 => ErrorKind::Auth,
    404 => ErrorKind::NotFound,
    s if s >= 500 => ErrorKind::Server,
    _ => ErrorKind::Unknown,
  }
}

fn body_message(body: &Value) -> Option<String> {
  ["message", "error"]
    .iter()
    .filter_map(|field| body.get(field).and_then(Value::as_str))
    .map(str::trim)
    .find(|s| !s.is_empty())
    .map(String::from)
}

fn body_field_errors(body: &Value) -> Option<FieldErrors> {
  let map = ["errors", "fieldErrors"]
    .iter()
    .find_map(|field| body.get(field).and_then(Value::as_object))?;

  let errors: FieldErrors = map
    .iter()
    .filter_map(|(field, messages)| {
      let messages: Vec<String> = match messages {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
          .iter()
          .filter_map(Value::as_str)
          .map(String::from)
          .collect(),
        _ => return None,
      };
      (!messages.is_empty()).then(|| (field.clone(), messages))
    })
    .collect();

  (!errors.is_empty()).then_some(errors)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn response(status: u16) -> RawFailure {
    RawFailure::Response { status, body: None }
  }

  #[test]
  fn test_status_table() {
    let table = [
      (400, ErrorKind::Validation),
      (401, ErrorKind::Auth),
      (403, ErrorKind::Auth),
      (404, ErrorKind::NotFound),
      (500, ErrorKind::Server),
      (503, ErrorKind::Server),
      (409, ErrorKind::Unknown),
      (422, ErrorKind::Unknown),
      (200, ErrorKind::Unknown),
    ];

    for (status, kind) in table {
      let error = classify(&response(status));
      assert_eq!(error.kind, kind, "status {}", status);
      assert_eq!(error.status, status);
    }
  }

  #[test]
  fn test_no_response_is_network_with_zero_status() {
    for raw in [
      RawFailure::Timeout,
      RawFailure::Connection("connection refused".into()),
      RawFailure::Aborted,
    ] {
      let error = classify(&raw);
      assert_eq!(error.kind, ErrorKind::Network);
      assert_eq!(error.status, 0);
    }
  }

  #[test]
  fn test_network_error_never_carries_status() {
    let error = ApiError::new(ErrorKind::Network, 503);
    assert_eq!(error.status, 0);
    assert!(error.is_network());

    assert_eq!(ApiError::new(ErrorKind::Server, 503).status, 503);
  }

  #[test]
  fn test_timeout_message_differs_from_connectivity() {
    let timeout = classify(&RawFailure::Timeout);
    let refused = classify(&RawFailure::Connection("dns".into()));

    assert_eq!(timeout.message, "Request timeout");
    assert_eq!(refused.message, ErrorKind::Network.default_message());
  }

  #[test]
  fn test_validation_field_errors() {
    let raw = RawFailure::Response {
      status: 400,
      body: Some(json!({
        "success": false,
        "message": "Invalid settings",
        "errors": {
          "timezone": ["Unknown timezone"],
          "language": "Unsupported language",
          "ignored": 42
        }
      })),
    };

    let error = classify(&raw);
    assert!(error.is_validation());
    assert_eq!(error.message, "Invalid settings");
    assert_eq!(error.field("timezone"), Some(&["Unknown timezone".to_string()][..]));
    assert_eq!(error.field("language"), Some(&["Unsupported language".to_string()][..]));
    assert_eq!(error.field("ignored"), None);
  }

  #[test]
  fn test_field_errors_only_for_validation() {
    let raw = RawFailure::Response {
      status: 500,
      body: Some(json!({ "errors": { "name": ["bad"] } })),
    };

    let error = classify(&raw);
    assert_eq!(error.kind, ErrorKind::Server);
    assert!(error.field_errors.is_none());
  }

  #[test]
  fn test_message_falls_back_per_kind() {
    let error = classify(&RawFailure::Response {
      status: 404,
      body: Some(json!({ "message": "   " })),
    });
    assert_eq!(error.message, ErrorKind::NotFound.default_message());

    let error = classify(&RawFailure::Response {
      status: 401,
      body: Some(json!({ "error": "Token expired" })),
    });
    assert_eq!(error.message, "Token expired");
  }

  #[test]
  fn test_kind_ignores_message_contents() {
    let error = classify(&RawFailure::Response {
      status: 503,
      body: Some(json!({ "message": "validation failed: unauthorized" })),
    });
    assert_eq!(error.kind, ErrorKind::Server);
  }

  #[test]
  fn test_malformed_body_classified_by_status() {
    let error = classify(&RawFailure::Malformed {
      status: 200,
      detail: "expected array".into(),
    });
    assert_eq!(error.kind, ErrorKind::Unknown);
    assert_eq!(error.status, 200);
  }
}
