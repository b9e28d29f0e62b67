//! Serde types for backend payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::error::RawFailure;

// ============================================================================
// Response envelope
// ============================================================================

/// The `{ success, data, error, message }` wrapper most endpoints use.
#[derive(Debug, Deserialize)]
struct Envelope {
  success: bool,
  #[serde(default)]
  data: Value,
}

/// Strip the response envelope if there is one.
///
/// Bodies that are not an object with a boolean `success` field are raw
/// payloads and pass through untouched. An envelope with `success: false`
/// is a failure even when the HTTP status says otherwise.
pub fn unwrap_envelope(status: u16, body: Value) -> Result<Value, RawFailure> {
  let is_envelope = body
    .as_object()
    .and_then(|obj| obj.get("success"))
    .is_some_and(Value::is_boolean);

  if !is_envelope {
    return Ok(body);
  }

  let envelope: Envelope =
    serde_json::from_value(body.clone()).map_err(|e| RawFailure::Malformed {
      status,
      detail: e.to_string(),
    })?;

  if envelope.success {
    Ok(envelope.data)
  } else {
    Err(RawFailure::Response {
      status,
      body: Some(body),
    })
  }
}

// ============================================================================
// Reference data
// ============================================================================

/// One entry of a user-settings option list (timezone, language, format...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
  #[serde(alias = "code", alias = "id")]
  pub value: String,
  #[serde(alias = "name")]
  pub label: String,
  /// Family-specific extras such as a timezone's UTC offset
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// A company size bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySize {
  pub code: String,
  #[serde(alias = "name")]
  pub label: String,
  #[serde(default)]
  pub min_employees: Option<u32>,
  #[serde(default)]
  pub max_employees: Option<u32>,
}

/// All user-settings option families, loaded together for a settings form.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSettingOptions {
  pub timezones: Vec<SelectOption>,
  pub languages: Vec<SelectOption>,
  pub date_formats: Vec<SelectOption>,
  pub time_formats: Vec<SelectOption>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_raw_payload_passes_through() {
    let body = json!([{ "value": "UTC", "label": "UTC" }]);
    assert_eq!(unwrap_envelope(200, body.clone()).unwrap(), body);
  }

  #[test]
  fn test_object_without_success_is_raw() {
    let body = json!({ "code": "1-10", "label": "1-10 employees" });
    assert_eq!(unwrap_envelope(200, body.clone()).unwrap(), body);
  }

  #[test]
  fn test_successful_envelope_yields_data() {
    let body = json!({ "success": true, "data": [1, 2, 3] });
    assert_eq!(unwrap_envelope(200, body).unwrap(), json!([1, 2, 3]));
  }

  #[test]
  fn test_envelope_without_data_yields_null() {
    let body = json!({ "success": true, "message": "Saved" });
    assert_eq!(unwrap_envelope(200, body).unwrap(), Value::Null);
  }

  #[test]
  fn test_failed_envelope_is_response_failure() {
    let body = json!({ "success": false, "error": "Not allowed" });
    match unwrap_envelope(200, body) {
      Err(RawFailure::Response { status, body }) => {
        assert_eq!(status, 200);
        assert_eq!(body.unwrap()["error"], "Not allowed");
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_option_aliases_and_extras() {
    let option: SelectOption =
      serde_json::from_value(json!({ "code": "Europe/Paris", "name": "Paris", "offset": "+01:00" }))
        .unwrap();

    assert_eq!(option.value, "Europe/Paris");
    assert_eq!(option.label, "Paris");
    assert_eq!(option.extra.get("offset"), Some(&json!("+01:00")));
  }

  #[test]
  fn test_company_size_camel_case() {
    let size: CompanySize = serde_json::from_value(
      json!({ "code": "11-50", "label": "11-50 employees", "minEmployees": 11, "maxEmployees": 50 }),
    )
    .unwrap();

    assert_eq!(size.min_employees, Some(11));
    assert_eq!(size.max_employees, Some(50));
  }
}
