//! Notification preference records and their delivery channels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A notification delivery mechanism tracked independently per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
  Email,
  InApp,
  Push,
  Sms,
}

impl Channel {
  pub const ALL: [Channel; 4] = [Channel::Email, Channel::InApp, Channel::Push, Channel::Sms];

  /// Name used on the wire.
  pub fn as_str(self) -> &'static str {
    match self {
      Channel::Email => "email",
      Channel::InApp => "inApp",
      Channel::Push => "push",
      Channel::Sms => "sms",
    }
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel '{0}' (expected email, in-app, push or sms)")]
pub struct ParseChannelError(String);

impl FromStr for Channel {
  type Err = ParseChannelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "email" => Ok(Channel::Email),
      "inapp" | "in-app" | "in_app" => Ok(Channel::InApp),
      "push" => Ok(Channel::Push),
      "sms" => Ok(Channel::Sms),
      _ => Err(ParseChannelError(s.to_string())),
    }
  }
}

/// Per-type delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
  #[serde(rename = "type")]
  pub notification_type: String,
  #[serde(default)]
  pub email_enabled: bool,
  #[serde(default)]
  pub in_app_enabled: bool,
  #[serde(default)]
  pub push_enabled: bool,
  #[serde(default)]
  pub sms_enabled: bool,
}

impl PreferenceRecord {
  /// A record with every channel off except in-app when `in_app` is set.
  pub fn with_defaults(notification_type: impl Into<String>, in_app: bool) -> Self {
    Self {
      notification_type: notification_type.into(),
      email_enabled: false,
      in_app_enabled: in_app,
      push_enabled: false,
      sms_enabled: false,
    }
  }

  pub fn channel(&self, channel: Channel) -> bool {
    match channel {
      Channel::Email => self.email_enabled,
      Channel::InApp => self.in_app_enabled,
      Channel::Push => self.push_enabled,
      Channel::Sms => self.sms_enabled,
    }
  }

  /// A copy of this record with only `channel` changed.
  pub fn with_channel(&self, channel: Channel, enabled: bool) -> Self {
    let mut next = self.clone();
    let flag = match channel {
      Channel::Email => &mut next.email_enabled,
      Channel::InApp => &mut next.in_app_enabled,
      Channel::Push => &mut next.push_enabled,
      Channel::Sms => &mut next.sms_enabled,
    };
    *flag = enabled;
    next
  }
}

/// The delta sent to the backend for one toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelUpdate {
  #[serde(skip)]
  pub notification_type: String,
  pub channel: Channel,
  pub enabled: bool,
}
