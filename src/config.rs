use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the backend, e.g. https://billing.example.com/api
  pub base_url: String,
  /// Per-request timeout; expiry is reported as a network failure
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
  10_000
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
  /// Total tries including the first one
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_initial_delay_ms")]
  pub initial_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
  3
}

fn default_initial_delay_ms() -> u64 {
  1000
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      initial_delay_ms: default_initial_delay_ms(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RollbackPolicy {
  /// Restore the previous channel value when persisting fails
  #[default]
  Revert,
  /// Leave the optimistic value in place
  Keep,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
  #[serde(default)]
  pub rollback: RollbackPolicy,
  /// Notification types whose in-app channel starts enabled (case-insensitive)
  #[serde(
    default = "default_in_app_types",
    deserialize_with = "deserialize_lowercase_set"
  )]
  pub in_app_defaults: BTreeSet<String>,
}

impl Default for NotificationsConfig {
  fn default() -> Self {
    Self {
      rollback: RollbackPolicy::default(),
      in_app_defaults: default_in_app_types(),
    }
  }
}

fn default_in_app_types() -> BTreeSet<String> {
  ["billing", "security", "system"]
    .into_iter()
    .map(String::from)
    .collect()
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./billdash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/billdash/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/billdash/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("billdash.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("billdash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  /// Parse and validate configuration from YAML text.
  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;

    config.base_url()?;
    if config.retry.max_attempts == 0 {
      return Err(eyre!("retry.max_attempts must be at least 1"));
    }

    Ok(config)
  }

  /// The backend base URL, normalized to end with a slash so relative
  /// endpoint paths join underneath it.
  pub fn base_url(&self) -> Result<Url> {
    let mut raw = self.api.base_url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }
    Url::parse(&raw).map_err(|e| eyre!("Invalid api.base_url '{}': {}", self.api.base_url, e))
  }

  /// Get the API token from environment variables, if one is set.
  ///
  /// Checks BILLDASH_API_TOKEN first, then API_TOKEN as fallback.
  pub fn get_api_token() -> Option<String> {
    std::env::var("BILLDASH_API_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
