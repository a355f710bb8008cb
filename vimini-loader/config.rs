use std::{
  fs,
  io,
  path::{
    Path,
    PathBuf,
  },
  time::Duration,
};

use serde::{
  Deserialize,
  Serialize,
};
use vimini_job::{
  TEMPERATURE_RANGE,
  validate_temperature,
};

use crate::ConfigError;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// How a host should open new panes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitMethod {
  #[default]
  Vertical,
  Horizontal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
  pub api_key:              Option<String>,
  pub model:                String,
  pub autocomplete_model:   String,
  pub temperature:          Option<f32>,
  /// Request and show thought output.
  pub verbose:              bool,
  pub log_file:             Option<PathBuf>,
  pub split_method:         SplitMethod,
  pub poll_interval_ms:     u64,
  pub step_interval_ms:     u64,
  pub base_url:             Option<String>,
  pub request_timeout_secs: u64,
  /// Problems found while loading, for the user to see. Each offending value
  /// has been replaced by its default.
  #[serde(skip)]
  pub warnings:             Vec<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_key:              None,
      model:                DEFAULT_MODEL.to_string(),
      autocomplete_model:   DEFAULT_MODEL.to_string(),
      temperature:          None,
      verbose:              false,
      log_file:             None,
      split_method:         SplitMethod::default(),
      poll_interval_ms:     100,
      step_interval_ms:     100,
      base_url:             None,
      request_timeout_secs: 120,
      warnings:             Vec::new(),
    }
  }
}

impl Config {
  /// Reads `path`. A missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = match fs::read_to_string(path) {
      Ok(text) => text,
      Err(err) if err.kind() == io::ErrorKind::NotFound => {
        log::info!("no config at {}, using defaults", path.display());
        return Ok(Self::default());
      },
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.to_path_buf(),
          source,
        });
      },
    };
    Self::parse(&text).map_err(|source| {
      ConfigError::Parse {
        path: path.to_path_buf(),
        source,
      }
    })
  }

  pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
    let config: Self = toml::from_str(text)?;
    Ok(config.validated())
  }

  /// Replaces out of range values with defaults, recording a warning for
  /// each one.
  fn validated(mut self) -> Self {
    let defaults = Self::default();
    if let Some(value) = self.temperature
      && validate_temperature(value).is_none()
    {
      self.warnings.push(format!(
        "Temperature must be between {:.1} and {:.1}. Using default.",
        TEMPERATURE_RANGE.start(),
        TEMPERATURE_RANGE.end()
      ));
      self.temperature = None;
    }
    if self.poll_interval_ms == 0 {
      self.warnings.push("poll-interval-ms must be positive. Using default.".to_string());
      self.poll_interval_ms = defaults.poll_interval_ms;
    }
    if self.step_interval_ms == 0 {
      self.warnings.push("step-interval-ms must be positive. Using default.".to_string());
      self.step_interval_ms = defaults.step_interval_ms;
    }
    if self.request_timeout_secs == 0 {
      self.warnings.push("request-timeout-secs must be positive. Using default.".to_string());
      self.request_timeout_secs = defaults.request_timeout_secs;
    }
    if self.api_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
      self.api_key = None;
    }
    self
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }

  pub fn step_interval(&self) -> Duration {
    Duration::from_millis(self.step_interval_ms)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
  Config,
  Environment,
  TokenFile,
}

/// First non-empty key from the config, the environment value, then the token
/// file.
pub fn resolve_api_key(
  config: &Config,
  env_value: Option<String>,
  token_file: Option<&Path>,
) -> Option<(String, ApiKeySource)> {
  fn non_empty(key: impl AsRef<str>) -> Option<String> {
    let key = key.as_ref().trim();
    (!key.is_empty()).then(|| key.to_string())
  }

  if let Some(key) = config.api_key.as_deref().and_then(non_empty) {
    return Some((key, ApiKeySource::Config));
  }
  if let Some(key) = env_value.and_then(non_empty) {
    return Some((key, ApiKeySource::Environment));
  }
  let token_file = token_file?;
  match fs::read_to_string(token_file) {
    Ok(text) => non_empty(text).map(|key| (key, ApiKeySource::TokenFile)),
    Err(err) => {
      log::debug!("no token at {}: {err}", token_file.display());
      None
    },
  }
}
