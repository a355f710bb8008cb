pub mod config;

use std::{
  io,
  path::{
    Path,
    PathBuf,
  },
  sync::OnceLock,
};

use etcetera::base_strategy::{
  BaseStrategy,
  choose_base_strategy,
};
use thiserror::Error;

pub use config::{
  ApiKeySource,
  Config,
  SplitMethod,
  resolve_api_key,
};

static CONFIG_FILE: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("unable to find the {0} directory")]
  NoBaseDir(&'static str),
  #[error("failed to read {}: {source}", path.display())]
  Read { path: PathBuf, source: io::Error },
  #[error("invalid config {}: {source}", path.display())]
  Parse {
    path:   PathBuf,
    source: toml::de::Error,
  },
}

/// Uses `specified_file` as the config file, or the default location.
pub fn initialize_config_file(specified_file: Option<PathBuf>) -> Result<(), ConfigError> {
  let config_file = match specified_file {
    Some(file) => file,
    None => default_config_file()?,
  };
  ensure_parent_dir(&config_file);
  CONFIG_FILE.set(config_file).ok();
  Ok(())
}

pub fn config_file() -> Result<PathBuf, ConfigError> {
  if let Some(path) = CONFIG_FILE.get() {
    return Ok(path.clone());
  }
  initialize_config_file(None)?;
  CONFIG_FILE
    .get()
    .cloned()
    .ok_or(ConfigError::NoBaseDir("config"))
}

/// `$VIMINI_CONFIG_DIR`, or `vimini` under the platform config directory.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
  if let Some(dir) = std::env::var_os("VIMINI_CONFIG_DIR") {
    return Ok(PathBuf::from(dir));
  }
  let strategy = choose_base_strategy().map_err(|_| ConfigError::NoBaseDir("config"))?;
  let mut path = strategy.config_dir();
  path.push("vimini");
  Ok(path)
}

/// Shared token file read by other Gemini tools: `~/.config/gemini.token`.
pub fn token_file() -> Result<PathBuf, ConfigError> {
  let home = etcetera::home_dir().map_err(|_| ConfigError::NoBaseDir("home"))?;
  Ok(home.join(".config").join("gemini.token"))
}

fn default_config_file() -> Result<PathBuf, ConfigError> {
  Ok(config_dir()?.join("config.toml"))
}

/// Creates the missing parent directories of `path`, ignoring failures.
pub fn ensure_parent_dir(path: &Path) {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
    && !parent.exists()
  {
    std::fs::create_dir_all(parent).ok();
  }
}
