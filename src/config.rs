//! Player configuration with persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config {path:?}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to parse config: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Settings shared by the supervisor (how to launch VLC) and the
/// connection (where to reach its remote-control socket).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Host the rc interface binds to and the connection dials.
  #[serde(default = "default_host")]
  pub host: String,

  #[serde(default = "default_port")]
  pub port: u16,

  /// Launch the interface-less binary (`cvlc`).
  #[serde(default)]
  pub headless: bool,

  /// Additional VLC command-line arguments, appended after the rc flags.
  #[serde(default)]
  pub extra_args: Vec<String>,

  /// Custom VLC executable path (None = auto-detect).
  #[serde(default)]
  pub vlc_path: Option<String>,

  /// Bound on how long a reply line may take. None blocks indefinitely.
  #[serde(default = "default_read_timeout_ms")]
  pub read_timeout_ms: Option<u64>,

  /// Stop an attached player when the host receives Ctrl-C. Enabling this
  /// takes over SIGINT for the whole process: the host must exit on
  /// `LifecycleEvent::Interrupted` itself.
  #[serde(default)]
  pub handle_interrupt: bool,

  /// How often an attached player is polled for exit.
  #[serde(default = "default_child_poll_interval_ms")]
  pub child_poll_interval_ms: u64,
}

fn default_host() -> String {
  "localhost".to_string()
}

fn default_port() -> u16 {
  1234
}

fn default_read_timeout_ms() -> Option<u64> {
  Some(5000)
}

fn default_child_poll_interval_ms() -> u64 {
  250
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
      headless: false,
      extra_args: Vec::new(),
      vlc_path: None,
      read_timeout_ms: default_read_timeout_ms(),
      handle_interrupt: false,
      child_poll_interval_ms: default_child_poll_interval_ms(),
    }
  }
}

impl PlayerConfig {
  /// Location of the config file: `<config dir>/vlc-rc/config.json`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vlc-rc").join("config.json"))
  }

  /// Load and validate a JSON config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let config: Self = serde_json::from_str(&raw)?;
    config.validate()?;
    log::debug!("Loaded player config from {:?}", path);
    Ok(config)
  }

  /// Load from [`Self::default_path`], falling back to defaults when the
  /// file does not exist.
  pub fn load_or_default() -> Result<Self, ConfigError> {
    match Self::default_path() {
      Some(path) if path.exists() => Self::load(&path),
      _ => Ok(Self::default()),
    }
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.host.trim().is_empty() {
      return Err(ConfigError::Invalid("Host cannot be empty".to_string()));
    }
    if self.port == 0 {
      return Err(ConfigError::Invalid("Port must be non-zero".to_string()));
    }
    if self.read_timeout_ms == Some(0) {
      return Err(ConfigError::Invalid(
        "Read timeout must be positive; omit it to block".to_string(),
      ));
    }
    if self.child_poll_interval_ms == 0 {
      return Err(ConfigError::Invalid(
        "Child poll interval must be positive".to_string(),
      ));
    }
    Ok(())
  }

  /// `host:port` as passed to `--rc-host` and dialled by the connection.
  pub fn rc_address(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }

  pub fn read_timeout(&self) -> Option<Duration> {
    self.read_timeout_ms.map(Duration::from_millis)
  }

  pub fn child_poll_interval(&self) -> Duration {
    Duration::from_millis(self.child_poll_interval_ms)
  }
}
