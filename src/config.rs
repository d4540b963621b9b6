use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub health: HealthConfig,
  /// Whether this process drives a live UI. Non-interactive runs use an
  /// in-memory cache and never start the background probe.
  #[serde(default = "default_true")]
  pub interactive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the content service, e.g. "https://api.example.org/v1/"
  pub url: String,
  /// Per-request timeout enforced by the transport
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  /// SQLite, then the key/value file, then memory
  #[default]
  Auto,
  Sqlite,
  /// Flat JSON key/value file with a byte quota
  File,
  Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub backend: BackendKind,
  /// Data directory override (default: $XDG_DATA_HOME/hadith-cache)
  pub dir: Option<PathBuf>,
  /// Key prefix for the key/value backend
  pub namespace: String,
  /// Entry count above which the key/value backend evicts the oldest quarter
  pub max_entries: usize,
  pub quota_bytes: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      backend: BackendKind::Auto,
      dir: None,
      namespace: "hadith-cache".to_string(),
      max_entries: 100,
      quota_bytes: 5 * 1024 * 1024,
    }
  }
}

impl CacheConfig {
  /// Directory for persisted cache files and logs.
  pub fn data_dir(&self) -> Option<PathBuf> {
    self.dir.clone().or_else(default_data_dir)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub attempts: u32,
  /// Wait before attempt n+1, indexed by n
  pub backoff_ms: Vec<u64>,
  /// Wait used once `backoff_ms` runs out
  pub fallback_backoff_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      attempts: 3,
      backoff_ms: vec![1000, 2000, 4000],
      fallback_backoff_ms: 5000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
  pub probe_interval_secs: u64,
  pub failure_threshold: u32,
  /// A valid cache entry is served without a network attempt if the last
  /// health check happened within this window
  pub recent_check_secs: u64,
}

impl Default for HealthConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: 30,
      failure_threshold: 3,
      recent_check_secs: 5,
    }
  }
}

/// Upper bound for `recent_check_secs`
const MAX_RECENT_CHECK_SECS: u64 = 24 * 60 * 60;

impl HealthConfig {
  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs)
  }

  /// The freshness window, clamped to one day.
  pub fn recent_check(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.recent_check_secs.min(MAX_RECENT_CHECK_SECS) as i64)
  }
}

fn default_true() -> bool {
  true
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_data_dir() -> Option<PathBuf> {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|p| p.join("hadith-cache"))
}

impl Config {
  /// Build a config with defaults for everything but the API URL.
  pub fn with_url(url: impl Into<String>) -> Self {
    Self {
      api: ApiConfig {
        url: url.into(),
        timeout_secs: default_timeout_secs(),
      },
      cache: CacheConfig::default(),
      retry: RetryConfig::default(),
      health: HealthConfig::default(),
      interactive: true,
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hadith-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hadith-cache/config.yaml
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
        "No configuration file found. Create one at ~/.config/hadith-cache/config.yaml\n\
                 or pass --url."
      )),
    }
  }

  pub fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("hadith-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hadith-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Get the API key from environment variables, if any.
  ///
  /// Checks HADITH_CACHE_API_KEY first, then HADITH_API_KEY as fallback.
  pub fn get_api_key() -> Option<String> {
    std::env::var("HADITH_CACHE_API_KEY")
      .or_else(|_| std::env::var("HADITH_API_KEY"))
      .ok()
      .filter(|key| !key.is_empty())
  }
}
