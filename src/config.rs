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
  pub sync: SyncConfig,
  /// Where the database and logs live (defaults to $XDG_DATA_HOME/paysync)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Backend origin, e.g. "https://clientes.example.com"
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to run every GET straight against the network
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Prefix shared by both bucket names
  #[serde(default = "default_prefix")]
  pub prefix: String,
  /// Static bucket version. Bumping it discards the previous static bucket on activation.
  #[serde(default = "default_version")]
  pub version: String,
  /// App shell paths precached into the static bucket
  #[serde(default = "default_static_assets")]
  pub static_assets: Vec<String>,
  /// Page served when a navigation cannot be satisfied
  #[serde(default = "default_root_document")]
  pub root_document: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      prefix: default_prefix(),
      version: default_version(),
      static_assets: default_static_assets(),
      root_document: default_root_document(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Periodic drain interval
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
  /// How often the health endpoint is probed to detect connectivity changes
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
  #[serde(default = "default_health_path")]
  pub health_path: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: default_interval_secs(),
      probe_interval_secs: default_probe_interval_secs(),
      health_path: default_health_path(),
    }
  }
}

impl SyncConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs.max(1))
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

fn default_true() -> bool {
  true
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_prefix() -> String {
  "paysync".to_string()
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_static_assets() -> Vec<String> {
  ["/", "/index.html", "/styles.css", "/app.js", "/manifest.json"]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_root_document() -> String {
  "/".to_string()
}

fn default_interval_secs() -> u64 {
  300
}

fn default_probe_interval_secs() -> u64 {
  30
}

fn default_health_path() -> String {
  "/api/health".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./paysync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/paysync/config.yaml
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
        "No configuration file found. Create one at ~/.config/paysync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("paysync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("paysync").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    url::Url::parse(&config.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url '{}': {}", config.api.base_url, e))?;
    Ok(config)
  }

  /// Resolve the data directory, falling back to the platform data dir.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("paysync"))
  }

  /// Get the optional API bearer token from the environment.
  ///
  /// Checks PAYSYNC_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("PAYSYNC_API_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("api:\n  base_url: https://example.com\n").unwrap();

    assert_eq!(config.api.timeout_secs, 10);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.version, "v1");
    assert_eq!(config.cache.root_document, "/");
    assert!(config.cache.static_assets.contains(&"/index.html".to_string()));
    assert_eq!(config.sync.health_path, "/api/health");
    assert_eq!(config.sync.interval(), Duration::from_secs(300));
  }

  #[test]
  fn test_invalid_base_url_rejected() {
    assert!(Config::from_yaml("api:\n  base_url: not a url\n").is_err());
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "api:\n  base_url: http://localhost:3000\ncache:\n  version: v7\n  static_assets: [\"/\", \"/app.js\"]\nsync:\n  interval_secs: 0"
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.cache.version, "v7");
    assert_eq!(config.cache.static_assets.len(), 2);
    // Zero intervals are clamped so the timer never spins
    assert_eq!(config.sync.interval(), Duration::from_secs(1));
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/paysync.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
