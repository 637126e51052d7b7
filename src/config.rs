//! Configuration for constructing the default collaborators.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{HintError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the remote authority, e.g. "https://api.example.com/".
  pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// Path of the SQLite store. Defaults to the platform data directory.
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sighints.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sighints/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(HintError::Config(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(HintError::Config(
        "no configuration file found; create one at ~/.config/sighints/config.yaml".into(),
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("sighints.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sighints").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      HintError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    serde_yaml::from_str(&contents).map_err(|e| {
      HintError::Config(format!(
        "failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_minimal_config() {
    let config: Config =
      serde_yaml::from_str("server:\n  url: https://api.example.com/\n").unwrap();
    assert_eq!(config.server.url, "https://api.example.com/");
    assert!(config.store.path.is_none());
  }

  #[test]
  fn test_parse_store_path() {
    let yaml = "server:\n  url: https://api.example.com/\nstore:\n  path: /tmp/hints.db\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.store.path, Some(PathBuf::from("/tmp/hints.db")));
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let missing = Path::new("/definitely/not/here.yaml");
    assert!(matches!(
      Config::load(Some(missing)),
      Err(HintError::Config(_))
    ));
  }
}
