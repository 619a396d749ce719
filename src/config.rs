//! Configuration loading.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_busy_timeout_ms() -> u64 {
  5000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  /// Database file path (default: $XDG_DATA_HOME/staffdb/staff.db)
  pub database: Option<PathBuf>,

  /// Deadline for store calls against a locked database, in milliseconds.
  #[serde(default = "default_busy_timeout_ms")]
  pub busy_timeout_ms: u64,

  /// Dynamic column the deployer treats as the unique business key (e.g.
  /// "ssn"). It is an ordinary dynamic column; this only names the default
  /// search field for lookups that don't specify one.
  pub business_key: Option<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database: None,
      busy_timeout_ms: default_busy_timeout_ms(),
      business_key: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./staffdb.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/staffdb/config.yaml
  ///
  /// Everything has a default, so a missing config file is not an error
  /// unless a path was given explicitly.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Config(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("staffdb.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("staffdb").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

    serde_yaml::from_str(&contents)
      .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
  }
}
