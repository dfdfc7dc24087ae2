//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Default run time for `scan` and `pair`, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default tag file name, relative to the working directory.
pub const DEFAULT_TAG_FILE: &str = "tag.json";

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default tag file
    #[serde(default)]
    pub tag: Option<PathBuf>,

    /// Default run time for `scan` and `pair`, in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Connect timeout in seconds
    #[serde(default)]
    pub connect_timeout: Option<u64>,

    /// Default service filter
    #[serde(default)]
    pub services: Vec<Uuid>,

    /// Keep scanning after a pairing key matches
    #[serde(default)]
    pub keep_scanning: bool,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tagpair")
            .join("config.toml")
    }

    /// Load config from `path` (or the default path), or return the default
    /// if it is missing or unreadable.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), "Failed to parse config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), "Failed to read config: {}", e);
                Self::default()
            }
        }
    }

    /// Resolve the tag file: explicit argument, then config, then the default.
    pub fn resolve_tag(&self, tag: Option<PathBuf>) -> PathBuf {
        tag.or_else(|| self.tag.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TAG_FILE))
    }

    /// Resolve the run time: explicit argument, then config, then the default.
    pub fn resolve_timeout(&self, timeout: Option<u64>) -> Duration {
        Duration::from_secs(
            timeout
                .or(self.timeout)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Resolve the service filter: explicit arguments replace the config list.
    pub fn resolve_services(&self, services: Vec<Uuid>) -> Vec<Uuid> {
        if services.is_empty() {
            self.services.clone()
        } else {
            services
        }
    }
}
