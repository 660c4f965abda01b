//! Session configuration.
//!
//! Resolution order: built-in defaults, then the JSON config file, then
//! `SWANK_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ipc::DEFAULT_TIMEOUT_SECS;
use crate::syntax::DEFAULT_PACKAGE;

/// Directory name under the platform config dir.
const CONFIG_DIR_NAME: &str = "lisp-editor-core";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_package")]
    pub default_package: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4005
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_package() -> String {
    DEFAULT_PACKAGE.to_string()
}

fn default_connect_attempts() -> u32 {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            default_package: default_package(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

/// Path of the user config file, e.g. `~/.config/lisp-editor-core/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl SessionConfig {
    /// Defaults, overlaid with the user config file if it exists, then with
    /// the environment.
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Apply `SWANK_HOST`, `SWANK_PORT`, `SWANK_TIMEOUT_SECS` and
    /// `SWANK_PACKAGE` from `lookup`. Unparseable numbers are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SWANK_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("SWANK_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid SWANK_PORT"),
            }
        }
        if let Some(secs) = lookup("SWANK_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => self.timeout_secs = secs,
                Err(_) => warn!(value = %secs, "Ignoring invalid SWANK_TIMEOUT_SECS"),
            }
        }
        if let Some(package) = lookup("SWANK_PACKAGE") {
            self.default_package = package;
        }
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
