//! Configuration management for cmdtree.
//!
//! Loads shell settings, external type sources and per-context init commands
//! from a TOML file. A missing file yields the defaults.

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure for cmdtree.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Shell settings.
    #[serde(default)]
    pub shell: ShellConfig,

    /// External type sources.
    #[serde(default)]
    pub types: TypesConfig,

    /// Init command lines keyed by context path suffix.
    #[serde(default)]
    pub init: BTreeMap<String, Vec<String>>,
}

/// Shell settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellConfig {
    /// Shell name, used in log output.
    #[serde(default = "default_name")]
    pub name: String,

    /// Prompt suffix shown after the current path in interactive mode.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Default log filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_name() -> String {
    "cmdtree".to_string()
}

fn default_prompt() -> String {
    "> ".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            prompt: default_prompt(),
            log_level: default_log_level(),
        }
    }
}

/// External type source settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TypesConfig {
    /// TOML type source files, loaded lazily on the first unknown type name.
    /// A leading `~/` is expanded to the home directory.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
}

impl TypesConfig {
    /// Source paths with `~/` expanded.
    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.sources.iter().map(|p| expand_home(p)).collect()
    }
}

/// Expands a leading `~/` using the platform home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cmdtree")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DispatchError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            DispatchError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Init lines as `(path_suffix, line)` pairs, in key order.
    pub fn init_commands(&self) -> Vec<(String, String)> {
        self.init
            .iter()
            .flat_map(|(suffix, lines)| lines.iter().map(move |line| (suffix.clone(), line.clone())))
            .collect()
    }
}
