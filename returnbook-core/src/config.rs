//! Run configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration. Nothing in the pipeline reads the environment or the working
//! directory; the store path and window come only from here.

use crate::source::FetchWindow;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What to do when the stored table cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Move the bad file to `{file}.quarantined` and start from an empty table.
    #[default]
    Quarantine,
    /// Stop the run and leave the file where it is.
    Abort,
}

/// Yahoo Finance client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YahooConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

/// Top-level configuration for an update run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrument to track.
    pub symbol: String,
    /// Location of the returns table.
    pub store_path: PathBuf,
    pub window: FetchWindow,
    pub on_malformed: MalformedPolicy,
    pub yahoo: YahooConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: "^NSEI".into(),
            store_path: PathBuf::from("data/nifty_returns.json"),
            window: FetchWindow::default(),
            on_malformed: MalformedPolicy::default(),
            yahoo: YahooConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}
