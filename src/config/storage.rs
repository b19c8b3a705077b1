//! Configuration Storage
//!
//! This module reads the optional settings file. Every field is optional;
//! anything left out falls back to the built-in defaults.

use crate::error::{ChatDbError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Settings that may be overridden from disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Chat model identifier
    pub model: Option<String>,
    /// Base URL of the OpenAI-compatible API
    pub api_base: Option<String>,
    /// Where the HTML preview is written
    pub preview_path: Option<PathBuf>,
    /// Maximum agent iterations per question
    pub max_iterations: Option<usize>,
    /// Row limit suggested to the model
    pub top_k: Option<usize>,
    /// Sample rows included in table descriptions
    pub sample_rows: Option<usize>,
    /// HTTP timeout for LLM requests (in seconds)
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chatdb"))
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load configuration from the default location
    ///
    /// A missing file (or a platform without a config directory) is not an
    /// error and yields the defaults.
    pub fn load() -> Result<Self> {
        match Self::config_file() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ChatDbError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content)
            .map_err(|e| ChatDbError::Config(format!("{} in {}", e, path.display())))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ChatDbError::Config(format!("Failed to parse config: {}", e)))
    }
}
