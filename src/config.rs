//! Engine configuration.
//!
//! Loaded from `taskweave.toml` at the store root; every field has a
//! default so a missing file is a valid configuration. The
//! `TASKWEAVE_DISABLE_HOOKS` environment variable is the global
//! kill-switch: any non-empty value disables all hook execution without
//! altering lifecycle transitions.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "taskweave.toml";
pub const DISABLE_HOOKS_ENV: &str = "TASKWEAVE_DISABLE_HOOKS";

fn default_true() -> bool {
    true
}

fn default_hook_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Master switch for hook execution (the env kill-switch overrides it).
    #[serde(default = "default_true")]
    pub hooks_enabled: bool,

    /// System-tier hook root; defaults to `<store>/hooks`.
    #[serde(default)]
    pub system_hooks_dir: Option<PathBuf>,

    /// User-tier hook root; defaults to `~/.config/taskweave/hooks`.
    #[serde(default)]
    pub user_hooks_dir: Option<PathBuf>,

    /// Timeout applied to hooks without a per-definition override.
    #[serde(default = "default_hook_timeout")]
    pub default_hook_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hooks_enabled: true,
            system_hooks_dir: None,
            user_hooks_dir: None,
            default_hook_timeout_secs: default_hook_timeout(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from a TOML string.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `taskweave.toml` from the store root, falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content, &path)
    }

    /// Resolved system-tier hook root.
    pub fn system_hooks_root(&self, store_root: &Path) -> PathBuf {
        self.system_hooks_dir
            .clone()
            .unwrap_or_else(|| store_root.join("hooks"))
    }

    /// Resolved user-tier hook root.
    pub fn user_hooks_root(&self) -> PathBuf {
        self.user_hooks_dir.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from(".config"))
                .join("taskweave")
                .join("hooks")
        })
    }

    /// Whether hooks may run at all: the config switch gated by the
    /// environment kill-switch, read once at engine construction.
    pub fn effective_hooks_enabled(&self) -> bool {
        if !self.hooks_enabled {
            return false;
        }
        match std::env::var_os(DISABLE_HOOKS_ENV) {
            Some(value) => value.is_empty(),
            None => true,
        }
    }
}
