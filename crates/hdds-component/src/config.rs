// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Component runtime configuration.
//!
//! Loaded from a JSON file or built from defaults, then overlaid with the
//! socket folder environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable selecting the socket folder.
pub const SOCKETS_FOLDER_ENV: &str = "DAPR_COMPONENT_SOCKETS_FOLDER";

/// Singular spelling still honoured when the plural one is unset.
pub const LEGACY_SOCKET_FOLDER_ENV: &str = "DAPR_COMPONENT_SOCKET_FOLDER";

/// Socket folder used when neither the config nor the environment sets one.
pub const DEFAULT_SOCKET_FOLDER: &str = "/tmp/dapr-components-sockets";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Component runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Folder holding one `<name>.sock` per registered component
    #[serde(default = "default_socket_folder")]
    pub socket_folder: PathBuf,

    /// How long an ack may wait for the dispatcher to take its result (milliseconds)
    #[serde(default = "default_ack_resolve_timeout")]
    pub ack_resolve_timeout_ms: u64,

    /// Per-message ack deadline used by the bundled components (seconds)
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,

    /// Maximum frame size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_socket_folder() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_FOLDER)
}

fn default_ack_resolve_timeout() -> u64 {
    1000
}

fn default_dispatch_timeout() -> u64 {
    30
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024 // 16 MB
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            socket_folder: default_socket_folder(),
            ack_resolve_timeout_ms: default_ack_resolve_timeout(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            max_message_size: default_max_message_size(),
            log_level: default_log_level(),
        }
    }
}

impl ComponentConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay the socket folder from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay the socket folder using the given variable lookup.
    ///
    /// The plural variable wins over the legacy singular one.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(folder) = lookup(SOCKETS_FOLDER_ENV).or_else(|| lookup(LEGACY_SOCKET_FOLDER_ENV))
        {
            self.socket_folder = PathBuf::from(folder);
        }
        self
    }

    /// Socket path for the component registered under `name`.
    pub fn socket_path(&self, name: &str) -> PathBuf {
        self.socket_folder.join(format!("{}.sock", name))
    }

    /// Get the ack resolve timeout as Duration.
    pub fn ack_resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_resolve_timeout_ms)
    }

    /// Get the dispatch timeout as Duration.
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_folder.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("socket_folder cannot be empty".into()));
        }
        if self.ack_resolve_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ack_resolve_timeout_ms cannot be 0".into(),
            ));
        }
        if self.dispatch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "dispatch_timeout_secs cannot be 0".into(),
            ));
        }
        if self.max_message_size < 1024 {
            return Err(ConfigError::Invalid(
                "max_message_size must be at least 1024 bytes".into(),
            ));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "max_message_size must fit a 4-byte length prefix (at most {} bytes)",
                u32::MAX
            )));
        }
        Ok(())
    }
}
