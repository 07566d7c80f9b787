//! Optional TOML configuration file.
//!
//! A missing file yields defaults; every key is optional.

use crate::exec_pane::ExecPaneConfig;
use execmux_core::{ApprovalError, ApprovalPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Pattern(#[from] ApprovalError),
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub max_capture_lines: usize,
    pub command_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub prepare_timeout_secs: u64,
    pub whitelist_patterns: Vec<String>,
    pub blacklist_patterns: Vec<String>,
    pub auto_exec_safe: bool,
    pub yolo: bool,
    pub log_level: String,
    /// `tmux` or `zellij`; unset means detect from the environment.
    pub backend: Option<String>,
    pub tmux_socket_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_capture_lines: 8000,
            command_timeout_secs: 300,
            poll_interval_ms: 500,
            prepare_timeout_secs: 5,
            whitelist_patterns: Vec::new(),
            blacklist_patterns: Vec::new(),
            auto_exec_safe: true,
            yolo: false,
            log_level: "warn".to_string(),
            backend: None,
            tmux_socket_path: None,
        }
    }
}

/// `$XDG_CONFIG_HOME/execmux/config.toml`, else `~/.config/execmux/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join("execmux").join("config.toml"));
    }
    let home = std::env::var_os("HOME").filter(|h| !h.is_empty())?;
    Some(PathBuf::from(home).join(".config").join("execmux").join("config.toml"))
}

impl Config {
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`. An explicit path must exist; the default path may not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                tracing::debug!(path = %path.display(), "loaded config");
                Self::from_toml(&text, &path)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_capture_lines", self.max_capture_lines as u64),
            ("command_timeout_secs", self.command_timeout_secs),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero { key: *key });
        }
        self.approval_policy()?;
        Ok(())
    }

    pub fn approval_policy(&self) -> Result<ApprovalPolicy, ApprovalError> {
        ApprovalPolicy::new(
            &self.whitelist_patterns,
            &self.blacklist_patterns,
            self.auto_exec_safe,
            self.yolo,
        )
    }

    pub fn exec_pane_config(&self) -> ExecPaneConfig {
        ExecPaneConfig {
            max_capture_lines: self.max_capture_lines,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            prepare_timeout: Duration::from_secs(self.prepare_timeout_secs),
            ..ExecPaneConfig::default()
        }
    }
}
