// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default host read chunk in bytes.
pub const DEFAULT_READ_CHUNK: usize = 256;

/// Largest accepted host read chunk in bytes.
pub const MAX_READ_CHUNK: usize = 64 * 1024;

/// Stream binding configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BindConfig {
    /// Bytes requested from the host per input refill.
    pub read_chunk: usize,
    /// Device node backing stdin and stdout.
    pub tty_path: String,
    /// Device node backing stderr.
    pub tty_err_path: String,
    /// Guest stdin path.
    pub stdin_path: String,
    /// Guest stdout path.
    pub stdout_path: String,
    /// Guest stderr path.
    pub stderr_path: String,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            read_chunk: DEFAULT_READ_CHUNK,
            tty_path: "/dev/hosttty".into(),
            tty_err_path: "/dev/hostttyerr".into(),
            stdin_path: "/dev/stdin".into(),
            stdout_path: "/dev/stdout".into(),
            stderr_path: "/dev/stderr".into(),
        }
    }
}

/// Errors raised while loading [`BindConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// TOML parsing failed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed, or `<inline>`.
        path: PathBuf,
        /// Error returned by the TOML deserializer.
        source: toml::de::Error,
    },
    /// Values parsed but are unusable.
    #[error("invalid tty configuration: {0}")]
    Invalid(String),
}

impl BindConfig {
    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, Path::new("<inline>"))
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks chunk bounds and that every path is absolute and unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk == 0 || self.read_chunk > MAX_READ_CHUNK {
            return Err(ConfigError::Invalid(format!(
                "read_chunk must be within 1..={MAX_READ_CHUNK}, got {}",
                self.read_chunk
            )));
        }
        let paths = self.paths();
        for (idx, path) in paths.iter().enumerate() {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!("path {path} is not absolute")));
            }
            if paths[..idx].contains(path) {
                return Err(ConfigError::Invalid(format!("path {path} is used twice")));
            }
        }
        Ok(())
    }

    /// Stdio paths in descriptor slot order.
    pub fn stdio_paths(&self) -> [&str; 3] {
        [&self.stdin_path, &self.stdout_path, &self.stderr_path]
    }

    fn paths(&self) -> [&str; 5] {
        [
            &self.tty_path,
            &self.tty_err_path,
            &self.stdin_path,
            &self.stdout_path,
            &self.stderr_path,
        ]
    }
}
