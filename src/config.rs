//! Gate configuration and layered loading.
//!
//! This module provides:
//! - [`GateConfig`], the settings a gate is built from
//! - [`ConfigLoader`], which layers defaults, a file, the environment and
//!   programmatic overrides
//! - validation that rejects a negative reader cap at load time
//!
//! The file format is deliberately minimal: `key = value` lines, `#` comments,
//! and an optional `[gate]` section header.
//!
//! ```text
//! [gate]
//! name = "inventory"
//! max_readers = 8
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Prefix for environment variable overrides, e.g. `ACCESSGATE_MAX_READERS`.
pub const ENV_PREFIX: &str = "ACCESSGATE_";

/// Settings an [`AccessGate`](crate::AccessGate) is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Optional label shown in diagnostics.
    pub name: Option<String>,
    /// Maximum number of concurrent read permits.
    pub max_readers: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            name: None,
            max_readers: available_parallelism(),
        }
    }
}

impl GateConfig {
    /// Creates a config with the given reader cap and no name.
    #[must_use]
    pub fn new(max_readers: usize) -> Self {
        Self {
            name: None,
            max_readers,
        }
    }

    /// Sets the diagnostic label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::EmptyName`] if a name is set but blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ConfigError::EmptyName);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading a config file.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed config file line.
    #[error("config parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        message: String,
    },
    /// The reader cap was negative.
    #[error("max_readers must be non-negative, got {0}")]
    NegativeCapacity(i64),
    /// A value could not be parsed for its key.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// The key being set.
        key: String,
        /// The offending value.
        value: String,
    },
    /// A key that no setting answers to.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    /// A name was given but is blank.
    #[error("gate name must not be blank")]
    EmptyName,
}

/// Configuration loader with layered sources.
///
/// Precedence, lowest first:
/// 1. Base config (defaults unless replaced with [`base`](Self::base))
/// 2. Config file
/// 3. `ACCESSGATE_*` environment variables
/// 4. Programmatic overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    base: GateConfig,
    file_path: Option<PathBuf>,
    overrides: BTreeMap<String, String>,
}

impl ConfigLoader {
    /// Creates a loader starting from [`GateConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the base layer.
    #[must_use]
    pub fn base(mut self, config: GateConfig) -> Self {
        self.base = config;
        self
    }

    /// Sets a file path for config loading.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Adds a programmatic override (highest precedence).
    ///
    /// Keys may be given bare (`max_readers`) or in environment form
    /// (`ACCESSGATE_MAX_READERS`).
    #[must_use]
    pub fn override_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Loads configuration, reading overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised by a layer or by final validation.
    pub fn load(&self) -> Result<GateConfig, ConfigError> {
        self.load_with_env(std::env::vars())
    }

    /// Loads configuration with an explicit set of environment variables.
    ///
    /// Variables without the [`ENV_PREFIX`] are ignored.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised by a layer or by final validation.
    pub fn load_with_env<I>(&self, vars: I) -> Result<GateConfig, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = match &self.file_path {
            Some(path) => load_from_file(path, self.base.clone())?,
            None => self.base.clone(),
        };

        for (key, value) in vars {
            if key.starts_with(ENV_PREFIX) {
                apply_override(&mut config, &key, &value)?;
            }
        }
        for (key, value) in &self.overrides {
            apply_override(&mut config, key, value)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get)
        .max(1)
}

fn load_from_file(path: &Path, base: GateConfig) -> Result<GateConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents, base)
}

fn parse_config(contents: &str, base: GateConfig) -> Result<GateConfig, ConfigError> {
    let mut config = base;

    for (line_idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if section.trim() != "gate" {
                return Err(ConfigError::Parse {
                    line: line_idx + 1,
                    message: format!("unknown section [{}]", section.trim()),
                });
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Parse {
                line: line_idx + 1,
                message: "expected `key = value`".to_string(),
            });
        };
        apply_override(&mut config, key.trim(), unquote(value.trim()))?;
    }

    Ok(config)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn apply_override(config: &mut GateConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let canonical = key
        .strip_prefix(ENV_PREFIX)
        .map_or_else(|| key.to_string(), str::to_ascii_lowercase);

    match canonical.as_str() {
        "max_readers" => config.max_readers = parse_capacity(key, value)?,
        "name" => config.name = Some(value.to_string()),
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}

fn parse_capacity(key: &str, value: &str) -> Result<usize, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };
    let raw: i64 = value.trim().parse().map_err(|_| invalid())?;
    if raw < 0 {
        return Err(ConfigError::NegativeCapacity(raw));
    }
    usize::try_from(raw).map_err(|_| invalid())
}
