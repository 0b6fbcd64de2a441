//! Configuration management for mculog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::file::{self, DEFAULT_FILE_NAME};
use crate::level::LogLevel;
use crate::ring;
use crate::uart::TransmitMode;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "mculog";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `MCULOG_`, sections separated by
///    `__`, e.g. `MCULOG_UART__MODE=dma`)
/// 2. TOML config file at `~/.config/mculog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logger core configuration.
    pub logger: LoggerConfig,
    /// UART output configuration.
    pub uart: UartConfig,
    /// SD card (log file) configuration.
    pub sd: SdConfig,
    /// Message filter configuration.
    pub filter: FilterConfig,
}

/// Logger core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Least severe level that is still emitted.
    pub level: LogLevel,
    /// Size of the formatting buffer in bytes; longer messages are truncated
    /// to `buffer_size - 1` bytes.
    pub buffer_size: usize,
}

/// UART output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    /// Send messages over UART.
    pub enabled: bool,
    /// How bytes are pushed to the port.
    pub mode: TransmitMode,
    /// Ring buffer capacity in bytes for interrupt and DMA modes.
    pub ring_buffer_size: usize,
}

/// SD card configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdConfig {
    /// Append messages to the log file.
    pub enabled: bool,
    /// Path to the log file.
    /// Defaults to `~/.local/share/mculog/log.txt`
    pub file_path: Option<PathBuf>,
    /// Prefix each file line with a UTC timestamp.
    pub timestamps: bool,
}

/// Message filter configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Messages matching any of these regular expressions are dropped.
    pub patterns: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            buffer_size: 256,
        }
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: TransmitMode::Interrupt,
            ring_buffer_size: 1024,
        }
    }
}

impl Default for SdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_path: None, // Will be resolved to default at runtime
            timestamps: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing, or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("MCULOG_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.logger.buffer_size == 0 {
            return Err(Error::ConfigValidation {
                message: "buffer_size must be greater than 0".to_string(),
            });
        }

        let ring_range = ring::MIN_CAPACITY..=ring::MAX_CAPACITY;
        if !ring_range.contains(&self.uart.ring_buffer_size) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "ring_buffer_size ({}) must be between {} and {}",
                    self.uart.ring_buffer_size,
                    ring::MIN_CAPACITY,
                    ring::MAX_CAPACITY
                ),
            });
        }

        for pattern in &self.filter.patterns {
            if regex::Regex::new(pattern).is_err() {
                return Err(Error::ConfigValidation {
                    message: format!("invalid regex pattern: {pattern}"),
                });
            }
        }

        Ok(())
    }

    /// Get the log file path, resolving defaults if not set.
    #[must_use]
    pub fn log_file_path(&self) -> PathBuf {
        self.sd
            .file_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DEFAULT_FILE_NAME))
    }

    /// Whether SD output is enabled and its log file could be opened.
    ///
    /// Does not create the file or its directories.
    #[must_use]
    pub fn log_file_available(&self) -> bool {
        self.sd.enabled && file::is_writable(self.log_file_path())
    }
}
