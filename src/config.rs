//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{AltosError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub units: UnitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device link configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LinkConfig {
    /// Serial device; probe the usual paths when unset
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    /// Talk to a flight computer through a ground-station relay
    #[serde(default)]
    pub remote: bool,
}

/// Display unit configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct UnitsConfig {
    #[serde(default)]
    pub imperial: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<String>,
}

// Default value functions
fn default_baud_rate() -> u32 { crate::link::serial::DEFAULT_BAUD_RATE }
fn default_reply_timeout_ms() -> u64 { crate::link::DEFAULT_REPLY_TIMEOUT_MS }
fn default_log_level() -> String { "info".to_string() }

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            reply_timeout_ms: default_reply_timeout_ms(),
            remote: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> AltosError {
    AltosError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use altos_decode::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if let Some(port) = &self.link.port {
            if port.trim().is_empty() {
                return Err(invalid("link port cannot be empty when set"));
            }
        }

        if !BAUD_RATES.contains(&self.link.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {}",
                BAUD_RATES.map(|b| b.to_string()).join(", ")
            )));
        }

        if self.link.reply_timeout_ms == 0 || self.link.reply_timeout_ms > 60000 {
            return Err(invalid("reply_timeout_ms must be between 1 and 60000"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        if let Some(file) = &self.logging.file {
            if file.trim().is_empty() {
                return Err(invalid("logging file cannot be empty when set"));
            }
        }

        Ok(())
    }
}
