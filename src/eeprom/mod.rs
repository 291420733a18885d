//! # Eeprom Module
//!
//! Flight logs stored on board and read back after the flight.
//!
//! This module handles:
//! - The tiny (one word per record) and full (eight byte record) log formats
//! - Querying device configuration and the stored flight index
//! - Downloading each flight's blocks over a [`crate::link::Link`]

pub mod config_data;
pub mod full;
pub mod list;
pub mod tiny;

pub use config_data::ConfigData;
pub use full::{FullLog, FullRecord};
pub use list::{download_all, download_flight, download_session, EepromFlight, EepromList};
pub use tiny::TinyLog;

use crate::error::{AltosError, Result};
use crate::fusion::DataListener;

/// Log format number reported as `log-format`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EepromFormat {
    Full,
    Tiny,
}

impl EepromFormat {
    pub fn from_log_format(format: u8) -> Option<Self> {
        match format {
            1 => Some(EepromFormat::Full),
            2 => Some(EepromFormat::Tiny),
            _ => None,
        }
    }
}

impl std::str::FromStr for EepromFormat {
    type Err = AltosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(EepromFormat::Full),
            "tiny" => Ok(EepromFormat::Tiny),
            other => Err(AltosError::Parse(format!("unknown eeprom format: {}", other))),
        }
    }
}

/// A decoded log in either format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EepromLog {
    Full(FullLog),
    Tiny(TinyLog),
}

impl EepromLog {
    /// Decode raw eeprom bytes
    pub fn decode(format: EepromFormat, bytes: &[u8]) -> Result<Self> {
        match format {
            EepromFormat::Full => Ok(EepromLog::Full(FullLog::from_bytes(bytes))),
            EepromFormat::Tiny => Ok(EepromLog::Tiny(TinyLog::from_bytes(bytes)?)),
        }
    }

    pub fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        match self {
            EepromLog::Full(log) => log.provide_data(listener),
            EepromLog::Tiny(log) => log.provide_data(listener),
        }
    }
}
