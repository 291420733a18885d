//! # Error Types
//!
//! Custom error types for AltOS Decode using `thiserror`.
//!
//! Every error here is scoped to a single record, sensor read or flight.
//! None of them is meant to abort a whole stream.

use thiserror::Error;

/// Main error type for AltOS Decode
#[derive(Debug, Error)]
pub enum AltosError {
    /// Record length does not match its format
    #[error("Invalid record length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Discriminant not known to any decoder
    #[error("Unknown record type: 0x{0:02X}")]
    UnknownRecordType(u8),

    /// Additive checksum mismatch
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Checksum { expected: u8, actual: u8 },

    /// Radio CRC failure reported by the receiver or computed on the frame
    #[error("CRC error (rssi {rssi} dBm)")]
    Crc { rssi: i32 },

    /// Any other structural problem with a record
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// Link did not answer in time
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Text reply did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Device type has no decoder for the requested operation
    #[error("Unsupported product: {0}")]
    UnsupportedProduct(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial device could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AltosError {
    /// True for errors that reject a single record as corrupt.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            AltosError::InvalidLength { .. }
                | AltosError::UnknownRecordType(_)
                | AltosError::Checksum { .. }
                | AltosError::Crc { .. }
                | AltosError::Malformed(_)
        )
    }
}

/// Result type alias for AltOS Decode
pub type Result<T> = std::result::Result<T, AltosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_grouping() {
        assert!(AltosError::Crc { rssi: -80 }.is_malformed());
        assert!(AltosError::UnknownRecordType(0x42).is_malformed());
        assert!(AltosError::InvalidLength { expected: 32, actual: 31 }.is_malformed());
        assert!(!AltosError::Timeout("reply".to_string()).is_malformed());
        assert!(!AltosError::UnsupportedProduct("TeleDongle".to_string()).is_malformed());
    }

    #[test]
    fn test_error_messages() {
        let err = AltosError::Checksum { expected: 0x12, actual: 0x34 };
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0x12, got 0x34");

        let err = AltosError::UnknownRecordType(0x7f);
        assert_eq!(err.to_string(), "Unknown record type: 0x7F");
    }
}
