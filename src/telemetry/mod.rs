//! # Telemetry Module
//!
//! Decodes the 32-byte radio telemetry packet family.
//!
//! This module handles:
//! - Receiver `TELEM` lines and raw CRC-16 radio frames
//! - Dispatching each packet to its typed record by type byte
//! - Pushing decoded records into a [`crate::fusion::DataListener`]
//! - Building packets and framings for replay and tests

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod protocol;
pub mod records;

pub use decoder::{decode_lines, decode_packet, decode_raw_frame, decode_telem_line, DecodeStats};
pub use protocol::{DeviceType, FlightState, RecordType};
pub use records::{RecordBody, TelemetryRecord};
