//! # Telemetry Protocol Constants and Types
//!
//! Core definitions shared by the telemetry and eeprom decoders.

use bytes::Buf;
use serde::Serialize;
use std::fmt;

use crate::error::{AltosError, Result};

/// Telemetry packet size, header included
pub const TELEMETRY_PACKET_LEN: usize = 32;

/// Extra bytes around a packet on a TeleDongle line: length, rssi, status, checksum
pub const TELEM_LINE_OVERHEAD: usize = 4;

/// Raw radio frame size: packet plus CRC-16 trailer
pub const RAW_FRAME_LEN: usize = TELEMETRY_PACKET_LEN + 2;

/// Prefix of a TeleDongle telemetry line
pub const TELEM_LINE_PREFIX: &str = "TELEM";

/// Status byte bit set when the radio CRC matched
pub const STATUS_CRC_OK: u8 = 0x80;

/// Status byte bits carrying the link quality indicator
pub const STATUS_LQI_MASK: u8 = 0x7f;

/// Seed of the additive line checksum
pub const CHECKSUM_SEED: u8 = 0x5a;

/// Maximum number of GPS satellites reported in one packet
pub const MAX_GPS_TRACKING: usize = 12;

/// Maximum number of companion data words in one packet
pub const MAX_COMPANION_CHANNELS: usize = 12;

/// Callsign field width
pub const MAX_CALLSIGN: usize = 8;

/// Firmware version field width
pub const MAX_VERSION: usize = 8;

/// Location flags
pub const GPS_NUM_SAT_MASK: u8 = 0x0f;
pub const GPS_VALID: u8 = 0x10;
pub const GPS_RUNNING: u8 = 0x20;
pub const GPS_DATE_VALID: u8 = 0x40;
pub const GPS_COURSE_VALID: u8 = 0x80;

/// Location mode bit: altitude_high carries bits 16..23 of the altitude
pub const GPS_MODE_ALTITUDE_24: u8 = 0x01;

/// Telemetry packet discriminant at offset 4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    TeleMetrumSensor = 0x01,
    TeleMiniSensor = 0x02,
    TeleNanoSensor = 0x03,
    Configuration = 0x04,
    Location = 0x05,
    Satellite = 0x06,
    Companion = 0x07,
    MegaSensor = 0x08,
    MegaData = 0x09,
    MetrumSensor = 0x0a,
    MetrumData = 0x0b,
    Mini2 = 0x10,
    Mini3 = 0x11,
}

impl TryFrom<u8> for RecordType {
    type Error = AltosError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0x01 => Self::TeleMetrumSensor,
            0x02 => Self::TeleMiniSensor,
            0x03 => Self::TeleNanoSensor,
            0x04 => Self::Configuration,
            0x05 => Self::Location,
            0x06 => Self::Satellite,
            0x07 => Self::Companion,
            0x08 => Self::MegaSensor,
            0x09 => Self::MegaData,
            0x0a => Self::MetrumSensor,
            0x0b => Self::MetrumData,
            0x10 => Self::Mini2,
            0x11 => Self::Mini3,
            other => return Err(AltosError::UnknownRecordType(other)),
        })
    }
}

/// Flight computer state machine, as reported on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FlightState {
    Startup = 0,
    Idle = 1,
    Pad = 2,
    Boost = 3,
    Fast = 4,
    Coast = 5,
    Drogue = 6,
    Main = 7,
    Landed = 8,
    Invalid = 9,
    Stateless = 10,
}

impl From<u8> for FlightState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Startup,
            1 => Self::Idle,
            2 => Self::Pad,
            3 => Self::Boost,
            4 => Self::Fast,
            5 => Self::Coast,
            6 => Self::Drogue,
            7 => Self::Main,
            8 => Self::Landed,
            10 => Self::Stateless,
            _ => Self::Invalid,
        }
    }
}

impl FlightState {
    /// True once the vehicle has left the pad
    pub fn is_flying(self) -> bool {
        self >= Self::Boost && self <= Self::Main
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Idle => "idle",
            Self::Pad => "pad",
            Self::Boost => "boost",
            Self::Fast => "fast",
            Self::Coast => "coast",
            Self::Drogue => "drogue",
            Self::Main => "main",
            Self::Landed => "landed",
            Self::Invalid => "invalid",
            Self::Stateless => "stateless",
        }
    }
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Product id of the transmitting device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceType {
    TeleMetrum,
    TeleMega,
    TeleGps,
    EasyMini,
    TeleMini,
    EasyMega,
    Unknown(u8),
}

impl From<u8> for DeviceType {
    fn from(value: u8) -> Self {
        match value {
            0x0b => Self::TeleMetrum,
            0x23 => Self::TeleMega,
            0x25 => Self::TeleGps,
            0x26 => Self::EasyMini,
            0x27 => Self::TeleMini,
            0x28 => Self::EasyMega,
            other => Self::Unknown(other),
        }
    }
}

impl DeviceType {
    pub fn product_id(self) -> u8 {
        match self {
            Self::TeleMetrum => 0x0b,
            Self::TeleMega => 0x23,
            Self::TeleGps => 0x25,
            Self::EasyMini => 0x26,
            Self::TeleMini => 0x27,
            Self::EasyMega => 0x28,
            Self::Unknown(id) => id,
        }
    }

    /// Match a product name such as `TeleMetrum-v2.0`
    pub fn from_product_name(name: &str) -> Option<Self> {
        const PRODUCTS: [(&str, DeviceType); 6] = [
            ("TeleMetrum", DeviceType::TeleMetrum),
            ("TeleMega", DeviceType::TeleMega),
            ("TeleGPS", DeviceType::TeleGps),
            ("EasyMini", DeviceType::EasyMini),
            ("TeleMini", DeviceType::TeleMini),
            ("EasyMega", DeviceType::EasyMega),
        ];
        PRODUCTS
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|&(_, device)| device)
    }

    /// Tracker-only devices have no pyro channels
    pub fn has_pyro(self) -> bool {
        !matches!(self, Self::TeleGps)
    }
}

/// Little-endian field access at fixed offsets within a validated record
///
/// The record length is checked once when the reader is built, so every
/// accessor below an offset within that length is infallible.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    data: &'a [u8],
}

impl<'a> FieldReader<'a> {
    /// Wrap `data`, rejecting anything not exactly `len` bytes long
    pub fn new(data: &'a [u8], len: usize) -> Result<Self> {
        if data.len() != len {
            return Err(AltosError::InvalidLength {
                expected: len,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn field(&self, offset: usize, width: usize) -> &'a [u8] {
        &self.data[offset..offset + width]
    }

    pub fn uint8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn int8(&self, offset: usize) -> i8 {
        self.data[offset] as i8
    }

    pub fn uint16(&self, offset: usize) -> u16 {
        self.field(offset, 2).get_u16_le()
    }

    pub fn int16(&self, offset: usize) -> i16 {
        self.field(offset, 2).get_i16_le()
    }

    pub fn uint32(&self, offset: usize) -> u32 {
        self.field(offset, 4).get_u32_le()
    }

    pub fn int32(&self, offset: usize) -> i32 {
        self.field(offset, 4).get_i32_le()
    }

    /// Fixed-width text field, cut at the first NUL and stripped of padding spaces
    pub fn string(&self, offset: usize, width: usize) -> String {
        let raw = self.field(offset, width);
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).trim_end_matches(' ').to_string()
    }
}
