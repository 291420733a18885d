//! # Telemetry Decoder
//!
//! Unwraps receiver framings and hands the packet to the record decoders.

use tracing::{debug, warn};

use super::checksum::{crc16, sum8};
use super::protocol::*;
use super::records::TelemetryRecord;
use crate::error::{AltosError, Result};
use crate::fusion::DataListener;

/// Decode a bare 32-byte packet
pub fn decode_packet(packet: &[u8]) -> Result<TelemetryRecord> {
    TelemetryRecord::decode(packet)
}

/// Parse a run of hex digit pairs, ignoring whitespace
fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(AltosError::Malformed(format!(
            "Odd number of hex digits: {}",
            digits.len()
        )));
    }

    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| {
                    AltosError::Malformed(format!("Invalid hex: {}", String::from_utf8_lossy(pair)))
                })
        })
        .collect()
}

/// Decode one receiver `TELEM` line
///
/// # Arguments
///
/// * `line` - `TELEM` followed by the hex-encoded frame
///
/// # Returns
///
/// * `Result<TelemetryRecord>` - Decoded record carrying rssi and lqi
///
/// # Errors
///
/// Returns error if:
/// - The line has no `TELEM` prefix or bad hex
/// - The length byte disagrees with the frame
/// - The additive checksum fails
/// - The receiver flagged a radio CRC failure
/// - The packet itself does not decode
pub fn decode_telem_line(line: &str) -> Result<TelemetryRecord> {
    let hex = line
        .trim()
        .strip_prefix(TELEM_LINE_PREFIX)
        .ok_or_else(|| AltosError::Malformed(format!("Not a telemetry line: {}", line.trim())))?;
    let bytes = parse_hex(hex)?;

    if bytes.len() < TELEM_LINE_OVERHEAD {
        return Err(AltosError::InvalidLength {
            expected: TELEMETRY_PACKET_LEN + TELEM_LINE_OVERHEAD,
            actual: bytes.len(),
        });
    }

    let n = bytes.len();
    let declared = bytes[0] as usize;
    if declared != n - 2 {
        return Err(AltosError::InvalidLength {
            expected: declared + 2,
            actual: n,
        });
    }

    let computed = sum8(&bytes[1..n - 1]);
    if computed != bytes[n - 1] {
        return Err(AltosError::Checksum {
            expected: computed,
            actual: bytes[n - 1],
        });
    }

    let rssi = (bytes[n - 3] as i8) as i32 / 2 - 74;
    let status = bytes[n - 2];
    if status & STATUS_CRC_OK == 0 {
        return Err(AltosError::Crc { rssi });
    }

    let mut record = TelemetryRecord::decode(&bytes[1..n - 3])?;
    record.rssi = Some(rssi);
    record.lqi = Some(status & STATUS_LQI_MASK);
    Ok(record)
}

/// Decode a raw radio frame: 32-byte packet plus big-endian CRC-16
pub fn decode_raw_frame(frame: &[u8]) -> Result<TelemetryRecord> {
    if frame.len() != RAW_FRAME_LEN {
        return Err(AltosError::InvalidLength {
            expected: RAW_FRAME_LEN,
            actual: frame.len(),
        });
    }

    let (packet, trailer) = frame.split_at(TELEMETRY_PACKET_LEN);
    let received = u16::from_be_bytes([trailer[0], trailer[1]]);
    let computed = crc16(packet);
    if computed != received {
        return Err(AltosError::Malformed(format!(
            "CRC-16 mismatch: computed 0x{:04X}, frame 0x{:04X}",
            computed, received
        )));
    }

    TelemetryRecord::decode(packet)
}

/// Outcome of decoding a stream of lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub decoded: usize,
    pub rejected: usize,
    /// Lines that were not telemetry at all (receiver chatter)
    pub ignored: usize,
}

/// Decode every `TELEM` line and feed the records to `listener`
///
/// Rejected records are logged and skipped; the stream always continues.
pub fn decode_lines<'a, I, L>(lines: I, listener: &mut L) -> DecodeStats
where
    I: IntoIterator<Item = &'a str>,
    L: DataListener + ?Sized,
{
    let mut stats = DecodeStats::default();

    for (number, line) in lines.into_iter().enumerate() {
        if !line.trim_start().starts_with(TELEM_LINE_PREFIX) {
            stats.ignored += 1;
            continue;
        }

        match decode_telem_line(line) {
            Ok(record) => {
                debug!("Line {}: {:?} from serial {}", number + 1, record.record_type, record.serial);
                record.provide_data(listener);
                stats.decoded += 1;
            }
            Err(e) => {
                warn!("Line {}: rejected: {}", number + 1, e);
                stats.rejected += 1;
            }
        }
    }

    stats
}
