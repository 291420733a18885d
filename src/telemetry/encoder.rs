//! # Telemetry Encoder
//!
//! Builds telemetry packets and wraps them in the receiver framings.
//! Used to replay synthetic flights and to exercise the decoder.

use bytes::BufMut;

use super::checksum::{crc16, sum8};
use super::protocol::*;

/// Builder for a 32-byte telemetry packet
///
/// # Examples
///
/// ```
/// use altos_decode::telemetry::encoder::PacketBuilder;
/// use altos_decode::telemetry::protocol::RecordType;
///
/// let packet = PacketBuilder::new(1234, 100, RecordType::Satellite)
///     .u8(5, 1)
///     .build();
/// assert_eq!(packet[4], 0x06);
/// ```
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    data: [u8; TELEMETRY_PACKET_LEN],
}

impl PacketBuilder {
    pub fn new(serial: u16, tick: u16, record_type: RecordType) -> Self {
        Self::raw(serial, tick, record_type as u8)
    }

    /// Builder with an arbitrary type byte
    pub fn raw(serial: u16, tick: u16, type_byte: u8) -> Self {
        Self {
            data: [0u8; TELEMETRY_PACKET_LEN],
        }
        .u16(0, serial)
        .u16(2, tick)
        .u8(4, type_byte)
    }

    fn slot(&mut self, offset: usize, width: usize) -> &mut [u8] {
        &mut self.data[offset..offset + width]
    }

    pub fn u8(mut self, offset: usize, value: u8) -> Self {
        self.data[offset] = value;
        self
    }

    pub fn i8(self, offset: usize, value: i8) -> Self {
        self.u8(offset, value as u8)
    }

    pub fn u16(mut self, offset: usize, value: u16) -> Self {
        self.slot(offset, 2).put_u16_le(value);
        self
    }

    pub fn i16(mut self, offset: usize, value: i16) -> Self {
        self.slot(offset, 2).put_i16_le(value);
        self
    }

    pub fn u32(mut self, offset: usize, value: u32) -> Self {
        self.slot(offset, 4).put_u32_le(value);
        self
    }

    pub fn i32(mut self, offset: usize, value: i32) -> Self {
        self.slot(offset, 4).put_i32_le(value);
        self
    }

    pub fn bytes(mut self, offset: usize, value: &[u8]) -> Self {
        self.slot(offset, value.len()).put_slice(value);
        self
    }

    pub fn build(self) -> [u8; TELEMETRY_PACKET_LEN] {
        self.data
    }
}

/// Encode received signal strength the way the receiver reports it
///
/// Inverse of `raw / 2 - 74` for in-range values.
pub fn encode_rssi(rssi: i32) -> u8 {
    ((rssi + 74) * 2).clamp(i8::MIN as i32, i8::MAX as i32) as i8 as u8
}

/// Wrap a packet in a receiver `TELEM` line
///
/// Layout: length, packet, rssi, status, checksum. The checksum covers
/// everything after the length byte.
pub fn encode_telem_line(packet: &[u8; TELEMETRY_PACKET_LEN], rssi: i32, status: u8) -> String {
    let mut frame = Vec::with_capacity(TELEMETRY_PACKET_LEN + TELEM_LINE_OVERHEAD);
    frame.put_u8((TELEMETRY_PACKET_LEN + 2) as u8);
    frame.put_slice(packet);
    frame.put_u8(encode_rssi(rssi));
    frame.put_u8(status);
    let checksum = sum8(&frame[1..]);
    frame.put_u8(checksum);

    let hex: String = frame.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{} {}", TELEM_LINE_PREFIX, hex)
}

/// Append the big-endian CRC-16 to a packet
pub fn encode_raw_frame(packet: &[u8; TELEMETRY_PACKET_LEN]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(RAW_FRAME_LEN);
    frame.put_slice(packet);
    frame.put_u16(crc16(packet));
    frame
}
