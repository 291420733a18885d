//! # Packet Checksums
//!
//! Two integrity checks protect telemetry:
//!
//! - The additive line checksum appended by the receiver to each TeleDongle
//!   line (and used, in its negated form, by full eeprom records).
//! - The CRC-16 trailing raw radio frames.
//!
//! **CRC polynomial**: 0x8005 (x^16 + x^15 + x^2 + 1), MSB first
//! **Initial Value**: 0xFFFF

use super::protocol::CHECKSUM_SEED;

/// CRC-16 polynomial used by the radio
const CRC16_POLY: u16 = 0x8005;

/// CRC-16 initial register value
const CRC16_INIT: u16 = 0xffff;

/// Precomputed CRC-16 lookup table for fast calculation
const CRC16_TABLE: [u16; 256] = generate_crc16_table();

/// Generate CRC-16 lookup table at compile time
const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate the radio CRC-16 using the lookup table
///
/// # Examples
///
/// ```
/// use altos_decode::telemetry::checksum::crc16;
///
/// let packet = [0u8; 32];
/// let crc = crc16(&packet);
/// assert_ne!(crc, 0);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc = (crc << 8) ^ CRC16_TABLE[(((crc >> 8) as u8) ^ byte) as usize];
    }

    crc
}

/// Calculate CRC-16 bit by bit (slow, for verification)
#[cfg(test)]
fn crc16_slow(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= (byte as u16) << 8;

        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// Additive checksum of `data`, seeded with 0x5a
pub fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(CHECKSUM_SEED, |acc, &b| acc.wrapping_add(b))
}

/// Checksum byte that makes a record's seeded sum come out to zero
pub fn negated_sum8(data: &[u8]) -> u8 {
    sum8(data).wrapping_neg()
}
