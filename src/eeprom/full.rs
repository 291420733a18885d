//! # Full Eeprom Log
//!
//! Eight-byte records logged by the first generation TeleMetrum:
//!
//! ```text
//! cmd u8 | csum u8 | tick u16 | a u16 | b u16
//! ```
//!
//! A record is valid when the seeded byte sum of all eight bytes is zero.

use bytes::{Buf, BufMut};
use tracing::{debug, warn};

use crate::error::{AltosError, Result};
use crate::fusion::DataListener;
use crate::telemetry::checksum::{negated_sum8, sum8};
use crate::telemetry::protocol::FlightState;
use crate::units::convert::{
    barometer_to_pressure, cc_battery_to_voltage, cc_igniter_to_voltage, thermometer_to_temperature,
};

/// Bytes per record
pub const FULL_RECORD_LEN: usize = 8;

const CMD_FLIGHT: u8 = b'F';
const CMD_SENSOR: u8 = b'A';
const CMD_TEMP_VOLT: u8 = b'T';
const CMD_DEPLOY: u8 = b'D';
const CMD_STATE: u8 = b'S';

/// Record payload by command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullCommand {
    Flight { ground_accel: u16, flight: u16 },
    Sensor { accel: u16, pres: u16 },
    TempVolt { temp: u16, v_batt: u16 },
    Deploy { drogue: u16, main: u16 },
    State { state: FlightState, reason: u16 },
}

impl FullCommand {
    fn code(&self) -> u8 {
        match self {
            FullCommand::Flight { .. } => CMD_FLIGHT,
            FullCommand::Sensor { .. } => CMD_SENSOR,
            FullCommand::TempVolt { .. } => CMD_TEMP_VOLT,
            FullCommand::Deploy { .. } => CMD_DEPLOY,
            FullCommand::State { .. } => CMD_STATE,
        }
    }

    fn words(&self) -> (u16, u16) {
        match *self {
            FullCommand::Flight { ground_accel, flight } => (ground_accel, flight),
            FullCommand::Sensor { accel, pres } => (accel, pres),
            FullCommand::TempVolt { temp, v_batt } => (temp, v_batt),
            FullCommand::Deploy { drogue, main } => (drogue, main),
            FullCommand::State { state, reason } => (state as u16, reason),
        }
    }
}

/// One validated record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullRecord {
    pub tick: u16,
    pub command: FullCommand,
}

impl FullRecord {
    /// # Errors
    ///
    /// Returns error if:
    /// - The record is not eight bytes
    /// - The checksum does not cancel
    /// - The command byte is unknown
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != FULL_RECORD_LEN {
            return Err(AltosError::InvalidLength {
                expected: FULL_RECORD_LEN,
                actual: bytes.len(),
            });
        }

        let residue = sum8(bytes);
        if residue != 0 {
            let mut zeroed = [0u8; FULL_RECORD_LEN];
            zeroed.copy_from_slice(bytes);
            zeroed[1] = 0;
            return Err(AltosError::Checksum {
                expected: negated_sum8(&zeroed),
                actual: bytes[1],
            });
        }

        let mut buf = bytes;
        let cmd = buf.get_u8();
        buf.advance(1);
        let tick = buf.get_u16_le();
        let a = buf.get_u16_le();
        let b = buf.get_u16_le();

        let command = match cmd {
            CMD_FLIGHT => FullCommand::Flight {
                ground_accel: a,
                flight: b,
            },
            CMD_SENSOR => FullCommand::Sensor { accel: a, pres: b },
            CMD_TEMP_VOLT => FullCommand::TempVolt { temp: a, v_batt: b },
            CMD_DEPLOY => FullCommand::Deploy { drogue: a, main: b },
            CMD_STATE => FullCommand::State {
                state: FlightState::from(a as u8),
                reason: b,
            },
            other => return Err(AltosError::UnknownRecordType(other)),
        };

        Ok(Self { tick, command })
    }

    pub fn encode(&self) -> [u8; FULL_RECORD_LEN] {
        let (a, b) = self.command.words();
        let mut record = [0u8; FULL_RECORD_LEN];
        {
            let mut buf = &mut record[..];
            buf.put_u8(self.command.code());
            buf.put_u8(0);
            buf.put_u16_le(self.tick);
            buf.put_u16_le(a);
            buf.put_u16_le(b);
        }
        record[1] = negated_sum8(&record);
        record
    }

    pub fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        if let FullCommand::Flight { ground_accel, flight } = self.command {
            let cal = listener.cal_data();
            cal.new_flight(flight);
            cal.set_ground_accel(ground_accel as f64);
        }
        let tick = listener.cal_data().extend_tick(self.tick);
        listener.set_tick(tick);

        match self.command {
            FullCommand::Flight { .. } => {}
            FullCommand::Sensor { accel, pres } => {
                let pressure = barometer_to_pressure(pres as f64);
                let cal = listener.cal_data();
                if !cal.in_flight() {
                    cal.set_ground_pressure(pressure);
                }
                if let Some(acceleration) = listener.cal_data().acceleration(accel as f64) {
                    listener.set_acceleration(acceleration);
                }
                listener.set_pressure(pressure);
            }
            FullCommand::TempVolt { temp, v_batt } => {
                listener.set_temperature(thermometer_to_temperature(temp as f64));
                listener.set_battery_voltage(cc_battery_to_voltage(v_batt as f64));
            }
            FullCommand::Deploy { drogue, main } => {
                listener.set_apogee_voltage(cc_igniter_to_voltage(drogue as f64));
                listener.set_main_voltage(cc_igniter_to_voltage(main as f64));
            }
            FullCommand::State { state, .. } => listener.update_state(state),
        }
    }
}

/// A full log, cut at the first erased record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullLog {
    pub records: Vec<FullRecord>,
    /// Records dropped for bad checksum or unknown command
    pub rejected: usize,
}

impl FullLog {
    /// Decode every record in `bytes`; a trailing partial record is ignored
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut log = FullLog::default();

        for (index, chunk) in bytes.chunks_exact(FULL_RECORD_LEN).enumerate() {
            if chunk.iter().all(|&b| b == 0xff) {
                debug!("Full log ends at record {}", index);
                break;
            }
            match FullRecord::decode(chunk) {
                Ok(record) => log.records.push(record),
                Err(e) => {
                    warn!("Full log record {} rejected: {}", index, e);
                    log.rejected += 1;
                }
            }
        }

        log
    }

    pub fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        for record in &self.records {
            record.provide_data(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{CalibrationPhase, FlightRecorder};

    fn record(tick: u16, command: FullCommand) -> [u8; FULL_RECORD_LEN] {
        FullRecord { tick, command }.encode()
    }

    #[test]
    fn test_encoded_record_checksums_to_zero() {
        let bytes = record(1234, FullCommand::Sensor { accel: 1500, pres: 30000 });
        assert_eq!(bytes[0], b'A');
        assert_eq!(sum8(&bytes), 0);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 1234);
    }

    #[test]
    fn test_decode_record() {
        let bytes = record(
            100,
            FullCommand::State {
                state: FlightState::Coast,
                reason: 0,
            },
        );
        let decoded = FullRecord::decode(&bytes).unwrap();
        assert_eq!(decoded.tick, 100);
        assert_eq!(
            decoded.command,
            FullCommand::State {
                state: FlightState::Coast,
                reason: 0
            }
        );
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut bytes = record(100, FullCommand::TempVolt { temp: 20000, v_batt: 24000 });
        bytes[5] ^= 0x10;
        assert!(matches!(FullRecord::decode(&bytes), Err(AltosError::Checksum { .. })));
    }

    #[test]
    fn test_unknown_command_rejected() {
        let mut bytes = [b'Z', 0, 1, 0, 2, 0, 3, 0];
        bytes[1] = negated_sum8(&bytes);
        assert!(matches!(FullRecord::decode(&bytes), Err(AltosError::UnknownRecordType(b'Z'))));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            FullRecord::decode(&[0u8; 7]),
            Err(AltosError::InvalidLength { expected: 8, actual: 7 })
        ));
    }

    #[test]
    fn test_log_skips_bad_and_stops_at_erased() {
        let mut bytes = Vec::new();
        bytes.extend(record(0, FullCommand::Flight { ground_accel: 1000, flight: 4 }));
        let mut bad = record(10, FullCommand::Sensor { accel: 1000, pres: 30000 });
        bad[6] ^= 0xff;
        bytes.extend(bad);
        bytes.extend(record(20, FullCommand::Sensor { accel: 1000, pres: 30000 }));
        bytes.extend([0xff; FULL_RECORD_LEN]);
        bytes.extend(record(30, FullCommand::Sensor { accel: 1000, pres: 30000 }));

        let log = FullLog::from_bytes(&bytes);
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.rejected, 1);
    }

    #[test]
    fn test_provide_data_flight() {
        let records = [
            record(0, FullCommand::Flight { ground_accel: 1000, flight: 9 }),
            record(2, FullCommand::Sensor { accel: 1000, pres: 30000 }),
            record(2, FullCommand::TempVolt { temp: 20000, v_batt: 24000 }),
            record(3, FullCommand::Deploy { drogue: 10000, main: 11000 }),
            record(
                50,
                FullCommand::State {
                    state: FlightState::Boost,
                    reason: 0,
                },
            ),
            record(52, FullCommand::Sensor { accel: 736, pres: 29000 }),
        ];
        let bytes: Vec<u8> = records.concat();
        let log = FullLog::from_bytes(&bytes);

        let mut recorder = FlightRecorder::new();
        log.provide_data(&mut recorder);

        let cal = recorder.cal();
        assert_eq!(cal.flight(), Some(9));
        assert_eq!(cal.ground_accel(), Some(1000.0));
        assert_eq!(cal.ground_pressure(), Some(barometer_to_pressure(30000.0)));
        assert_eq!(cal.phase(), CalibrationPhase::InFlight);

        let pad = recorder.sample_at(2).unwrap();
        assert_eq!(pad.acceleration, Some(0.0));
        assert!(pad.temperature.is_some());
        assert!(pad.battery_voltage.is_some());

        let boost = recorder.sample_at(52).unwrap();
        // 264 counts below ground at the nominal scale is just under 1g
        assert!(boost.acceleration.unwrap() > 9.0);
        assert!(boost.height.unwrap() > 0.0);
    }

    #[test]
    fn test_new_flight_marker_resets_ground() {
        let records = [
            record(0, FullCommand::Flight { ground_accel: 1000, flight: 1 }),
            record(1, FullCommand::Sensor { accel: 1000, pres: 30000 }),
            record(0, FullCommand::Flight { ground_accel: 1100, flight: 2 }),
            record(1, FullCommand::Sensor { accel: 1100, pres: 31000 }),
        ];
        let log = FullLog::from_bytes(&records.concat());
        let mut recorder = FlightRecorder::new();
        log.provide_data(&mut recorder);

        assert_eq!(recorder.cal().flight(), Some(2));
        assert_eq!(recorder.cal().ground_accel(), Some(1100.0));
        assert_eq!(recorder.cal().ground_pressure(), Some(barometer_to_pressure(31000.0)));
    }
}
