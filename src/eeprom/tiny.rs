//! # Tiny Eeprom Log
//!
//! One 16-bit word per record, as logged by the smallest flight computers.
//!
//! - Word 0 is the flight number.
//! - A word with bit 15 set is a state change; the low 15 bits are the state.
//! - Any other word is a raw barometer sample.
//!
//! Ticks are not stored. The tick of record `j` is the sum, over the
//! records `1..j`, of a step for each barometer sample: 10 ticks until a
//! state at or past drogue deployment has been seen, 100 afterwards.

use tracing::debug;

use crate::error::{AltosError, Result};
use crate::fusion::DataListener;
use crate::telemetry::protocol::FlightState;
use crate::units::convert::barometer_to_pressure;

/// Erased flash reads back as all ones
pub const TINY_ERASED: u16 = 0xffff;

const STATE_FLAG: u16 = 0x8000;
const STATE_MASK: u16 = 0x7fff;

/// Ticks between samples before drogue deployment
pub const TINY_STEP_ASCENT: u32 = 10;

/// Ticks between samples from drogue deployment on
pub const TINY_STEP_DESCENT: u32 = 100;

/// One decoded tiny record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TinyRecord {
    Flight(u16),
    State(FlightState),
    /// Raw barometer count
    Sensor(u16),
}

impl TinyRecord {
    fn from_word(index: usize, word: u16) -> Self {
        if word & STATE_FLAG != 0 {
            TinyRecord::State(FlightState::from((word & STATE_MASK) as u8))
        } else if index == 0 {
            TinyRecord::Flight(word)
        } else {
            TinyRecord::Sensor(word)
        }
    }

    /// State word raw value, used for the step switch
    fn state_value(word: u16) -> Option<u16> {
        (word & STATE_FLAG != 0).then_some(word & STATE_MASK)
    }
}

/// A record with its reconstructed tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TinyEntry {
    pub index: usize,
    pub tick: u32,
    pub record: TinyRecord,
}

/// A tiny log, cut at the first erased word
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TinyLog {
    words: Vec<u16>,
}

impl TinyLog {
    pub fn from_words(words: &[u16]) -> Self {
        let end = words.iter().position(|&w| w == TINY_ERASED).unwrap_or(words.len());
        Self {
            words: words[..end].to_vec(),
        }
    }

    /// Little-endian words from raw eeprom bytes
    ///
    /// # Errors
    ///
    /// Returns error if the byte count is odd
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 2 != 0 {
            return Err(AltosError::InvalidLength {
                expected: bytes.len() + 1,
                actual: bytes.len(),
            });
        }
        let words: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self::from_words(&words))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<TinyRecord> {
        self.words.get(index).map(|&w| TinyRecord::from_word(index, w))
    }

    /// Tick of record `index`, rescanning every earlier record
    pub fn tick_at(&self, index: usize) -> u32 {
        let mut tick = 0;
        let mut step = TINY_STEP_ASCENT;
        for &word in self.words.iter().take(index).skip(1) {
            match TinyRecord::state_value(word) {
                Some(state) => {
                    if state >= FlightState::Drogue as u16 {
                        step = TINY_STEP_DESCENT;
                    }
                }
                None => tick += step,
            }
        }
        tick
    }

    /// Every record with its tick, accumulated incrementally
    pub fn records(&self) -> TinyRecords<'_> {
        TinyRecords {
            words: &self.words,
            index: 0,
            tick: 0,
            step: TINY_STEP_ASCENT,
        }
    }

    /// Replay the log into `listener`
    ///
    /// The flight marker starts a new flight. Barometer samples before boost
    /// supply the ground pressure.
    pub fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        for entry in self.records() {
            listener.cal_data().set_tick(entry.tick);
            listener.set_tick(entry.tick);

            match entry.record {
                TinyRecord::Flight(flight) => {
                    debug!("Tiny log flight {}", flight);
                    listener.cal_data().new_flight(flight);
                    listener.cal_data().set_tick(entry.tick);
                    listener.update_state(FlightState::Pad);
                }
                TinyRecord::State(state) => listener.update_state(state),
                TinyRecord::Sensor(count) => {
                    let pressure = barometer_to_pressure(count as f64);
                    let cal = listener.cal_data();
                    if !cal.in_flight() {
                        cal.set_ground_pressure(pressure);
                    }
                    listener.set_pressure(pressure);
                }
            }
        }
    }
}

/// Iterator over a [`TinyLog`]
#[derive(Debug, Clone)]
pub struct TinyRecords<'a> {
    words: &'a [u16],
    index: usize,
    tick: u32,
    step: u32,
}

impl Iterator for TinyRecords<'_> {
    type Item = TinyEntry;

    fn next(&mut self) -> Option<TinyEntry> {
        let index = self.index;
        let word = *self.words.get(index)?;
        let entry = TinyEntry {
            index,
            tick: self.tick,
            record: TinyRecord::from_word(index, word),
        };

        // This record's contribution applies from the next one on
        if index > 0 {
            match TinyRecord::state_value(word) {
                Some(state) => {
                    if state >= FlightState::Drogue as u16 {
                        self.step = TINY_STEP_DESCENT;
                    }
                }
                None => self.tick += self.step,
            }
        }
        self.index += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.words.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TinyRecords<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{CalibrationPhase, FlightRecorder};

    fn state_word(state: FlightState) -> u16 {
        STATE_FLAG | state as u16
    }

    /// Flight marker, `k` samples, drogue, then `after` samples
    fn flight(k: usize, after: usize) -> Vec<u16> {
        let mut words = vec![7];
        words.extend(std::iter::repeat(30000).take(k));
        words.push(state_word(FlightState::Drogue));
        words.extend(std::iter::repeat(28000).take(after));
        words
    }

    #[test]
    fn test_record_kinds() {
        let log = TinyLog::from_words(&[12, 30000, state_word(FlightState::Boost), 29000]);
        assert_eq!(log.record(0), Some(TinyRecord::Flight(12)));
        assert_eq!(log.record(1), Some(TinyRecord::Sensor(30000)));
        assert_eq!(log.record(2), Some(TinyRecord::State(FlightState::Boost)));
        assert_eq!(log.record(4), None);
    }

    #[test]
    fn test_log_ends_at_erased_word() {
        let log = TinyLog::from_words(&[1, 100, 200, TINY_ERASED, 300]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_from_bytes() {
        let log = TinyLog::from_bytes(&[0x05, 0x00, 0x30, 0x75, 0xff, 0xff]).unwrap();
        assert_eq!(log.record(0), Some(TinyRecord::Flight(5)));
        assert_eq!(log.record(1), Some(TinyRecord::Sensor(30000)));
        assert_eq!(log.len(), 2);

        assert!(TinyLog::from_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_tick_after_drogue() {
        let k = 25;
        let log = TinyLog::from_words(&flight(k, 40));
        let drogue = k + 1;

        for j in drogue + 1..log.len() {
            let after = (j - drogue - 1) as u32;
            assert_eq!(log.tick_at(j), 10 * k as u32 + 100 * after, "record {}", j);
        }
    }

    #[test]
    fn test_tick_before_drogue() {
        let log = TinyLog::from_words(&flight(10, 5));
        assert_eq!(log.tick_at(0), 0);
        assert_eq!(log.tick_at(1), 0);
        assert_eq!(log.tick_at(2), 10);
        assert_eq!(log.tick_at(11), 100);
        // the drogue record itself adds nothing
        assert_eq!(log.tick_at(12), 100);
        assert_eq!(log.tick_at(13), 200);
    }

    #[test]
    fn test_incremental_ticks_match_rescan() {
        let mut words = flight(17, 3);
        words.push(state_word(FlightState::Boost));
        words.extend([1, 2, 3]);
        words.push(state_word(FlightState::Main));
        words.extend([4, 5]);
        words.push(state_word(FlightState::Landed));
        words.push(6);
        let log = TinyLog::from_words(&words);

        let entries: Vec<TinyEntry> = log.records().collect();
        assert_eq!(entries.len(), log.len());
        for entry in entries {
            assert_eq!(entry.tick, log.tick_at(entry.index), "record {}", entry.index);
        }
    }

    #[test]
    fn test_state_below_drogue_keeps_step() {
        let words = [1, 100, state_word(FlightState::Coast), 100, 100];
        let log = TinyLog::from_words(&words);
        assert_eq!(log.tick_at(4), 20);
        assert_eq!(log.tick_at(5), 30);
    }

    #[test]
    fn test_provide_data() {
        let mut words = vec![3, 30000, 30000, state_word(FlightState::Boost), 28000];
        words.push(state_word(FlightState::Drogue));
        words.push(27000);
        let log = TinyLog::from_words(&words);

        let mut recorder = FlightRecorder::new();
        log.provide_data(&mut recorder);

        let cal = recorder.cal();
        assert_eq!(cal.flight(), Some(3));
        assert_eq!(cal.phase(), CalibrationPhase::InFlight);
        assert_eq!(cal.ground_pressure(), Some(barometer_to_pressure(30000.0)));

        let ticks: Vec<u32> = recorder.samples().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![0, 10, 20, 30]);
        assert_eq!(recorder.sample_at(20).unwrap().state, Some(FlightState::Boost));
        assert!(recorder.sample_at(20).unwrap().height.unwrap() > 0.0);
    }
}
