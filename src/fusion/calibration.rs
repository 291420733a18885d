//! # Calibration Module
//!
//! Per-flight calibration state rebuilt from the record stream.
//!
//! ## Ground Baseline
//!
//! The first ground pressure and ground acceleration seen for a flight
//! become the zero reference for altitude and acceleration. Later records
//! repeat those values; they never replace the captured ones. Only a new
//! flight marker clears them.
//!
//! ## Accelerometer Curve
//!
//! Boards that ship calibrated report the accelerometer reading at +1g and
//! -1g. With both points known the two-point curve is used:
//!
//! `acceleration = (ground - raw) / ((minus_g - plus_g) / 2 / g)`
//!
//! Boards that never calibrate fall back to a nominal scale relative to the
//! ground reading for the whole flight.
//!
//! ## Usage
//!
//! ```
//! use altos_decode::fusion::{CalData, CalibrationPhase};
//!
//! let mut cal = CalData::new();
//! assert_eq!(cal.phase(), CalibrationPhase::AwaitingGround);
//!
//! cal.set_ground_pressure(101325.0);
//! cal.set_ground_accel(1000.0);
//! assert_eq!(cal.phase(), CalibrationPhase::GroundCaptured);
//!
//! cal.set_accel_plus_minus(1000.0, 3000.0);
//! assert_eq!(cal.phase(), CalibrationPhase::Calibrated);
//! assert!(cal.acceleration(1000.0).unwrap().abs() < 1e-9);
//! ```

use serde::Serialize;

use crate::telemetry::protocol::{DeviceType, FlightState};
use crate::units::convert::{acceleration_from_sensor, pressure_to_altitude};

/// Pad orientation value for a board mounted antenna down
pub const PAD_ORIENTATION_ANTENNA_DOWN: u8 = 1;

/// Backward tick jump beyond which a 16-bit tick is taken to have wrapped
const TICK_WRAP_SLOP: u32 = 1000;

/// Where a flight's calibration has got to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalibrationPhase {
    /// Nothing known about the pad yet
    AwaitingGround,
    /// Ground baseline captured; acceleration uses the ground-relative estimate
    GroundCaptured,
    /// Ground baseline and both ±1g points known
    Calibrated,
    /// Boost seen
    InFlight,
}

/// Calibration and identity state for one flight
#[derive(Debug, Clone, Default)]
pub struct CalData {
    ground_pressure: Option<f64>,
    ground_accel: Option<f64>,
    accel_plus_g: Option<f64>,
    accel_minus_g: Option<f64>,
    gps_ground_altitude: Option<f64>,
    pad_orientation: Option<u8>,
    accel_inverted: bool,

    flight: Option<u16>,
    serial: Option<u16>,
    config_version: Option<(u8, u8)>,
    callsign: Option<String>,
    firmware_version: Option<String>,
    device_type: Option<DeviceType>,
    apogee_delay: Option<f64>,
    main_deploy: Option<f64>,

    state: Option<FlightState>,
    boost_tick: Option<u32>,
    tick: Option<u32>,
}

impl CalData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new flight
    ///
    /// Clears the ground baseline, accelerometer points, flight state and tick
    /// history. Device identity (serial, callsign, firmware, device type,
    /// configuration, pad orientation) carries over.
    pub fn new_flight(&mut self, flight: u16) {
        self.ground_pressure = None;
        self.ground_accel = None;
        self.accel_plus_g = None;
        self.accel_minus_g = None;
        self.gps_ground_altitude = None;
        self.state = None;
        self.boost_tick = None;
        self.tick = None;
        self.flight = Some(flight);
    }

    /// Current phase, derived from what has been captured so far
    pub fn phase(&self) -> CalibrationPhase {
        if self.boost_tick.is_some() || self.state.is_some_and(FlightState::is_flying) {
            CalibrationPhase::InFlight
        } else if self.ground_pressure.is_none() && self.ground_accel.is_none() {
            CalibrationPhase::AwaitingGround
        } else if self.is_accel_calibrated() {
            CalibrationPhase::Calibrated
        } else {
            CalibrationPhase::GroundCaptured
        }
    }

    /// True once boost has been seen this flight
    pub fn in_flight(&self) -> bool {
        self.phase() == CalibrationPhase::InFlight
    }

    /// Capture ground pressure (Pa). Returns false if already captured.
    pub fn set_ground_pressure(&mut self, pressure: f64) -> bool {
        if self.ground_pressure.is_some() {
            return false;
        }
        self.ground_pressure = Some(pressure);
        true
    }

    /// Capture ground accelerometer reading (raw counts). Returns false if already captured.
    pub fn set_ground_accel(&mut self, accel: f64) -> bool {
        if self.ground_accel.is_some() {
            return false;
        }
        self.ground_accel = Some(accel);
        true
    }

    /// Record the accelerometer readings at +1g and -1g
    ///
    /// Identical points carry no scale and are ignored.
    pub fn set_accel_plus_minus(&mut self, plus_g: f64, minus_g: f64) {
        if plus_g == minus_g {
            return;
        }
        self.accel_plus_g = Some(plus_g);
        self.accel_minus_g = Some(minus_g);
    }

    /// Capture the GPS altitude on the pad (m). Returns false if already captured.
    pub fn set_gps_ground_altitude(&mut self, altitude: f64) -> bool {
        if self.gps_ground_altitude.is_some() {
            return false;
        }
        self.gps_ground_altitude = Some(altitude);
        true
    }

    pub fn set_pad_orientation(&mut self, orientation: u8) {
        self.pad_orientation = Some(orientation);
        self.accel_inverted = orientation == PAD_ORIENTATION_ANTENNA_DOWN;
    }

    pub fn set_accel_inverted(&mut self, inverted: bool) {
        self.accel_inverted = inverted;
    }

    pub fn set_flight(&mut self, flight: u16) {
        self.flight = Some(flight);
    }

    pub fn set_serial(&mut self, serial: u16) {
        self.serial = Some(serial);
    }

    pub fn set_config_version(&mut self, major: u8, minor: u8) {
        self.config_version = Some((major, minor));
    }

    pub fn set_callsign(&mut self, callsign: &str) {
        self.callsign = Some(callsign.to_string());
    }

    pub fn set_firmware_version(&mut self, version: &str) {
        self.firmware_version = Some(version.to_string());
    }

    pub fn set_device_type(&mut self, device: DeviceType) {
        self.device_type = Some(device);
    }

    /// Apogee delay in seconds and main deploy altitude in meters
    pub fn set_flight_params(&mut self, apogee_delay: f64, main_deploy: f64) {
        self.apogee_delay = Some(apogee_delay);
        self.main_deploy = Some(main_deploy);
    }

    /// Record a flight state change; the first flying state marks boost
    pub fn set_state(&mut self, state: FlightState) {
        if state.is_flying() && self.boost_tick.is_none() {
            self.boost_tick = Some(self.tick.unwrap_or(0));
        }
        self.state = Some(state);
    }

    /// Record a full-width tick
    pub fn set_tick(&mut self, tick: u32) {
        self.tick = Some(tick);
    }

    /// Extend a 16-bit wire tick to a full tick and record it
    ///
    /// A tick more than 1000 below the previous one is taken to have wrapped.
    /// Once the upper word is exhausted ticks stay in the last epoch.
    pub fn extend_tick(&mut self, raw: u16) -> u32 {
        let mut tick = raw as u32;
        if let Some(prev) = self.tick {
            tick |= prev & !0xffff;
            if tick.saturating_add(TICK_WRAP_SLOP) < prev {
                if let Some(wrapped) = tick.checked_add(0x10000) {
                    tick = wrapped;
                }
            }
        }
        self.tick = Some(tick);
        tick
    }

    /// Acceleration in m/s² from a raw accelerometer reading
    pub fn acceleration(&self, raw: f64) -> Option<f64> {
        acceleration_from_sensor(raw, self.accel_plus_g, self.accel_minus_g, self.ground_accel)
            .map(|a| if self.accel_inverted { -a } else { a })
    }

    /// Pad altitude above sea level derived from ground pressure
    pub fn ground_altitude(&self) -> Option<f64> {
        self.ground_pressure.and_then(pressure_to_altitude)
    }

    pub fn is_accel_calibrated(&self) -> bool {
        self.accel_plus_g.is_some() && self.accel_minus_g.is_some()
    }

    pub fn ground_pressure(&self) -> Option<f64> {
        self.ground_pressure
    }

    pub fn ground_accel(&self) -> Option<f64> {
        self.ground_accel
    }

    pub fn accel_plus_g(&self) -> Option<f64> {
        self.accel_plus_g
    }

    pub fn accel_minus_g(&self) -> Option<f64> {
        self.accel_minus_g
    }

    pub fn gps_ground_altitude(&self) -> Option<f64> {
        self.gps_ground_altitude
    }

    pub fn pad_orientation(&self) -> Option<u8> {
        self.pad_orientation
    }

    pub fn accel_inverted(&self) -> bool {
        self.accel_inverted
    }

    pub fn flight(&self) -> Option<u16> {
        self.flight
    }

    pub fn serial(&self) -> Option<u16> {
        self.serial
    }

    pub fn config_version(&self) -> Option<(u8, u8)> {
        self.config_version
    }

    pub fn callsign(&self) -> Option<&str> {
        self.callsign.as_deref()
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref()
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.device_type
    }

    pub fn apogee_delay(&self) -> Option<f64> {
        self.apogee_delay
    }

    pub fn main_deploy(&self) -> Option<f64> {
        self.main_deploy
    }

    pub fn state(&self) -> Option<FlightState> {
        self.state
    }

    pub fn boost_tick(&self) -> Option<u32> {
        self.boost_tick
    }

    pub fn tick(&self) -> Option<u32> {
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_progression() {
        let mut cal = CalData::new();
        assert_eq!(cal.phase(), CalibrationPhase::AwaitingGround);

        cal.set_ground_pressure(98000.0);
        assert_eq!(cal.phase(), CalibrationPhase::GroundCaptured);

        cal.set_accel_plus_minus(1000.0, 3000.0);
        assert_eq!(cal.phase(), CalibrationPhase::Calibrated);

        cal.set_state(FlightState::Boost);
        assert_eq!(cal.phase(), CalibrationPhase::InFlight);
    }

    #[test]
    fn test_new_flight_resets_to_awaiting_ground() {
        let mut cal = CalData::new();
        cal.set_serial(1234);
        cal.set_callsign("KD7SQG");
        cal.set_ground_pressure(98000.0);
        cal.set_ground_accel(1010.0);
        cal.set_accel_plus_minus(1000.0, 3000.0);
        assert_eq!(cal.phase(), CalibrationPhase::Calibrated);

        cal.new_flight(7);
        assert_eq!(cal.phase(), CalibrationPhase::AwaitingGround);
        assert_eq!(cal.ground_pressure(), None);
        assert_eq!(cal.ground_accel(), None);
        assert!(!cal.is_accel_calibrated());
        assert_eq!(cal.flight(), Some(7));
        assert_eq!(cal.serial(), Some(1234));
        assert_eq!(cal.callsign(), Some("KD7SQG"));
    }

    #[test]
    fn test_uncalibrated_stays_ground_captured() {
        let mut cal = CalData::new();
        cal.set_ground_pressure(98000.0);
        cal.set_ground_accel(1000.0);
        cal.set_accel_plus_minus(0.0, 0.0);
        assert_eq!(cal.phase(), CalibrationPhase::GroundCaptured);
        assert!(cal.acceleration(900.0).is_some());
    }

    #[test]
    fn test_ground_first_write_wins() {
        let mut cal = CalData::new();
        assert!(cal.set_ground_pressure(98000.0));
        assert!(!cal.set_ground_pressure(90000.0));
        assert_eq!(cal.ground_pressure(), Some(98000.0));

        assert!(cal.set_ground_accel(1000.0));
        assert!(!cal.set_ground_accel(1200.0));
        assert_eq!(cal.ground_accel(), Some(1000.0));
    }

    #[test]
    fn test_acceleration_without_ground() {
        let cal = CalData::new();
        assert_eq!(cal.acceleration(1000.0), None);
    }

    #[test]
    fn test_inverted_acceleration() {
        let mut cal = CalData::new();
        cal.set_ground_accel(1000.0);
        cal.set_accel_plus_minus(1000.0, 3000.0);
        let upright = cal.acceleration(500.0).unwrap();

        cal.set_pad_orientation(PAD_ORIENTATION_ANTENNA_DOWN);
        assert!(cal.accel_inverted());
        assert!((cal.acceleration(500.0).unwrap() + upright).abs() < 1e-9);
    }

    #[test]
    fn test_extend_tick_wraps() {
        let mut cal = CalData::new();
        assert_eq!(cal.extend_tick(65000), 65000);
        assert_eq!(cal.extend_tick(65500), 65500);
        assert_eq!(cal.extend_tick(100), 65536 + 100);
        assert_eq!(cal.extend_tick(200), 65536 + 200);
        // Small backward jitter does not wrap
        assert_eq!(cal.extend_tick(150), 65536 + 150);
    }

    #[test]
    fn test_extend_tick_last_epoch_does_not_overflow() {
        let mut cal = CalData::new();
        cal.set_tick(0xffff_fff0);
        assert_eq!(cal.extend_tick(5), 0xffff_0005);

        cal.set_tick(u32::MAX);
        assert_eq!(cal.extend_tick(0xffff), u32::MAX);
        assert_eq!(cal.extend_tick(0xfff0), 0xffff_fff0);
    }

    #[test]
    fn test_boost_tick_recorded_once() {
        let mut cal = CalData::new();
        cal.set_tick(500);
        cal.set_state(FlightState::Pad);
        assert_eq!(cal.boost_tick(), None);
        cal.set_state(FlightState::Boost);
        cal.set_tick(800);
        cal.set_state(FlightState::Coast);
        assert_eq!(cal.boost_tick(), Some(500));
    }

    #[test]
    fn test_ground_altitude() {
        let mut cal = CalData::new();
        assert_eq!(cal.ground_altitude(), None);
        cal.set_ground_pressure(101325.0);
        assert!(cal.ground_altitude().unwrap().abs() < 1e-6);
    }
}
