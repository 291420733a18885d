//! # Data Listener
//!
//! The sink decoders push converted values into.
//!
//! Values arrive grouped by tick: a decoder calls [`DataListener::set_tick`]
//! first and then any number of setters. A setter called twice within the
//! same tick overwrites the earlier value.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::calibration::CalData;
use crate::telemetry::protocol::{DeviceType, FlightState};

/// One tracked satellite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SatInfo {
    pub svid: u8,
    /// Carrier to noise ratio in dB-Hz
    pub c_n_1: u8,
}

/// GPS solution, possibly partial
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Gps {
    pub locked: bool,
    pub connected: bool,
    pub nsat: u8,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Meters above sea level
    pub altitude: Option<f64>,
    /// m/s
    pub ground_speed: Option<f64>,
    /// m/s
    pub climb_rate: Option<f64>,
    /// Degrees
    pub course: Option<f64>,
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub time: Option<NaiveDateTime>,
    pub sats: Vec<SatInfo>,
}

/// Companion board payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Companion {
    pub board_id: u8,
    /// Update period in ticks
    pub update_period: u8,
    pub channels: u8,
    pub data: Vec<u16>,
}

/// Inertial measurement, body axes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Imu {
    /// m/s²
    pub accel: [f64; 3],
    /// °/s
    pub gyro: [f64; 3],
}

/// Magnetometer reading in gauss
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Mag {
    pub field: [f64; 3],
}

/// Consumer of decoded, unit-normalized values
///
/// Implementations own the [`CalData`] for the stream; decoders borrow it
/// through [`DataListener::cal_data`] for the duration of one record.
pub trait DataListener {
    fn cal_data(&mut self) -> &mut CalData;

    fn set_tick(&mut self, tick: u32);
    fn set_state(&mut self, state: FlightState);
    /// Pa
    fn set_pressure(&mut self, pressure: f64);
    /// °C
    fn set_temperature(&mut self, temperature: f64);
    /// m/s²
    fn set_acceleration(&mut self, acceleration: f64);
    fn set_battery_voltage(&mut self, voltage: f64);
    fn set_apogee_voltage(&mut self, voltage: f64);
    fn set_main_voltage(&mut self, voltage: f64);
    fn set_igniter_voltage(&mut self, voltages: &[f64]);
    /// Height in m (low 16 bits only on the wire), speed in m/s, acceleration in m/s²
    fn set_kalman(&mut self, height: f64, speed: f64, acceleration: f64);
    fn set_companion(&mut self, companion: &Companion);
    /// `locked` replaces the location part, `has_sats` the satellite list
    fn set_gps(&mut self, gps: &Gps, locked: bool, has_sats: bool);
    fn set_device_type(&mut self, device: DeviceType);

    fn set_pyro_voltage(&mut self, _voltage: f64) {}
    /// Degrees from vertical
    fn set_orient(&mut self, _orient: f64) {}
    fn set_imu(&mut self, _imu: &Imu) {}
    fn set_mag(&mut self, _mag: &Mag) {}
    fn set_rssi(&mut self, _rssi: i32, _lqi: u8) {}

    /// Record a state change in both the calibration state and the sink
    fn update_state(&mut self, state: FlightState) {
        self.cal_data().set_state(state);
        self.set_state(state);
    }
}
