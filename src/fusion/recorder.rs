//! # Flight Recorder
//!
//! Reference [`DataListener`] that keeps one [`Sample`] per tick.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;

use super::calibration::CalData;
use super::listener::{Companion, DataListener, Gps, Imu, Mag};
use crate::telemetry::protocol::{DeviceType, FlightState};
use crate::units::convert::pressure_to_altitude;

/// Everything known at one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sample {
    pub tick: u32,
    pub state: Option<FlightState>,
    /// Pa
    pub pressure: Option<f64>,
    /// Meters above sea level, from pressure
    pub altitude: Option<f64>,
    /// Meters above the pad, from pressure
    pub height: Option<f64>,
    /// °C
    pub temperature: Option<f64>,
    /// m/s²
    pub acceleration: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub apogee_voltage: Option<f64>,
    pub main_voltage: Option<f64>,
    pub pyro_voltage: Option<f64>,
    pub igniter_voltage: Vec<f64>,
    pub kalman_height: Option<f64>,
    pub kalman_speed: Option<f64>,
    pub kalman_acceleration: Option<f64>,
    pub orient: Option<f64>,
    pub imu: Option<Imu>,
    pub mag: Option<Mag>,
    pub gps: Option<Gps>,
    pub companion: Option<Companion>,
    pub device: Option<DeviceType>,
    pub rssi: Option<i32>,
    pub lqi: Option<u8>,
}

/// Restore the high bits of a 16-bit height using a nearby full-width reference
pub fn extend_16(low: f64, reference: f64) -> f64 {
    let reference = reference.round() as i64;
    let low = (low as i64) & 0xffff;
    let mut height = (reference & !0xffff) | low;
    if height - reference > 0x8000 {
        height -= 0x10000;
    } else if reference - height > 0x8000 {
        height += 0x10000;
    }
    height as f64
}

/// Collects decoded values into per-tick samples
#[derive(Debug, Default)]
pub struct FlightRecorder {
    cal: CalData,
    samples: BTreeMap<u32, Sample>,
    current: u32,
    gps: Gps,
    last_kalman_height: Option<f64>,
}

impl FlightRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn sample(&mut self) -> &mut Sample {
        let tick = self.current;
        self.samples.entry(tick).or_insert_with(|| Sample {
            tick,
            ..Sample::default()
        })
    }

    /// GPS height above the pad, when both ends are known
    fn gps_height(&self) -> Option<f64> {
        match (self.gps.altitude, self.cal.gps_ground_altitude()) {
            (Some(altitude), Some(ground)) if self.gps.locked => Some(altitude - ground),
            _ => None,
        }
    }

    pub fn cal(&self) -> &CalData {
        &self.cal
    }

    pub fn gps(&self) -> &Gps {
        &self.gps
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.values()
    }

    pub fn sample_at(&self, tick: u32) -> Option<&Sample> {
        self.samples.get(&tick)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Remove and return every sample older than the current tick
    pub fn drain_completed(&mut self) -> Vec<Sample> {
        let current = self.samples.split_off(&self.current);
        std::mem::replace(&mut self.samples, current).into_values().collect()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples.into_values().collect()
    }
}

impl DataListener for FlightRecorder {
    fn cal_data(&mut self) -> &mut CalData {
        &mut self.cal
    }

    fn set_tick(&mut self, tick: u32) {
        self.current = tick;
        self.sample();
    }

    fn set_state(&mut self, state: FlightState) {
        self.sample().state = Some(state);
    }

    fn set_pressure(&mut self, pressure: f64) {
        let altitude = pressure_to_altitude(pressure);
        let ground = self.cal.ground_altitude();
        let sample = self.sample();
        sample.pressure = Some(pressure);
        sample.altitude = altitude;
        sample.height = match (altitude, ground) {
            (Some(altitude), Some(ground)) => Some(altitude - ground),
            _ => None,
        };
    }

    fn set_temperature(&mut self, temperature: f64) {
        self.sample().temperature = Some(temperature);
    }

    fn set_acceleration(&mut self, acceleration: f64) {
        self.sample().acceleration = Some(acceleration);
    }

    fn set_battery_voltage(&mut self, voltage: f64) {
        self.sample().battery_voltage = Some(voltage);
    }

    fn set_apogee_voltage(&mut self, voltage: f64) {
        self.sample().apogee_voltage = Some(voltage);
    }

    fn set_main_voltage(&mut self, voltage: f64) {
        self.sample().main_voltage = Some(voltage);
    }

    fn set_igniter_voltage(&mut self, voltages: &[f64]) {
        self.sample().igniter_voltage = voltages.to_vec();
    }

    fn set_kalman(&mut self, height: f64, speed: f64, acceleration: f64) {
        let reference = self.gps_height().or(self.last_kalman_height);
        let height = match reference {
            Some(reference) => extend_16(height, reference),
            None => height,
        };
        trace!(height, speed, acceleration, "kalman");
        self.last_kalman_height = Some(height);

        let sample = self.sample();
        sample.kalman_height = Some(height);
        sample.kalman_speed = Some(speed);
        sample.kalman_acceleration = Some(acceleration);
    }

    fn set_companion(&mut self, companion: &Companion) {
        self.sample().companion = Some(companion.clone());
    }

    fn set_gps(&mut self, gps: &Gps, locked: bool, has_sats: bool) {
        if locked {
            let sats = std::mem::take(&mut self.gps.sats);
            self.gps = Gps {
                sats,
                ..gps.clone()
            };
        }
        if has_sats {
            self.gps.sats = gps.sats.clone();
            if !locked {
                self.gps.nsat = gps.nsat;
            }
        }
        let merged = self.gps.clone();
        self.sample().gps = Some(merged);
    }

    fn set_device_type(&mut self, device: DeviceType) {
        self.sample().device = Some(device);
    }

    fn set_pyro_voltage(&mut self, voltage: f64) {
        self.sample().pyro_voltage = Some(voltage);
    }

    fn set_orient(&mut self, orient: f64) {
        self.sample().orient = Some(orient);
    }

    fn set_imu(&mut self, imu: &Imu) {
        self.sample().imu = Some(*imu);
    }

    fn set_mag(&mut self, mag: &Mag) {
        self.sample().mag = Some(*mag);
    }

    fn set_rssi(&mut self, rssi: i32, lqi: u8) {
        let sample = self.sample();
        sample.rssi = Some(rssi);
        sample.lqi = Some(lqi);
    }
}
