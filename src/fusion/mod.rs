//! # Fusion Module
//!
//! Calibration state and the data listener decoders feed.
//!
//! This module handles:
//! - Capturing the ground baseline and accelerometer calibration per flight
//! - Unwrapping 16-bit ticks
//! - The [`DataListener`] sink contract
//! - [`FlightRecorder`], a sink that collects one sample per tick

pub mod calibration;
pub mod listener;
pub mod recorder;

pub use calibration::{CalData, CalibrationPhase};
pub use listener::{Companion, DataListener, Gps, Imu, Mag, SatInfo};
pub use recorder::{FlightRecorder, Sample};
