//! # AltOS Decode Library
//!
//! Decode amateur-rocketry flight-computer telemetry and eeprom flight logs.
//!
//! This library turns telemetry packets, eeprom records and ADC replies into
//! SI values, rebuilding each flight's calibration state as records arrive.
//! Decoded values are pushed into a [`fusion::DataListener`].

pub mod config;
pub mod eeprom;
pub mod error;
pub mod fusion;
pub mod link;
pub mod sensor;
pub mod sites;
pub mod telemetry;
pub mod units;
