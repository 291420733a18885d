//! # Sensor Module
//!
//! Request/reply ADC readers for boards queried over a link.
//!
//! The device answers `a` with a single line of `key: value` tokens:
//!
//! ```text
//! tick: 12345 accel: 1500 pres: 30000 temp: 20000 batt: 24000 drogue: 100 main: 120
//! ```

pub mod boards;

pub use boards::{TeleGpsAdc, TeleMegaAdc, TeleMetrumAdc, TeleMiniAdc};

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{AltosError, Result};
use crate::fusion::DataListener;
use crate::link::Link;
use crate::telemetry::protocol::DeviceType;
use crate::telemetry::records::MiniGeneration;
use crate::units::convert::{
    barometer_to_pressure, cc_battery_to_voltage, cc_igniter_to_voltage, mega_battery_voltage,
    mega_pyro_voltage, tele_gps_voltage, tele_mini_2_voltage, tele_mini_3_battery_voltage,
    tele_mini_3_pyro_voltage, thermometer_to_temperature,
};

/// A board's set of named ADC fields
pub trait AdcFields: Default {
    /// Store `value` under `key` (without the colon). Returns false for keys
    /// this board does not have.
    fn set(&mut self, key: &str, value: i32) -> bool;
}

/// Fill `T` from whitespace-split reply tokens
///
/// Unknown keys and unparsable values are skipped. Fields that never
/// appear stay zero.
///
/// # Examples
///
/// ```
/// use altos_decode::sensor::{parse_adc, TeleGpsAdc};
///
/// let tokens: Vec<&str> = "tick: 100 batt: 2048 unknown: 7".split_whitespace().collect();
/// let adc: TeleGpsAdc = parse_adc(&tokens);
/// assert_eq!(adc.tick, 100);
/// assert_eq!(adc.batt, 2048);
/// ```
pub fn parse_adc<T: AdcFields, S: AsRef<str>>(tokens: &[S]) -> T {
    let mut adc = T::default();
    let mut i = 0;

    while i + 1 < tokens.len() {
        let token = tokens[i].as_ref();
        if let Some(key) = token.strip_suffix(':') {
            match tokens[i + 1].as_ref().parse::<i32>() {
                Ok(value) => {
                    if !adc.set(key, value) {
                        trace!("Skipping unknown ADC key {:?}", key);
                    }
                    i += 2;
                    continue;
                }
                Err(_) => debug!("Skipping unparsable ADC value for {:?}: {:?}", key, tokens[i + 1].as_ref()),
            }
        }
        i += 1;
    }

    adc
}

/// One ADC snapshot, typed by board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorReading {
    TeleMetrum(TeleMetrumAdc),
    TeleMini(TeleMiniAdc, #[serde(skip)] MiniGeneration),
    TeleMega(TeleMegaAdc),
    TeleGps(TeleGpsAdc),
}

impl SensorReading {
    /// Parse reply tokens for `device`
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedProduct` for devices without an ADC decoder
    pub fn parse<S: AsRef<str>>(device: DeviceType, tokens: &[S]) -> Result<Self> {
        let reading = match device {
            DeviceType::TeleMetrum => SensorReading::TeleMetrum(parse_adc(tokens)),
            DeviceType::TeleMini => SensorReading::TeleMini(parse_adc(tokens), MiniGeneration::Mini2),
            DeviceType::EasyMini => SensorReading::TeleMini(parse_adc(tokens), MiniGeneration::Mini3),
            DeviceType::TeleMega | DeviceType::EasyMega => SensorReading::TeleMega(parse_adc(tokens)),
            DeviceType::TeleGps => SensorReading::TeleGps(parse_adc(tokens)),
            DeviceType::Unknown(id) => {
                return Err(AltosError::UnsupportedProduct(format!("product id 0x{:02x}", id)))
            }
        };
        Ok(reading)
    }

    pub fn tick(&self) -> i32 {
        match self {
            SensorReading::TeleMetrum(adc) => adc.tick,
            SensorReading::TeleMini(adc, _) => adc.tick,
            SensorReading::TeleMega(adc) => adc.tick,
            SensorReading::TeleGps(adc) => adc.tick,
        }
    }

    /// Push converted values into `listener`
    pub fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        let tick = listener.cal_data().extend_tick(self.tick() as u16);
        listener.set_tick(tick);

        match self {
            SensorReading::TeleMetrum(adc) => {
                if let Some(acceleration) = listener.cal_data().acceleration(adc.accel as f64) {
                    listener.set_acceleration(acceleration);
                }
                listener.set_pressure(barometer_to_pressure(adc.pres as f64));
                listener.set_temperature(thermometer_to_temperature(adc.temp as f64));
                listener.set_battery_voltage(cc_battery_to_voltage(adc.batt as f64));
                listener.set_apogee_voltage(cc_igniter_to_voltage(adc.drogue as f64));
                listener.set_main_voltage(cc_igniter_to_voltage(adc.main as f64));
            }
            SensorReading::TeleMini(adc, generation) => {
                let (battery, pyro): (fn(f64) -> f64, fn(f64) -> f64) = match generation {
                    MiniGeneration::Mini2 => (tele_mini_2_voltage, tele_mini_2_voltage),
                    MiniGeneration::Mini3 => (tele_mini_3_battery_voltage, tele_mini_3_pyro_voltage),
                };
                listener.set_battery_voltage(battery(adc.batt as f64));
                listener.set_apogee_voltage(pyro(adc.apogee as f64));
                listener.set_main_voltage(pyro(adc.main as f64));
            }
            SensorReading::TeleMega(adc) => {
                listener.set_battery_voltage(mega_battery_voltage(adc.batt as f64));
                listener.set_pyro_voltage(mega_pyro_voltage(adc.pyro as f64));
                let igniters: Vec<f64> = adc.sense.iter().map(|&s| mega_pyro_voltage(s as f64)).collect();
                listener.set_igniter_voltage(&igniters);
                listener.set_apogee_voltage(mega_pyro_voltage(adc.apogee as f64));
                listener.set_main_voltage(mega_pyro_voltage(adc.main as f64));
            }
            SensorReading::TeleGps(adc) => {
                listener.set_battery_voltage(tele_gps_voltage(adc.batt as f64));
            }
        }
    }
}

/// Query the ADC of `device` over `link`
///
/// # Errors
///
/// Returns error if:
/// - The device type has no ADC decoder (checked before querying)
/// - The link times out
pub async fn read_sensor<L: Link + ?Sized>(link: &mut L, device: DeviceType) -> Result<SensorReading> {
    if let DeviceType::Unknown(id) = device {
        return Err(AltosError::UnsupportedProduct(format!("product id 0x{:02x}", id)));
    }
    let tokens = link.adc().await?;
    SensorReading::parse(device, &tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::FlightRecorder;
    use crate::link::MockLink;

    fn tokens(line: &str) -> Vec<&str> {
        line.split_whitespace().collect()
    }

    #[test]
    fn test_unknown_key_ignored() {
        let adc: TeleGpsAdc = parse_adc(&tokens("tick: 100 batt: 2048 unknown: 7"));
        assert_eq!(adc, TeleGpsAdc { tick: 100, batt: 2048 });
    }

    #[test]
    fn test_missing_fields_stay_zero() {
        let adc: TeleMetrumAdc = parse_adc(&tokens("tick: 5 pres: 30000"));
        assert_eq!(adc.tick, 5);
        assert_eq!(adc.pres, 30000);
        assert_eq!(adc.accel, 0);
        assert_eq!(adc.main, 0);
    }

    #[test]
    fn test_unparsable_value_skipped() {
        let adc: TeleMiniAdc = parse_adc(&tokens("tick: 7 apogee: n/a main: 300 batt: 2900"));
        assert_eq!(adc.tick, 7);
        assert_eq!(adc.apogee, 0);
        assert_eq!(adc.main, 300);
        assert_eq!(adc.batt, 2900);
    }

    #[test]
    fn test_trailing_key_without_value() {
        let adc: TeleGpsAdc = parse_adc(&tokens("tick: 1 batt:"));
        assert_eq!(adc, TeleGpsAdc { tick: 1, batt: 0 });
    }

    #[test]
    fn test_mega_fields() {
        let adc: TeleMegaAdc = parse_adc(&tokens(
            "tick: 900 A: 10 B: 20 C: 30 D: 40 drogue: 50 main: 60 batt: 3000 pyro: 3100",
        ));
        assert_eq!(adc.sense, [10, 20, 30, 40]);
        assert_eq!(adc.apogee, 50);
        assert_eq!(adc.main, 60);
        assert_eq!(adc.pyro, 3100);
    }

    #[test]
    fn test_parse_unknown_device() {
        let result = SensorReading::parse(DeviceType::Unknown(0x42), &tokens("tick: 1"));
        assert!(matches!(result, Err(AltosError::UnsupportedProduct(_))));
    }

    #[test]
    fn test_provide_data_telegps() {
        let reading = SensorReading::parse(DeviceType::TeleGps, &tokens("tick: 250 batt: 3000")).unwrap();
        let mut recorder = FlightRecorder::new();
        reading.provide_data(&mut recorder);

        let sample = recorder.sample_at(250).unwrap();
        assert_eq!(sample.battery_voltage, Some(tele_gps_voltage(3000.0)));
    }

    #[test]
    fn test_provide_data_mega_igniters() {
        let reading = SensorReading::parse(
            DeviceType::EasyMega,
            &tokens("tick: 10 A: 4095 B: 0 C: 0 D: 0 apogee: 4095 main: 0 batt: 2000 pyro: 2000"),
        )
        .unwrap();
        let mut recorder = FlightRecorder::new();
        reading.provide_data(&mut recorder);

        let sample = recorder.sample_at(10).unwrap();
        assert_eq!(sample.igniter_voltage.len(), 4);
        assert_eq!(sample.igniter_voltage[0], mega_pyro_voltage(4095.0));
        assert_eq!(sample.main_voltage, Some(0.0));
    }

    #[tokio::test]
    async fn test_read_sensor() {
        let mut link = MockLink::new();
        link.expect_adc()
            .times(1)
            .returning(|| Ok(vec!["tick:".into(), "100".into(), "batt:".into(), "2048".into()]));

        let reading = read_sensor(&mut link, DeviceType::TeleGps).await.unwrap();
        assert_eq!(reading, SensorReading::TeleGps(TeleGpsAdc { tick: 100, batt: 2048 }));
    }

    #[tokio::test]
    async fn test_read_sensor_unsupported_skips_query() {
        let mut link = MockLink::new();
        link.expect_adc().never();

        let result = read_sensor(&mut link, DeviceType::Unknown(0x99)).await;
        assert!(matches!(result, Err(AltosError::UnsupportedProduct(_))));
    }

    #[tokio::test]
    async fn test_read_sensor_timeout() {
        let mut link = MockLink::new();
        link.expect_adc()
            .returning(|| Err(AltosError::Timeout("ADC reply".to_string())));

        let result = read_sensor(&mut link, DeviceType::TeleMetrum).await;
        assert!(matches!(result, Err(AltosError::Timeout(_))));
    }
}
