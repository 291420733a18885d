//! Device configuration as reported by the `c s` and `v` commands

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AltosError, Result};
use crate::fusion::CalData;
use crate::link::Link;
use crate::telemetry::protocol::DeviceType;

/// Query sent to the device; the version block ends the reply
pub const CONFIG_COMMAND: &str = "c s\nv\n";

/// Last line of the reply
const CONFIG_END: &str = "software-version";

/// Device identity and flight configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigData {
    pub serial: Option<u16>,
    pub log_format: Option<u8>,
    pub config_version: Option<(u8, u8)>,
    pub callsign: Option<String>,
    /// Seconds
    pub apogee_delay: Option<u16>,
    /// Meters
    pub main_deploy: Option<u16>,
    pub pad_orientation: Option<u8>,
    pub accel_plus_g: Option<i32>,
    pub accel_minus_g: Option<i32>,
    pub flight_log_max: Option<u32>,
    pub product: Option<String>,
    pub version: Option<String>,
}

/// First whitespace token after `prefix`, parsed
fn value_after<T: std::str::FromStr>(line: &str, prefix: &str) -> Option<T> {
    line.strip_prefix(prefix)?.split_whitespace().next()?.parse().ok()
}

/// Parse a numeric field when `line` starts with `prefix`
fn set_number<T: std::str::FromStr>(field: &mut Option<T>, line: &str, prefix: &str) -> Option<bool> {
    if !line.starts_with(prefix) {
        return None;
    }
    *field = value_after(line, prefix);
    Some(field.is_some())
}

fn string_after(line: &str, prefix: &str) -> Option<String> {
    let value = line.strip_prefix(prefix)?.trim();
    Some(value.trim_matches('"').to_string())
}

impl ConfigData {
    /// Absorb one reply line. Returns false if the line was not recognised.
    pub fn parse_line(&mut self, line: &str) -> bool {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Config version:") {
            let mut parts = rest.trim().splitn(2, '.');
            let major = parts.next().and_then(|p| p.parse().ok());
            let minor = parts.next().and_then(|p| p.parse().ok());
            if let (Some(major), Some(minor)) = (major, minor) {
                self.config_version = Some((major, minor));
                return true;
            }
            return false;
        }

        if let Some(rest) = line.strip_prefix("Accel cal +1g:") {
            let mut tokens = rest.split_whitespace();
            let plus = tokens.next().and_then(|t| t.parse().ok());
            let minus = match (tokens.next(), tokens.next()) {
                (Some("-1g:"), Some(value)) => value.parse().ok(),
                _ => None,
            };
            if let (Some(plus), Some(minus)) = (plus, minus) {
                self.accel_plus_g = Some(plus);
                self.accel_minus_g = Some(minus);
                return true;
            }
            return false;
        }

        if line.starts_with("Callsign:") {
            self.callsign = string_after(line, "Callsign:");
            return true;
        }

        let numeric = [
            set_number(&mut self.main_deploy, line, "Main deploy:"),
            set_number(&mut self.apogee_delay, line, "Apogee delay:"),
            set_number(&mut self.pad_orientation, line, "Pad orientation:"),
            set_number(&mut self.serial, line, "serial-number"),
            set_number(&mut self.log_format, line, "log-format"),
            set_number(&mut self.flight_log_max, line, "flight-log-max"),
        ];
        if let Some(recognised) = numeric.into_iter().flatten().next() {
            return recognised;
        }

        if line.starts_with("product") {
            self.product = string_after(line, "product");
            return true;
        }
        if line.starts_with(CONFIG_END) {
            self.version = string_after(line, CONFIG_END);
            return true;
        }

        false
    }

    /// Parse a captured reply
    pub fn parse<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut config = ConfigData::default();
        for line in lines {
            config.parse_line(line);
        }
        config
    }

    /// Query the device over `link`
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the reply stops before the version line
    pub async fn fetch<L: Link + ?Sized>(link: &mut L, timeout_ms: u64) -> Result<Self> {
        link.printf(CONFIG_COMMAND).await?;
        link.flush_output().await?;

        let mut config = ConfigData::default();
        loop {
            let line = link
                .get_reply_no_dialog(timeout_ms)
                .await?
                .ok_or_else(|| AltosError::Timeout("configuration data".to_string()))?;

            if !config.parse_line(&line) {
                debug!("Ignoring config line: {}", line);
            }
            if line.trim_start().starts_with(CONFIG_END) {
                break;
            }
        }

        if config.serial.is_none() {
            warn!("Configuration reply carried no serial number");
        }
        Ok(config)
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.product.as_deref().and_then(DeviceType::from_product_name)
    }

    /// Copy device identity and calibration into `cal`
    pub fn apply(&self, cal: &mut CalData) {
        if let Some(serial) = self.serial {
            cal.set_serial(serial);
        }
        if let Some((major, minor)) = self.config_version {
            cal.set_config_version(major, minor);
        }
        if let Some(callsign) = &self.callsign {
            cal.set_callsign(callsign);
        }
        if let Some(version) = &self.version {
            cal.set_firmware_version(version);
        }
        if let Some(device) = self.device_type() {
            cal.set_device_type(device);
        }
        if let Some(orientation) = self.pad_orientation {
            cal.set_pad_orientation(orientation);
        }
        if let (Some(plus), Some(minus)) = (self.accel_plus_g, self.accel_minus_g) {
            cal.set_accel_plus_minus(plus as f64, minus as f64);
        }
        if let (Some(apogee_delay), Some(main_deploy)) = (self.apogee_delay, self.main_deploy) {
            cal.set_flight_params(apogee_delay as f64, main_deploy as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MockLink;
    use mockall::Sequence;

    const REPLY: &[&str] = &[
        "c s",
        "Config version: 1.24",
        "Main deploy: 250 meters",
        "Apogee delay: 2 seconds",
        "Frequency: 434550 kHz",
        "Callsign: \"KD7SQG\"",
        "Pad orientation: 1 (antenna down)",
        "Accel cal +1g: 1901 -1g: 2125",
        "manufacturer     altusmetrum.org",
        "product          TeleMetrum-v2.0",
        "serial-number    2345",
        "log-format       2",
        "software-version 1.9.18",
    ];

    #[test]
    fn test_parse_reply() {
        let config = ConfigData::parse(REPLY.iter().copied());

        assert_eq!(config.config_version, Some((1, 24)));
        assert_eq!(config.main_deploy, Some(250));
        assert_eq!(config.apogee_delay, Some(2));
        assert_eq!(config.callsign.as_deref(), Some("KD7SQG"));
        assert_eq!(config.pad_orientation, Some(1));
        assert_eq!(config.accel_plus_g, Some(1901));
        assert_eq!(config.accel_minus_g, Some(2125));
        assert_eq!(config.serial, Some(2345));
        assert_eq!(config.log_format, Some(2));
        assert_eq!(config.product.as_deref(), Some("TeleMetrum-v2.0"));
        assert_eq!(config.version.as_deref(), Some("1.9.18"));
        assert_eq!(config.device_type(), Some(DeviceType::TeleMetrum));
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        let mut config = ConfigData::default();
        assert!(!config.parse_line("Main deploy: lots"));
        assert!(!config.parse_line("Accel cal +1g: 1901"));
        assert!(!config.parse_line("Frequency: 434550 kHz"));
        assert_eq!(config, ConfigData::default());
    }

    #[test]
    fn test_apply() {
        let config = ConfigData::parse(REPLY.iter().copied());
        let mut cal = CalData::new();
        config.apply(&mut cal);

        assert_eq!(cal.serial(), Some(2345));
        assert_eq!(cal.callsign(), Some("KD7SQG"));
        assert_eq!(cal.firmware_version(), Some("1.9.18"));
        assert_eq!(cal.device_type(), Some(DeviceType::TeleMetrum));
        assert!(cal.accel_inverted());
        assert!(cal.is_accel_calibrated());
        assert_eq!(cal.apogee_delay(), Some(2.0));
        assert_eq!(cal.main_deploy(), Some(250.0));
    }

    #[tokio::test]
    async fn test_fetch() {
        let mut link = MockLink::new();
        let mut seq = Sequence::new();

        link.expect_printf()
            .withf(|text| text.starts_with("c s"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        link.expect_flush_output().returning(|| Ok(()));

        let mut replies: Vec<Option<String>> = REPLY.iter().map(|l| Some(l.to_string())).collect();
        replies.reverse();
        link.expect_get_reply_no_dialog()
            .times(REPLY.len())
            .returning(move |_| Ok(replies.pop().flatten()));

        let config = ConfigData::fetch(&mut link, 1000).await.unwrap();
        assert_eq!(config.serial, Some(2345));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mut link = MockLink::new();
        link.expect_printf().returning(|_| Ok(()));
        link.expect_flush_output().returning(|| Ok(()));
        let mut replies = vec![None, Some("Config version: 1.24".to_string())];
        link.expect_get_reply_no_dialog()
            .returning(move |_| Ok(replies.pop().flatten()));

        let result = ConfigData::fetch(&mut link, 1000).await;
        assert!(matches!(result, Err(AltosError::Timeout(_))));
    }
}
