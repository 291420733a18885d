//! # Telemetry Records
//!
//! Typed views of each 32-byte telemetry packet.
//!
//! Decoding and delivery are separate steps. [`TelemetryRecord::decode`]
//! validates the packet and extracts every field without touching any
//! state; [`TelemetryRecord::provide_data`] cannot fail and is the only
//! step that updates calibration state or the listener. A packet that fails
//! to decode therefore leaves the flight untouched.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use super::protocol::*;
use crate::error::Result;
use crate::fusion::{Companion, DataListener, Gps, Imu, Mag, SatInfo};
use crate::units::convert::{
    barometer_to_pressure, cc_battery_to_voltage, cc_igniter_to_voltage, hmc5883_gauss,
    mega_battery_voltage, mega_pyro_voltage, metrum_voltage, mpu6000_accel, mpu6000_gyro,
    tele_gps_voltage, tele_mini_2_voltage, tele_mini_3_battery_voltage, tele_mini_3_pyro_voltage,
    thermometer_to_temperature,
};

/// Kalman speed and acceleration are sent in 1/16 units
const KALMAN_SCALE: f64 = 16.0;

fn provide_kalman<L: DataListener + ?Sized>(listener: &mut L, height: i16, speed: i16, acceleration: i16) {
    listener.set_kalman(
        height as f64,
        speed as f64 / KALMAN_SCALE,
        acceleration as f64 / KALMAN_SCALE,
    );
}

/// Which board sent a legacy sensor packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    TeleMetrum,
    TeleMini,
    TeleNano,
}

/// Legacy sensor packet (types 0x01..0x03)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRecord {
    pub kind: SensorKind,
    pub state: u8,
    pub accel: i16,
    pub pres: i16,
    pub temp: i16,
    pub v_batt: i16,
    pub sense_d: i16,
    pub sense_m: i16,
    pub acceleration: i16,
    pub speed: i16,
    pub height: i16,
    pub ground_pres: i16,
    pub ground_accel: i16,
    pub accel_plus_g: i16,
    pub accel_minus_g: i16,
}

impl SensorRecord {
    fn decode(kind: SensorKind, r: &FieldReader) -> Self {
        Self {
            kind,
            state: r.uint8(5),
            accel: r.int16(6),
            pres: r.int16(8),
            temp: r.int16(10),
            v_batt: r.int16(12),
            sense_d: r.int16(14),
            sense_m: r.int16(16),
            acceleration: r.int16(18),
            speed: r.int16(20),
            height: r.int16(22),
            ground_pres: r.int16(24),
            ground_accel: r.int16(26),
            accel_plus_g: r.int16(28),
            accel_minus_g: r.int16(30),
        }
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        let has_accel = self.kind == SensorKind::TeleMetrum;

        let cal = listener.cal_data();
        cal.set_ground_pressure(barometer_to_pressure(self.ground_pres as f64));
        if has_accel {
            cal.set_ground_accel(self.ground_accel as f64);
            cal.set_accel_plus_minus(self.accel_plus_g as f64, self.accel_minus_g as f64);
        }

        listener.update_state(FlightState::from(self.state));
        if has_accel {
            if let Some(acceleration) = listener.cal_data().acceleration(self.accel as f64) {
                listener.set_acceleration(acceleration);
            }
        }
        listener.set_pressure(barometer_to_pressure(self.pres as f64));
        listener.set_temperature(thermometer_to_temperature(self.temp as f64));
        listener.set_battery_voltage(cc_battery_to_voltage(self.v_batt as f64));
        if self.kind != SensorKind::TeleNano {
            listener.set_apogee_voltage(cc_igniter_to_voltage(self.sense_d as f64));
            listener.set_main_voltage(cc_igniter_to_voltage(self.sense_m as f64));
        }
        provide_kalman(listener, self.height, self.speed, self.acceleration);
    }
}

/// Device configuration packet (type 0x04)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRecord {
    pub device: DeviceType,
    pub flight: u16,
    pub config_major: u8,
    pub config_minor: u8,
    /// Centiseconds; absent on devices without pyro channels
    pub apogee_delay: Option<u16>,
    /// Meters; absent on devices without pyro channels
    pub main_deploy: Option<u16>,
    /// Battery ADC reading, sent in the main deploy slot by trackers
    pub v_batt: Option<u16>,
    pub flight_log_max: u16,
    pub callsign: String,
    pub version: String,
}

impl ConfigurationRecord {
    fn decode(r: &FieldReader) -> Self {
        let device = DeviceType::from(r.uint8(5));
        let (apogee_delay, main_deploy, v_batt) = if device.has_pyro() {
            (Some(r.uint16(10)), Some(r.uint16(12)), None)
        } else {
            (None, None, Some(r.uint16(12)))
        };

        Self {
            device,
            flight: r.uint16(6),
            config_major: r.uint8(8),
            config_minor: r.uint8(9),
            apogee_delay,
            main_deploy,
            v_batt,
            flight_log_max: r.uint16(14),
            callsign: r.string(16, MAX_CALLSIGN),
            version: r.string(24, MAX_VERSION),
        }
    }

    /// Battery voltage for trackers, choosing the divider by board revision
    pub fn battery_voltage(&self) -> Option<f64> {
        self.v_batt.map(|raw| tele_gps_voltage(raw as f64))
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        let cal = listener.cal_data();
        cal.set_device_type(self.device);
        cal.set_flight(self.flight);
        cal.set_config_version(self.config_major, self.config_minor);
        cal.set_callsign(&self.callsign);
        cal.set_firmware_version(&self.version);
        if let (Some(apogee_delay), Some(main_deploy)) = (self.apogee_delay, self.main_deploy) {
            cal.set_flight_params(apogee_delay as f64 / 100.0, main_deploy as f64);
        }

        listener.set_device_type(self.device);
        if let Some(voltage) = self.battery_voltage() {
            listener.set_battery_voltage(voltage);
        }
    }
}

/// GPS location packet (type 0x05)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRecord {
    pub flags: u8,
    /// Meters, with the high byte merged in when the mode says so
    pub altitude: i32,
    /// Degrees × 10⁷
    pub latitude: i32,
    /// Degrees × 10⁷
    pub longitude: i32,
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Dilution of precision × 5
    pub pdop: u8,
    pub hdop: u8,
    pub vdop: u8,
    pub mode: u8,
    /// cm/s
    pub ground_speed: u16,
    /// cm/s
    pub climb_rate: i16,
    /// Degrees / 2
    pub course: u8,
}

impl LocationRecord {
    fn decode(r: &FieldReader) -> Self {
        let mode = r.uint8(25);
        let altitude_low = r.int16(6);
        let altitude = if mode & GPS_MODE_ALTITUDE_24 != 0 {
            ((r.int8(31) as i32) << 16) | (altitude_low as u16 as i32)
        } else {
            altitude_low as i32
        };

        Self {
            flags: r.uint8(5),
            altitude,
            latitude: r.int32(8),
            longitude: r.int32(12),
            year: r.uint8(16),
            month: r.uint8(17),
            day: r.uint8(18),
            hour: r.uint8(19),
            minute: r.uint8(20),
            second: r.uint8(21),
            pdop: r.uint8(22),
            hdop: r.uint8(23),
            vdop: r.uint8(24),
            mode,
            ground_speed: r.uint16(26),
            climb_rate: r.int16(28),
            course: r.uint8(30),
        }
    }

    pub fn time(&self) -> Option<NaiveDateTime> {
        if self.flags & GPS_DATE_VALID == 0 {
            return None;
        }
        NaiveDate::from_ymd_opt(2000 + self.year as i32, self.month as u32, self.day as u32)?
            .and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
    }

    /// Convert to a GPS solution; position fields are only filled when locked
    pub fn gps(&self) -> Gps {
        let locked = self.flags & GPS_VALID != 0;
        let mut gps = Gps {
            locked,
            connected: self.flags & GPS_RUNNING != 0,
            nsat: self.flags & GPS_NUM_SAT_MASK,
            time: self.time(),
            ..Gps::default()
        };

        if locked {
            gps.latitude = Some(self.latitude as f64 / 1.0e7);
            gps.longitude = Some(self.longitude as f64 / 1.0e7);
            gps.altitude = Some(self.altitude as f64);
            gps.ground_speed = Some(self.ground_speed as f64 / 100.0);
            gps.climb_rate = Some(self.climb_rate as f64 / 100.0);
            gps.pdop = Some(self.pdop as f64 / 5.0);
            gps.hdop = Some(self.hdop as f64 / 5.0);
            gps.vdop = Some(self.vdop as f64 / 5.0);
            if self.flags & GPS_COURSE_VALID != 0 {
                gps.course = Some(self.course as f64 * 2.0);
            }
        }
        gps
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        let gps = self.gps();
        if let Some(altitude) = gps.altitude {
            let cal = listener.cal_data();
            if !cal.in_flight() {
                cal.set_gps_ground_altitude(altitude);
            }
        }
        listener.set_gps(&gps, true, false);
    }
}

/// GPS satellite packet (type 0x06)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatelliteRecord {
    /// Count declared by the sender, possibly more than were decoded
    pub channels: u8,
    pub sats: Vec<SatInfo>,
}

impl SatelliteRecord {
    fn decode(r: &FieldReader) -> Self {
        let channels = r.uint8(5);
        let count = (channels as usize).min(MAX_GPS_TRACKING);
        if count < channels as usize {
            debug!("Satellite packet declares {} channels, using {}", channels, count);
        }

        let sats = (0..count)
            .map(|i| SatInfo {
                svid: r.uint8(6 + i * 2),
                c_n_1: r.uint8(7 + i * 2),
            })
            .collect();

        Self { channels, sats }
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        let gps = Gps {
            nsat: self.sats.len() as u8,
            sats: self.sats.clone(),
            ..Gps::default()
        };
        listener.set_gps(&gps, false, true);
    }
}

/// Companion board packet (type 0x07)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionRecord {
    pub companion: Companion,
}

impl CompanionRecord {
    fn decode(r: &FieldReader) -> Self {
        let channels = r.uint8(7);
        let count = (channels as usize).min(MAX_COMPANION_CHANNELS);
        let data = (0..count).map(|i| r.uint16(8 + i * 2)).collect();

        Self {
            companion: Companion {
                board_id: r.uint8(5),
                update_period: r.uint8(6),
                channels,
                data,
            },
        }
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        listener.set_companion(&self.companion);
    }
}

/// TeleMega IMU packet (type 0x08)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MegaSensorRecord {
    /// Degrees from vertical
    pub orient: u8,
    pub accel: i16,
    /// Pa
    pub pres: i32,
    /// °C × 100
    pub temp: i16,
    pub accel_xyz: [i16; 3],
    pub gyro_xyz: [i16; 3],
    pub mag_xyz: [i16; 3],
}

impl MegaSensorRecord {
    fn decode(r: &FieldReader) -> Self {
        Self {
            orient: r.uint8(5),
            accel: r.int16(6),
            pres: r.int32(8),
            temp: r.int16(12),
            accel_xyz: [r.int16(14), r.int16(16), r.int16(18)],
            gyro_xyz: [r.int16(20), r.int16(22), r.int16(24)],
            // mag z precedes mag y on the wire
            mag_xyz: [r.int16(26), r.int16(30), r.int16(28)],
        }
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        listener.set_orient(self.orient as f64);
        if let Some(acceleration) = listener.cal_data().acceleration(self.accel as f64) {
            listener.set_acceleration(acceleration);
        }
        listener.set_pressure(self.pres as f64);
        listener.set_temperature(self.temp as f64 / 100.0);

        let imu = Imu {
            accel: self.accel_xyz.map(|a| mpu6000_accel(a as f64)),
            gyro: self.gyro_xyz.map(|g| mpu6000_gyro(g as f64)),
        };
        listener.set_imu(&imu);
        listener.set_mag(&Mag {
            field: self.mag_xyz.map(|m| hmc5883_gauss(m as f64)),
        });
    }
}

/// TeleMega state packet (type 0x09)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MegaDataRecord {
    pub state: u8,
    pub v_batt: i16,
    pub v_pyro: i16,
    /// ADC counts / 16: igniters A..D, then apogee and main
    pub sense: [u8; 6],
    pub ground_pres: i32,
    pub ground_accel: i16,
    pub accel_plus_g: i16,
    pub accel_minus_g: i16,
    pub acceleration: i16,
    pub speed: i16,
    pub height: i16,
}

impl MegaDataRecord {
    fn decode(r: &FieldReader) -> Self {
        let mut sense = [0u8; 6];
        for (i, s) in sense.iter_mut().enumerate() {
            *s = r.uint8(10 + i);
        }

        Self {
            state: r.uint8(5),
            v_batt: r.int16(6),
            v_pyro: r.int16(8),
            sense,
            ground_pres: r.int32(16),
            ground_accel: r.int16(20),
            accel_plus_g: r.int16(22),
            accel_minus_g: r.int16(24),
            acceleration: r.int16(26),
            speed: r.int16(28),
            height: r.int16(30),
        }
    }

    fn sense_voltage(sense: u8) -> f64 {
        mega_pyro_voltage(sense as f64 * 16.0)
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        let cal = listener.cal_data();
        cal.set_ground_pressure(self.ground_pres as f64);
        cal.set_ground_accel(self.ground_accel as f64);
        cal.set_accel_plus_minus(self.accel_plus_g as f64, self.accel_minus_g as f64);

        listener.update_state(FlightState::from(self.state));
        listener.set_battery_voltage(mega_battery_voltage(self.v_batt as f64));
        listener.set_pyro_voltage(mega_pyro_voltage(self.v_pyro as f64));

        let igniters: Vec<f64> = self.sense[..4].iter().map(|&s| Self::sense_voltage(s)).collect();
        listener.set_igniter_voltage(&igniters);
        listener.set_apogee_voltage(Self::sense_voltage(self.sense[4]));
        listener.set_main_voltage(Self::sense_voltage(self.sense[5]));

        provide_kalman(listener, self.height, self.speed, self.acceleration);
    }
}

/// TeleMetrum v2 sensor packet (type 0x0a)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetrumSensorRecord {
    pub state: u8,
    pub accel: i16,
    pub pres: i32,
    pub temp: i16,
    pub acceleration: i16,
    pub speed: i16,
    pub height: i16,
    pub v_batt: i16,
    pub sense_a: i16,
    pub sense_m: i16,
}

impl MetrumSensorRecord {
    fn decode(r: &FieldReader) -> Self {
        Self {
            state: r.uint8(5),
            accel: r.int16(6),
            pres: r.int32(8),
            temp: r.int16(12),
            acceleration: r.int16(14),
            speed: r.int16(16),
            height: r.int16(18),
            v_batt: r.int16(20),
            sense_a: r.int16(22),
            sense_m: r.int16(24),
        }
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        listener.update_state(FlightState::from(self.state));
        if let Some(acceleration) = listener.cal_data().acceleration(self.accel as f64) {
            listener.set_acceleration(acceleration);
        }
        listener.set_pressure(self.pres as f64);
        listener.set_temperature(self.temp as f64 / 100.0);
        listener.set_battery_voltage(metrum_voltage(self.v_batt as f64));
        listener.set_apogee_voltage(metrum_voltage(self.sense_a as f64));
        listener.set_main_voltage(metrum_voltage(self.sense_m as f64));
        provide_kalman(listener, self.height, self.speed, self.acceleration);
    }
}

/// TeleMetrum v2 calibration packet (type 0x0b)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetrumDataRecord {
    pub ground_pres: i32,
    pub ground_accel: i16,
    pub accel_plus_g: i16,
    pub accel_minus_g: i16,
}

impl MetrumDataRecord {
    fn decode(r: &FieldReader) -> Self {
        Self {
            ground_pres: r.int32(8),
            ground_accel: r.int16(12),
            accel_plus_g: r.int16(14),
            accel_minus_g: r.int16(16),
        }
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        let cal = listener.cal_data();
        cal.set_ground_pressure(self.ground_pres as f64);
        cal.set_ground_accel(self.ground_accel as f64);
        cal.set_accel_plus_minus(self.accel_plus_g as f64, self.accel_minus_g as f64);
    }
}

/// Mini board generation; selects the voltage dividers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiniGeneration {
    Mini2,
    Mini3,
}

/// TeleMini v2/v3 and EasyMini packet (types 0x10, 0x11)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiniRecord {
    pub generation: MiniGeneration,
    pub state: u8,
    pub v_batt: i16,
    pub sense_a: i16,
    pub sense_m: i16,
    pub pres: i32,
    pub temp: i16,
    pub acceleration: i16,
    pub speed: i16,
    pub height: i16,
    pub ground_pres: i32,
}

impl MiniRecord {
    fn decode(generation: MiniGeneration, r: &FieldReader) -> Self {
        Self {
            generation,
            state: r.uint8(5),
            v_batt: r.int16(6),
            sense_a: r.int16(8),
            sense_m: r.int16(10),
            pres: r.int32(12),
            temp: r.int16(16),
            acceleration: r.int16(18),
            speed: r.int16(20),
            height: r.int16(22),
            ground_pres: r.int32(24),
        }
    }

    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        listener.cal_data().set_ground_pressure(self.ground_pres as f64);

        let (battery, pyro): (fn(f64) -> f64, fn(f64) -> f64) = match self.generation {
            MiniGeneration::Mini2 => (tele_mini_2_voltage, tele_mini_2_voltage),
            MiniGeneration::Mini3 => (tele_mini_3_battery_voltage, tele_mini_3_pyro_voltage),
        };

        listener.update_state(FlightState::from(self.state));
        listener.set_battery_voltage(battery(self.v_batt as f64));
        listener.set_apogee_voltage(pyro(self.sense_a as f64));
        listener.set_main_voltage(pyro(self.sense_m as f64));
        listener.set_pressure(self.pres as f64);
        listener.set_temperature(self.temp as f64 / 100.0);
        provide_kalman(listener, self.height, self.speed, self.acceleration);
    }
}

/// Payload of a telemetry packet, one variant per layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    Sensor(SensorRecord),
    Configuration(ConfigurationRecord),
    Location(LocationRecord),
    Satellite(SatelliteRecord),
    Companion(CompanionRecord),
    MegaSensor(MegaSensorRecord),
    MegaData(MegaDataRecord),
    MetrumSensor(MetrumSensorRecord),
    MetrumData(MetrumDataRecord),
    Mini(MiniRecord),
}

impl RecordBody {
    fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        match self {
            RecordBody::Sensor(record) => record.provide_data(listener),
            RecordBody::Configuration(record) => record.provide_data(listener),
            RecordBody::Location(record) => record.provide_data(listener),
            RecordBody::Satellite(record) => record.provide_data(listener),
            RecordBody::Companion(record) => record.provide_data(listener),
            RecordBody::MegaSensor(record) => record.provide_data(listener),
            RecordBody::MegaData(record) => record.provide_data(listener),
            RecordBody::MetrumSensor(record) => record.provide_data(listener),
            RecordBody::MetrumData(record) => record.provide_data(listener),
            RecordBody::Mini(record) => record.provide_data(listener),
        }
    }
}

/// A decoded telemetry packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub serial: u16,
    /// 16-bit wire tick (100 Hz)
    pub tick: u16,
    pub record_type: RecordType,
    pub body: RecordBody,
    /// dBm, when received through a TeleDongle
    pub rssi: Option<i32>,
    pub lqi: Option<u8>,
}

impl TelemetryRecord {
    /// Decode a bare 32-byte packet
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The packet is not exactly 32 bytes
    /// - The type byte names no known layout
    pub fn decode(packet: &[u8]) -> Result<Self> {
        let r = FieldReader::new(packet, TELEMETRY_PACKET_LEN)?;
        let record_type = RecordType::try_from(r.uint8(4))?;

        let body = match record_type {
            RecordType::TeleMetrumSensor => RecordBody::Sensor(SensorRecord::decode(SensorKind::TeleMetrum, &r)),
            RecordType::TeleMiniSensor => RecordBody::Sensor(SensorRecord::decode(SensorKind::TeleMini, &r)),
            RecordType::TeleNanoSensor => RecordBody::Sensor(SensorRecord::decode(SensorKind::TeleNano, &r)),
            RecordType::Configuration => RecordBody::Configuration(ConfigurationRecord::decode(&r)),
            RecordType::Location => RecordBody::Location(LocationRecord::decode(&r)),
            RecordType::Satellite => RecordBody::Satellite(SatelliteRecord::decode(&r)),
            RecordType::Companion => RecordBody::Companion(CompanionRecord::decode(&r)),
            RecordType::MegaSensor => RecordBody::MegaSensor(MegaSensorRecord::decode(&r)),
            RecordType::MegaData => RecordBody::MegaData(MegaDataRecord::decode(&r)),
            RecordType::MetrumSensor => RecordBody::MetrumSensor(MetrumSensorRecord::decode(&r)),
            RecordType::MetrumData => RecordBody::MetrumData(MetrumDataRecord::decode(&r)),
            RecordType::Mini2 => RecordBody::Mini(MiniRecord::decode(MiniGeneration::Mini2, &r)),
            RecordType::Mini3 => RecordBody::Mini(MiniRecord::decode(MiniGeneration::Mini3, &r)),
        };

        Ok(Self {
            serial: r.uint16(0),
            tick: r.uint16(2),
            record_type,
            body,
            rssi: None,
            lqi: None,
        })
    }

    /// Push this record's values into `listener`
    pub fn provide_data<L: DataListener + ?Sized>(&self, listener: &mut L) {
        let cal = listener.cal_data();
        cal.set_serial(self.serial);
        let tick = cal.extend_tick(self.tick);

        listener.set_tick(tick);
        if let (Some(rssi), Some(lqi)) = (self.rssi, self.lqi) {
            listener.set_rssi(rssi, lqi);
        }
        self.body.provide_data(listener);
    }
}
