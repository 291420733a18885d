//! # Sensor Conversions
//!
//! Raw sensor counts to SI values, plus the metric/imperial factors used by
//! the display units.
//!
//! Every board generation wires its sensors through a different ADC and
//! voltage divider, so each has its own conversion here. The functions are
//! pure; the caller picks the one matching the hardware that produced the
//! record.

/// Standard gravity in m/s²
pub const GRAVITY: f64 = 9.80665;

/// Feet per meter denominator
const METERS_PER_FOOT: f64 = 0.3048;

/// Pascals in one pound per square inch
const PA_PER_PSI: f64 = 6894.757293168;

/// Newtons in one pound-force
const N_PER_LB: f64 = 4.4482216152605;

/// Reference supply of the 12-bit and 16-bit ADCs
const ADC_SUPPLY: f64 = 3.3;

/// Largest 12-bit ADC reading
pub const ADC_12_MAX: f64 = 4095.0;

/// Largest positive 16-bit ADC reading
pub const ADC_16_MAX: f64 = 32767.0;

/// Nominal accelerometer scale used before ±1g calibration is known
const NOMINAL_COUNTS_PER_G: f64 = 264.8;

/// Lowest pressure the atmosphere model handles, in Pa
const MINIMUM_PRESSURE: f64 = 0.3734;

/// Top of the atmosphere model, in m
const MAXIMUM_ALTITUDE: f64 = 84852.0;

const LAYER0_BASE_TEMPERATURE: f64 = 288.15;
const LAYER0_BASE_PRESSURE: f64 = 101325.0;
const AIR_GAS_CONSTANT: f64 = 287.053;

/// Base altitude of each atmosphere layer, with the model ceiling last
const BASE_ALTITUDE: [f64; 8] = [
    0.0, 11000.0, 20000.0, 32000.0, 47000.0, 51000.0, 71000.0, MAXIMUM_ALTITUDE,
];

/// Temperature lapse rate of each layer in K/m
const LAPSE_RATE: [f64; 7] = [-0.0065, 0.0, 0.001, 0.0028, 0.0, -0.0028, -0.002];

pub fn meters_to_feet(meters: f64) -> f64 {
    meters / METERS_PER_FOOT
}

pub fn feet_to_meters(feet: f64) -> f64 {
    feet * METERS_PER_FOOT
}

pub fn pa_to_psi(pa: f64) -> f64 {
    pa / PA_PER_PSI
}

pub fn psi_to_pa(psi: f64) -> f64 {
    psi * PA_PER_PSI
}

pub fn n_to_lb(n: f64) -> f64 {
    n / N_PER_LB
}

pub fn lb_to_n(lb: f64) -> f64 {
    lb * N_PER_LB
}

pub fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Pressure ratio across `delta_z` meters of one layer
fn layer_pressure_ratio(layer: usize, base_temperature: f64, delta_z: f64) -> f64 {
    let lapse = LAPSE_RATE[layer];
    if lapse == 0.0 {
        (-GRAVITY * delta_z / AIR_GAS_CONSTANT / base_temperature).exp()
    } else {
        let base = lapse * delta_z / base_temperature + 1.0;
        base.powf(-GRAVITY / (AIR_GAS_CONSTANT * lapse))
    }
}

/// Convert an altitude above sea level to pressure in the standard atmosphere
///
/// Altitudes above the model ceiling return 0 Pa.
pub fn altitude_to_pressure(altitude: f64) -> f64 {
    if altitude > MAXIMUM_ALTITUDE {
        return 0.0;
    }

    let mut base_temperature = LAYER0_BASE_TEMPERATURE;
    let mut base_pressure = LAYER0_BASE_PRESSURE;
    let mut layer = 0;

    while layer < LAPSE_RATE.len() - 1 && altitude > BASE_ALTITUDE[layer + 1] {
        let delta_z = BASE_ALTITUDE[layer + 1] - BASE_ALTITUDE[layer];
        base_pressure *= layer_pressure_ratio(layer, base_temperature, delta_z);
        base_temperature += delta_z * LAPSE_RATE[layer];
        layer += 1;
    }

    let delta_z = altitude - BASE_ALTITUDE[layer];
    base_pressure * layer_pressure_ratio(layer, base_temperature, delta_z)
}

/// Convert pressure to altitude above sea level in the standard atmosphere
///
/// Returns `None` for non-positive pressure.
pub fn pressure_to_altitude(pressure: f64) -> Option<f64> {
    if pressure <= 0.0 {
        return None;
    }
    if pressure < MINIMUM_PRESSURE {
        return Some(MAXIMUM_ALTITUDE);
    }

    let mut next_base_temperature = LAYER0_BASE_TEMPERATURE;
    let mut next_base_pressure = LAYER0_BASE_PRESSURE;
    let mut base_temperature;
    let mut base_pressure;
    let mut layer = 0;

    loop {
        base_pressure = next_base_pressure;
        base_temperature = next_base_temperature;
        let delta_z = BASE_ALTITUDE[layer + 1] - BASE_ALTITUDE[layer];
        next_base_pressure *= layer_pressure_ratio(layer, base_temperature, delta_z);
        next_base_temperature += delta_z * LAPSE_RATE[layer];

        if layer >= LAPSE_RATE.len() - 1 || pressure >= next_base_pressure {
            break;
        }
        layer += 1;
    }

    let lapse = LAPSE_RATE[layer];
    let altitude = if lapse == 0.0 {
        let coefficient = (AIR_GAS_CONSTANT / -GRAVITY) * base_temperature;
        BASE_ALTITUDE[layer] + coefficient * (pressure / base_pressure).ln()
    } else {
        let exponent = AIR_GAS_CONSTANT * lapse / -GRAVITY;
        let coefficient = base_temperature / lapse;
        BASE_ALTITUDE[layer] + coefficient * ((pressure / base_pressure).powf(exponent) - 1.0)
    };

    Some(altitude)
}

/// MPX4115 barometer on the CC1111 ADC (counts are left-justified by 4 bits)
pub fn barometer_to_pressure(count: f64) -> f64 {
    ((count / 16.0) / 2047.0 + 0.095) / 0.009 * 1000.0
}

/// Inverse of [`barometer_to_pressure`]
pub fn pressure_to_barometer(pressure: f64) -> f64 {
    (pressure / 1000.0 * 0.009 - 0.095) * 2047.0 * 16.0
}

/// CC1111 internal temperature sensor, in °C
pub fn thermometer_to_temperature(thermo: f64) -> f64 {
    (thermo - 19791.268) / 32728.0 * 1.25 / 0.00247
}

pub fn cc_battery_to_voltage(battery: f64) -> f64 {
    battery / ADC_16_MAX * 5.0
}

pub fn cc_igniter_to_voltage(ignite: f64) -> f64 {
    ignite / ADC_16_MAX * 15.0
}

pub fn tele_mini_2_voltage(sensor: f64) -> f64 {
    sensor / ADC_16_MAX * ADC_SUPPLY * 127.0 / 27.0
}

pub fn tele_mini_3_battery_voltage(v_batt: f64) -> f64 {
    v_batt / ADC_12_MAX * ADC_SUPPLY * (5.6 + 10.0) / 10.0
}

pub fn tele_mini_3_pyro_voltage(v_pyro: f64) -> f64 {
    v_pyro / ADC_12_MAX * ADC_SUPPLY * (100.0 + 27.0) / 27.0
}

pub fn mega_battery_voltage(v_batt: f64) -> f64 {
    v_batt / ADC_12_MAX * ADC_SUPPLY * (5.6 + 10.0) / 10.0
}

pub fn mega_pyro_voltage(raw: f64) -> f64 {
    raw / ADC_12_MAX * ADC_SUPPLY * (100.0 + 27.0) / 27.0
}

pub fn metrum_voltage(raw: f64) -> f64 {
    raw / ADC_12_MAX * ADC_SUPPLY * (5.6 + 10.0) / 10.0
}

/// First TeleGPS board: 16-bit scaled battery reading
pub fn tele_gps_1_voltage(raw: f64) -> f64 {
    raw / ADC_16_MAX * ADC_SUPPLY * (5.6 + 10.0) / 10.0
}

/// Later TeleGPS boards: raw 12-bit battery reading
pub fn tele_gps_2_voltage(raw: f64) -> f64 {
    raw / ADC_12_MAX * ADC_SUPPLY * (5.6 + 10.0) / 10.0
}

/// TeleGPS battery voltage
///
/// A reading above the 12-bit ADC range can only come from the first board
/// revision, which reports a 16-bit scaled value.
pub fn tele_gps_voltage(raw: f64) -> f64 {
    if raw > ADC_12_MAX {
        tele_gps_1_voltage(raw)
    } else {
        tele_gps_2_voltage(raw)
    }
}

/// Convert a raw single-axis accelerometer reading to m/s²
///
/// With both ±1g points the two-point curve is used. Without them the
/// reading is taken relative to the pad reading with a nominal scale.
/// Returns `None` when neither reference is known.
pub fn acceleration_from_sensor(
    sensor: f64,
    plus_g: Option<f64>,
    minus_g: Option<f64>,
    ground: Option<f64>,
) -> Option<f64> {
    match (plus_g, minus_g) {
        (Some(plus_g), Some(minus_g)) if minus_g != plus_g => {
            let counts_per_mss = (minus_g - plus_g) / 2.0 / GRAVITY;
            let zero = ground.unwrap_or(plus_g);
            Some((zero - sensor) / counts_per_mss)
        }
        _ => ground.map(|ground| (ground - sensor) / NOMINAL_COUNTS_PER_G * GRAVITY),
    }
}

/// MPU6000 accelerometer at ±16g, in m/s²
pub fn mpu6000_accel(counts: f64) -> f64 {
    counts / 2048.0 * GRAVITY
}

/// MPU6000 gyro at ±2000°/s, in °/s
pub fn mpu6000_gyro(counts: f64) -> f64 {
    counts / 16.4
}

/// HMC5883 magnetometer at the default gain, in gauss
pub fn hmc5883_gauss(counts: f64) -> f64 {
    counts / 1090.0
}
