//! # Units Module
//!
//! Display units for decoded physical quantities.
//!
//! Every quantity stores SI internally. A [`Units`] implementation maps SI
//! to the value shown to the user in metric or imperial mode, back again,
//! and names the unit for display and for speech.
//!
//! ```
//! use altos_decode::units::{Height, Units};
//!
//! assert_eq!(Height.show_units(true), "ft");
//! assert!((Height.value(0.3048, true) - 1.0).abs() < 1e-12);
//! assert_eq!(Height.show(9, 100.0, false), "    100.0 m");
//! ```

pub mod convert;

use convert::{feet_to_meters, lb_to_n, meters_to_feet, n_to_lb, pa_to_psi, psi_to_pa};

/// A physical quantity with metric and imperial display forms
pub trait Units {
    /// SI value to display value
    fn value(&self, v: f64, imperial: bool) -> f64;

    /// Display value back to SI
    fn inverse(&self, v: f64, imperial: bool) -> f64;

    /// Short unit label
    fn show_units(&self, imperial: bool) -> &'static str;

    /// Unit name as spoken
    fn say_units(&self, imperial: bool) -> &'static str;

    /// Decimal digits to show in a field `width` characters wide
    fn show_fraction(&self, width: usize, imperial: bool) -> usize;

    /// Decimal digits to speak
    fn say_fraction(&self, _imperial: bool) -> usize {
        1
    }

    /// Format `v` right-aligned in `width` characters followed by the label
    fn show(&self, width: usize, v: f64, imperial: bool) -> String {
        let fraction = self.show_fraction(width, imperial);
        let value = self.value(v, imperial);
        let label = self.show_units(imperial);
        if label.is_empty() {
            format!("{:>width$.fraction$}", value)
        } else {
            format!("{:>width$.fraction$} {}", value, label)
        }
    }

    /// Format `v` for speech
    fn say(&self, v: f64, imperial: bool) -> String {
        let fraction = self.say_fraction(imperial);
        let value = self.value(v, imperial);
        let label = self.say_units(imperial);
        if label.is_empty() {
            format!("{:.fraction$}", value)
        } else {
            format!("{:.fraction$} {}", value, label)
        }
    }
}

/// Height in meters, shown in meters or feet
#[derive(Debug, Clone, Copy, Default)]
pub struct Height;

impl Units for Height {
    fn value(&self, v: f64, imperial: bool) -> f64 {
        if imperial { meters_to_feet(v) } else { v }
    }

    fn inverse(&self, v: f64, imperial: bool) -> f64 {
        if imperial { feet_to_meters(v) } else { v }
    }

    fn show_units(&self, imperial: bool) -> &'static str {
        if imperial { "ft" } else { "m" }
    }

    fn say_units(&self, imperial: bool) -> &'static str {
        if imperial { "feet" } else { "meters" }
    }

    fn show_fraction(&self, width: usize, _imperial: bool) -> usize {
        width / 9
    }

    fn say_fraction(&self, _imperial: bool) -> usize {
        0
    }
}

/// Pressure in pascals, shown in kPa or psi
#[derive(Debug, Clone, Copy, Default)]
pub struct Pressure;

impl Units for Pressure {
    fn value(&self, v: f64, imperial: bool) -> f64 {
        if imperial { pa_to_psi(v) } else { v / 1000.0 }
    }

    fn inverse(&self, v: f64, imperial: bool) -> f64 {
        if imperial { psi_to_pa(v) } else { v * 1000.0 }
    }

    fn show_units(&self, imperial: bool) -> &'static str {
        if imperial { "psi" } else { "kPa" }
    }

    fn say_units(&self, imperial: bool) -> &'static str {
        if imperial { "p s i" } else { "kilopascals" }
    }

    fn show_fraction(&self, width: usize, _imperial: bool) -> usize {
        width / 5
    }
}

/// Force in newtons, shown in newtons or pounds
#[derive(Debug, Clone, Copy, Default)]
pub struct Force;

impl Units for Force {
    fn value(&self, v: f64, imperial: bool) -> f64 {
        if imperial { n_to_lb(v) } else { v }
    }

    fn inverse(&self, v: f64, imperial: bool) -> f64 {
        if imperial { lb_to_n(v) } else { v }
    }

    fn show_units(&self, imperial: bool) -> &'static str {
        if imperial { "lbs" } else { "N" }
    }

    fn say_units(&self, imperial: bool) -> &'static str {
        if imperial { "pounds" } else { "newtons" }
    }

    fn show_fraction(&self, width: usize, _imperial: bool) -> usize {
        width / 9
    }
}

/// Magnetic field in gauss
///
/// The micro-tesla sub-range shows the same field scaled by 100
/// (1 G = 100 µT) and speaks whole numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gauss {
    micro_tesla: bool,
}

impl Gauss {
    pub fn new() -> Self {
        Self { micro_tesla: false }
    }

    pub fn micro_tesla() -> Self {
        Self { micro_tesla: true }
    }
}

impl Units for Gauss {
    fn value(&self, v: f64, _imperial: bool) -> f64 {
        if self.micro_tesla { v * 100.0 } else { v }
    }

    fn inverse(&self, v: f64, _imperial: bool) -> f64 {
        if self.micro_tesla { v / 100.0 } else { v }
    }

    fn show_units(&self, _imperial: bool) -> &'static str {
        if self.micro_tesla { "µT" } else { "G" }
    }

    fn say_units(&self, _imperial: bool) -> &'static str {
        if self.micro_tesla { "micro tesla" } else { "gauss" }
    }

    fn show_fraction(&self, width: usize, _imperial: bool) -> usize {
        if self.micro_tesla { width / 9 } else { width / 3 }
    }

    fn say_fraction(&self, _imperial: bool) -> usize {
        if self.micro_tesla { 0 } else { 2 }
    }
}

/// Rotation rate in degrees per second
#[derive(Debug, Clone, Copy, Default)]
pub struct RotationRate;

impl Units for RotationRate {
    fn value(&self, v: f64, _imperial: bool) -> f64 {
        v
    }

    fn inverse(&self, v: f64, _imperial: bool) -> f64 {
        v
    }

    fn show_units(&self, _imperial: bool) -> &'static str {
        "°/s"
    }

    fn say_units(&self, _imperial: bool) -> &'static str {
        "degrees per second"
    }

    fn show_fraction(&self, width: usize, _imperial: bool) -> usize {
        width / 9
    }
}

/// Pyro channel index, named `A`, `B`, `C`, ...
#[derive(Debug, Clone, Copy, Default)]
pub struct PyroName;

impl PyroName {
    /// Channel name for a zero-based channel index
    pub fn name(index: usize) -> String {
        let mut name = String::new();
        let mut n = index;
        loop {
            name.insert(0, (b'A' + (n % 26) as u8) as char);
            if n < 26 {
                break;
            }
            n = n / 26 - 1;
        }
        name
    }

    /// Channel index for a name produced by [`PyroName::name`]
    pub fn index(name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        let mut index = 0usize;
        for c in name.chars() {
            if !c.is_ascii_uppercase() {
                return None;
            }
            index = index * 26 + (c as usize - 'A' as usize + 1);
        }
        Some(index - 1)
    }
}

impl Units for PyroName {
    fn value(&self, v: f64, _imperial: bool) -> f64 {
        v
    }

    fn inverse(&self, v: f64, _imperial: bool) -> f64 {
        v
    }

    fn show_units(&self, _imperial: bool) -> &'static str {
        ""
    }

    fn say_units(&self, _imperial: bool) -> &'static str {
        ""
    }

    fn show_fraction(&self, _width: usize, _imperial: bool) -> usize {
        0
    }

    fn say_fraction(&self, _imperial: bool) -> usize {
        0
    }
}

/// Elapsed time in seconds
#[derive(Debug, Clone, Copy, Default)]
pub struct Time;

impl Units for Time {
    fn value(&self, v: f64, _imperial: bool) -> f64 {
        v
    }

    fn inverse(&self, v: f64, _imperial: bool) -> f64 {
        v
    }

    fn show_units(&self, _imperial: bool) -> &'static str {
        "s"
    }

    fn say_units(&self, _imperial: bool) -> &'static str {
        "seconds"
    }

    fn show_fraction(&self, width: usize, _imperial: bool) -> usize {
        if width < 5 { 0 } else { 1 }
    }

    fn say_fraction(&self, _imperial: bool) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_units() -> Vec<Box<dyn Units>> {
        vec![
            Box::new(Height),
            Box::new(Pressure),
            Box::new(Force),
            Box::new(Gauss::new()),
            Box::new(Gauss::micro_tesla()),
            Box::new(RotationRate),
            Box::new(PyroName),
            Box::new(Time),
        ]
    }

    #[test]
    fn test_inverse_round_trip() {
        let samples = [-1234.5, -1.0, 0.0, 0.001, 1.0, 98.6, 101325.0, 1.0e7];
        for units in all_units() {
            for imperial in [false, true] {
                for &v in &samples {
                    let back = units.inverse(units.value(v, imperial), imperial);
                    let tolerance = 1e-9 * v.abs().max(1.0);
                    assert!(
                        (back - v).abs() <= tolerance,
                        "{} round trip of {} gave {}",
                        units.show_units(imperial),
                        v,
                        back
                    );
                }
            }
        }
    }

    #[test]
    fn test_pressure_values() {
        assert!((Pressure.value(101325.0, false) - 101.325).abs() < 1e-9);
        assert!((Pressure.value(101325.0, true) - 14.6959).abs() < 1e-4);
        assert_eq!(Pressure.show_units(false), "kPa");
        assert_eq!(Pressure.show_units(true), "psi");
    }

    #[test]
    fn test_force_values() {
        assert!((Force.value(4.4482216152605, true) - 1.0).abs() < 1e-12);
        assert_eq!(Force.value(10.0, false), 10.0);
        assert_eq!(Force.say_units(true), "pounds");
    }

    #[test]
    fn test_gauss_sub_range() {
        assert_eq!(Gauss::new().value(0.5, false), 0.5);
        assert_eq!(Gauss::micro_tesla().value(0.5, false), 50.0);
        assert_eq!(Gauss::micro_tesla().show_units(true), "µT");
        assert_eq!(Gauss::micro_tesla().say_fraction(false), 0);
        assert_ne!(Gauss::new().say_fraction(false), 0);
    }

    #[test]
    fn test_say_fraction_differs_from_show_fraction() {
        assert_eq!(Time.say_fraction(false), 0);
        assert_eq!(Time.show_fraction(8, false), 1);
        assert_eq!(Time.say(12.75, false), "13 seconds");
    }

    #[test]
    fn test_show_formatting() {
        assert_eq!(Height.show(9, 100.0, false), "    100.0 m");
        assert_eq!(Height.show(4, 0.3048, true), "   1 ft");
        assert_eq!(Height.say(1000.0, true), "3281 feet");
        assert_eq!(PyroName.show(3, 2.0, false), "  2");
    }

    #[test]
    fn test_pyro_names() {
        assert_eq!(PyroName::name(0), "A");
        assert_eq!(PyroName::name(3), "D");
        assert_eq!(PyroName::name(25), "Z");
        assert_eq!(PyroName::name(26), "AA");
        for i in 0..60 {
            assert_eq!(PyroName::index(&PyroName::name(i)), Some(i));
        }
        assert_eq!(PyroName::index(""), None);
        assert_eq!(PyroName::index("a"), None);
    }
}
