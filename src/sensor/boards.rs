//! ADC field sets, one per board family

use serde::Serialize;

use super::AdcFields;

/// TeleMetrum v1 ADC reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeleMetrumAdc {
    pub tick: i32,
    pub accel: i32,
    pub pres: i32,
    pub temp: i32,
    pub batt: i32,
    pub drogue: i32,
    pub main: i32,
}

impl AdcFields for TeleMetrumAdc {
    fn set(&mut self, key: &str, value: i32) -> bool {
        let field = match key {
            "tick" => &mut self.tick,
            "accel" => &mut self.accel,
            "pres" => &mut self.pres,
            "temp" => &mut self.temp,
            "batt" => &mut self.batt,
            "drogue" => &mut self.drogue,
            "main" => &mut self.main,
            _ => return false,
        };
        *field = value;
        true
    }
}

/// TeleMini and EasyMini ADC reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeleMiniAdc {
    pub tick: i32,
    pub apogee: i32,
    pub main: i32,
    pub batt: i32,
}

impl AdcFields for TeleMiniAdc {
    fn set(&mut self, key: &str, value: i32) -> bool {
        let field = match key {
            "tick" => &mut self.tick,
            "apogee" => &mut self.apogee,
            "main" => &mut self.main,
            "batt" => &mut self.batt,
            _ => return false,
        };
        *field = value;
        true
    }
}

/// TeleMega and EasyMega ADC reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeleMegaAdc {
    pub tick: i32,
    pub batt: i32,
    pub pyro: i32,
    /// Igniters A through D
    pub sense: [i32; 4],
    pub apogee: i32,
    pub main: i32,
}

impl AdcFields for TeleMegaAdc {
    fn set(&mut self, key: &str, value: i32) -> bool {
        let field = match key {
            "tick" => &mut self.tick,
            "batt" => &mut self.batt,
            "pyro" => &mut self.pyro,
            "A" => &mut self.sense[0],
            "B" => &mut self.sense[1],
            "C" => &mut self.sense[2],
            "D" => &mut self.sense[3],
            "apogee" | "drogue" => &mut self.apogee,
            "main" => &mut self.main,
            _ => return false,
        };
        *field = value;
        true
    }
}

/// TeleGPS ADC reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeleGpsAdc {
    pub tick: i32,
    pub batt: i32,
}

impl AdcFields for TeleGpsAdc {
    fn set(&mut self, key: &str, value: i32) -> bool {
        let field = match key {
            "tick" => &mut self.tick,
            "batt" => &mut self.batt,
            _ => return false,
        };
        *field = value;
        true
    }
}
