//! Unit conversions used by `adjust-units`.
//!
//! Every supported conversion is linear: `to = from * factor + offset`.

use crate::error::{FlowError, Result};

/// A linear conversion between two units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub factor: f64,
    pub offset: f64,
}

impl Conversion {
    const fn scale(factor: f64) -> Self {
        Conversion {
            factor,
            offset: 0.0,
        }
    }

    const fn shift(offset: f64) -> Self {
        Conversion {
            factor: 1.0,
            offset,
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        value * self.factor + self.offset
    }
}

fn canonical(unit: &str) -> String {
    let unit = unit.trim().to_lowercase();
    match unit.as_str() {
        "kelvin" | "k" | "degk" | "deg k" => "k".to_string(),
        "celsius" | "c" | "degc" | "deg c" | "degrees c" | "degree_celsius" | "°c" => {
            "c".to_string()
        }
        "pascal" | "pa" => "pa".to_string(),
        "hectopascal" | "hpa" => "hpa".to_string(),
        "millibar" | "mbar" | "mb" => "mbar".to_string(),
        "kilopascal" | "kpa" => "kpa".to_string(),
        "metre" | "meter" | "metres" | "meters" | "m" => "m".to_string(),
        "millimetre" | "millimeter" | "mm" => "mm".to_string(),
        "kg m-2 s-1" | "kg m**-2 s**-1" | "kg/m2/s" | "kg m^-2 s^-1" => "kg m-2 s-1".to_string(),
        "mm/s" | "mm s-1" => "mm/s".to_string(),
        "mm/hr" | "mm/h" | "mm hr-1" | "mm h-1" => "mm/hr".to_string(),
        "mm/day" | "mm/d" | "mm day-1" | "mm d-1" => "mm/day".to_string(),
        other => other.to_string(),
    }
}

/// Looks up the conversion from `from` to `to` for the named variable.
pub fn conversion(variable: &str, from: &str, to: &str) -> Result<Conversion> {
    let (f, t) = (canonical(from), canonical(to));
    if f == t {
        return Ok(Conversion::scale(1.0));
    }
    let conversion = match (f.as_str(), t.as_str()) {
        ("pa", "mbar") | ("pa", "hpa") => Conversion::scale(0.01),
        ("mbar", "pa") | ("hpa", "pa") => Conversion::scale(100.0),
        ("mbar", "hpa") | ("hpa", "mbar") => Conversion::scale(1.0),
        ("pa", "kpa") => Conversion::scale(0.001),
        ("kpa", "pa") => Conversion::scale(1000.0),
        ("kpa", "mbar") | ("kpa", "hpa") => Conversion::scale(10.0),
        ("mbar", "kpa") | ("hpa", "kpa") => Conversion::scale(0.1),
        ("k", "c") => Conversion::shift(-273.15),
        ("c", "k") => Conversion::shift(273.15),
        ("m", "mm") => Conversion::scale(1000.0),
        ("mm", "m") => Conversion::scale(0.001),
        // 1 kg of water over 1 m2 is 1 mm
        ("kg m-2 s-1", "mm/s") => Conversion::scale(1.0),
        ("kg m-2 s-1", "mm/hr") => Conversion::scale(3600.0),
        ("kg m-2 s-1", "mm/day") => Conversion::scale(86400.0),
        ("mm/s", "mm/hr") => Conversion::scale(3600.0),
        ("mm/hr", "mm/day") => Conversion::scale(24.0),
        ("mm/day", "mm/hr") => Conversion::scale(1.0 / 24.0),
        _ => {
            return Err(FlowError::UnsupportedConversion {
                variable: variable.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
    };
    Ok(conversion)
}
