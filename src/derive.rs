//! # Derived Variables
//!
//! Steps that add a variable computed from ones already in the store, plus
//! the two steps that re-encode time and values for model input.

use crate::cftime::TimeUnits;
use crate::error::{FlowError, Result};
use crate::store::{StoredVariable, Values, VariableStore};
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const PRECIPITATION_RATE: &str = "Precipitation rate";
pub const RELATIVE_HUMIDITY: &str = "Relative Humidity";
pub const WIND_SPEED: &str = "Wind Speed";
pub const WIND_HEIGHT: &str = "Wind reference height";
pub const DATES: &str = "dates";

fn zip_same_shape(a: &StoredVariable, a_name: &str, b: &StoredVariable, b_name: &str) -> Result<()> {
    if a.len() != b.len() {
        return Err(FlowError::ShapeMismatch(format!(
            "'{}' has {} values but '{}' has {}",
            a_name,
            a.len(),
            b_name,
            b.len()
        )));
    }
    Ok(())
}

/// Adds the precipitation rate in mm/hr from an accumulated amount in metres.
pub fn add_precipitation_rate(store: &mut VariableStore, source: &str, hours: f64) -> Result<()> {
    if hours <= 0.0 {
        return Err(FlowError::invalid(format!(
            "accumulation period must be positive, got {}",
            hours
        )));
    }
    let amount = store.get(source)?;
    let rate: Vec<f64> = amount
        .as_numeric(source)?
        .iter()
        .map(|v| 1000.0 * v / hours)
        .collect();
    let variable = StoredVariable::numeric(rate, amount.shape.clone(), "mm/hr")
        .with_notes(&format!("converted from amount, {}", source));
    store.insert(PRECIPITATION_RATE, variable);
    Ok(())
}

/// Relative humidity in percent from dewpoint and air temperature.
///
/// Both temperatures must share a unit; the Magnus coefficients assume °C.
pub fn relative_humidity(dewpoint: f64, temperature: f64) -> f64 {
    let magnus = |t: f64| (17.625 * t / (243.04 + t)).exp();
    100.0 * magnus(dewpoint) / magnus(temperature)
}

pub fn add_relative_humidity(store: &mut VariableStore, dewpoint: &str, temperature: &str) -> Result<()> {
    let td = store.get(dewpoint)?;
    let t = store.get(temperature)?;
    zip_same_shape(td, dewpoint, t, temperature)?;
    let rh: Vec<f64> = td
        .as_numeric(dewpoint)?
        .iter()
        .zip(t.as_numeric(temperature)?)
        .map(|(d, t)| relative_humidity(*d, *t))
        .collect();
    let variable = StoredVariable::numeric(rh, t.shape.clone(), "NA");
    store.insert(RELATIVE_HUMIDITY, variable);
    Ok(())
}

/// First run of digits in a variable name, e.g. `10` in `10 metre U wind component`.
pub fn reference_height(name: &str) -> Option<u32> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits: String = name[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub fn add_wind_speed(store: &mut VariableStore, u_name: &str, v_name: &str) -> Result<()> {
    let u = store.get(u_name)?;
    let v = store.get(v_name)?;
    zip_same_shape(u, u_name, v, v_name)?;
    let speed: Vec<f64> = u
        .as_numeric(u_name)?
        .iter()
        .zip(v.as_numeric(v_name)?)
        .map(|(u, v)| u.hypot(*v))
        .collect();
    let speed = StoredVariable::numeric(speed, v.shape.clone(), &v.units);
    let height = reference_height(u_name).ok_or_else(|| {
        FlowError::invalid(format!("no reference height in variable name '{}'", u_name))
    })?;
    store.insert(WIND_SPEED, speed);
    store.insert(WIND_HEIGHT, StoredVariable::scalar(height as f64, "m"));
    Ok(())
}

/// Decodes the time variable into ISO timestamps stored under `dates`.
pub fn add_dates(store: &mut VariableStore, time_var: &str, calendar: &str) -> Result<()> {
    let time = store.get(time_var)?;
    let units: TimeUnits = time.units.parse()?;
    let dates: Vec<String> = units
        .decode_all(time.as_numeric(time_var)?)?
        .iter()
        .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
        .collect();
    debug!("Decoded {} time steps with units '{}'", dates.len(), units);
    let variable = StoredVariable {
        values: Values::Text(dates),
        shape: time.shape.clone(),
        dimensions: time.dimensions.clone(),
        units: "NA".to_string(),
        standard_name: None,
        missing_value: None,
        notes: None,
        calendar: Some(calendar.to_string()),
    };
    store.insert(DATES, variable);
    Ok(())
}

/// Writes values as raw native-endian float32.
pub fn write_f32<W: Write>(values: &[f64], writer: &mut W) -> Result<()> {
    for v in values {
        writer.write_all(&(*v as f32).to_ne_bytes())?;
    }
    Ok(())
}

/// `amount-to-rate`
pub fn amount_to_rate<P: AsRef<Path>>(input: P, output: P, source: &str, hours: f64) -> Result<()> {
    let mut store = VariableStore::load(input)?;
    add_precipitation_rate(&mut store, source, hours)?;
    store.save(output)
}

/// `calculate-rh`
pub fn calculate_rh<P: AsRef<Path>>(input: P, output: P, dewpoint: &str, temperature: &str) -> Result<()> {
    let mut store = VariableStore::load(input)?;
    add_relative_humidity(&mut store, dewpoint, temperature)?;
    store.save(output)
}

/// `calculate-wind`
pub fn calculate_wind<P: AsRef<Path>>(input: P, output: P, u_name: &str, v_name: &str) -> Result<()> {
    let mut store = VariableStore::load(input)?;
    add_wind_speed(&mut store, u_name, v_name)?;
    store.save(output)
}

/// `adjust-time`
pub fn adjust_time<P: AsRef<Path>>(input: P, calendar: &str, output: P, time_var: &str) -> Result<()> {
    let mut store = VariableStore::load(input)?;
    add_dates(&mut store, time_var, calendar)?;
    store.save(output)
}

/// `adjust-format`: one binary file per listed variable, in list order.
pub fn adjust_format<P: AsRef<Path>, Q: AsRef<Path>>(input: P, variables: &[String], outputs: &[Q]) -> Result<()> {
    if variables.len() != outputs.len() {
        return Err(FlowError::invalid(format!(
            "{} variables listed but {} output files given",
            variables.len(),
            outputs.len()
        )));
    }
    let store = VariableStore::load(input)?;
    for (name, path) in variables.iter().zip(outputs) {
        let values = store.get(name)?.as_numeric(name)?;
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        write_f32(values, &mut writer)?;
        writer.flush()?;
        info!(
            "Wrote {} float32 values of '{}' to {}",
            values.len(),
            name,
            path.as_ref().display()
        );
    }
    Ok(())
}
