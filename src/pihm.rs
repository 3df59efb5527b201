//! # PIHM
//!
//! Converts PIHM meteorological forcing into a Cycles weather file and runs
//! the PIHM model on a prepared project directory.
//!
//! A forcing file is a sequence of blocks, each opened by a header line
//! `<Variable> <index> ...` and followed by `<day> <value>` lines.

use crate::error::{FlowError, Result};
use crate::input::RunConfig;
use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use serde::Deserialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const WEATHER_HEADER: &str =
    "YEAR  DOY     PP      TX      TN     SOLAR      RHX      RHN     WIND\n";

/// Value of `variable` for `day` in the block of forcing `index`.
///
/// The first `<day> ` line at or after the block header wins.
pub fn find_day_entry(forcing: &str, index: u32, variable: &str, day: u32) -> Option<f64> {
    let header = format!("{} {} ", variable, index);
    let prefix = format!("{} ", day);
    let mut in_block = false;
    for line in forcing.lines() {
        if line.starts_with(&header) {
            in_block = true;
        }
        if in_block && line.starts_with(&prefix) {
            return line.split_whitespace().nth(1)?.parse().ok();
        }
    }
    None
}

/// Saturation vapour pressure in kPa at `temp` °C.
pub fn satvp(temp: f64) -> f64 {
    0.6108 * (17.27 * temp / (temp + 237.3)).exp()
}

/// Dew point in °C for vapour pressure `ea` in kPa.
pub fn tdew(ea: f64) -> f64 {
    let l = (ea / 0.6108).ln();
    237.3 * l / (17.27 - l)
}

/// Daily Cycles weather values derived from one day of forcing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherDay {
    pub date: NaiveDate,
    pub precipitation: f64,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub solar: f64,
    pub max_humidity: f64,
    pub min_humidity: f64,
    pub wind: f64,
}

impl WeatherDay {
    pub fn line(&self) -> String {
        format!(
            "{}  {:6.2}  {:6.2}  {:6.2}  {:8.4}  {:8.4} {:8.4} {:6.2}\n",
            self.date.format("%Y  %j"),
            self.precipitation,
            self.max_temperature,
            self.min_temperature,
            self.solar,
            self.max_humidity,
            self.min_humidity,
            self.wind
        )
    }
}

fn entry(forcing: &str, index: u32, variable: &str, day: u32) -> Result<f64> {
    find_day_entry(forcing, index, variable, day).ok_or_else(|| {
        FlowError::invalid(format!(
            "no {} value for day {} of forcing {}",
            variable, day, index
        ))
    })
}

/// Derives one day of Cycles weather from the forcing blocks of `index`.
pub fn process_day(forcing: &str, index: u32, date: NaiveDate) -> Result<WeatherDay> {
    let day = date.ordinal0();
    let tavg = entry(forcing, index, "Temp", day)?;
    let rh = entry(forcing, index, "RH", day)?;
    let ea = rh * satvp(tavg);

    let delta_t = 17.37 * (1.01 - 1.0 / (1.0 + 3.0 * (1.0 / rh - 1.0)));
    let dew = tdew(ea);

    let tx = tavg + 0.5 * delta_t;
    let tn = tavg - 0.5 * delta_t;
    Ok(WeatherDay {
        date,
        precipitation: entry(forcing, index, "Precip", day)? * 1000.0,
        max_temperature: tx,
        min_temperature: tn,
        solar: entry(forcing, index, "RN", day)? / 1_000_000.0,
        max_humidity: if tn > dew { 100.0 * ea / satvp(tn) } else { 99.9 },
        min_humidity: if tx > dew { 100.0 * ea / satvp(tx) } else { 99.8 },
        wind: entry(forcing, index, "Wind", day)? / 86400.0,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct CroplandCell {
    #[serde(rename = "SP_ID")]
    sp_id: u32,
    #[serde(rename = "Y_c")]
    lat: f64,
    #[serde(rename = "X_c")]
    _lon: f64,
    #[serde(rename = "Zmax")]
    zmax: f64,
    #[serde(rename = "Zmin")]
    zmin: f64,
}

/// Forcing index of a mesh cell: the tenth column of its attribute line.
pub fn forcing_index(attributes: &str, cell: u32) -> Option<u32> {
    let prefix = format!("{}\t", cell);
    attributes
        .lines()
        .find(|line| line.starts_with(&prefix))
        .and_then(|line| line.split_whitespace().nth(9))
        .and_then(|token| token.parse().ok())
}

/// `pihm-to-cycles`: writes the weather file for the first cropland cell.
pub fn pihm_to_cycles<P: AsRef<Path>>(
    forcing: P,
    attributes: P,
    cropland: P,
    start: NaiveDate,
    end: NaiveDate,
    weather: P,
) -> Result<()> {
    if end < start {
        return Err(FlowError::invalid(format!("end date {} precedes start date {}", end, start)));
    }
    let mut reader = csv::Reader::from_path(cropland.as_ref())?;
    let cell: CroplandCell = reader
        .deserialize()
        .next()
        .ok_or_else(|| FlowError::invalid("cropland file has no cells"))??;
    let elevation = cell.zmax - cell.zmin;

    let attributes = fs::read_to_string(attributes)?;
    let index = forcing_index(&attributes, cell.sp_id).ok_or_else(|| {
        FlowError::invalid(format!("cell {} is not in the attribute file", cell.sp_id))
    })?;
    info!("Cell {} uses forcing {}", cell.sp_id, index);

    let forcing = fs::read_to_string(forcing)?;
    let mut content = String::new();
    writeln!(content, "LATITUDE {:.2}", cell.lat).ok();
    writeln!(content, "ALTITUDE {:.2}", elevation).ok();
    content.push_str("SCREENING_HEIGHT 2\n");
    content.push_str(WEATHER_HEADER);
    let mut days = 0;
    for date in start.iter_days().take_while(|d| *d <= end) {
        content.push_str(&process_day(&forcing, index, date)?.line());
        days += 1;
    }
    fs::write(weather.as_ref(), content)?;
    info!("Wrote {} days to {}", days, weather.as_ref().display());
    Ok(())
}

/// The single `*.para` project in `base_dir`, without its extension.
pub fn project_name<P: AsRef<Path>>(base_dir: P) -> Result<String> {
    let projects: Vec<PathBuf> = fs::read_dir(base_dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "para"))
        .collect();
    match projects.as_slice() {
        [project] => project
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| FlowError::invalid("Unable to determine project name!")),
        _ => Err(FlowError::invalid("Unable to determine project name!")),
    }
}

/// `pihm-run`: runs `executable <project>` inside `base_dir`.
pub fn run_pihm<P: AsRef<Path>, Q: AsRef<Path>>(config: P, base_dir: Q, executable: &str) -> Result<()> {
    let config = RunConfig::from_file(config)?;
    let start_year = config.mint.start_year.unwrap_or(config.mint.end_year);
    let end_year = config.mint.end_year;
    if let (Some(start), Some(end)) = (
        NaiveDate::from_ymd_opt(start_year, 1, 1),
        NaiveDate::from_ymd_opt(end_year, 12, 31),
    ) {
        debug!(
            "Simulation period {} to {} ({} minutes)",
            start,
            end,
            (end - start).num_days() * 24 * 60
        );
    }

    let project = project_name(base_dir.as_ref())?;
    info!("Running {} {}", executable, project);
    let status = Command::new(executable)
        .arg(&project)
        .current_dir(base_dir.as_ref())
        .status()?;
    if !status.success() {
        return Err(FlowError::CommandFailed(status.code().unwrap_or(-1)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORCING: &str = "\
Precip 1 365
0 0.001
1 0.002
Temp 1 365
0 20.0
1 22.0
RH 1 365
0 0.5
1 0.6
Temp 2 365
0 30.0
";

    #[test]
    fn test_find_day_entry() {
        assert_eq!(find_day_entry(FORCING, 1, "Temp", 1), Some(22.0));
        assert_eq!(find_day_entry(FORCING, 2, "Temp", 0), Some(30.0));
        assert_eq!(find_day_entry(FORCING, 1, "Precip", 0), Some(0.001));
        assert_eq!(find_day_entry(FORCING, 1, "Wind", 0), None);
    }

    #[test]
    fn test_vapour_pressure_inverse() {
        let ea = satvp(15.0);
        assert!((tdew(ea) - 15.0).abs() < 1e-9);
        assert!((satvp(0.0) - 0.6108).abs() < 1e-12);
    }

    #[test]
    fn test_forcing_index() {
        let attributes = "1\t0\t0\t0\t0\t0\t0\t0\t0\t7\n12\t1\t1\t1\t1\t1\t1\t1\t1\t3\n";
        assert_eq!(forcing_index(attributes, 12), Some(3));
        assert_eq!(forcing_index(attributes, 1), Some(7));
        assert_eq!(forcing_index(attributes, 2), None);
    }

    #[test]
    fn test_weather_line_format() {
        let day = WeatherDay {
            date: NaiveDate::from_ymd_opt(2017, 2, 1).unwrap(),
            precipitation: 1.5,
            max_temperature: 25.0,
            min_temperature: 12.25,
            solar: 18.1234,
            max_humidity: 80.0,
            min_humidity: 40.0,
            wind: 2.0,
        };
        assert_eq!(
            day.line(),
            "2017  032    1.50   25.00   12.25   18.1234   80.0000  40.0000   2.00\n"
        );
    }
}
