//! # FLDAS and the Weather Generator
//!
//! `fldas-to-wgen` turns FLDAS reanalysis into the monthly station table the
//! weather generator reads. A seasonal climatology picks the historical year
//! whose rainfall sits at the requested level, and that year's daily files
//! are summarised per grid cell.
//!
//! `wgen-to-fldas` goes the other way: the generated daily station series are
//! written back as FLDAS-like daily NetCDF files on a 0.1° grid.

use crate::cftime::TimeUnits;
use crate::dataset::{
    BoundingBox, attr_string, exclusive_range, inclusive_range,
    list_nc_files, list_subdirs, missing_sentinels, read_coordinate, unpack, value_as_f64, variable,
};
use crate::error::{FlowError, Result};
use crate::numeric::{format_float, mask_sentinels, nanmax, nanmean, nanmin, nansum, round_half_even, round_to};
use chrono::{Datelike, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use ndarray::{Array3, Axis};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::{Range, RangeInclusive};
use std::path::{Path, PathBuf};

/// Years covered by the daily FLDAS archive.
pub const DAILY_YEARS: RangeInclusive<i32> = 2001..=2016;
/// Density of water in kg m-3.
pub const RHO_W: f64 = 997.0;
pub const GRID_STEP: f64 = 0.1;
pub const MISSING_VALUE: f64 = -9999.0;
const MAX_STATION_ID: usize = 99_999;

pub const WGEN_HEADER: [&str; 11] = [
    "station id",
    "lon",
    "lat",
    "year",
    "month",
    "min. temperature",
    "max. temperature",
    "cloud fraction",
    "wind speed",
    "precipitation",
    "wet",
];

/// Inputs of `fldas-to-wgen`.
#[derive(Debug, Clone)]
pub struct WgenRequest {
    pub monthly_dir: PathBuf,
    pub daily_dir: PathBuf,
    pub variable: String,
    pub bbox: BoundingBox,
    pub min_month: u32,
    pub max_month: u32,
    pub level: f64,
    pub available_years: RangeInclusive<i32>,
}

impl WgenRequest {
    pub fn validate(&self) -> Result<()> {
        if self.min_month >= self.max_month {
            return Err(FlowError::invalid(format!(
                "minimum month {} must be below maximum month {}",
                self.min_month, self.max_month
            )));
        }
        if self.min_month < 1 || self.max_month > 12 {
            return Err(FlowError::invalid("months must lie between 1 and 12"));
        }
        if !(0.0..=1.0).contains(&self.level) {
            return Err(FlowError::invalid(format!(
                "level {} must lie between 0 and 1",
                self.level
            )));
        }
        Ok(())
    }

    fn season(&self) -> RangeInclusive<u32> {
        self.min_month..=self.max_month
    }
}

/// Yearly seasonal mean of a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearMean {
    pub year: i32,
    pub value: f64,
}

/// Missing-value flags of a FLDAS file: the global flag plus the variable's own.
fn fldas_sentinels(file: &netcdf::File, var: &netcdf::Variable) -> Vec<f64> {
    let mut sentinels = missing_sentinels(var);
    if let Some(flag) = file
        .attribute("missing_value")
        .and_then(|a| a.value().ok())
        .and_then(|v| value_as_f64(&v))
    {
        sentinels.push(flag);
    }
    sentinels
}

fn read_box(
    file: &netcdf::File,
    name: &str,
    y_range: &Range<usize>,
    x_range: &Range<usize>,
) -> Result<Array3<f64>> {
    let var = variable(file, name)?;
    let nt = var.dimensions().first().map(|d| d.len()).unwrap_or(1);
    let mut values = var.get_values::<f64, _>((0..nt, y_range.clone(), x_range.clone()))?;
    mask_sentinels(&mut values, &fldas_sentinels(file, &var));
    unpack(&var, &mut values);
    Ok(Array3::from_shape_vec((nt, y_range.len(), x_range.len()), values)?)
}

fn first_timestamp(file: &netcdf::File) -> Result<NaiveDate> {
    let time = variable(file, "time")?;
    let units: TimeUnits = attr_string(&time, "units")
        .ok_or_else(|| FlowError::AttributeNotFound {
            owner: "time".to_string(),
            attribute: "units".to_string(),
        })?
        .parse()?;
    let first = time
        .get_values::<f64, _>(..)?
        .first()
        .copied()
        .ok_or_else(|| FlowError::invalid("time variable is empty"))?;
    Ok(units.decode(first)?.date())
}

fn check_overlap(x: &[f64], y: &[f64], bbox: &BoundingBox) -> Result<()> {
    let checks = [
        (bbox.min_lat < nanmax(y.iter().copied()), "Minimum latitude out of range"),
        (bbox.max_lat > nanmin(y.iter().copied()), "Maximum latitude out of range"),
        (bbox.min_lon < nanmax(x.iter().copied()), "Minimum longitude out of range"),
        (bbox.max_lon > nanmin(x.iter().copied()), "Maximum longitude out of range"),
    ];
    for (ok, message) in checks {
        if !ok {
            return Err(FlowError::invalid(message));
        }
    }
    Ok(())
}

/// Seasonal climatology from the monthly files, sorted by ascending value.
///
/// Each file contributes the mean of `variable` over the cells strictly
/// inside the box; a year's value is the mean over its season months.
pub fn climatology(request: &WgenRequest) -> Result<Vec<YearMean>> {
    let mut files = Vec::new();
    for dir in list_subdirs(&request.monthly_dir)? {
        files.extend(list_nc_files(&dir)?);
    }
    if files.is_empty() {
        return Err(FlowError::NoDatasets(request.monthly_dir.clone()));
    }

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_message("Scanning monthly files");

    let season = request.season();
    let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for path in &files {
        progress.inc(1);
        let file = netcdf::open(path)?;
        let date = first_timestamp(&file)?;
        if !season.contains(&date.month()) {
            continue;
        }
        let x = read_coordinate(&file, "X")?;
        let y = read_coordinate(&file, "Y")?;
        check_overlap(&x, &y, &request.bbox)?;
        let x_range = exclusive_range(&x, request.bbox.min_lon, request.bbox.max_lon)
            .ok_or_else(|| FlowError::invalid("no longitude strictly inside the box"))?;
        let y_range = exclusive_range(&y, request.bbox.min_lat, request.bbox.max_lat)
            .ok_or_else(|| FlowError::invalid("no latitude strictly inside the box"))?;
        let data = read_box(&file, &request.variable, &y_range, &x_range)?;
        let mean = nanmean(data.iter().copied());
        debug!("{}: {}-{:02} mean {}", path.display(), date.year(), date.month(), mean);
        by_year.entry(date.year()).or_default().push(mean);
    }
    progress.finish_and_clear();

    let mut means: Vec<YearMean> = by_year
        .into_iter()
        .map(|(year, values)| YearMean {
            year,
            value: nanmean(values),
        })
        .collect();
    means.sort_by(|a, b| a.value.total_cmp(&b.value));
    info!("Climatology covers {} years", means.len());
    Ok(means)
}

/// Picks the comparison year: the year at rank `round(level * n)` of the
/// sorted climatology, moved to the nearest rank whose year is available.
pub fn find_year(sorted: &[YearMean], level: f64, available: &RangeInclusive<i32>) -> Result<i32> {
    if sorted.is_empty() {
        return Err(FlowError::invalid("climatology is empty"));
    }
    let rank = (round_half_even(level * sorted.len() as f64) as usize).clamp(1, sorted.len());
    let start = rank - 1;

    let up = (start..sorted.len()).find(|&i| available.contains(&sorted[i].year));
    let down = (0..=start).rev().find(|&i| available.contains(&sorted[i].year));

    let index = match (down, up) {
        (Some(d), Some(u)) => {
            if start - d < u - start {
                d
            } else {
                u
            }
        }
        (Some(d), None) => d,
        (None, Some(u)) => u,
        (None, None) => return Err(FlowError::YearNotAvailable(sorted[start].year)),
    };
    Ok(sorted[index].year)
}

/// One row of the weather generator input table.
#[derive(Debug, Clone, PartialEq)]
pub struct StationMonth {
    pub station_id: String,
    pub lon: f64,
    pub lat: f64,
    pub year: i32,
    pub month: u32,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub cloud_fraction: f64,
    pub wind_speed: f64,
    pub precipitation: f64,
    pub wet_days: usize,
}

impl StationMonth {
    fn record(&self) -> Vec<String> {
        vec![
            self.station_id.clone(),
            format_float(round_to(self.lon, 2)),
            format_float(round_to(self.lat, 2)),
            self.year.to_string(),
            self.month.to_string(),
            format_float(round_to(self.min_temperature, 2)),
            format_float(round_to(self.max_temperature, 2)),
            format_float(self.cloud_fraction),
            format_float(round_to(self.wind_speed, 2)),
            format_float(round_to(self.precipitation, 2)),
            self.wet_days.to_string(),
        ]
    }
}

pub fn station_id(index: usize) -> Result<String> {
    if index > MAX_STATION_ID {
        return Err(FlowError::invalid("Station_ID index out of bounds"));
    }
    Ok(format!("FLDAS_{:05}", index))
}

/// Daily grids of one month, concatenated along time.
struct DailyMonth {
    x: Vec<f64>,
    y: Vec<f64>,
    temperature: Array3<f64>,
    wind: Array3<f64>,
    rain: Array3<f64>,
}

fn read_daily_month(dir: &Path, bbox: &BoundingBox) -> Result<DailyMonth> {
    let files = list_nc_files(dir)?;
    if files.is_empty() {
        return Err(FlowError::NoDatasets(dir.to_path_buf()));
    }
    let mut month: Option<DailyMonth> = None;
    for path in &files {
        let file = netcdf::open(path)?;
        let x = read_coordinate(&file, "X")?;
        let y = read_coordinate(&file, "Y")?;
        let x_range = inclusive_range(&x, bbox.min_lon, bbox.max_lon)
            .ok_or_else(|| FlowError::invalid(format!("no longitude inside {}", bbox)))?;
        let y_range = inclusive_range(&y, bbox.min_lat, bbox.max_lat)
            .ok_or_else(|| FlowError::invalid(format!("no latitude inside {}", bbox)))?;
        let temperature = read_box(&file, "Tair_f_tavg", &y_range, &x_range)?;
        let wind = read_box(&file, "Wind_f_tavg", &y_range, &x_range)?;
        let rain = read_box(&file, "Rainf_f_tavg", &y_range, &x_range)?;
        match month.as_mut() {
            None => {
                month = Some(DailyMonth {
                    x: x[x_range].to_vec(),
                    y: y[y_range].to_vec(),
                    temperature,
                    wind,
                    rain,
                });
            }
            Some(m) => {
                m.temperature.append(Axis(0), temperature.view())?;
                m.wind.append(Axis(0), wind.view())?;
                m.rain.append(Axis(0), rain.view())?;
            }
        }
    }
    month.ok_or_else(|| FlowError::NoDatasets(dir.to_path_buf()))
}

/// Summarises the daily files of `year` into one row per month and cell.
pub fn station_months(request: &WgenRequest, year: i32) -> Result<Vec<StationMonth>> {
    let mut rows = Vec::new();
    let mut next_id = 1;
    for month in request.season() {
        let dir = request
            .daily_dir
            .join(year.to_string())
            .join(format!("{:02}", month));
        let daily = read_daily_month(&dir, &request.bbox)?;
        debug!(
            "{}: {} days over {}x{} cells",
            dir.display(),
            daily.temperature.len_of(Axis(0)),
            daily.y.len(),
            daily.x.len()
        );
        for (j, lat) in daily.y.iter().enumerate() {
            for (i, lon) in daily.x.iter().enumerate() {
                let temperature = daily.temperature.slice(ndarray::s![.., j, i]);
                let wind = daily.wind.slice(ndarray::s![.., j, i]);
                let rain = daily.rain.slice(ndarray::s![.., j, i]);
                rows.push(StationMonth {
                    station_id: station_id(next_id)?,
                    lon: *lon,
                    lat: *lat,
                    year,
                    month,
                    min_temperature: nanmin(temperature.iter().copied()) - 273.15,
                    max_temperature: nanmax(temperature.iter().copied()) - 273.15,
                    cloud_fraction: 0.5,
                    wind_speed: nanmean(wind.iter().copied()),
                    precipitation: nansum(rain.iter().copied()) * 1000.0 * 86400.0 / RHO_W,
                    wet_days: rain.iter().filter(|v| **v > 0.0).count(),
                });
                next_id += 1;
            }
        }
    }
    Ok(rows)
}

pub fn write_station_months<P: AsRef<Path>>(rows: &[StationMonth], output: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(output.as_ref())?;
    writer.write_record(WGEN_HEADER)?;
    for row in rows {
        writer.write_record(row.record())?;
    }
    writer.flush()?;
    Ok(())
}

/// `fldas-to-wgen`: returns the comparison year used.
pub fn fldas_to_wgen<P: AsRef<Path>>(request: &WgenRequest, output: P) -> Result<i32> {
    request.validate()?;
    let means = climatology(request)?;
    let year = find_year(&means, request.level, &request.available_years)?;
    info!("Comparison year at level {}: {}", request.level, year);
    let rows = station_months(request, year)?;
    write_station_months(&rows, output.as_ref())?;
    info!("Wrote {} station months to {}", rows.len(), output.as_ref().display());
    Ok(year)
}

#[derive(Debug, Clone, Deserialize)]
struct StationLocation {
    #[serde(rename = "station id")]
    station_id: String,
    lon: f64,
    lat: f64,
}

/// One generated day of one station.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedDay {
    pub id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub tmin: f64,
    pub tmax: f64,
    pub wind: f64,
    pub prcp: f64,
}

/// Regular axis from `min` to `max` with `step`, always ending at `max`.
pub fn regular_axis(min: f64, max: f64, step: f64) -> Vec<f64> {
    let n = ((max - min) / step).ceil().max(0.0) as usize;
    let mut axis: Vec<f64> = (0..n).map(|i| min + i as f64 * step).collect();
    match axis.last() {
        Some(last) if (max - last).abs() <= 1e-6 => {}
        _ => axis.push(max),
    }
    axis
}

fn nearest(axis: &[f64], value: f64) -> usize {
    axis.iter()
        .enumerate()
        .min_by(|a, b| (a.1 - value).abs().total_cmp(&(b.1 - value).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn read_locations(path: &Path) -> Result<HashMap<String, (f64, f64)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut locations = HashMap::new();
    for row in reader.deserialize() {
        let row: StationLocation = row?;
        locations.entry(row.station_id).or_insert((row.lon, row.lat));
    }
    Ok(locations)
}

/// A generated day as FLDAS grids on (Y, X).
#[derive(Debug, Clone)]
pub struct DailyGrid {
    pub date: NaiveDate,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub temperature: Vec<f64>,
    pub wind: Vec<f64>,
    pub rain: Vec<f64>,
}

/// Grids the generated days, one grid per date in date order.
pub fn grid_generated_days(
    days: &[GeneratedDay],
    locations: &HashMap<String, (f64, f64)>,
) -> Result<Vec<DailyGrid>> {
    if locations.is_empty() {
        return Err(FlowError::invalid("no station locations"));
    }
    let lons: Vec<f64> = locations.values().map(|l| l.0).collect();
    let lats: Vec<f64> = locations.values().map(|l| l.1).collect();
    let lat_axis = regular_axis(nanmin(lats.iter().copied()), nanmax(lats.iter().copied()), GRID_STEP);
    let lon_axis = regular_axis(nanmin(lons.iter().copied()), nanmax(lons.iter().copied()), GRID_STEP);
    let cells = lat_axis.len() * lon_axis.len();

    let mut grids: BTreeMap<NaiveDate, DailyGrid> = BTreeMap::new();
    for day in days {
        let date = NaiveDate::from_ymd_opt(day.year, day.month, day.day).ok_or_else(|| {
            FlowError::invalid(format!("invalid date {}-{}-{}", day.year, day.month, day.day))
        })?;
        let (lon, lat) = locations.get(&day.id).ok_or_else(|| {
            FlowError::invalid(format!("station '{}' has no location", day.id))
        })?;
        let grid = grids.entry(date).or_insert_with(|| DailyGrid {
            date,
            lat: lat_axis.clone(),
            lon: lon_axis.clone(),
            temperature: vec![MISSING_VALUE; cells],
            wind: vec![MISSING_VALUE; cells],
            rain: vec![MISSING_VALUE; cells],
        });
        let cell = nearest(&lat_axis, *lat) * lon_axis.len() + nearest(&lon_axis, *lon);
        grid.temperature[cell] = (day.tmin + day.tmax) / 2.0 + 273.15;
        grid.wind[cell] = day.wind;
        grid.rain[cell] = day.prcp * RHO_W / (1000.0 * 86400.0);
    }
    Ok(grids.into_values().collect())
}

fn valid_range(values: &[f64]) -> (f64, f64) {
    let valid = || values.iter().copied().filter(|v| *v != MISSING_VALUE);
    (nanmin(valid()), nanmax(valid()))
}

fn put_grid_variable(
    file: &mut netcdf::FileMut,
    name: &str,
    values: &[f64],
    attrs: [(&str, &str); 3],
) -> Result<()> {
    let mut var = file.add_variable::<f64>(name, &["time", "Y", "X"])?;
    var.put_values(values, ..)?;
    for (key, value) in attrs {
        var.put_attribute(key, value)?;
    }
    let (vmin, vmax) = valid_range(values);
    var.put_attribute("vmin", vmin)?;
    var.put_attribute("vmax", vmax)?;
    var.put_attribute("cell_methods", "time:mean")?;
    Ok(())
}

/// Writes one FLDAS-like daily file.
pub fn write_daily_grid<P: AsRef<Path>>(grid: &DailyGrid, path: P) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        fs::remove_file(path)?;
    }
    let mut file = netcdf::create(path)?;
    file.add_dimension("time", 1)?;
    file.add_dimension("Y", grid.lat.len())?;
    file.add_dimension("X", grid.lon.len())?;
    {
        let mut time = file.add_variable::<f64>("time", &["time"])?;
        time.put_values(&[0.0], ..)?;
        time.put_attribute("units", TimeUnits::days_since(grid.date).to_string())?;
        time.put_attribute("calendar", "proleptic_gregorian")?;
    }
    for (name, values, axis, units) in [
        ("Y", &grid.lat, "Y", "degrees_north"),
        ("X", &grid.lon, "X", "degrees_east"),
    ] {
        let standard = if axis == "Y" { "latitude" } else { "longitude" };
        let mut var = file.add_variable::<f64>(name, &[name])?;
        var.put_values(values, ..)?;
        var.put_attribute("standard_name", standard)?;
        var.put_attribute("long_name", standard)?;
        var.put_attribute("axis", axis)?;
        var.put_attribute("units", units)?;
    }
    put_grid_variable(
        &mut file,
        "Tair_f_tavg",
        &grid.temperature,
        [("standard_name", "air_temperature"), ("long_name", "air temperature"), ("units", "K")],
    )?;
    put_grid_variable(
        &mut file,
        "Wind_f_tavg",
        &grid.wind,
        [("standard_name", "wind_speed"), ("long_name", "wind speed"), ("units", "m s-1")],
    )?;
    put_grid_variable(
        &mut file,
        "Rainf_f_tavg",
        &grid.rain,
        [("standard_name", "rainfall_flux"), ("long_name", "rainfall flux"), ("units", "kg m-2 s-1")],
    )?;
    file.add_attribute("Conventions", "CF-1.4")?;
    file.add_attribute("missing_value", MISSING_VALUE)?;
    file.add_attribute("title", "WGEN output")?;
    file.add_attribute("comment", "Outputs generated from WGEN")?;
    Ok(())
}

/// `wgen-to-fldas`: returns the files written.
pub fn wgen_to_fldas<P: AsRef<Path>>(wgen_out: P, wgen_in: P, path_out: P, prefix: &str) -> Result<Vec<PathBuf>> {
    let locations = read_locations(wgen_in.as_ref())?;
    let mut reader = csv::Reader::from_path(wgen_out.as_ref())?;
    let days = reader
        .deserialize()
        .collect::<std::result::Result<Vec<GeneratedDay>, _>>()?;
    if days.is_empty() {
        warn!("{} holds no generated days", wgen_out.as_ref().display());
    }
    let grids = grid_generated_days(&days, &locations)?;

    let mut written = Vec::with_capacity(grids.len());
    for grid in &grids {
        let dir = path_out
            .as_ref()
            .join(grid.date.format("%Y").to_string())
            .join(grid.date.format("%m").to_string());
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}{}.001.nc", prefix, grid.date.format("%Y%m%d")));
        write_daily_grid(grid, &path)?;
        written.push(path);
    }
    info!("Wrote {} daily files under {}", written.len(), path_out.as_ref().display());
    Ok(written)
}
