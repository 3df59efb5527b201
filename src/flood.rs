//! # Flood Severity Index
//!
//! Classifies daily river discharge against return-period thresholds:
//!
//! | index | meaning                     |
//! |-------|-----------------------------|
//! | 0     | below the 2-year flood      |
//! | 1     | medium (2-year flood)       |
//! | 2     | high (5-year flood)         |
//! | 3     | severe (20-year flood)      |
//!
//! Discharge comes either from one NetCDF file holding every year, or from a
//! directory with one sub-directory of daily files per year.

use crate::cftime::TimeUnits;
use crate::dataset::{attr_string, inclusive_range, list_nc_files, read_coordinate, read_unpacked_slab, variable, BoundingBox};
use crate::error::{FlowError, Result};
use crate::numeric::{nanmax, nanmin};
use crate::render::{parse_color, render_classes, save_png, with_legend, write_gif, Color, GRAY};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info};
use ndarray::{Array2, Array3, Axis, s};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const DISCHARGE_VAR: &str = "dis24";
pub const THRESHOLD_VARS: [&str; 3] = ["Q_2", "Q_5", "Q_20"];
pub const FLOOD_COLORS: [&str; 4] = ["white", "orange", "#FF4500", "#B22222"];
pub const ANIMATION_FPS: u32 = 5;

/// Discharge cut to a bounding box and time window.
#[derive(Debug, Clone)]
pub struct DischargeGrid {
    pub time: Vec<f64>,
    pub time_units: TimeUnits,
    pub calendar: Option<String>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// (time, lat, lon)
    pub values: Array3<f64>,
}

#[derive(Debug, Clone)]
pub struct Thresholds {
    pub q2: Array2<f64>,
    pub q5: Array2<f64>,
    pub q20: Array2<f64>,
}

/// Optional creator metadata written to the output's global attributes.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub creator_name: Option<String>,
    pub creator_email: Option<String>,
    pub institution: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FloodOptions {
    pub bbox: BoundingBox,
    pub years: Vec<i32>,
    pub figures: bool,
    pub output_dir: PathBuf,
    pub provenance: Provenance,
}

/// Severity class of one discharge value.
pub fn classify(v: f64, q2: f64, q5: f64, q20: f64) -> f64 {
    if v >= q20 {
        3.0
    } else if v < q2 {
        0.0
    } else if v >= q2 && v < q5 {
        1.0
    } else if v >= q5 && v < q20 {
        2.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        0.0
    }
}

/// Applies [`classify`] to every time step of the grid.
pub fn flood_index(values: &Array3<f64>, thresholds: &Thresholds) -> Result<Array3<f64>> {
    let (_, nlat, nlon) = values.dim();
    if thresholds.q2.dim() != (nlat, nlon)
        || thresholds.q5.dim() != (nlat, nlon)
        || thresholds.q20.dim() != (nlat, nlon)
    {
        return Err(FlowError::ShapeMismatch(format!(
            "discharge grid is {}x{} but thresholds are {:?}",
            nlat,
            nlon,
            thresholds.q2.dim()
        )));
    }
    let mut index = Array3::<f64>::zeros(values.dim());
    for ((t, i, j), v) in values.indexed_iter() {
        index[[t, i, j]] = classify(
            *v,
            thresholds.q2[[i, j]],
            thresholds.q5[[i, j]],
            thresholds.q20[[i, j]],
        );
    }
    Ok(index)
}

fn spatial_ranges(file: &netcdf::File, bbox: &BoundingBox) -> Result<(Vec<f64>, Vec<f64>, Range<usize>, Range<usize>)> {
    let lat = read_coordinate(file, "lat")?;
    let lon = read_coordinate(file, "lon")?;
    let lat_range = inclusive_range(&lat, bbox.min_lat, bbox.max_lat)
        .ok_or_else(|| FlowError::invalid(format!("no latitude inside {}", bbox)))?;
    let lon_range = inclusive_range(&lon, bbox.min_lon, bbox.max_lon)
        .ok_or_else(|| FlowError::invalid(format!("no longitude inside {}", bbox)))?;
    Ok((
        lat[lat_range.clone()].to_vec(),
        lon[lon_range.clone()].to_vec(),
        lat_range,
        lon_range,
    ))
}

/// Reads the three return-period thresholds inside the bounding box.
pub fn read_thresholds<P: AsRef<Path>>(path: P, bbox: &BoundingBox) -> Result<Thresholds> {
    let file = netcdf::open(path.as_ref())?;
    let (lat, lon, lat_range, lon_range) = spatial_ranges(&file, bbox)?;
    let mut grids = Vec::with_capacity(3);
    for name in THRESHOLD_VARS {
        let var = variable(&file, name)?;
        let values = read_unpacked_slab(&var, (lat_range.clone(), lon_range.clone()))?;
        grids.push(Array2::from_shape_vec((lat.len(), lon.len()), values)?);
    }
    let q20 = grids.pop().ok_or_else(|| FlowError::VariableNotFound("Q_20".to_string()))?;
    let q5 = grids.pop().ok_or_else(|| FlowError::VariableNotFound("Q_5".to_string()))?;
    let q2 = grids.pop().ok_or_else(|| FlowError::VariableNotFound("Q_2".to_string()))?;
    Ok(Thresholds { q2, q5, q20 })
}

fn time_units_of(var: &netcdf::Variable) -> Result<TimeUnits> {
    attr_string(var, "units")
        .ok_or_else(|| FlowError::AttributeNotFound {
            owner: var.name().to_string(),
            attribute: "units".to_string(),
        })?
        .parse()
}

/// Reads discharge from one file, optionally restricted to a time window.
fn read_discharge_file(
    path: &Path,
    bbox: &BoundingBox,
    window: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Result<DischargeGrid> {
    let file = netcdf::open(path)?;
    let (lat, lon, lat_range, lon_range) = spatial_ranges(&file, bbox)?;
    let time_var = variable(&file, "time")?;
    let time_units = time_units_of(&time_var)?;
    let calendar = attr_string(&time_var, "calendar");
    let all_times = time_var.get_values::<f64, _>(..)?;

    let time_range = match window {
        Some((start, end)) => {
            inclusive_range(&all_times, time_units.encode(start), time_units.encode(end))
                .ok_or_else(|| {
                    FlowError::invalid(format!(
                        "no time steps between {} and {} in {}",
                        start,
                        end,
                        path.display()
                    ))
                })?
        }
        None => 0..all_times.len(),
    };

    let var = variable(&file, DISCHARGE_VAR)?;
    let values =
        read_unpacked_slab(&var, (time_range.clone(), lat_range.clone(), lon_range.clone()))?;
    let values = Array3::from_shape_vec((time_range.len(), lat.len(), lon.len()), values)?;
    debug!(
        "Read {:?} discharge cells from {}",
        values.dim(),
        path.display()
    );

    Ok(DischargeGrid {
        time: all_times[time_range].to_vec(),
        time_units,
        calendar,
        lat,
        lon,
        values,
    })
}

/// Concatenates grids along time, re-encoding offsets in the first grid's units.
fn concat_time(grids: Vec<DischargeGrid>) -> Result<DischargeGrid> {
    let mut iter = grids.into_iter();
    let mut merged = iter
        .next()
        .ok_or_else(|| FlowError::invalid("no discharge files to combine"))?;
    for grid in iter {
        if grid.lat.len() != merged.lat.len() || grid.lon.len() != merged.lon.len() {
            return Err(FlowError::ShapeMismatch(
                "discharge files cover different grids".to_string(),
            ));
        }
        for t in &grid.time {
            let when = grid.time_units.decode(*t)?;
            merged.time.push(merged.time_units.encode(when));
        }
        merged.values.append(Axis(0), grid.values.view())?;
    }
    Ok(merged)
}

/// Reads every `*.nc` file of `dir`, sorted by name, as one time series.
pub fn read_discharge_dir<P: AsRef<Path>>(dir: P, bbox: &BoundingBox) -> Result<DischargeGrid> {
    let files = list_nc_files(dir.as_ref())?;
    if files.is_empty() {
        return Err(FlowError::NoDatasets(dir.as_ref().to_path_buf()));
    }
    let grids = files
        .iter()
        .map(|f| read_discharge_file(f, bbox, None))
        .collect::<Result<Vec<_>>>()?;
    concat_time(grids)
}

/// Window from 1 January of the first year to 31 December of the last.
pub fn year_window(years: &[i32]) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let min = years.iter().min().ok_or_else(|| FlowError::invalid("no years given"))?;
    let max = years.iter().max().ok_or_else(|| FlowError::invalid("no years given"))?;
    let start = NaiveDate::from_ymd_opt(*min, 1, 1)
        .ok_or_else(|| FlowError::invalid(format!("invalid year {}", min)))?;
    let end = NaiveDate::from_ymd_opt(*max, 12, 31)
        .ok_or_else(|| FlowError::invalid(format!("invalid year {}", max)))?;
    Ok((start.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN)))
}

/// Writes the index grid with its coordinates and metadata.
pub fn write_flood_netcdf<P: AsRef<Path>>(
    path: P,
    grid: &DischargeGrid,
    index: &Array3<f64>,
    provenance: &Provenance,
) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        fs::remove_file(path)?;
    }
    let mut file = netcdf::create(path)?;
    file.add_dimension("time", grid.time.len())?;
    file.add_dimension("lat", grid.lat.len())?;
    file.add_dimension("lon", grid.lon.len())?;

    {
        let mut time = file.add_variable::<f64>("time", &["time"])?;
        time.put_values(&grid.time, ..)?;
        time.put_attribute("units", grid.time_units.to_string())?;
        time.put_attribute("calendar", grid.calendar.clone().unwrap_or_else(|| "standard".to_string()))?;
    }
    {
        let mut lat = file.add_variable::<f64>("lat", &["lat"])?;
        lat.put_values(&grid.lat, ..)?;
        lat.put_attribute("units", "degrees_north")?;
    }
    {
        let mut lon = file.add_variable::<f64>("lon", &["lon"])?;
        lon.put_values(&grid.lon, ..)?;
        lon.put_attribute("units", "degrees_east")?;
    }
    {
        let mut flood = file.add_variable::<f64>("flood", &["time", "lat", "lon"])?;
        let values: Vec<f64> = index.iter().copied().collect();
        flood.put_values(&values, ..)?;
        flood.put_attribute("title", "Flood level Severity (medium, high, and severe)")?;
        flood.put_attribute("long_name", "Flood Level Severity")?;
        flood.put_attribute("units", "unitless")?;
        flood.put_attribute("valid_min", 0i32)?;
        flood.put_attribute("valid_max", 3i32)?;
        flood.put_attribute("missing_value", f64::NAN)?;
        flood.put_attribute(
            "standard_name",
            "channel_water_flow__flood_volume-flux_severity_index",
        )?;
    }

    file.add_attribute("title", "Flood Severity")?;
    file.add_attribute(
        "summary",
        "Flood severity index: medium (2-yr flood, index=1), high (5-yr flood, index=2), \
         and severe (20-yr flood, index=3), inferred from the GloFAS dataset. Thresholds \
         were determined by fitting a Gumbel extreme value distribution to the yearly \
         maxima in each grid cell over 1981-2017.",
    )?;
    file.add_attribute(
        "date_created",
        chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
    )?;
    if let Some(name) = &provenance.creator_name {
        file.add_attribute("creator_name", name.as_str())?;
    }
    if let Some(email) = &provenance.creator_email {
        file.add_attribute("creator_email", email.as_str())?;
    }
    if let Some(institution) = &provenance.institution {
        file.add_attribute("institution", institution.as_str())?;
    }
    file.add_attribute("geospatial_lat_min", nanmin(grid.lat.iter().copied()))?;
    file.add_attribute("geospatial_lat_max", nanmax(grid.lat.iter().copied()))?;
    file.add_attribute("geospatial_lon_min", nanmin(grid.lon.iter().copied()))?;
    file.add_attribute("geospatial_lon_max", nanmax(grid.lon.iter().copied()))?;
    if let (Some(first), Some(last)) = (grid.time.first(), grid.time.last()) {
        let fmt = "%Y-%m-%dT%H:%M:%S";
        file.add_attribute(
            "time_coverage_start",
            grid.time_units.decode(*first)?.format(fmt).to_string(),
        )?;
        file.add_attribute(
            "time_coverage_end",
            grid.time_units.decode(*last)?.format(fmt).to_string(),
        )?;
    }
    file.add_attribute("time_coverage_resolution", "daily")?;
    info!("Wrote flood index {}", path.display());
    Ok(())
}

fn flood_palette() -> Result<Vec<Color>> {
    FLOOD_COLORS.iter().map(|c| parse_color(c)).collect()
}

/// Writes one PNG per time step and returns the file names in time order.
pub fn render_frames(grid: &DischargeGrid, index: &Array3<f64>, figures_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(figures_dir)?;
    let palette = flood_palette()?;
    let flip = grid.lat.first() < grid.lat.last();
    let cell = (400 / grid.lon.len().max(1)).max(1) as u32;
    let mut frames = Vec::with_capacity(grid.time.len());
    for (t, offset) in grid.time.iter().enumerate() {
        let date = grid.time_units.decode(*offset)?;
        let img = render_classes(index.slice(s![t, .., ..]), &palette, GRAY, cell, flip);
        let img = with_legend(&img, &palette, (cell * 2).max(12));
        let path = figures_dir.join(format!("flooding_t{}.png", date.format("%Y-%m-%d")));
        save_png(&img, &path)?;
        frames.push(path);
    }
    Ok(frames)
}

fn process_grid(
    grid: &DischargeGrid,
    thresholds: &Thresholds,
    label: &str,
    options: &FloodOptions,
    frames: &mut Vec<PathBuf>,
) -> Result<PathBuf> {
    let index = flood_index(&grid.values, thresholds)?;
    let results = options.output_dir.join("results");
    fs::create_dir_all(&results)?;
    let output = results.join(format!("GloFAS_FloodIndex_{}.nc", label));
    write_flood_netcdf(&output, grid, &index, &options.provenance)?;
    if options.figures {
        frames.extend(render_frames(grid, &index, &options.output_dir.join("figures"))?);
    }
    Ok(output)
}

/// `flood-index`: returns the NetCDF files written.
pub fn run_flood_index<P: AsRef<Path>, Q: AsRef<Path>>(
    data: P,
    thresholds: Q,
    options: &FloodOptions,
) -> Result<Vec<PathBuf>> {
    let data = data.as_ref();
    let thresholds = read_thresholds(thresholds, &options.bbox)?;
    let mut frames = Vec::new();
    let mut outputs = Vec::new();

    if data.extension().is_some_and(|ext| ext == "nc") {
        let window = year_window(&options.years)?;
        info!("Reading {} between {} and {}", data.display(), window.0, window.1);
        let grid = read_discharge_file(data, &options.bbox, Some(window))?;
        outputs.push(process_grid(&grid, &thresholds, "all", options, &mut frames)?);
    } else {
        for year in &options.years {
            let dir = data.join(year.to_string());
            info!("Processing year {} from {}", year, dir.display());
            let grid = read_discharge_dir(&dir, &options.bbox)?;
            outputs.push(process_grid(
                &grid,
                &thresholds,
                &year.to_string(),
                options,
                &mut frames,
            )?);
        }
    }

    if options.figures && !frames.is_empty() {
        let animation = options.output_dir.join("results").join("Flooding_index.gif");
        write_gif(&frames, &animation, ANIMATION_FPS)?;
    }
    Ok(outputs)
}
