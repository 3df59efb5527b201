//! # Cycles to Economic Model
//!
//! Reads the season tables packed in Cycles result tarballs and turns the
//! baseline and increased-fertilizer runs into yield elasticities for the
//! economic model (`,ybarN` tables).

use crate::error::{FlowError, Result};
use crate::numeric::format_float;
use chrono::{Datelike, NaiveDate};
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const BASELINE: &str = "baseline";
pub const DEFAULT_SCENARIO: &str = "10_percent_inc";
pub const YIELD_COLUMN: &str = "ybarN";

/// Crops the economic model expects, with the elasticity used when a crop
/// has no Cycles run.
pub const ECONOMIC_CROPS: [(&str, &str); 5] = [
    ("Cassava", "0.25"),
    ("Groundnuts", "0.25"),
    ("Maize", "0.11"),
    ("Sesame", "0.25"),
    ("Sorghum", "0.11"),
];

pub fn elasticity(base: f64, scenario: f64, percent_fertilizer: f64) -> f64 {
    ((scenario - base) / base) / percent_fertilizer
}

/// Crop names of the `Cycles-<crop>-...tar.gz` files in `dir`, in file order.
pub fn crop_names<P: AsRef<Path>>(dir: P) -> Result<Vec<String>> {
    let mut files: Vec<String> = std::fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with("Cycles") && name.ends_with(".tar.gz"))
        .collect();
    files.sort();
    let mut crops: Vec<String> = Vec::new();
    for file in files {
        if let Some(crop) = file.split('-').nth(1)
            && !crops.iter().any(|c| c == crop)
        {
            crops.push(crop.to_string());
        }
    }
    Ok(crops)
}

/// Contents of the last archive member whose path mentions `season`.
pub fn season_table<P: AsRef<Path>>(archive: P) -> Result<String> {
    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive.as_ref())?));
    let mut table = None;
    for entry in tar.entries()? {
        let mut entry = entry?;
        let is_season = entry.path()?.to_string_lossy().contains("season");
        if is_season {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            table = Some(content);
        }
    }
    table.ok_or_else(|| {
        FlowError::invalid(format!(
            "no season table in {}",
            archive.as_ref().display()
        ))
    })
}

/// Mean grain yield per harvest year of a tab-separated season table.
///
/// The row after the header holds units and is skipped.
pub fn yearly_grain_yield(table: &str) -> Result<BTreeMap<i32, f64>> {
    let mut lines = table.lines();
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| FlowError::invalid("empty season table"))?
        .split('\t')
        .map(str::trim)
        .collect();
    let date_col = header
        .iter()
        .position(|h| *h == "DATE")
        .or_else(|| header.iter().position(|h| h.contains("DATE")))
        .ok_or_else(|| FlowError::ColumnNotFound("DATE".to_string()))?;
    let yield_col = header
        .iter()
        .rposition(|h| h.contains("GRAIN YIELD"))
        .ok_or_else(|| FlowError::ColumnNotFound("GRAIN YIELD".to_string()))?;

    let mut sums: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for line in lines.skip(1).filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let (Some(&date), Some(&value)) = (fields.get(date_col), fields.get(yield_col)) else {
            return Err(FlowError::invalid(format!("short season row: {}", line)));
        };
        let date = NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d")
            .map_err(|_| FlowError::invalid(format!("invalid harvest date '{}'", date)))?;
        let value: f64 = value
            .parse()
            .map_err(|_| FlowError::invalid(format!("invalid grain yield '{}'", value)))?;
        let entry = sums.entry(date.year()).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    Ok(sums
        .into_iter()
        .map(|(year, (sum, n))| (year, sum / n as f64))
        .collect())
}

fn yield_for_year(dir: &Path, crop: &str, run: &str, year: i32) -> Result<f64> {
    let archive = dir.join(format!("Cycles-{}-{}-results.tar.gz", crop, run));
    let yields = yearly_grain_yield(&season_table(&archive)?)?;
    debug!("{} {} yields: {:?}", crop, run, yields);
    yields
        .get(&year)
        .copied()
        .ok_or(FlowError::YearNotAvailable(year))
}

/// `cycles-to-crop`: elasticity of grain yield to fertilizer for each crop run.
pub fn cycles_to_crop<P: AsRef<Path>>(
    dir: P,
    year: i32,
    percent_fertilizer: f64,
    scenario: &str,
    output: P,
) -> Result<BTreeMap<String, f64>> {
    if percent_fertilizer == 0.0 {
        return Err(FlowError::invalid("fertilizer change must be non-zero"));
    }
    let dir = dir.as_ref();
    let mut elasticities = BTreeMap::new();
    for crop in crop_names(dir)? {
        let base = yield_for_year(dir, &crop, BASELINE, year)?;
        let changed = yield_for_year(dir, &crop, scenario, year)?;
        let value = elasticity(base, changed, percent_fertilizer);
        info!("{}: elasticity {:.4}", crop, value);
        elasticities.insert(crop, value);
    }

    let mut writer = csv::Writer::from_path(output.as_ref())?;
    writer.write_record(["", YIELD_COLUMN])?;
    for (crop, default) in ECONOMIC_CROPS {
        let value = match elasticities.get(crop) {
            Some(v) => format_float(*v),
            None => {
                debug!("No Cycles run for {}, using {}", crop, default);
                default.to_string()
            }
        };
        writer.write_record([crop, value.as_str()])?;
    }
    writer.flush()?;
    Ok(elasticities)
}

fn is_placeholder(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok_and(|v| v == -99.0)
}

/// `merge-points`: merges `,ybarN` tables; a crop seen again only fills in its
/// `-99` placeholder.
pub fn merge_points<P: AsRef<Path>, Q: AsRef<Path>>(files: &[P], output: Q) -> Result<Vec<(String, String)>> {
    let mut merged: Vec<(String, String)> = Vec::new();
    for file in files {
        let mut reader = csv::Reader::from_path(file.as_ref())?;
        let headers = reader.headers()?.clone();
        let crop_col = headers
            .iter()
            .position(|h| h.is_empty())
            .ok_or_else(|| FlowError::ColumnNotFound("crop".to_string()))?;
        let value_col = headers
            .iter()
            .position(|h| h == YIELD_COLUMN)
            .ok_or_else(|| FlowError::ColumnNotFound(YIELD_COLUMN.to_string()))?;
        for record in reader.records() {
            let record = record?;
            let (crop, value) = (&record[crop_col], &record[value_col]);
            match merged.iter_mut().find(|(c, _)| c == crop) {
                Some(existing) if is_placeholder(&existing.1) => existing.1 = value.to_string(),
                Some(_) => warn!("Keeping first value of {} from {}", crop, file.as_ref().display()),
                None => merged.push((crop.to_string(), value.to_string())),
            }
        }
    }

    let mut writer = csv::Writer::from_path(output.as_ref())?;
    writer.write_record(["", YIELD_COLUMN])?;
    for (crop, value) in &merged {
        writer.write_record([crop, value])?;
    }
    writer.flush()?;
    Ok(merged)
}
