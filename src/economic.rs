//! # Economic Model Inputs
//!
//! Table rewrites that prepare the calibration and simulation CSV files read
//! by the economic model, plus the pivot that turns its production output into
//! a visualisation table.
//!
//! Crop tables are two or three column CSV files without a header; a row whose
//! first cell is empty is a column label row and is copied through unchanged.

use crate::error::{FlowError, Result};
use crate::input::RunConfig;
use crate::numeric::{format_float, round_to};
use log::{debug, info};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SIM_PRICE_FILE: &str = "simprice.csv";
pub const SIM_COST_FILE: &str = "simproductioncost.csv";
pub const PERCENT_CROPS: [&str; 7] = ["barley", "maize", "millet", "pulses", "sorghum", "teff", "wheat"];

/// Per-crop adjustment in percent: one value for every crop, or one per crop row.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment(pub Vec<f64>);

impl Adjustment {
    fn fraction(&self, row: usize) -> Result<f64> {
        let pct = match self.0.as_slice() {
            [single] => *single,
            many => *many.get(row).ok_or_else(|| {
                FlowError::invalid(format!(
                    "{} adjustments given but the table has more crop rows",
                    many.len()
                ))
            })?,
        };
        Ok(pct / 100.0)
    }
}

pub fn scale(value: f64, fraction: f64) -> f64 {
    round_to(value + value * fraction, 2)
}

fn parse_cell(cell: &str, path: &Path) -> Result<f64> {
    cell.trim().parse().map_err(|_| {
        FlowError::invalid(format!("'{}' in {} is not a number", cell, path.display()))
    })
}

/// Rewrites a crop table, scaling every value column by its own adjustment.
fn scale_table(input: &Path, output: &Path, adjustments: &[&Adjustment]) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(input)?;
    let mut writer = csv::Writer::from_path(output)?;
    let mut crops = 0;
    for record in reader.records() {
        let record = record?;
        if record.len() != adjustments.len() + 1 {
            return Err(FlowError::invalid(format!(
                "expected {} columns in {}, found {}",
                adjustments.len() + 1,
                input.display(),
                record.len()
            )));
        }
        if record[0].is_empty() {
            writer.write_record(&record)?;
            continue;
        }
        let mut row = vec![record[0].to_string()];
        for (cell, adjustment) in record.iter().skip(1).zip(adjustments) {
            let value = parse_cell(cell, input)?;
            row.push(format_float(scale(value, adjustment.fraction(crops)?)));
        }
        writer.write_record(&row)?;
        crops += 1;
    }
    writer.flush()?;
    Ok(crops)
}

/// `update-sims`: writes `simprice.csv` and `simproductioncost.csv` into `output_dir`.
pub fn update_sims<P: AsRef<Path>>(
    base_price: P,
    base_cost: P,
    price: &Adjustment,
    cost_c1: &Adjustment,
    cost_c2: &Adjustment,
    output_dir: P,
) -> Result<(PathBuf, PathBuf)> {
    let price_out = output_dir.as_ref().join(SIM_PRICE_FILE);
    let cost_out = output_dir.as_ref().join(SIM_COST_FILE);
    let crops = scale_table(base_price.as_ref(), &price_out, &[price])?;
    debug!("Scaled prices of {} crops", crops);
    let crops = scale_table(base_cost.as_ref(), &cost_out, &[cost_c1, cost_c2])?;
    debug!("Scaled production costs of {} crops", crops);
    info!("Wrote {} and {}", price_out.display(), cost_out.display());
    Ok((price_out, cost_out))
}

/// `update-subsidy`: multiplies column `c2` by `factor`, rewriting the file in place.
pub fn update_subsidy<P: AsRef<Path>>(path: P, factor: f64) -> Result<()> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = headers
        .iter()
        .position(|h| h == "c2")
        .ok_or_else(|| FlowError::ColumnNotFound("c2".to_string()))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file());
        writer.write_record(&headers)?;
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            let value = parse_cell(&row[column], path)?;
            row[column] = format_float(value * factor);
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }
    temp.persist(path).map_err(|e| FlowError::Io(e.error))?;
    info!("Scaled subsidy column of {} by {}", path.display(), factor);
    Ok(())
}

fn write_calibration(path: &Path, crops: &StringChunked, values: &StringChunked) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["", "calib"])?;
    for (crop, value) in crops.into_iter().zip(values.into_iter()) {
        writer.write_record([crop.unwrap_or(""), value.unwrap_or("")])?;
    }
    writer.flush()?;
    Ok(())
}

fn string_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a StringChunked> {
    df.column(name)
        .map_err(|_| FlowError::ColumnNotFound(name.to_string()))?
        .str()
        .map_err(FlowError::from)
}

/// `generate-sim`: splits the rows for one year and region into the land,
/// yield and price calibration tables.
pub fn generate_sim<P: AsRef<Path>>(data: P, year: &str, region: &str, output_dir: P) -> Result<Vec<PathBuf>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(data.as_ref().to_path_buf()))?
        .finish()?;
    for required in ["year", "region", "crop", "land_area", "crop_yield", "crop_price"] {
        string_column(&df, required)?;
    }
    let selected = df
        .lazy()
        .filter(col("year").eq(lit(year)).and(col("region").eq(lit(region))))
        .collect()?;
    debug!("{} rows for {} in {}", selected.height(), region, year);

    let crops = string_column(&selected, "crop")?;
    let mut written = Vec::new();
    for (file, column) in [
        ("landdata.csv", "land_area"),
        ("yielddata.csv", "crop_yield"),
        ("pricedata.csv", "crop_price"),
    ] {
        let path = output_dir.as_ref().join(file);
        write_calibration(&path, crops, string_column(&selected, column)?)?;
        written.push(path);
    }
    info!("Wrote calibration tables for {} crops", selected.height());
    Ok(written)
}

/// `generate-percent`: seven price values, seven fertilizer subsidy values and
/// one fertilizer consumption value, in that order.
pub fn generate_percent<P: AsRef<Path>>(values: &[String], output_dir: P) -> Result<Vec<PathBuf>> {
    if values.len() != 2 * PERCENT_CROPS.len() + 1 {
        return Err(FlowError::invalid(format!(
            "expected {} values, got {}",
            2 * PERCENT_CROPS.len() + 1,
            values.len()
        )));
    }
    let dir = output_dir.as_ref();
    let (prices, rest) = values.split_at(PERCENT_CROPS.len());
    let (subsidies, consumption) = rest.split_at(PERCENT_CROPS.len());

    let mut written = Vec::new();
    for (file, column) in [("simpricedata.csv", prices), ("simfertsubsidy.csv", subsidies)] {
        let path = dir.join(file);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["", "sim"])?;
        for (crop, value) in PERCENT_CROPS.iter().zip(column) {
            writer.write_record([*crop, value.as_str()])?;
        }
        writer.flush()?;
        written.push(path);
    }
    let path = dir.join("simfertcon.csv");
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["", "sim"])?;
    writer.write_record(["all", consumption[0].as_str()])?;
    writer.flush()?;
    written.push(path);
    Ok(written)
}

/// Scenario column name for a fertilizer subsidy cell such as `20.00`.
pub fn scenario_name(subsidy: &str, year: i32) -> Result<String> {
    if subsidy == "0.00" {
        return Ok(format!("Fertilizer_Prices_No_Subsidy_{}", year));
    }
    let pct: f64 = subsidy
        .trim()
        .parse()
        .map_err(|_| FlowError::invalid(format!("invalid fertilizer subsidy '{}'", subsidy)))?;
    Ok(format!("Fertilizer_Prices_{}_Subsidy_{}", pct.trunc() as i64, year))
}

/// Production per crop, keeping scenarios in the order they were first seen.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProductionTable {
    pub crops: Vec<(String, Vec<(String, String)>)>,
}

impl ProductionTable {
    pub fn insert(&mut self, crop: &str, scenario: String, production: String) {
        let index = match self.crops.iter().position(|(c, _)| c == crop) {
            Some(i) => i,
            None => {
                self.crops.push((crop.to_string(), Vec::new()));
                self.crops.len() - 1
            }
        };
        let scenarios = &mut self.crops[index].1;
        match scenarios.iter_mut().find(|(s, _)| *s == scenario) {
            Some(entry) => entry.1 = production,
            None => scenarios.push((scenario, production)),
        }
    }

    /// Scenario columns, taken from the first crop.
    pub fn scenarios(&self) -> Vec<&str> {
        self.crops
            .first()
            .map(|(_, s)| s.iter().map(|(name, _)| name.as_str()).collect())
            .unwrap_or_default()
    }
}

/// `economic-to-vis`
pub fn economic_to_vis<P: AsRef<Path>, Q: AsRef<Path>>(config: P, files: &[Q], output: P) -> Result<()> {
    let config = RunConfig::from_file(config)?;
    let year = config.mint.end_year;
    let mut table = ProductionTable::default();
    for file in files {
        let mut reader = csv::Reader::from_path(file.as_ref())?;
        let headers = reader.headers()?.clone();
        let index = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| FlowError::ColumnNotFound(name.to_string()))
        };
        let crop = index("crop")?;
        let subsidy = index("fert_subsidy (%)")?;
        let production = index("production (kg)")?;
        for record in reader.records() {
            let record = record?;
            table.insert(
                &record[crop],
                scenario_name(&record[subsidy], year)?,
                record[production].to_string(),
            );
        }
    }

    let mut writer = csv::Writer::from_writer(File::create(output.as_ref())?);
    let mut header = vec!["year", "region", "crop"];
    header.extend(table.scenarios());
    writer.write_record(&header)?;
    let year = year.to_string();
    for (crop, scenarios) in &table.crops {
        let mut row = vec![year.as_str(), config.mint.region.as_str(), crop.as_str()];
        row.extend(scenarios.iter().map(|(_, v)| v.as_str()));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    info!(
        "Wrote {} crops to {}",
        table.crops.len(),
        output.as_ref().display()
    );
    Ok(())
}
