//! # CLI Module
//!
//! Command-line interface for mintflow: one subcommand per workflow step.
//! Positional arguments keep the order the workflow components pass them in;
//! list-valued arguments (bounding boxes, years, percentages) are parsed by
//! the `parse_*` functions below and accept both `[a,b,c]` and `a,b,c`.

use crate::dataset::{BoundingBox, parse_number_list};
use crate::economic::Adjustment;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Data-transformation steps for climate, crop and hydrology modelling workflows
#[derive(Parser, Debug)]
#[command(name = "mintflow")]
#[command(about = "Data-transformation steps for climate, crop and hydrology workflows")]
#[command(version)]
#[command(long_about = "
mintflow bundles the data preparation steps of a modelling workflow into one
executable. Every subcommand is an independent step: it reads its input files,
transforms them and writes its outputs. Steps never call each other; chaining
is left to the workflow manager.

EXAMPLES:
  # Aggregate NetCDF files into a variable store
  mintflow open-netcdf era5_*.nc -o store.json

  # Derive relative humidity
  mintflow calculate-rh store.json store_rh.json

  # Flood severity index with figures
  mintflow flood-index glofas/ thresholds.nc '[32,48,3,15]' '[2017,2018]' --figures

  # Weather generator input from FLDAS
  mintflow fldas-to-wgen monthly/ daily/ Rainf_f_tavg 24.0 24.5 -5.0 -4.5 6 9 0.5

  # Generate completions
  mintflow completions bash > ~/.bash_completion.d/mintflow
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open NetCDF files as one dataset and save a variable store
    #[command(long_about = "
Open one or more NetCDF files as a single dataset and save every variable to a
JSON variable store keyed by its long name.

Variables along an unlimited (record) dimension are concatenated across the
files in argument order. Missing values become NaN and packed values are
unpacked with scale_factor and add_offset.
")]
    OpenNetcdf {
        /// Input NetCDF files
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Output variable store
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Display dimensions and variables of a NetCDF file
    Info {
        /// NetCDF file to inspect
        file: PathBuf,

        /// Include all variable and global attributes
        #[arg(long)]
        detailed: bool,

        /// Only show this variable
        #[arg(short = 'n', long)]
        variable: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },

    /// Copy a store, listing requested variables it lacks
    SelectVar {
        store: PathBuf,
        /// Variable list, one name per line
        varlist: PathBuf,
        output: PathBuf,
        /// Receives the names of missing variables
        warnings: PathBuf,
    },

    /// Fail unless every listed variable is in the store
    CompleteCheck {
        store: PathBuf,
        varlist: PathBuf,
        output: PathBuf,
    },

    /// Convert listed variables to the listed units
    AdjustUnits {
        store: PathBuf,
        varlist: PathBuf,
        /// Desired units, one per line, matching the variable list
        unitlist: PathBuf,
        output: PathBuf,
    },

    /// Add a precipitation rate derived from an accumulated amount
    AmountToRate {
        store: PathBuf,
        output: PathBuf,

        /// Accumulated precipitation variable (metres)
        #[arg(long, default_value = "Total precipitation")]
        source: String,

        /// Accumulation period in hours
        #[arg(long, default_value_t = 3.0)]
        hours: f64,
    },

    /// Add relative humidity from dewpoint and air temperature
    CalculateRh {
        store: PathBuf,
        output: PathBuf,

        #[arg(long, default_value = "2 metre dewpoint temperature")]
        dewpoint: String,

        #[arg(long, default_value = "2 metre temperature")]
        temperature: String,
    },

    /// Add wind speed and its reference height from U and V components
    CalculateWind {
        store: PathBuf,
        output: PathBuf,

        #[arg(long, default_value = "10 metre U wind component")]
        u: String,

        #[arg(long, default_value = "10 metre V wind component")]
        v: String,
    },

    /// Decode the time variable into ISO dates
    AdjustTime {
        store: PathBuf,
        /// Calendar recorded with the dates
        calendar: String,
        output: PathBuf,

        #[arg(long, default_value = "time")]
        time_var: String,
    },

    /// Write listed variables as raw float32 files
    AdjustFormat {
        store: PathBuf,
        varlist: PathBuf,
        /// One output file per listed variable
        #[arg(required = true)]
        outputs: Vec<PathBuf>,
    },

    /// Compute the GloFAS flood severity index
    #[command(long_about = "
Classify daily river discharge against the 2, 5 and 20 year return period
thresholds: 0 below Q2, 1 between Q2 and Q5, 2 between Q5 and Q20, 3 at or
above Q20.

DATA is either one NetCDF file covering all years, or a directory with one
sub-directory of NetCDF files per year.

EXAMPLES:
  mintflow flood-index glofas.nc thresholds.nc '[32,48,3,15]' '[2017,2018]'
  mintflow flood-index glofas/ thresholds.nc 32,48,3,15 2017 --figures
")]
    FloodIndex {
        /// Discharge NetCDF file or directory of yearly sub-directories
        data: PathBuf,

        /// Return period thresholds NetCDF file
        thresholds: PathBuf,

        /// [min_lon,max_lon,min_lat,max_lat]
        #[arg(value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: BoundingBox,

        /// [year,...]
        #[arg(value_parser = parse_years)]
        years: YearList,

        /// Render one PNG per day and an animation
        #[arg(long)]
        figures: bool,

        /// Directory receiving results/ and figures/
        #[arg(long, default_value = ".", env = "MINTFLOW_OUTPUT_DIR")]
        output_dir: PathBuf,

        #[arg(long)]
        creator_name: Option<String>,

        #[arg(long)]
        creator_email: Option<String>,

        #[arg(long)]
        institution: Option<String>,
    },

    /// Build weather generator input from FLDAS archives
    #[command(allow_negative_numbers = true)]
    FldasToWgen {
        /// Monthly FLDAS archive (one sub-directory per period)
        monthly: PathBuf,
        /// Daily FLDAS archive (<year>/<month>/*.nc)
        daily: PathBuf,
        /// Variable ranked for the climatology
        variable: String,
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
        min_month: u32,
        max_month: u32,
        /// Quantile of the climatology to reproduce (0-1)
        level: f64,

        #[arg(short, long, default_value = "FLDAS_WGEN.csv")]
        output: PathBuf,
    },

    /// Grid weather generator output back into daily FLDAS files
    WgenToFldas {
        /// Generated daily weather CSV
        wgen_out: PathBuf,
        /// Station CSV the generator was run on
        wgen_in: PathBuf,
        /// Output root (YYYY/MM sub-directories)
        path_out: PathBuf,
        /// File name prefix
        prefix: String,
    },

    /// Render a HAND distance-down raster into quantile classes
    HandVis {
        /// Distance down raster (GeoTIFF)
        #[arg(short = 'd', long = "dd")]
        raster: PathBuf,

        /// Colour map name
        #[arg(short, long)]
        cmap: String,

        /// Number of bins
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
        bins: u16,

        /// Output PNG
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Convert PIHM forcing into a Cycles weather file
    PihmToCycles {
        forcing: PathBuf,
        /// Mesh attribute file
        attributes: PathBuf,
        /// Cropland cells CSV
        cropland: PathBuf,
        /// First day (YYYY-MM-DD)
        start: NaiveDate,
        /// Last day (YYYY-MM-DD), inclusive
        end: NaiveDate,
        weather: PathBuf,
    },

    /// Run PIHM on the project in the base directory
    PihmRun {
        /// Run configuration (INI `[mint]` section, or JSON / YAML)
        config: PathBuf,

        #[arg(long, default_value = "PIHM-base")]
        base_dir: PathBuf,

        #[arg(long, default_value = "/usr/bin/pihm")]
        executable: String,
    },

    /// Scale crop prices and production costs by percentages
    #[command(allow_negative_numbers = true)]
    UpdateSims {
        base_price: PathBuf,
        base_cost: PathBuf,

        /// Price change in percent, one value or one per crop
        #[arg(value_parser = parse_percentages)]
        price: Adjustment,

        /// First production cost change in percent
        #[arg(value_parser = parse_percentages)]
        c1: Adjustment,

        /// Second production cost change in percent
        #[arg(value_parser = parse_percentages)]
        c2: Adjustment,

        #[arg(long, default_value = ".", env = "MINTFLOW_OUTPUT_DIR")]
        output_dir: PathBuf,
    },

    /// Multiply the c2 column of a cost table in place
    #[command(allow_negative_numbers = true)]
    UpdateSubsidy { file: PathBuf, factor: f64 },

    /// Split calibration data for one year and region
    GenerateSim {
        data: PathBuf,
        year: String,
        region: String,

        #[arg(long, default_value = ".", env = "MINTFLOW_OUTPUT_DIR")]
        output_dir: PathBuf,
    },

    /// Write simulation price, subsidy and fertilizer tables
    #[command(allow_negative_numbers = true)]
    GeneratePercent {
        /// 7 prices, 7 fertilizer subsidies, 1 fertilizer consumption
        #[arg(num_args = 15, required = true)]
        values: Vec<String>,

        #[arg(long, default_value = ".", env = "MINTFLOW_OUTPUT_DIR")]
        output_dir: PathBuf,
    },

    /// Pivot economic model production into a visualisation table
    EconomicToVis {
        /// Run configuration (INI `[mint]` section, or JSON / YAML)
        config: PathBuf,

        /// Economic model output tables
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compute fertilizer elasticities from Cycles runs
    CyclesToCrop {
        /// Directory holding Cycles-<crop>-<run>-results.tar.gz
        dir: PathBuf,

        #[arg(long, default_value_t = 2017)]
        year: i32,

        /// Fractional fertilizer increase of the scenario run
        #[arg(long, default_value_t = 0.1)]
        percent_fertilizer: f64,

        #[arg(long, default_value = crate::cycles::DEFAULT_SCENARIO)]
        scenario: String,

        #[arg(short, long, default_value = "cyclesdata2016.csv")]
        output: PathBuf,
    },

    /// Merge per-point elasticity tables
    MergePoints {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Set wings.source of each component listed in the catalog
    InsertSource {
        #[arg(long, default_value = "model.csv")]
        catalog: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    /// Subcommand name as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::OpenNetcdf { .. } => "open-netcdf",
            Commands::Info { .. } => "info",
            Commands::SelectVar { .. } => "select-var",
            Commands::CompleteCheck { .. } => "complete-check",
            Commands::AdjustUnits { .. } => "adjust-units",
            Commands::AmountToRate { .. } => "amount-to-rate",
            Commands::CalculateRh { .. } => "calculate-rh",
            Commands::CalculateWind { .. } => "calculate-wind",
            Commands::AdjustTime { .. } => "adjust-time",
            Commands::AdjustFormat { .. } => "adjust-format",
            Commands::FloodIndex { .. } => "flood-index",
            Commands::FldasToWgen { .. } => "fldas-to-wgen",
            Commands::WgenToFldas { .. } => "wgen-to-fldas",
            Commands::HandVis { .. } => "hand-vis",
            Commands::PihmToCycles { .. } => "pihm-to-cycles",
            Commands::PihmRun { .. } => "pihm-run",
            Commands::UpdateSims { .. } => "update-sims",
            Commands::UpdateSubsidy { .. } => "update-subsidy",
            Commands::GenerateSim { .. } => "generate-sim",
            Commands::GeneratePercent { .. } => "generate-percent",
            Commands::EconomicToVis { .. } => "economic-to-vis",
            Commands::CyclesToCrop { .. } => "cycles-to-crop",
            Commands::MergePoints { .. } => "merge-points",
            Commands::InsertSource { .. } => "insert-source",
            Commands::Completions { .. } => "completions",
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
}

/// Years given as one argument, e.g. `[2017,2018]`.
#[derive(Clone, Debug, PartialEq)]
pub struct YearList(pub Vec<i32>);

/// Parse a bounding box: `[min_lon,max_lon,min_lat,max_lat]`
fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    s.parse::<BoundingBox>().map_err(|e| e.to_string())
}

/// Parse a year list: `[2017,2018]`, `2017,2018` or `2017`
fn parse_years(s: &str) -> Result<YearList, String> {
    let values = parse_number_list(s).map_err(|e| e.to_string())?;
    if values.is_empty() {
        return Err("at least one year is required".to_string());
    }
    values
        .into_iter()
        .map(|v| {
            if v.fract() == 0.0 {
                Ok(v as i32)
            } else {
                Err(format!("'{}' is not a year", v))
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(YearList)
}

/// Parse percentages: one value for every crop or one per crop
fn parse_percentages(s: &str) -> Result<Adjustment, String> {
    let values = parse_number_list(s).map_err(|e| e.to_string())?;
    if values.is_empty() {
        return Err("at least one percentage is required".to_string());
    }
    Ok(Adjustment(values))
}
