//! # mintflow
//!
//! Data-transformation steps for climate, crop and hydrology modelling
//! workflows. Each step reads input files (NetCDF, CSV, GeoTIFF, tarballs or a
//! JSON variable store), applies a fixed transformation and writes its outputs.
//! Steps share no runtime; a workflow manager chains them through files.
//!
//! ## Steps
//!
//! - **Variable store**: [`extract`] aggregates NetCDF files into a store;
//!   [`variables`] and [`derive`] select, check, convert and derive variables.
//! - **Flood index**: [`flood`] classifies GloFAS discharge against return
//!   period thresholds and renders figures.
//! - **Weather generator**: [`weather`] converts FLDAS archives to generator
//!   input and grids the generated weather back into daily files.
//! - **Crop and economic models**: [`pihm`], [`cycles`] and [`economic`]
//!   translate between PIHM, Cycles and the economic model tables.
//! - **Visualisation and catalog**: [`hand`] renders HAND rasters and
//!   [`catalog`] updates component descriptions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mintflow::store::VariableStore;
//! use mintflow::derive::add_relative_humidity;
//!
//! mintflow::extract::open_netcdf(&["era5.nc"], "store.json")?;
//! let mut store = VariableStore::load("store.json")?;
//! add_relative_humidity(&mut store, "2 metre dewpoint temperature", "2 metre temperature")?;
//! store.save("store_rh.json")?;
//! # Ok::<(), mintflow::error::FlowError>(())
//! ```

pub mod catalog;
pub mod cftime;
pub mod cli;
pub mod cycles;
pub mod dataset;
pub mod derive;
pub mod economic;
pub mod error;
pub mod extract;
pub mod flood;
pub mod hand;
pub mod info;
pub mod input;
pub mod log;
pub mod numeric;
pub mod pihm;
pub mod render;
pub mod store;
pub mod units;
pub mod variables;
pub mod weather;

#[cfg(test)]
mod tests;
