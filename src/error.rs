//! # Error Types
//!
//! Every step in the crate reports failures through [`FlowError`]. Library
//! errors from the I/O stack convert automatically; the remaining variants
//! describe the ways an input can fail to match what a step expects.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running a workflow step
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("INI error: {0}")]
    Ini(#[from] ini::ParseError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Variable '{0}' not found")]
    VariableNotFound(String),

    #[error("variables are missing: {}", .0.join(", "))]
    MissingVariables(Vec<String>),

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Attribute '{attribute}' not found on '{owner}'")]
    AttributeNotFound { owner: String, attribute: String },

    #[error("Cannot convert '{variable}' from '{from}' to '{to}'")]
    UnsupportedConversion {
        variable: String,
        from: String,
        to: String,
    },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid time units: {0}")]
    InvalidTimeUnits(String),

    #[error("Year {0} not available")]
    YearNotAvailable(i32),

    #[error("No available datasets in {}", .0.display())]
    NoDatasets(PathBuf),

    #[error("Command failed with exit code {0}")]
    CommandFailed(i32),
}

/// Result type for workflow steps
pub type Result<T> = std::result::Result<T, FlowError>;

impl FlowError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FlowError::InvalidInput(message.into())
    }
}
