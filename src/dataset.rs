//! # NetCDF Helpers
//!
//! Attribute lookups, masked reads and coordinate handling shared by the
//! steps that read gridded NetCDF data.

use crate::error::{FlowError, Result};
use crate::numeric::mask_sentinels;
use log::debug;
use netcdf::AttributeValue;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Converts a scalar numeric attribute value to f64.
pub fn value_as_f64(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Double(v) => Some(*v),
        AttributeValue::Float(v) => Some(*v as f64),
        AttributeValue::Int(v) => Some(*v as f64),
        AttributeValue::Short(v) => Some(*v as f64),
        AttributeValue::Longlong(v) => Some(*v as f64),
        AttributeValue::Uint(v) => Some(*v as f64),
        AttributeValue::Ushort(v) => Some(*v as f64),
        AttributeValue::Uchar(v) => Some(*v as f64),
        AttributeValue::Schar(v) => Some(*v as f64),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Floats(v) => v.first().map(|x| *x as f64),
        AttributeValue::Ints(v) => v.first().map(|x| *x as f64),
        AttributeValue::Shorts(v) => v.first().map(|x| *x as f64),
        _ => None,
    }
}

pub fn attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    var.attribute(name)
        .and_then(|attr| attr.value().ok())
        .and_then(|value| value_as_f64(&value))
}

pub fn attr_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        AttributeValue::Strs(v) => Some(v.join(" ")),
        _ => None,
    }
}

pub fn global_attr_string(file: &netcdf::File, name: &str) -> Option<String> {
    match file.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        AttributeValue::Strs(v) => Some(v.join(" ")),
        _ => None,
    }
}

/// Sentinels declared by `_FillValue` and `missing_value`.
pub fn missing_sentinels(var: &netcdf::Variable) -> Vec<f64> {
    ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| attr_f64(var, name))
        .collect()
}

pub fn variable<'f>(file: &'f netcdf::File, name: &str) -> Result<netcdf::Variable<'f>> {
    file.variable(name)
        .ok_or_else(|| FlowError::VariableNotFound(name.to_string()))
}

/// Applies `scale_factor` and `add_offset` to values already read from `var`.
///
/// Masking has to happen first, sentinels are stored packed.
pub fn unpack(var: &netcdf::Variable, values: &mut [f64]) {
    let scale = attr_f64(var, "scale_factor").unwrap_or(1.0);
    let offset = attr_f64(var, "add_offset").unwrap_or(0.0);
    if scale != 1.0 || offset != 0.0 {
        for v in values.iter_mut() {
            *v = *v * scale + offset;
        }
    }
}

/// Reads a slab of `var` with missing cells set to NaN and packing undone.
pub fn read_unpacked_slab<E>(var: &netcdf::Variable, extents: E) -> Result<Vec<f64>>
where
    E: TryInto<netcdf::Extents>,
    E::Error: Into<netcdf::Error>,
{
    let mut values = var.get_values::<f64, _>(extents)?;
    mask_sentinels(&mut values, &missing_sentinels(var));
    unpack(var, &mut values);
    Ok(values)
}

pub fn shape(var: &netcdf::Variable) -> Vec<usize> {
    var.dimensions().iter().map(|d| d.len()).collect()
}

pub fn dimension_names(var: &netcdf::Variable) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name().to_string()).collect()
}

/// Reads a one-dimensional coordinate variable.
pub fn read_coordinate(file: &netcdf::File, name: &str) -> Result<Vec<f64>> {
    let var = variable(file, name)?;
    Ok(var.get_values::<f64, _>(..)?)
}

/// Lists `*.nc` files directly inside `dir`, sorted by name.
pub fn list_nc_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "nc"))
        .collect();
    files.sort();
    debug!("Found {} NetCDF files in {}", files.len(), dir.as_ref().display());
    Ok(files)
}

/// Lists sub-directories of `dir`, sorted by name.
pub fn list_subdirs<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Index range of coordinate values inside `[lo, hi]`, in file order.
///
/// Works for ascending and descending coordinates. Returns `None` when no
/// value falls inside the interval.
pub fn inclusive_range(coords: &[f64], lo: f64, hi: f64) -> Option<std::ops::Range<usize>> {
    let first = coords.iter().position(|c| *c >= lo && *c <= hi)?;
    let last = coords.iter().rposition(|c| *c >= lo && *c <= hi)?;
    Some(first..last + 1)
}

/// Index range of ascending coordinate values strictly inside `(lo, hi)`.
pub fn exclusive_range(coords: &[f64], lo: f64, hi: f64) -> Option<std::ops::Range<usize>> {
    let first = coords.iter().position(|c| *c > lo && *c < hi)?;
    let last = coords.iter().rposition(|c| *c > lo && *c < hi)?;
    Some(first..last + 1)
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Result<Self> {
        if min_lon >= max_lon {
            return Err(FlowError::invalid(format!(
                "minimum longitude {} must be below maximum longitude {}",
                min_lon, max_lon
            )));
        }
        if min_lat >= max_lat {
            return Err(FlowError::invalid(format!(
                "minimum latitude {} must be below maximum latitude {}",
                min_lat, max_lat
            )));
        }
        Ok(BoundingBox {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        })
    }
}

impl FromStr for BoundingBox {
    type Err = FlowError;

    /// Parses `[min_lon,max_lon,min_lat,max_lat]`, brackets optional.
    fn from_str(s: &str) -> Result<Self> {
        let values = parse_number_list(s)?;
        if values.len() != 4 {
            return Err(FlowError::invalid(format!(
                "bounding box needs 4 values, got {}",
                values.len()
            )));
        }
        BoundingBox::new(values[0], values[1], values[2], values[3])
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_lon, self.max_lon, self.min_lat, self.max_lat
        )
    }
}

/// Parses `[a,b,c]` or `a,b,c` into numbers.
pub fn parse_number_list(s: &str) -> Result<Vec<f64>> {
    let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
    inner
        .split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>()
                .map_err(|_| FlowError::invalid(format!("'{}' is not a number", part)))
        })
        .collect()
}
