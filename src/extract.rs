//! # Variable Extraction
//!
//! Opens one or more NetCDF files as a single dataset and collects every
//! numeric variable into a [`VariableStore`].
//!
//! Variables whose first dimension is unlimited (usually `time`) are
//! concatenated across the files in the order given; every other variable
//! is read from the first file only. Entries are keyed by the `long_name`
//! attribute, which is how the later preparation steps address them.

use crate::dataset::{attr_f64, attr_string, dimension_names, read_unpacked_slab, shape};
use crate::error::{FlowError, Result};
use crate::store::{StoredVariable, Values, VariableStore};
use log::{debug, info, warn};
use std::path::Path;

/// Per-variable metadata gathered from the first file.
#[derive(Debug, Clone)]
struct VariableLayout {
    name: String,
    key: String,
    units: String,
    standard_name: String,
    missing_value: Option<f64>,
    dimensions: Vec<String>,
    shape: Vec<usize>,
    aggregated: bool,
}

impl VariableLayout {
    fn from_variable(var: &netcdf::Variable) -> Self {
        let name = var.name().to_string();
        let aggregated = var
            .dimensions()
            .first()
            .map(|d| d.is_unlimited())
            .unwrap_or(false);
        VariableLayout {
            key: attr_string(var, "long_name").unwrap_or_else(|| name.clone()),
            units: attr_string(var, "units").unwrap_or_else(|| "NA".to_string()),
            standard_name: attr_string(var, "standard_name").unwrap_or_else(|| "NA".to_string()),
            missing_value: attr_f64(var, "missing_value"),
            dimensions: dimension_names(var),
            shape: shape(var),
            aggregated,
            name,
        }
    }
}

/// Reads a variable with missing cells masked and packing undone.
pub fn read_unpacked(var: &netcdf::Variable) -> Result<Vec<f64>> {
    read_unpacked_slab(var, ..)
}

/// Opens `files` as one dataset and returns all of its numeric variables.
pub fn open_dataset<P: AsRef<Path>>(files: &[P]) -> Result<VariableStore> {
    let first_path = files
        .first()
        .ok_or_else(|| FlowError::invalid("at least one NetCDF file is required"))?;
    let first = netcdf::open(first_path.as_ref())?;
    info!(
        "Opening {} NetCDF file(s), layout from {}",
        files.len(),
        first_path.as_ref().display()
    );

    let layouts: Vec<VariableLayout> = first
        .variables()
        .map(|v| VariableLayout::from_variable(&v))
        .collect();
    let mut store = VariableStore::new();

    let others: Vec<netcdf::File> = files[1..]
        .iter()
        .map(|p| netcdf::open(p.as_ref()))
        .collect::<std::result::Result<_, _>>()?;

    for layout in layouts {
        let var = first
            .variable(&layout.name)
            .ok_or_else(|| FlowError::VariableNotFound(layout.name.clone()))?;
        let mut values = match read_unpacked(&var) {
            Ok(values) => values,
            Err(e) => {
                warn!("Skipping non-numeric variable '{}': {}", layout.name, e);
                continue;
            }
        };
        let mut shape = layout.shape.clone();

        if layout.aggregated {
            for other in &others {
                let var = other
                    .variable(&layout.name)
                    .ok_or_else(|| FlowError::VariableNotFound(layout.name.clone()))?;
                let other_shape: Vec<usize> = crate::dataset::shape(&var);
                if other_shape.get(1..) != shape.get(1..) {
                    return Err(FlowError::ShapeMismatch(format!(
                        "'{}' has shape {:?} in one file and {:?} in another",
                        layout.name, shape, other_shape
                    )));
                }
                values.extend(read_unpacked(&var)?);
                shape[0] += other_shape[0];
            }
        }

        debug!(
            "Variable '{}' stored as '{}' with shape {:?}",
            layout.name, layout.key, shape
        );
        store.insert(
            &layout.key,
            StoredVariable {
                values: Values::Numeric(values),
                shape,
                dimensions: layout.dimensions,
                units: layout.units,
                standard_name: Some(layout.standard_name),
                missing_value: layout.missing_value,
                notes: None,
                calendar: None,
            },
        );
    }

    info!("Collected {} variables", store.len());
    Ok(store)
}

/// `open-netcdf`: aggregates `files` and saves the result to `output`.
pub fn open_netcdf<P: AsRef<Path>, Q: AsRef<Path>>(files: &[P], output: Q) -> Result<()> {
    let store = open_dataset(files)?;
    store.save(output)
}
