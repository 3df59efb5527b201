//! # Variable Selection and Units
//!
//! Steps that check a variable store against a list of wanted variables and
//! bring their units in line with what the downstream model expects.

use crate::error::{FlowError, Result};
use crate::input::read_list_file;
use crate::store::{Values, VariableStore};
use crate::units::conversion;
use log::{info, warn};
use std::fs;
use std::path::Path;

pub const CONVERTED_NOTE: &str = "units have been converted";

/// Names from `wanted` absent from `store`, logged as warnings.
pub fn select_variables(store: &VariableStore, wanted: &[String]) -> Vec<String> {
    let missing = store.missing(wanted);
    for name in &missing {
        warn!("Variable '{}' is not in the store", name);
    }
    missing
}

/// `select-var`: copies the store and lists the missing variables.
pub fn select_var<P: AsRef<Path>>(store: P, varlist: P, output: P, warnings: P) -> Result<()> {
    let store = VariableStore::load(store)?;
    let wanted = read_list_file(varlist)?;
    let missing = select_variables(&store, &wanted);
    let mut content = String::new();
    for name in &missing {
        content.push_str(name);
        content.push('\n');
    }
    fs::write(warnings, content)?;
    store.save(output)
}

/// Fails with [`FlowError::MissingVariables`] unless every name is present.
pub fn check_complete(store: &VariableStore, wanted: &[String]) -> Result<()> {
    let missing = store.missing(wanted);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(FlowError::MissingVariables(missing))
    }
}

/// `complete-check`
pub fn complete_check<P: AsRef<Path>>(store: P, varlist: P, output: P) -> Result<()> {
    let store = VariableStore::load(store)?;
    let wanted = read_list_file(varlist)?;
    check_complete(&store, &wanted)?;
    info!("All {} listed variables are present", wanted.len());
    store.save(output)
}

/// Converts each listed variable to its desired unit.
///
/// `variables` and `units` pair up by position.
pub fn convert_units(store: &mut VariableStore, variables: &[String], units: &[String]) -> Result<()> {
    if variables.len() != units.len() {
        return Err(FlowError::invalid(format!(
            "{} variables listed but {} units",
            variables.len(),
            units.len()
        )));
    }
    for (name, desired) in variables.iter().zip(units) {
        let variable = store.get_mut(name)?;
        if variable.units == *desired {
            continue;
        }
        let conv = conversion(name, &variable.units, desired)?;
        match &mut variable.values {
            Values::Numeric(values) => {
                for v in values.iter_mut() {
                    *v = conv.apply(*v);
                }
            }
            Values::Text(_) => {
                return Err(FlowError::UnsupportedConversion {
                    variable: name.clone(),
                    from: variable.units.clone(),
                    to: desired.clone(),
                });
            }
        }
        info!("Converted '{}' from {} to {}", name, variable.units, desired);
        variable.units = desired.clone();
        variable.notes = Some(CONVERTED_NOTE.to_string());
    }
    Ok(())
}

/// `adjust-units`
pub fn adjust_units<P: AsRef<Path>>(store: P, varlist: P, unitlist: P, output: P) -> Result<()> {
    let mut store = VariableStore::load(store)?;
    let variables = read_list_file(varlist)?;
    let units = read_list_file(unitlist)?;
    convert_units(&mut store, &variables, &units)?;
    store.save(output)
}
