//! # NetCDF Summary
//!
//! Describes a NetCDF file the way `open-netcdf` will see it: the store key
//! each variable gets, its units and shape, and whether it is a record
//! variable concatenated across files.

use crate::dataset::{attr_string, dimension_names, global_attr_string, shape, value_as_f64};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionSummary {
    pub name: String,
    pub len: usize,
    pub unlimited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSummary {
    pub name: String,
    /// Key under which `open-netcdf` stores the variable.
    pub key: String,
    pub units: String,
    pub data_type: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    /// First dimension is unlimited, so the variable is concatenated across files.
    pub record: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub dimensions: Vec<DimensionSummary>,
    pub variables: Vec<VariableSummary>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub global_attributes: BTreeMap<String, String>,
}

fn attribute_text(value: &netcdf::AttributeValue) -> String {
    match value {
        netcdf::AttributeValue::Str(s) => s.clone(),
        netcdf::AttributeValue::Strs(v) => v.join(" "),
        other => value_as_f64(other)
            .map(|v| v.to_string())
            .unwrap_or_else(|| format!("{:?}", other)),
    }
}

fn summarize_variable(var: &netcdf::Variable, detailed: bool) -> VariableSummary {
    let name = var.name().to_string();
    let attributes = if detailed {
        var.attributes()
            .filter_map(|a| a.value().ok().map(|v| (a.name().to_string(), attribute_text(&v))))
            .collect()
    } else {
        BTreeMap::new()
    };
    VariableSummary {
        key: attr_string(var, "long_name").unwrap_or_else(|| name.clone()),
        units: attr_string(var, "units").unwrap_or_else(|| "NA".to_string()),
        data_type: format!("{:?}", var.vartype()),
        dimensions: dimension_names(var),
        shape: shape(var),
        record: var.dimensions().first().is_some_and(|d| d.is_unlimited()),
        attributes,
        name,
    }
}

/// Summarizes `path`, optionally restricted to one variable.
///
/// With `detailed`, variable and global attributes are included too.
pub fn summarize<P: AsRef<Path>>(path: P, variable: Option<&str>, detailed: bool) -> Result<FileSummary> {
    let path = path.as_ref();
    debug!("Summarizing {}", path.display());
    let file = netcdf::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let variables: Vec<VariableSummary> = file
        .variables()
        .filter(|v| variable.is_none_or(|wanted| v.name() == wanted))
        .map(|v| summarize_variable(&v, detailed))
        .collect();
    if let Some(wanted) = variable
        && variables.is_empty()
    {
        anyhow::bail!("Variable '{}' not found in {}", wanted, path.display());
    }

    let global_attributes = if detailed {
        file.attributes()
            .filter_map(|a| a.value().ok().map(|v| (a.name().to_string(), attribute_text(&v))))
            .collect()
    } else {
        BTreeMap::new()
    };

    Ok(FileSummary {
        path: path.display().to_string(),
        title: global_attr_string(&file, "title"),
        size_bytes: fs::metadata(path).ok().map(|m| m.len()),
        dimensions: file
            .dimensions()
            .map(|d| DimensionSummary {
                name: d.name().to_string(),
                len: d.len(),
                unlimited: d.is_unlimited(),
            })
            .collect(),
        variables,
        global_attributes,
    })
}

pub fn print_human(summary: &FileSummary) {
    println!("{}", summary.path);
    if let Some(title) = &summary.title {
        println!("  {}", title);
    }
    if let Some(size) = summary.size_bytes {
        println!("  {:.2} MB", size as f64 / 1_048_576.0);
    }
    let dims: Vec<String> = summary
        .dimensions
        .iter()
        .map(|d| {
            if d.unlimited {
                format!("{}={} (unlimited)", d.name, d.len)
            } else {
                format!("{}={}", d.name, d.len)
            }
        })
        .collect();
    println!("  dimensions: {}", dims.join(", "));
    println!("  variables ({}):", summary.variables.len());
    for var in &summary.variables {
        let marker = if var.record { "*" } else { " " };
        println!(
            "  {} {:<12} {:<36} [{}] ({}) {:?}",
            marker,
            var.name,
            format!("\"{}\"", var.key),
            var.units,
            var.dimensions.join(", "),
            var.shape
        );
        for (name, value) in &var.attributes {
            println!("        {} = {}", name, value);
        }
    }
    for (name, value) in &summary.global_attributes {
        println!("  :{} = {}", name, value);
    }
}

pub fn print_json(summary: &FileSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

pub fn print_yaml(summary: &FileSummary) -> Result<()> {
    print!(
        "{}",
        serde_yaml::to_string(summary).context("Failed to serialize summary as YAML")?
    );
    Ok(())
}
