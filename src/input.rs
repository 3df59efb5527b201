//! # Input Configuration Module
//!
//! Run configuration and the plain-text list files the preparation steps read.
//!
//! A run configuration carries the `mint` section shared by the economic
//! and PIHM steps. Workflows hand it over as an INI file:
//!
//! ```ini
//! [mint]
//! start_year = 2017
//! end_year = 2018
//! region = Pongo
//! ```
//!
//! JSON and YAML files with the same `mint` section are accepted too. The
//! format is picked from the extension and anything that is not `.json`,
//! `.yaml` or `.yml` is read as INI.
//!
//! ```rust,no_run
//! use mintflow::input::RunConfig;
//!
//! let config = RunConfig::from_file("mint_run.config")?;
//! println!("{} {}", config.mint.region, config.mint.end_year);
//! # Ok::<(), mintflow::error::FlowError>(())
//! ```

use crate::error::{FlowError, Result};
use ini::Ini;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Workflow run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub mint: MintSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    pub end_year: i32,
    pub region: String,
}

impl RunConfig {
    /// Loads a configuration, choosing JSON, YAML or INI by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match extension.as_deref() {
            Some("json") => Self::from_json(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_ini(&content),
        }
    }

    /// Reads the `[mint]` section of an INI document.
    pub fn from_ini(ini_str: &str) -> Result<Self> {
        let ini = Ini::load_from_str(ini_str)?;
        let section = ini
            .section(Some("mint"))
            .ok_or_else(|| FlowError::invalid("configuration has no [mint] section"))?;
        let year = |key: &str| -> Result<Option<i32>> {
            section
                .get(key)
                .map(|v| {
                    v.trim().parse().map_err(|_| {
                        FlowError::invalid(format!("mint.{} is not a year: '{}'", key, v))
                    })
                })
                .transpose()
        };
        Ok(RunConfig {
            mint: MintSection {
                start_year: year("start_year")?,
                end_year: year("end_year")?
                    .ok_or_else(|| FlowError::invalid("mint.end_year is missing"))?,
                region: section
                    .get("region")
                    .map(|r| r.trim().to_string())
                    .ok_or_else(|| FlowError::invalid("mint.region is missing"))?,
            },
        })
    }

    pub fn from_json(json_str: &str) -> Result<Self> {
        Ok(serde_json::from_str(json_str)?)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml_str)?)
    }
}

/// Reads a list file: one entry per line, trimmed, blank lines skipped.
pub fn read_list_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_list(&content))
}

pub fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
