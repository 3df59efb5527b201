//! Points each workflow component at its model catalog entry.
//!
//! `model.csv` lists `folder,model` pairs; each folder holds a
//! `wings-component.yml` (or `.yaml`) whose `wings.source` is replaced.

use crate::error::{FlowError, Result};
use log::info;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub folder: String,
    pub model: String,
}

pub fn read_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<CatalogEntry>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut entries = Vec::new();
    for row in reader.deserialize() {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn component_file(dir: &Path) -> Result<PathBuf> {
    ["wings-component.yml", "wings-component.yaml"]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            FlowError::invalid(format!("no wings-component.yml in {}", dir.display()))
        })
}

/// Sets `wings.source` in a component document, creating `wings` if absent.
pub fn set_source(doc: &mut Value, source: &str) -> Result<()> {
    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| FlowError::invalid("component description is not a mapping"))?;
    if root.get("wings").is_none() {
        root.insert(Value::from("wings"), Value::Mapping(Mapping::new()));
    }
    let wings = root
        .get_mut("wings")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| FlowError::invalid("'wings' is not a mapping"))?;
    wings.insert(Value::from("source"), Value::from(source));
    Ok(())
}

/// `insert-source`
pub fn insert_source<P: AsRef<Path>>(catalog: P) -> Result<usize> {
    let base = catalog
        .as_ref()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let entries = read_catalog(catalog)?;
    for entry in &entries {
        let path = component_file(&base.join(&entry.folder))?;
        let mut doc: Value = serde_yaml::from_str(&fs::read_to_string(&path)?)?;
        set_source(&mut doc, &entry.model)?;
        fs::write(&path, serde_yaml::to_string(&doc)?)?;
        info!("{} -> {}", path.display(), entry.model);
    }
    Ok(entries.len())
}
