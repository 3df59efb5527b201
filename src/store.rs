//! # Variable Store
//!
//! The variable store is the file handed from one NetCDF preparation step to
//! the next: a mapping from a variable's descriptive name to its values and
//! metadata. It is serialized as JSON; NaN values are written as `null` and
//! read back as NaN so masked cells survive the round trip. JSON has no
//! infinity, so infinite values are written as `null` too and come back as NaN.
//!
//! ```rust,no_run
//! use mintflow::store::VariableStore;
//!
//! let store = VariableStore::load("era5.json")?;
//! let temperature = store.get("2 metre temperature")?;
//! println!("{} values in {}", temperature.len(), temperature.units);
//! # Ok::<(), mintflow::error::FlowError>(())
//! ```

use crate::error::{FlowError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Values held by a stored variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    Numeric(#[serde(with = "nullable_floats")] Vec<f64>),
    Text(Vec<String>),
}

/// One entry of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVariable {
    pub values: Values,
    /// Array shape; empty for scalars.
    #[serde(default)]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<String>,
}

impl StoredVariable {
    pub fn numeric(values: Vec<f64>, shape: Vec<usize>, units: &str) -> Self {
        StoredVariable {
            values: Values::Numeric(values),
            shape,
            dimensions: Vec::new(),
            units: units.to_string(),
            standard_name: None,
            missing_value: None,
            notes: None,
            calendar: None,
        }
    }

    pub fn scalar(value: f64, units: &str) -> Self {
        Self::numeric(vec![value], Vec::new(), units)
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    /// Numeric values, or an error naming the variable if it holds text.
    pub fn as_numeric(&self, name: &str) -> Result<&[f64]> {
        match &self.values {
            Values::Numeric(v) => Ok(v),
            Values::Text(_) => Err(FlowError::invalid(format!(
                "variable '{}' does not hold numeric values",
                name
            ))),
        }
    }

    pub fn len(&self) -> usize {
        match &self.values {
            Values::Numeric(v) => v.len(),
            Values::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Name-keyed collection of variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableStore {
    variables: BTreeMap<String, StoredVariable>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading variable store from {}", path.display());
        let content = fs::read_to_string(path)?;
        let store: VariableStore = serde_json::from_str(&content)?;
        debug!("Loaded {} variables", store.len());
        Ok(store)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!(
            "Writing {} variables to store {}",
            self.len(),
            path.display()
        );
        let content = serde_json::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&StoredVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| FlowError::VariableNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut StoredVariable> {
        self.variables
            .get_mut(name)
            .ok_or_else(|| FlowError::VariableNotFound(name.to_string()))
    }

    /// Inserts or replaces a variable.
    pub fn insert(&mut self, name: &str, variable: StoredVariable) {
        self.variables.insert(name.to_string(), variable);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|k| k.as_str())
    }

    /// Names from `wanted` that the store does not hold, in request order.
    pub fn missing<S: AsRef<str>>(&self, wanted: &[S]) -> Vec<String> {
        wanted
            .iter()
            .map(|w| w.as_ref())
            .filter(|w| !self.contains(w))
            .map(|w| w.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

mod nullable_floats {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Non-finite values (NaN and both infinities) become `null`.
    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let nullable: Vec<Option<f64>> = values
            .iter()
            .map(|v| if v.is_finite() { Some(*v) } else { None })
            .collect();
        nullable.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let nullable: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
        Ok(nullable
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect())
    }
}
