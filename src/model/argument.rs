//! Declared arguments of tables and columns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::ValueType;

/// Argument name → raw value. Ordered so bindings serialize canonically.
pub type Bindings = BTreeMap<String, String>;

/// An argument a table or column accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDef {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Empty means any value of the declared type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl ArgumentDef {
    pub fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            default: None,
            allowed_values: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_allowed_values(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Check a value against the declared type and allowed values.
    ///
    /// Returns the reason on failure.
    pub fn check(&self, value: &str) -> Result<(), String> {
        if !self.allowed_values.is_empty() && !self.allowed_values.iter().any(|v| v == value) {
            return Err(format!(
                "must be one of [{}]",
                self.allowed_values.join(", ")
            ));
        }
        if !self.value_type.matches(value) {
            return Err(format!("is not a valid {}", self.value_type));
        }
        Ok(())
    }
}

/// Bind declared arguments: explicit values first, then declared defaults.
///
/// Arguments with neither stay unbound; callers decide whether that is an error.
pub fn bind(declared: &[ArgumentDef], explicit: &Bindings) -> Bindings {
    let mut bound = Bindings::new();
    for arg in declared {
        if let Some(value) = explicit.get(&arg.name).or(arg.default.as_ref()) {
            bound.insert(arg.name.clone(), value.clone());
        }
    }
    bound
}
