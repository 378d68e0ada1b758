//! Declared relationships between tables.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
    Full,
    Cross,
}

/// A named join from one table to another.
///
/// `expression` is an ON template: `{{x}}` refers to the parent table and
/// `{{<name>.x}}` to the joined table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub kind: JoinKind,
    #[serde(default)]
    pub expression: String,
}

impl Join {
    pub fn new(name: &str, target: &str, kind: JoinKind, expression: &str) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind,
            expression: expression.into(),
        }
    }
}
