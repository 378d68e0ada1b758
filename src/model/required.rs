//! Where conditions a query must carry.

use serde::{Deserialize, Serialize};

use crate::semantic::query::{Operator, Predicate};

/// A where predicate that must be present, at the top level of the where
/// conjunction, on every query over a table (or selecting a column).
///
/// Predicates under `OR` or `NOT` do not count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredFilter {
    /// Dotted path, as written in a where predicate.
    pub field: String,
    /// Unset means any operator satisfies the requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
}

impl RequiredFilter {
    pub fn on(field: &str) -> Self {
        Self {
            field: field.into(),
            operator: None,
        }
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn is_satisfied_by(&self, predicate: &Predicate) -> bool {
        predicate.path.to_dotted() == self.field && self.operator.map_or(true, |op| op == predicate.operator)
    }

    /// `recordedDate` or `recordedDate Ge`.
    pub fn describe(&self) -> String {
        match self.operator {
            Some(op) => format!("{} {:?}", self.field, op),
            None => self.field.clone(),
        }
    }
}
