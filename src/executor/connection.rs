//! Driver seam: connections and the provider that hands them out.

use std::fmt::Debug;

use super::cancel::CancellationToken;
use super::error::ExecutionResult;
use crate::model::Value;

/// Rows as returned by the driver, before coercion to declared types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawRows {
    /// The single value of a one-row, one-column result.
    pub fn scalar(&self) -> Option<&Value> {
        match self.rows.as_slice() {
            [row] => row.first(),
            _ => None,
        }
    }
}

/// One logical database connection, held for the duration of an execution.
pub trait Connection: Send {
    /// Run a statement and collect its rows.
    ///
    /// Implementations poll `cancel` while the statement runs and return
    /// `ExecutionError::Cancelled` when it trips.
    fn query(&mut self, sql: &str, cancel: &CancellationToken) -> ExecutionResult<RawRows>;
}

/// Hands out connections by name.
pub trait ConnectionProvider: Debug + Send + Sync {
    /// `None` asks for the default connection.
    fn connect(&self, name: Option<&str>) -> ExecutionResult<Box<dyn Connection>>;
}
