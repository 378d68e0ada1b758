//! Execution error types.

use thiserror::Error;

/// Result type for execution operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Errors raised while running generated statements.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The driver rejected or failed a statement.
    #[error("statement failed: {source}\n{sql}")]
    Statement {
        sql: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A returned value does not fit the column's declared type.
    #[error("cannot read column '{column}' as {expected}: {value}\n{sql}")]
    Coercion {
        sql: String,
        column: String,
        expected: String,
        value: String,
    },

    /// The statement produced rows of the wrong shape.
    #[error("unexpected result shape: {message}\n{sql}")]
    Shape { sql: String, message: String },

    #[error("execution cancelled")]
    Cancelled,

    #[error("no connection named '{0}'")]
    UnknownConnection(String),

    #[error("failed to open connection '{name}': {message}")]
    Connect { name: String, message: String },
}

impl ExecutionError {
    pub fn statement(sql: &str, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        ExecutionError::Statement {
            sql: sql.to_string(),
            source: Box::new(source),
        }
    }

    /// SQL of the failing statement, when there is one.
    pub fn sql(&self) -> Option<&str> {
        match self {
            ExecutionError::Statement { sql, .. }
            | ExecutionError::Coercion { sql, .. }
            | ExecutionError::Shape { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Whether running the same request again may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ExecutionError::Statement { .. } | ExecutionError::Cancelled | ExecutionError::Connect { .. }
        )
    }
}
