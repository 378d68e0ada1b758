//! Error types for the semantic layer.
//!
//! One error type covers schema validation, reference resolution and
//! query planning.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result type for semantic operations.
pub type SemanticResult<T> = Result<T, SemanticError>;

/// Part of the client query an `InvalidQuery` error points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryClause {
    Table,
    Columns,
    Metrics,
    Where,
    Having,
    Sort,
    Pagination,
    Arguments,
}

impl fmt::Display for QueryClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryClause::Table => "table",
            QueryClause::Columns => "columns",
            QueryClause::Metrics => "metrics",
            QueryClause::Where => "where",
            QueryClause::Having => "having",
            QueryClause::Sort => "sort",
            QueryClause::Pagination => "pagination",
            QueryClause::Arguments => "arguments",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SemanticError {
    /// Column formulas reference each other in a loop.
    ///
    /// `path` runs from the first occurrence of the repeated column to the repeat.
    ReferenceCycle { path: Vec<String> },

    /// A template needs an argument nobody supplied and that has no default.
    MissingArgument { column: String, argument: String },

    /// An argument value failed its declared type or allowed values.
    InvalidArgument {
        argument: String,
        value: String,
        reason: String,
    },

    /// The client query is malformed.
    InvalidQuery {
        clause: QueryClause,
        message: String,
    },

    UnknownTable(String),

    UnknownColumn { table: String, column: String },

    UnknownJoin { table: String, join: String },

    /// A `{{...}}` token that doesn't parse or isn't valid where it appears.
    InvalidReference(String),

    /// The schema document is inconsistent.
    InvalidSchema(String),
}

impl SemanticError {
    pub fn invalid_query(clause: QueryClause, message: impl Into<String>) -> Self {
        SemanticError::InvalidQuery {
            clause,
            message: message.into(),
        }
    }

    /// Errors caused by the client request rather than the schema.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SemanticError::InvalidQuery { .. }
                | SemanticError::InvalidArgument { .. }
                | SemanticError::MissingArgument { .. }
        )
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticError::ReferenceCycle { path } => {
                write!(f, "Formula reference loop: {}", path.join("->"))
            }
            SemanticError::MissingArgument { column, argument } => {
                write!(
                    f,
                    "Column '{}' requires argument '{}' but no value or default was provided",
                    column, argument
                )
            }
            SemanticError::InvalidArgument {
                argument,
                value,
                reason,
            } => {
                write!(f, "Argument '{}' value '{}' {}", argument, value, reason)
            }
            SemanticError::InvalidQuery { clause, message } => {
                write!(f, "Invalid query ({}): {}", clause, message)
            }
            SemanticError::UnknownTable(name) => {
                write!(f, "Unknown table: '{}'", name)
            }
            SemanticError::UnknownColumn { table, column } => {
                write!(f, "Unknown column '{}' on table '{}'", column, table)
            }
            SemanticError::UnknownJoin { table, join } => {
                write!(f, "Unknown join '{}' on table '{}'", join, table)
            }
            SemanticError::InvalidReference(msg) => {
                write!(f, "Invalid reference: {}", msg)
            }
            SemanticError::InvalidSchema(msg) => {
                write!(f, "Invalid schema: {}", msg)
            }
        }
    }
}

impl std::error::Error for SemanticError {}
