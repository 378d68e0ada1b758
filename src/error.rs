//! Crate-level error type.

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::SettingsError;
use crate::executor::ExecutionError;
use crate::semantic::error::SemanticError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    /// The dialect cannot express a non-zero offset.
    #[error("dialect {dialect} does not support offset pagination (offset {offset})")]
    UnsupportedPagination { dialect: String, offset: u64 },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl Error {
    /// Whether the client sent something the engine cannot answer.
    ///
    /// Schema problems and execution failures are server-side.
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::Semantic(err) => err.is_client_error(),
            Error::UnsupportedPagination { .. } => true,
            Error::Execution(_) | Error::Cache(_) | Error::Settings(_) => false,
        }
    }
}
