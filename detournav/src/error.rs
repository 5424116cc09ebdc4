//! Navigator construction errors.
//!
//! Only setup can fail loudly: per-tile build failures are contained by the
//! updater and query failures are reported as [`crate::navmesh::Status`].

use thiserror::Error;

use crate::db::DbError;
use crate::settings::ConfigError;

/// Errors returned while building a navigator.
#[derive(Debug, Error)]
pub enum NavigatorError {
    #[error("Invalid navigator settings: {0}")]
    InvalidSettings(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Navmesh database error: {0}")]
    Db(#[from] DbError),

    #[error("Failed to spawn navigator thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// Result type for navigator setup.
pub type NavigatorResult<T> = Result<T, NavigatorError>;
