//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use detournav::settings::ConfigError;
use detournav::{DbError, NavigatorError};

/// Errors reported by `navmeshtool` commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration file could not be loaded.
    Config(String),

    /// Scene file could not be read or holds invalid geometry.
    Scene { path: PathBuf, message: String },

    /// Navmesh database operation failed.
    Db(DbError),

    /// Navigator could not be started.
    Navigator(NavigatorError),

    /// Filesystem operation failed.
    Io { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(message) => write!(f, "Configuration error: {}", message),
            CliError::Scene { path, message } => {
                write!(f, "Invalid scene {}: {}", path.display(), message)
            }
            CliError::Db(e) => write!(f, "Navmesh database error: {}", e),
            CliError::Navigator(e) => write!(f, "Navigator error: {}", e),
            CliError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Db(e) => Some(e),
            CliError::Navigator(e) => Some(e),
            CliError::Io { source, .. } => Some(source),
            CliError::Config(_) | CliError::Scene { .. } => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<DbError> for CliError {
    fn from(e: DbError) -> Self {
        CliError::Db(e)
    }
}

impl From<NavigatorError> for CliError {
    fn from(e: NavigatorError) -> Self {
        CliError::Navigator(e)
    }
}
