//! Navmesh database errors.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type for navmesh database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while reading or writing the navmesh database.
#[derive(Debug, Error)]
pub enum DbError {
    /// The database file could not be opened or initialized
    #[error("Failed to open navmesh database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A tile with the same worldspace, position and input already exists
    #[error("Duplicate navmesh tile for worldspace, position and input")]
    DuplicateTile,

    /// A tile with the same id already exists
    #[error("Duplicate navmesh tile id")]
    DuplicateTileId,

    /// The write would exceed the configured size limit, or the disk is full
    #[error("Navmesh database size limit is reached or disk is full")]
    StorageExhausted,

    /// Another connection holds the write lock
    #[error("Navmesh database is locked")]
    Locked,

    /// The database reported an unusable page size
    #[error("Invalid navmesh database page size: {0}")]
    InvalidPageSize(i64),

    /// Blob compression or decompression failed
    #[error("Navmesh database blob compression error: {0}")]
    Compression(#[source] std::io::Error),

    /// Any other SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for DbError {
    fn from(error: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &error {
            match failure.code {
                ErrorCode::ConstraintViolation => {
                    let is_tile_id = message
                        .as_deref()
                        .is_some_and(|m| m.contains("tiles.tile_id"));
                    return if is_tile_id {
                        DbError::DuplicateTileId
                    } else {
                        DbError::DuplicateTile
                    };
                }
                ErrorCode::DiskFull => return DbError::StorageExhausted,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => return DbError::Locked,
                _ => {}
            }
        }
        DbError::Sqlite(error)
    }
}
