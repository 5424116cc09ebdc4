//! Helpers shared across CLI commands.

use std::path::{Path, PathBuf};

use detournav::settings::{default_config_path, default_db_path};
use detournav::{NavMeshDb, Settings};
use tracing::{debug, info};

use crate::error::CliError;

/// Loads navigator settings.
///
/// An explicitly given file must exist; the default file is optional.
pub fn load_settings(config: Option<&Path>) -> Result<Settings, CliError> {
    let (path, required) = match config {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    if !path.exists() {
        if required {
            return Err(CliError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "No configuration file, using defaults");
        return Ok(Settings::default());
    }

    let settings = Settings::load(&path)?;
    settings.validate()?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(settings)
}

/// Database path from the CLI, falling back to the default location.
pub fn resolve_db_path(db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(default_db_path)
}

/// Opens the database, creating its directory when needed.
pub fn open_db(path: &Path, settings: &Settings) -> Result<NavMeshDb, CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| CliError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(NavMeshDb::open(path, settings.max_navmeshdb_file_size)?)
}

/// Opens an existing database without creating anything.
pub fn open_existing_db(path: &Path, settings: &Settings) -> Result<NavMeshDb, CliError> {
    if !path.exists() {
        return Err(CliError::Config(format!(
            "Navmesh database not found: {}",
            path.display()
        )));
    }
    Ok(NavMeshDb::open(path, settings.max_navmeshdb_file_size)?)
}

/// Human readable byte size.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
