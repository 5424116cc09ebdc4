//! INI configuration file support.
//!
//! Settings live in a `[Navigator]` section using human-readable keys:
//!
//! ```text
//! [Navigator]
//! async nav mesh updater threads = 2
//! min update interval ms = 250
//! write to navmeshdb = true
//! tile size = 64
//! ```
//!
//! Missing keys keep their defaults, unknown keys are ignored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::Settings;

/// Section holding all navigator keys.
pub const SECTION: &str = "Navigator";

/// Errors raised while reading a configuration file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    Read { path: PathBuf, message: String },

    /// A key holds a value that cannot be parsed.
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, message } => {
                write!(f, "Failed to read {}: {}", path.display(), message)
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{}' for key '{}'", value, key)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("detournav")
        .join("navigator.ini")
}

/// Default location of the navmesh database.
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("detournav")
        .join("navmesh.db")
}

impl Settings {
    /// Loads settings from an INI file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Loads settings from INI text on top of the defaults.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        let Some(section) = ini.section(Some(SECTION)) else {
            return Ok(settings);
        };

        read(section, "enable", &mut settings.enable)?;
        read(
            section,
            "async nav mesh updater threads",
            &mut settings.async_navmesh_updater_threads,
        )?;
        read(
            section,
            "max nav mesh tiles cache size",
            &mut settings.max_navmesh_tiles_cache_size,
        )?;
        let mut interval_ms = settings.min_update_interval.as_millis() as u64;
        read(section, "min update interval ms", &mut interval_ms)?;
        settings.min_update_interval = Duration::from_millis(interval_ms);
        read(
            section,
            "wait until min distance to player",
            &mut settings.wait_until_min_distance_to_player,
        )?;
        read(section, "max tiles number", &mut settings.max_tiles_number)?;
        read(
            section,
            "enable nav mesh disk cache",
            &mut settings.enable_navmesh_disk_cache,
        )?;
        read(section, "write to navmeshdb", &mut settings.write_to_navmeshdb)?;
        read(
            section,
            "max navmeshdb file size",
            &mut settings.max_navmeshdb_file_size,
        )?;

        let recast = &mut settings.recast;
        read(section, "cell size", &mut recast.cell_size)?;
        read(section, "cell height", &mut recast.cell_height)?;
        read(section, "tile size", &mut recast.tile_size)?;
        read(section, "border size", &mut recast.border_size)?;
        read(section, "recast scale factor", &mut recast.recast_scale_factor)?;
        read(section, "max climb", &mut recast.max_climb)?;
        read(section, "max slope", &mut recast.max_slope)?;
        read(section, "swim height scale", &mut recast.swim_height_scale)?;
        read(section, "region min size", &mut recast.region_min_size)?;

        let detour = &mut settings.detour;
        read(
            section,
            "max nav mesh query nodes",
            &mut detour.max_navmesh_query_nodes,
        )?;
        read(section, "max polygon path size", &mut detour.max_polygon_path_size)?;
        read(section, "max smooth path size", &mut detour.max_smooth_path_size)?;
        read(section, "water cost", &mut detour.area_costs.water)?;
        read(section, "door cost", &mut detour.area_costs.door)?;
        read(section, "pathgrid cost", &mut detour.area_costs.pathgrid)?;
        read(section, "ground cost", &mut detour.area_costs.ground)?;

        Ok(settings)
    }
}

fn read<T: FromStr>(section: &Properties, key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Some(value) = section.get(key) {
        *target = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_section_keeps_defaults() {
        let settings = Settings::from_ini_str("[Other]\nfoo = 1\n").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_reads_known_keys() {
        let settings = Settings::from_ini_str(
            "[Navigator]\n\
             async nav mesh updater threads = 3\n\
             min update interval ms = 40\n\
             write to navmeshdb = false\n\
             tile size = 32\n\
             unknown key = whatever\n",
        )
        .unwrap();
        assert_eq!(settings.async_navmesh_updater_threads, 3);
        assert_eq!(settings.min_update_interval, Duration::from_millis(40));
        assert!(!settings.write_to_navmeshdb);
        assert_eq!(settings.recast.tile_size, 32);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let err = Settings::from_ini_str("[Navigator]\ntile size = big\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(err.to_string().contains("tile size"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[Navigator]\nmax tiles number = 128").unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.max_tiles_number, 128);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("absent.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
