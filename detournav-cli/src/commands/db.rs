//! Navmesh database maintenance commands.

use std::path::PathBuf;

use clap::Subcommand;
use detournav::{TilePosition, TilesPositionsRange};

use super::common::{format_size, load_settings, open_existing_db, resolve_db_path};
use crate::error::CliError;

/// Database subcommands.
#[derive(Debug, Subcommand)]
pub enum DbAction {
    /// Show database statistics
    Stats,

    /// Rebuild the database file, reclaiming space of deleted tiles
    Vacuum,

    /// Delete tiles of a worldspace outside a tile range
    Prune {
        /// Worldspace to prune
        #[arg(long)]
        worldspace: String,

        /// First tile of the kept range, as `x,y`
        #[arg(long, value_parser = parse_tile_position, allow_hyphen_values = true)]
        begin: TilePosition,

        /// Tile just past the kept range, as `x,y`
        #[arg(long, value_parser = parse_tile_position, allow_hyphen_values = true)]
        end: TilePosition,

        /// Vacuum the database afterwards
        #[arg(long)]
        vacuum: bool,
    },
}

/// Run a db subcommand.
pub fn run(action: DbAction, config: Option<PathBuf>, db: Option<PathBuf>) -> Result<(), CliError> {
    let settings = load_settings(config.as_deref())?;
    let path = resolve_db_path(db);
    let navmesh_db = open_existing_db(&path, &settings)?;

    match action {
        DbAction::Stats => {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            println!("Navmesh database: {}", path.display());
            println!("  Tiles:         {}", navmesh_db.get_tiles_count()?);
            println!("  Max tile id:   {}", navmesh_db.get_max_tile_id()?.0);
            println!("  Max shape id:  {}", navmesh_db.get_max_shape_id()?.0);
            println!("  Size:          {}", format_size(size));
            println!(
                "  Size limit:    {}",
                format_size(settings.max_navmeshdb_file_size)
            );
            Ok(())
        }
        DbAction::Vacuum => {
            let before = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            navmesh_db.vacuum()?;
            let after = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            println!(
                "Vacuumed {}: {} -> {}",
                path.display(),
                format_size(before),
                format_size(after)
            );
            Ok(())
        }
        DbAction::Prune {
            worldspace,
            begin,
            end,
            vacuum,
        } => {
            let range = TilesPositionsRange::new(begin, end);
            let removed = navmesh_db.delete_tiles_outside_range(&worldspace, &range)?;
            println!(
                "Removed {} tiles of '{}' outside {}..{}",
                removed, worldspace, begin, end
            );
            if vacuum {
                navmesh_db.vacuum()?;
                println!("Vacuumed database");
            }
            Ok(())
        }
    }
}

/// Parses `x,y` into a tile position.
fn parse_tile_position(value: &str) -> Result<TilePosition, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", value))?;
    let x = x.trim().parse().map_err(|e| format!("invalid x '{}': {}", x, e))?;
    let y = y.trim().parse().map_err(|e| format!("invalid y '{}': {}", y, e))?;
    Ok(TilePosition::new(x, y))
}
