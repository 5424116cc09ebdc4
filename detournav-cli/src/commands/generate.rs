//! Generate command - pre-build every navmesh tile of a scene into the database.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use tracing::{info, warn};

use detournav::{
    AsyncNavMeshUpdater, ChangeType, GridTileBuilder, NavMeshCacheItem, TileCachedRecastMeshManager,
    TilePosition, TilesPositionsRange, WaitConditionType,
};

use super::common::{format_size, load_settings, open_db, resolve_db_path};
use crate::error::CliError;
use crate::progress::ProgressBarListener;
use crate::scene::Scene;

/// Arguments for the generate command.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Scene file describing agents and worldspace geometry
    pub scene: PathBuf,

    /// Number of worker threads (defaults to the configured updater threads)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Delete stored tiles outside of the generated area of each worldspace
    #[arg(long)]
    pub remove_unused_tiles: bool,

    /// Vacuum the database after generation
    #[arg(long)]
    pub vacuum: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Run the generate command.
pub fn run(
    args: GenerateArgs,
    config: Option<PathBuf>,
    db: Option<PathBuf>,
) -> Result<(), CliError> {
    let started = Instant::now();
    let scene = Scene::load(&args.scene)?;
    if scene.agents.is_empty() {
        return Err(CliError::Scene {
            path: args.scene,
            message: "no agents defined".to_string(),
        });
    }

    let mut settings = load_settings(config.as_deref())?;
    if let Some(threads) = args.threads {
        settings.async_navmesh_updater_threads = threads;
    }
    // Every tile of the scene is in range, wherever the virtual player is.
    settings.max_tiles_number = i32::MAX;
    settings.write_to_navmeshdb = true;
    settings.validate()?;

    let db_path = resolve_db_path(db);
    let navmesh_db = open_db(&db_path, &settings)?;
    println!("Navmesh database: {}", db_path.display());

    let manager = Arc::new(TileCachedRecastMeshManager::new(settings.recast.clone()));
    let mut updater = AsyncNavMeshUpdater::new(
        settings.clone(),
        Arc::clone(&manager),
        Arc::new(GridTileBuilder::new()),
        Some(navmesh_db),
    )?;

    let mut listener = if args.no_progress {
        ProgressBarListener::hidden()
    } else {
        ProgressBarListener::new("")
    };

    let mut generated_ranges = Vec::with_capacity(scene.worldspaces.len());
    for worldspace in &scene.worldspaces {
        manager.set_worldspace(&worldspace.name);
        let applied = worldspace.apply(&manager).map_err(|message| CliError::Scene {
            path: args.scene.clone(),
            message: format!("worldspace '{}': {}", worldspace.name, message),
        })?;

        let range = manager.get_limited_objects_range();
        let mut tiles = BTreeMap::new();
        manager.for_each_tile_position(|tile| {
            tiles.insert(tile, ChangeType::Add);
        });
        info!(
            worldspace = %worldspace.name,
            heightfields = applied.heightfields,
            water = applied.water,
            objects = applied.objects,
            tiles = tiles.len(),
            "Generating worldspace"
        );
        println!(
            "Worldspace '{}': {} heightfields, {} water, {} objects, {} tiles",
            worldspace.name,
            applied.heightfields,
            applied.water,
            applied.objects,
            tiles.len()
        );
        if tiles.is_empty() {
            warn!(worldspace = %worldspace.name, "Worldspace has no bounded geometry");
            generated_ranges.push((worldspace.name.clone(), range));
            continue;
        }

        let player_tile = range_center(&range);
        let navmeshes: Vec<_> = scene
            .agents
            .iter()
            .map(|agent| (agent, NavMeshCacheItem::shared(manager.get_generation())))
            .collect();
        for (agent, navmesh) in &navmeshes {
            updater.post(agent, navmesh, player_tile, &worldspace.name, &tiles);
        }

        listener.set_prefix(worldspace.name.clone());
        updater.wait(&mut listener, WaitConditionType::AllJobsDone);

        for (agent, navmesh) in &navmeshes {
            let item = navmesh.read();
            info!(
                worldspace = %worldspace.name,
                agent = %agent,
                tiles = item.tiles().len(),
                empty_tiles = item.empty_tiles_count(),
                "Generated agent navmesh"
            );
        }
        generated_ranges.push((worldspace.name.clone(), range));
    }
    listener.finish();

    let stats = updater.stats();
    updater.stop();
    println!();
    println!("{}", stats);

    let navmesh_db = open_db(&db_path, &settings)?;
    if args.remove_unused_tiles {
        let mut removed = 0;
        for (name, range) in &generated_ranges {
            removed += navmesh_db.delete_tiles_outside_range(name, range)?;
        }
        println!("Removed {} unused tiles", removed);
    }
    if args.vacuum {
        navmesh_db.vacuum()?;
        println!("Vacuumed database");
    }

    let tiles = navmesh_db.get_tiles_count()?;
    let size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    println!(
        "Done in {:.1}s: {} tiles stored, database size {}",
        started.elapsed().as_secs_f32(),
        tiles,
        format_size(size)
    );
    Ok(())
}

/// Tile in the middle of a range, the origin for an empty one.
fn range_center(range: &TilesPositionsRange) -> TilePosition {
    if range.is_empty() {
        return TilePosition::default();
    }
    TilePosition::new(
        range.begin.x + (range.end.x - range.begin.x) / 2,
        range.begin.y + (range.end.y - range.begin.y) / 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCENE: &str = r#"{
        "agents": [{ "shape_type": "Aabb", "half_extents": [29.0, 29.0, 66.0] }],
        "worldspaces": [{
            "name": "sys::default",
            "heightfields": [{ "cell": [0, 0], "size": 512, "plane": 0.0 }]
        }]
    }"#;

    #[test]
    fn test_range_center() {
        let range = TilesPositionsRange::new(TilePosition::new(-2, 0), TilePosition::new(2, 4));
        assert_eq!(range_center(&range), TilePosition::new(0, 2));
        assert_eq!(range_center(&TilesPositionsRange::default()), TilePosition::default());
    }

    #[test]
    fn test_generate_stores_tiles() {
        let temp = TempDir::new().unwrap();
        let scene = temp.path().join("scene.json");
        std::fs::write(&scene, SCENE).unwrap();
        let db_path = temp.path().join("navmesh.db");
        let config = temp.path().join("navigator.ini");
        std::fs::write(&config, "[Navigator]\n").unwrap();

        let args = GenerateArgs {
            scene,
            threads: Some(2),
            remove_unused_tiles: true,
            vacuum: true,
            no_progress: true,
        };
        run(args, Some(config), Some(db_path.clone())).unwrap();

        let db = detournav::NavMeshDb::open(&db_path, u64::MAX).unwrap();
        assert!(db.get_tiles_count().unwrap() >= 1);
    }
}
