//! Integration tests for the Navigator.
//!
//! These tests drive the full pipeline across threads:
//! - Geometry → changed tiles → updater jobs → committed tiles
//! - Barriers releasing once the tiles around the player are built
//! - Path queries against the committed tiles
//!
//! Run with: `cargo test --test navigator_integration`

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{IVec2, Vec3};
use parking_lot::Mutex;

use detournav::settings::RecastSettings;
use detournav::{
    AgentBounds, AreaType, BuildError, CollisionShape, CollisionShapeType, Flags, GridTileBuilder,
    HeightfieldShape, HeightfieldSurface, Navigator, NoopListener, ObjectTransform,
    PreparedNavMeshData, RecastMesh, Settings, Status, TileBuilder, TilePosition,
    WaitConditionType,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn agent() -> AgentBounds {
    AgentBounds::new(CollisionShapeType::Aabb, Vec3::new(29.0, 29.0, 66.0))
}

fn player_position() -> Vec3 {
    Vec3::new(256.0, 256.0, 0.0)
}

/// A 512x512 cell at the origin dipping down to -100 toward one corner.
fn depression() -> HeightfieldShape {
    let rows: [[f32; 5]; 5] = [
        [0.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, -25.0, -25.0, -25.0, -25.0],
        [0.0, -25.0, -100.0, -100.0, -100.0],
        [0.0, -25.0, -100.0, -100.0, -100.0],
        [0.0, -25.0, -100.0, -100.0, -100.0],
    ];
    let heights = rows.iter().flatten().copied().collect();
    HeightfieldShape::Surface(HeightfieldSurface::new(heights, 5).expect("valid surface"))
}

fn navigator(settings: Settings) -> Navigator {
    navigator_with_builder(settings, Arc::new(GridTileBuilder::new()))
}

fn navigator_with_builder(settings: Settings, builder: Arc<dyn TileBuilder>) -> Navigator {
    let navigator = Navigator::with_builder(settings, builder, None).expect("navigator");
    navigator.set_worldspace("sys::default");
    assert!(navigator.add_agent(&agent()));
    navigator
}

/// [`GridTileBuilder`] counting the builds of every tile.
#[derive(Default)]
struct CountingTileBuilder {
    inner: GridTileBuilder,
    builds: Mutex<BTreeMap<TilePosition, usize>>,
}

impl CountingTileBuilder {
    fn builds(&self, tile: TilePosition) -> usize {
        self.builds.lock().get(&tile).copied().unwrap_or(0)
    }
}

impl TileBuilder for CountingTileBuilder {
    fn build(
        &self,
        recast_mesh: &RecastMesh,
        worldspace: &str,
        tile: TilePosition,
        agent: &AgentBounds,
        settings: &RecastSettings,
    ) -> Result<Option<PreparedNavMeshData>, BuildError> {
        *self.builds.lock().entry(tile).or_default() += 1;
        self.inner.build(recast_mesh, worldspace, tile, agent, settings)
    }
}

fn assert_near_horizontally(actual: Vec3, expected: Vec3) {
    let distance = actual.truncate().distance(expected.truncate());
    assert!(distance < 1.0, "{actual} is {distance} away from {expected}");
}

/// Height of the committed cell under `position`.
fn committed_height(navigator: &Navigator, position: Vec3) -> Option<(AreaType, f32)> {
    let cell_size = navigator.settings().recast.real_cell_size();
    let navmesh = navigator.get_navmesh(&agent())?;
    let item = navmesh.read();
    let tile = item.get_tile(TilePosition::new(0, 0))?;
    let column = ((position.x - tile.origin.x) / cell_size).floor() as usize;
    let row = ((position.y - tile.origin.y) / cell_size).floor() as usize;
    tile.cell(column, row)
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_find_path_over_heightfield_depression() {
    let navigator = navigator(Settings::default());
    assert!(navigator.add_heightfield(IVec2::ZERO, 512, depression()));

    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::RequiredTilesPresent);

    let navmesh = navigator.get_navmesh(&agent()).expect("navmesh");
    assert!(navmesh.read().has_tile(TilePosition::new(0, 0)));

    let start = Vec3::new(52.0, 460.0, 1.0);
    let end = Vec3::new(460.0, 52.0, 1.0);
    let result = navigator.find_path(&agent(), start, end, Flags::WALK);

    assert_eq!(result.status, Status::Success);
    assert!(result.path.len() >= 2);
    assert_near_horizontally(result.path[0], start);
    assert_near_horizontally(*result.path.last().unwrap(), end);
    assert!(result.path.iter().all(|p| p.z <= 1.0 && p.z >= -101.0));
}

#[test]
fn test_find_path_failures() {
    let navigator = navigator(Settings::default());
    navigator.add_heightfield(IVec2::ZERO, 512, depression());
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    let inside = Vec3::new(256.0, 256.0, 0.0);
    let outside = Vec3::new(-5000.0, -5000.0, 0.0);

    let unknown = AgentBounds::new(CollisionShapeType::Cylinder, Vec3::new(10.0, 10.0, 10.0));
    assert_eq!(
        navigator.find_path(&unknown, inside, inside, Flags::WALK).status,
        Status::NavMeshNotFound
    );
    assert_eq!(
        navigator.find_path(&agent(), outside, inside, Flags::WALK).status,
        Status::StartPolygonNotFound
    );
    assert_eq!(
        navigator.find_path(&agent(), inside, outside, Flags::WALK).status,
        Status::EndPolygonNotFound
    );
}

#[test]
fn test_queries_on_committed_tiles() {
    let navigator = navigator(Settings::default());
    navigator.add_heightfield(IVec2::ZERO, 512, HeightfieldShape::Plane { height: 0.0 });
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    let nearest = navigator
        .find_nearest_navmesh_position(&agent(), Vec3::new(256.0, 256.0, 40.0), Flags::WALK)
        .expect("nearest position");
    assert_near_horizontally(nearest, Vec3::new(256.0, 256.0, 0.0));
    assert!(nearest.z.abs() < 1e-3);

    let hit = navigator
        .raycast(&agent(), Vec3::new(256.0, 256.0, 0.0), Vec3::new(1000.0, 256.0, 0.0), Flags::WALK)
        .expect("raycast");
    assert!(hit.x > 400.0 && hit.x < 512.0, "raycast stopped at {hit}");

    let mut rng = rand::rng();
    for _ in 0..10 {
        let point = navigator
            .find_random_point_around_circle(&agent(), player_position(), 100.0, Flags::WALK, &mut rng)
            .expect("random point");
        assert!(point.truncate().distance(player_position().truncate()) <= 100.0 + 12.0);
    }
}

#[test]
fn test_repeated_object_updates_are_debounced() {
    let interval = Duration::from_millis(200);
    let navigator = navigator(Settings::default().with_min_update_interval(interval));
    navigator.add_heightfield(IVec2::ZERO, 512, HeightfieldShape::Plane { height: 0.0 });

    let shape = Arc::new(CollisionShape::new_box(Vec3::new(20.0, 20.0, 20.0)));
    let id = navigator.create_object_id();
    let positions = [
        Vec3::new(150.0, 250.0, 0.0),
        Vec3::new(250.0, 250.0, 0.0),
        Vec3::new(350.0, 250.0, 0.0),
    ];
    assert!(navigator.add_object(
        id,
        shape,
        ObjectTransform::from_position(positions[0]),
        AreaType::Ground
    ));
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
    assert_eq!(committed_height(&navigator, positions[0]), Some((AreaType::Ground, 20.0)));

    let start = Instant::now();
    for position in &positions[1..] {
        navigator.update_object(id, ObjectTransform::from_position(*position), AreaType::Ground);
        navigator.update(player_position());
        navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
    }
    assert!(start.elapsed() >= interval, "updates took {:?}", start.elapsed());

    assert_eq!(committed_height(&navigator, positions[2]), Some((AreaType::Ground, 20.0)));
    assert_eq!(committed_height(&navigator, positions[0]), Some((AreaType::Ground, 0.0)));
}

#[test]
fn test_burst_of_object_updates_rebuilds_tile_once() {
    let builder = Arc::new(CountingTileBuilder::default());
    let navigator = navigator_with_builder(Settings::default(), builder.clone());
    navigator.add_heightfield(IVec2::ZERO, 512, HeightfieldShape::Plane { height: 0.0 });

    let shape = Arc::new(CollisionShape::new_box(Vec3::new(20.0, 20.0, 20.0)));
    let id = navigator.create_object_id();
    navigator.add_object(
        id,
        shape,
        ObjectTransform::from_position(Vec3::new(250.0, 250.0, 0.0)),
        AreaType::Ground,
    );
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
    let tile = TilePosition::new(0, 0);
    assert_eq!(builder.builds(tile), 1);

    for x in [260.0, 270.0, 280.0, 290.0] {
        let transform = ObjectTransform::from_position(Vec3::new(x, 250.0, 0.0));
        assert!(navigator.update_object(id, transform, AreaType::Ground));
    }
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    assert_eq!(builder.builds(tile), 2);
    let last = Vec3::new(290.0, 250.0, 0.0);
    assert_eq!(committed_height(&navigator, last), Some((AreaType::Ground, 20.0)));
    assert_eq!(navigator.stats().updater.jobs, 0);
}

#[test]
fn test_area_type_change_in_place_reaches_navmesh() {
    let navigator = navigator(Settings::default());
    navigator.add_heightfield(IVec2::ZERO, 512, HeightfieldShape::Plane { height: 0.0 });
    let shape = Arc::new(CollisionShape::new_box(Vec3::new(20.0, 20.0, 20.0)));
    let id = navigator.create_object_id();
    let position = Vec3::new(250.0, 250.0, 0.0);
    let transform = ObjectTransform::from_position(position);
    navigator.add_object(id, shape, transform, AreaType::Ground);
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
    assert_eq!(committed_height(&navigator, position), Some((AreaType::Ground, 20.0)));

    assert!(navigator.update_object(id, transform, AreaType::Water));
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    assert_eq!(committed_height(&navigator, position), Some((AreaType::Water, 20.0)));
}

#[test]
fn test_no_op_updates_keep_navmesh_version() {
    let navigator = navigator(Settings::default());
    navigator.add_heightfield(IVec2::ZERO, 512, HeightfieldShape::Plane { height: 0.0 });
    let shape = Arc::new(CollisionShape::new_box(Vec3::new(20.0, 20.0, 20.0)));
    let id = navigator.create_object_id();
    let transform = ObjectTransform::from_position(Vec3::new(250.0, 250.0, 0.0));
    navigator.add_object(id, shape, transform, AreaType::Ground);
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    let navmesh = navigator.get_navmesh(&agent()).expect("navmesh");
    let version = navmesh.read().version();

    for _ in 0..5 {
        assert!(!navigator.update_object(id, transform, AreaType::Ground));
        navigator.update(player_position());
        navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
    }

    assert_eq!(navmesh.read().version(), version);
    assert_eq!(navigator.stats().updater.jobs, 0);
}

#[test]
fn test_removed_geometry_removes_tiles() {
    let navigator = navigator(Settings::default());
    navigator.add_heightfield(IVec2::ZERO, 512, HeightfieldShape::Plane { height: 0.0 });
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
    let navmesh = navigator.get_navmesh(&agent()).expect("navmesh");
    assert!(navmesh.read().has_tile(TilePosition::new(0, 0)));

    assert!(navigator.remove_heightfield(IVec2::ZERO));
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
    assert!(!navmesh.read().has_tile(TilePosition::new(0, 0)));
    assert!(navmesh.read().is_empty_tile(TilePosition::new(0, 0)));
}

#[test]
fn test_worldspace_switch_discards_tiles() {
    let navigator = navigator(Settings::default());
    navigator.add_heightfield(IVec2::ZERO, 512, HeightfieldShape::Plane { height: 0.0 });
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    navigator.set_worldspace("other");
    let navmesh = navigator.get_navmesh(&agent()).expect("navmesh");
    assert!(navmesh.read().tiles().is_empty());
    assert_eq!(navigator.stats().recast.heightfields, 0);

    navigator.add_heightfield(IVec2::ZERO, 512, HeightfieldShape::Plane { height: 5.0 });
    navigator.update(player_position());
    navigator.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
    assert_eq!(
        committed_height(&navigator, player_position()),
        Some((AreaType::Ground, 5.0))
    );
}
