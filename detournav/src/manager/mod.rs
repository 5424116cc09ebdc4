//! Geometry manager.
//!
//! [`TileCachedRecastMeshManager`] owns every piece of geometry of the
//! current worldspace, maps it onto the tile grid and keeps a snapshot
//! [`RecastMesh`] per tile. Each mutation bumps the revision and reports
//! the tiles it touched, both through a callback and through the changed
//! tiles map drained by [`take_changed_tiles`].
//!
//! Tile membership of an object is its world AABB expanded by the tile
//! border; only tiles inside the managed range are reported.
//!
//! [`take_changed_tiles`]: TileCachedRecastMeshManager::take_changed_tiles

mod change;
mod object;

pub use change::ChangeType;
pub use object::ObjectId;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::mem;
use std::sync::Arc;

use glam::IVec2;
use parking_lot::Mutex;
use tracing::debug;

use object::{NavMeshReport, ObjectData, ObjectIdAllocator};

use crate::coord::{
    make_real_tile_bounds_with_border, make_tiles_positions_range, TilePosition,
    TilesPositionsRange,
};
use crate::geometry::{
    cell_bounds, AreaType, CollisionShape, CumulativeAabb, HeightfieldShape, ObjectTransform,
    INFINITE_CELL_SIZE,
};
use crate::recast::{RecastMesh, RecastMeshBuilder, Version, Water};
use crate::settings::RecastSettings;

type CellKey = (i32, i32);

struct WaterData {
    water: Water,
    range: Option<TilesPositionsRange>,
}

struct HeightfieldData {
    cell_size: i32,
    shape: Arc<HeightfieldShape>,
    range: Option<TilesPositionsRange>,
}

struct CachedTile {
    version: Version,
    mesh: Arc<RecastMesh>,
}

/// Geometry manager counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileCachedRecastMeshManagerStats {
    pub tiles: usize,
    pub objects: usize,
    pub heightfields: usize,
    pub water: usize,
}

impl fmt::Display for TileCachedRecastMeshManagerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tiles={} objects={} heightfields={} water={}",
            self.tiles, self.objects, self.heightfields, self.water
        )
    }
}

struct ManagerState {
    worldspace: String,
    range: TilesPositionsRange,
    generation: u64,
    revision: u64,
    ids: ObjectIdAllocator,
    objects: BTreeMap<ObjectId, ObjectData>,
    water: BTreeMap<CellKey, WaterData>,
    heightfields: BTreeMap<CellKey, HeightfieldData>,
    cache: HashMap<TilePosition, CachedTile>,
    changed_tiles: BTreeMap<TilePosition, ChangeType>,
}

impl ManagerState {
    fn add_changed_tile(
        &mut self,
        changes: &mut BTreeMap<TilePosition, ChangeType>,
        tile: TilePosition,
        change_type: ChangeType,
    ) {
        for map in [&mut self.changed_tiles, changes] {
            map.entry(tile)
                .and_modify(|existing| *existing = existing.merge(change_type))
                .or_insert(change_type);
        }
    }

    fn add_changed_tiles(
        &mut self,
        changes: &mut BTreeMap<TilePosition, ChangeType>,
        range: &TilesPositionsRange,
        change_type: ChangeType,
    ) {
        for tile in range.positions() {
            self.add_changed_tile(changes, tile, change_type);
        }
    }
}

fn notify(
    changes: BTreeMap<TilePosition, ChangeType>,
    on_changed_tile: &mut impl FnMut(TilePosition, ChangeType),
) {
    for (tile, change_type) in changes {
        on_changed_tile(tile, change_type);
    }
}

/// Thread-safe geometry manager with per-tile mesh snapshots.
pub struct TileCachedRecastMeshManager {
    settings: RecastSettings,
    state: Mutex<ManagerState>,
}

impl TileCachedRecastMeshManager {
    pub fn new(settings: RecastSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(ManagerState {
                worldspace: String::new(),
                range: TilesPositionsRange::INFINITE,
                generation: 0,
                revision: 0,
                ids: ObjectIdAllocator::default(),
                objects: BTreeMap::new(),
                water: BTreeMap::new(),
                heightfields: BTreeMap::new(),
                cache: HashMap::new(),
                changed_tiles: BTreeMap::new(),
            }),
        }
    }

    pub fn settings(&self) -> &RecastSettings {
        &self.settings
    }

    pub fn create_object_id(&self) -> ObjectId {
        self.state.lock().ids.allocate()
    }

    pub fn get_revision(&self) -> u64 {
        self.state.lock().revision
    }

    pub fn get_generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn worldspace(&self) -> String {
        self.state.lock().worldspace.clone()
    }

    pub fn range(&self) -> TilesPositionsRange {
        self.state.lock().range
    }

    fn cell_range(&self, cell_position: IVec2, cell_size: i32) -> Option<TilesPositionsRange> {
        if cell_size == INFINITE_CELL_SIZE {
            return None;
        }
        let (min, max) = cell_bounds(cell_position, cell_size);
        Some(make_tiles_positions_range(&self.settings, min, max))
    }

    // =========================================================================
    // Range and worldspace
    // =========================================================================

    /// Limits the managed tiles.
    ///
    /// Tiles of objects leaving the range are reported as removed, tiles
    /// entering it as added. Snapshots outside the new range are dropped.
    pub fn set_range(
        &self,
        range: TilesPositionsRange,
        mut on_changed_tile: impl FnMut(TilePosition, ChangeType),
    ) {
        let mut changes = BTreeMap::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.range == range {
                return;
            }
            let old_range = state.range;
            if old_range != TilesPositionsRange::INFINITE {
                let mut changed = false;
                let object_ranges: Vec<_> = state.objects.values().map(|o| o.range).collect();
                for object_range in object_ranges {
                    for tile in old_range.intersection(&object_range).positions() {
                        if !range.contains(tile) {
                            state.add_changed_tile(&mut changes, tile, ChangeType::Remove);
                            changed = true;
                        }
                    }
                    for tile in range.intersection(&object_range).positions() {
                        if !old_range.contains(tile) {
                            state.add_changed_tile(&mut changes, tile, ChangeType::Add);
                            changed = true;
                        }
                    }
                }
                state.cache.retain(|tile, _| range.contains(*tile));
                if changed {
                    state.revision += 1;
                }
            }
            state.range = range;
        }
        notify(changes, &mut on_changed_tile);
    }

    /// Bounding range of all finite geometry, limited to the managed range.
    pub fn get_limited_objects_range(&self) -> TilesPositionsRange {
        let state = self.state.lock();
        let finite = state
            .water
            .values()
            .filter_map(|w| w.range)
            .chain(state.heightfields.values().filter_map(|h| h.range))
            .chain(state.objects.values().map(|o| o.range));
        let mut result: Option<TilesPositionsRange> = None;
        for range in finite {
            result = Some(match result {
                Some(current) => current.union(&range),
                None => range,
            });
        }
        result
            .map(|r| state.range.intersection(&r))
            .unwrap_or_default()
    }

    /// Switches to another worldspace, dropping all geometry.
    ///
    /// Returns `false` when already in `worldspace`.
    pub fn set_worldspace(&self, worldspace: &str) -> bool {
        let mut state = self.state.lock();
        if state.worldspace == worldspace {
            return false;
        }
        state.worldspace = worldspace.to_string();
        state.generation += 1;
        state.revision += 1;
        state.objects.clear();
        state.water.clear();
        state.heightfields.clear();
        state.cache.clear();
        debug!(worldspace, generation = state.generation, "Switched worldspace");
        true
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Adds an object. Fails for stale ids and ids already present.
    pub fn add_object(
        &self,
        id: ObjectId,
        shape: Arc<CollisionShape>,
        transform: ObjectTransform,
        area_type: AreaType,
        mut on_changed_tile: impl FnMut(TilePosition, ChangeType),
    ) -> bool {
        let Some(aabb) = shape.aabb(&transform) else {
            return false;
        };
        let range =
            make_tiles_positions_range(&self.settings, aabb.horizontal_min(), aabb.horizontal_max());
        let mut changes = BTreeMap::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !state.ids.is_current(id) || state.objects.contains_key(&id) {
                return false;
            }
            let revision = state.revision + 1;
            state.objects.insert(
                id,
                ObjectData {
                    shape,
                    transform,
                    area_type,
                    range,
                    aabb: CumulativeAabb::new(revision, aabb),
                    generation: state.generation,
                    revision,
                    last_navmesh_reported_change: None,
                    last_navmesh_report: None,
                },
            );
            state.revision = revision;
            let affected = range.intersection(&state.range);
            state.add_changed_tiles(&mut changes, &affected, ChangeType::Add);
        }
        notify(changes, &mut on_changed_tile);
        true
    }

    /// Moves an object or changes its area type.
    ///
    /// Returns `true` only when the change can alter built tiles: the area
    /// type changed, or the transform moved beyond the tolerance and the
    /// object left the area it covered since the last navmesh change.
    pub fn update_object(
        &self,
        id: ObjectId,
        transform: ObjectTransform,
        area_type: AreaType,
        mut on_changed_tile: impl FnMut(TilePosition, ChangeType),
    ) -> bool {
        let mut changes = BTreeMap::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let current_revision = state.revision;
            let Some(object) = state.objects.get_mut(&id) else {
                return false;
            };
            let area_changed = object.area_type != area_type;
            if !object.update(&transform, area_type) {
                return false;
            }
            let last_change_revision = object
                .last_navmesh_reported_change
                .map_or(current_revision, |report| report.revision);
            let Some(aabb) = object.shape.aabb(&transform) else {
                return false;
            };
            // A new area type rewrites every covered tile, wherever the object is.
            let extended = object.aabb.update(last_change_revision, aabb);
            if !extended && !area_changed {
                return false;
            }
            let new_range = make_tiles_positions_range(
                &self.settings,
                aabb.horizontal_min(),
                aabb.horizontal_max(),
            );
            let old_range = object.range;
            object.range = new_range;
            state.revision += 1;
            object.revision = state.revision;

            let managed = state.range;
            if new_range == old_range {
                state.add_changed_tiles(&mut changes, &new_range.intersection(&managed), ChangeType::Update);
            } else {
                for tile in new_range.intersection(&managed).positions() {
                    let change_type = if old_range.contains(tile) {
                        ChangeType::Update
                    } else {
                        ChangeType::Add
                    };
                    state.add_changed_tile(&mut changes, tile, change_type);
                }
                for tile in old_range.intersection(&managed).positions() {
                    if !new_range.contains(tile) {
                        state.add_changed_tile(&mut changes, tile, ChangeType::Remove);
                    }
                }
            }
        }
        notify(changes, &mut on_changed_tile);
        true
    }

    /// Removes an object and invalidates its id.
    pub fn remove_object(
        &self,
        id: ObjectId,
        mut on_changed_tile: impl FnMut(TilePosition, ChangeType),
    ) -> bool {
        let mut changes = BTreeMap::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(object) = state.objects.remove(&id) else {
                return false;
            };
            state.ids.release(id);
            state.revision += 1;
            let affected = object.range.intersection(&state.range);
            state.add_changed_tiles(&mut changes, &affected, ChangeType::Remove);
        }
        notify(changes, &mut on_changed_tile);
        true
    }

    // =========================================================================
    // Water and terrain
    // =========================================================================

    /// Adds the water plane of a cell. At most one per cell.
    ///
    /// Infinite water reports no tiles; it only joins tiles with other
    /// input.
    pub fn add_water(
        &self,
        cell_position: IVec2,
        cell_size: i32,
        level: f32,
        mut on_changed_tile: impl FnMut(TilePosition, ChangeType),
    ) -> bool {
        let range = self.cell_range(cell_position, cell_size);
        let mut changes = BTreeMap::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let key = (cell_position.x, cell_position.y);
            if state.water.contains_key(&key) {
                return false;
            }
            state.water.insert(
                key,
                WaterData {
                    water: Water { cell_size, level },
                    range,
                },
            );
            state.revision += 1;
            if let Some(range) = range {
                state.add_changed_tiles(&mut changes, &range, ChangeType::Add);
            }
        }
        notify(changes, &mut on_changed_tile);
        true
    }

    pub fn remove_water(
        &self,
        cell_position: IVec2,
        mut on_changed_tile: impl FnMut(TilePosition, ChangeType),
    ) -> bool {
        let mut changes = BTreeMap::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(data) = state.water.remove(&(cell_position.x, cell_position.y)) else {
                return false;
            };
            state.revision += 1;
            if let Some(range) = data.range {
                state.add_changed_tiles(&mut changes, &range, ChangeType::Remove);
            }
        }
        notify(changes, &mut on_changed_tile);
        true
    }

    /// Adds the terrain of a cell. At most one per cell.
    pub fn add_heightfield(
        &self,
        cell_position: IVec2,
        cell_size: i32,
        shape: HeightfieldShape,
        mut on_changed_tile: impl FnMut(TilePosition, ChangeType),
    ) -> bool {
        let range = self.cell_range(cell_position, cell_size);
        let mut changes = BTreeMap::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let key = (cell_position.x, cell_position.y);
            if state.heightfields.contains_key(&key) {
                return false;
            }
            state.heightfields.insert(
                key,
                HeightfieldData {
                    cell_size,
                    shape: Arc::new(shape),
                    range,
                },
            );
            state.revision += 1;
            if let Some(range) = range {
                state.add_changed_tiles(&mut changes, &range, ChangeType::Add);
            }
        }
        notify(changes, &mut on_changed_tile);
        true
    }

    pub fn remove_heightfield(
        &self,
        cell_position: IVec2,
        mut on_changed_tile: impl FnMut(TilePosition, ChangeType),
    ) -> bool {
        let mut changes = BTreeMap::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(data) = state.heightfields.remove(&(cell_position.x, cell_position.y)) else {
                return false;
            };
            state.revision += 1;
            if let Some(range) = data.range {
                state.add_changed_tiles(&mut changes, &range, ChangeType::Remove);
            }
        }
        notify(changes, &mut on_changed_tile);
        true
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Current snapshot of a tile, rebuilt when outdated.
    ///
    /// `None` for another worldspace, a tile outside the managed range or a
    /// tile without geometry.
    pub fn get_mesh(&self, worldspace: &str, tile: TilePosition) -> Option<Arc<RecastMesh>> {
        {
            let state = self.state.lock();
            if state.worldspace != worldspace || !state.range.contains(tile) {
                return None;
            }
            if let Some(cached) = state.cache.get(&tile) {
                if cached.mesh.version() == cached.version {
                    return Some(Arc::clone(&cached.mesh));
                }
            }
        }
        let mesh = self.make_mesh(tile)?;
        self.state.lock().cache.insert(
            tile,
            CachedTile {
                version: mesh.version(),
                mesh: Arc::clone(&mesh),
            },
        );
        Some(mesh)
    }

    /// Last snapshot of a tile, outdated or not.
    pub fn get_cached_mesh(&self, worldspace: &str, tile: TilePosition) -> Option<Arc<RecastMesh>> {
        let state = self.state.lock();
        if state.worldspace != worldspace || !state.range.contains(tile) {
            return None;
        }
        state.cache.get(&tile).map(|cached| Arc::clone(&cached.mesh))
    }

    /// Freshly built snapshot, bypassing the snapshot cache.
    pub fn get_new_mesh(&self, worldspace: &str, tile: TilePosition) -> Option<Arc<RecastMesh>> {
        if self.state.lock().worldspace != worldspace {
            return None;
        }
        self.make_mesh(tile)
    }

    fn make_mesh(&self, tile: TilePosition) -> Option<Arc<RecastMesh>> {
        let mut builder = RecastMeshBuilder::new(make_real_tile_bounds_with_border(&self.settings, tile));
        let mut objects = Vec::new();
        let version;
        {
            let state = self.state.lock();
            let mut has_input = false;
            for ((x, y), data) in &state.water {
                if data.range.is_some_and(|r| r.contains(tile)) {
                    builder.add_water(IVec2::new(*x, *y), data.water);
                    has_input = true;
                }
            }
            for ((x, y), data) in &state.heightfields {
                if data.range.is_some_and(|r| r.contains(tile)) {
                    builder.add_heightfield(IVec2::new(*x, *y), data.cell_size, &data.shape);
                    has_input = true;
                }
            }
            for object in state.objects.values() {
                if object.range.contains(tile) {
                    objects.push((Arc::clone(&object.shape), object.transform, object.area_type));
                    has_input = true;
                }
            }
            if !has_input {
                return None;
            }
            for ((x, y), data) in &state.water {
                if data.range.is_none() {
                    builder.add_water(IVec2::new(*x, *y), data.water);
                }
            }
            for ((x, y), data) in &state.heightfields {
                if data.range.is_none() {
                    builder.add_heightfield(IVec2::new(*x, *y), data.cell_size, &data.shape);
                }
            }
            version = Version::new(state.generation, state.revision);
        }
        for (shape, transform, area_type) in &objects {
            builder.add_object(shape, transform, *area_type);
        }
        Some(Arc::new(builder.create(version)))
    }

    /// Tiles inside the managed range holding finite geometry.
    pub fn for_each_tile_position(&self, mut f: impl FnMut(TilePosition)) {
        let tiles: BTreeSet<TilePosition> = {
            let state = self.state.lock();
            let managed = state.range;
            state
                .water
                .values()
                .filter_map(|w| w.range)
                .chain(state.heightfields.values().filter_map(|h| h.range))
                .chain(state.objects.values().map(|o| o.range))
                .flat_map(|range| range.intersection(&managed).positions())
                .collect()
        };
        for tile in tiles {
            f(tile);
        }
    }

    /// Records that a navmesh tile was built from `recast_version`.
    ///
    /// Objects covering the tile restart their cumulative AABB from the
    /// reported revision on their next move.
    pub fn report_navmesh_change(
        &self,
        tile: TilePosition,
        recast_version: Version,
        navmesh_version: Version,
    ) {
        let mut state = self.state.lock();
        for object in state.objects.values_mut() {
            if !object.range.contains(tile) || object.generation != recast_version.generation {
                continue;
            }
            if object
                .last_navmesh_report
                .is_some_and(|last| navmesh_version < last.navmesh_version)
            {
                continue;
            }
            let report = NavMeshReport {
                revision: recast_version.revision,
                navmesh_version,
            };
            object.last_navmesh_report = Some(report);
            if object
                .last_navmesh_reported_change
                .map_or(true, |change| change.navmesh_version < navmesh_version)
            {
                object.last_navmesh_reported_change = Some(report);
            }
        }
    }

    /// Drains the changed tiles accumulated since the last call.
    ///
    /// Snapshots of the drained tiles are marked outdated.
    pub fn take_changed_tiles(&self) -> BTreeMap<TilePosition, ChangeType> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for tile in state.changed_tiles.keys() {
            if let Some(cached) = state.cache.get_mut(tile) {
                cached.version.revision += 1;
            }
        }
        mem::take(&mut state.changed_tiles)
    }

    pub fn stats(&self) -> TileCachedRecastMeshManagerStats {
        let state = self.state.lock();
        TileCachedRecastMeshManagerStats {
            tiles: state.cache.len(),
            objects: state.objects.len(),
            heightfields: state.heightfields.len(),
            water: state.water.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    const WORLDSPACE: &str = "sys::default";

    fn manager() -> TileCachedRecastMeshManager {
        let manager = TileCachedRecastMeshManager::new(RecastSettings::default());
        manager.set_worldspace(WORLDSPACE);
        manager
    }

    fn shape() -> Arc<CollisionShape> {
        Arc::new(CollisionShape::new_box(Vec3::splat(10.0)))
    }

    fn at(x: f32, y: f32) -> ObjectTransform {
        ObjectTransform::from_position(Vec3::new(x, y, 0.0))
    }

    fn tiles(list: &[(i32, i32)]) -> Vec<TilePosition> {
        list.iter().map(|(x, y)| TilePosition::new(*x, *y)).collect()
    }

    fn collect(changes: &mut Vec<(TilePosition, ChangeType)>) -> impl FnMut(TilePosition, ChangeType) + '_ {
        move |tile, change_type| changes.push((tile, change_type))
    }

    #[test]
    fn test_add_object_reports_covered_tiles() {
        let manager = manager();
        let id = manager.create_object_id();
        let mut changes = Vec::new();
        assert!(manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, collect(&mut changes)));

        let reported: Vec<_> = changes.iter().map(|(t, _)| *t).collect();
        assert_eq!(reported, tiles(&[(-1, -1), (-1, 0), (0, -1), (0, 0)]));
        assert!(changes.iter().all(|(_, c)| *c == ChangeType::Add));
        assert_eq!(manager.get_revision(), 2);
    }

    #[test]
    fn test_add_object_rejects_duplicate_and_stale_ids() {
        let manager = manager();
        let id = manager.create_object_id();
        assert!(manager.add_object(id, shape(), at(0.0, 0.0), AreaType::Ground, |_, _| {}));
        let revision = manager.get_revision();
        assert!(!manager.add_object(id, shape(), at(0.0, 0.0), AreaType::Ground, |_, _| {}));
        assert_eq!(manager.get_revision(), revision);

        assert!(manager.remove_object(id, |_, _| {}));
        assert!(!manager.add_object(id, shape(), at(0.0, 0.0), AreaType::Ground, |_, _| {}));
        assert!(!manager.remove_object(id, |_, _| {}));
    }

    #[test]
    fn test_update_object_ignores_tiny_moves() {
        let manager = manager();
        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});
        let revision = manager.get_revision();

        let mut changes = Vec::new();
        assert!(!manager.update_object(id, at(100.0, 100.00001), AreaType::Ground, collect(&mut changes)));
        assert!(changes.is_empty());
        assert_eq!(manager.get_revision(), revision);
    }

    #[test]
    fn test_update_object_diffs_tiles() {
        let manager = manager();
        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});

        let mut changes = Vec::new();
        assert!(manager.update_object(id, at(1000.0, 100.0), AreaType::Ground, collect(&mut changes)));
        let expected = vec![
            (TilePosition::new(-1, -1), ChangeType::Remove),
            (TilePosition::new(-1, 0), ChangeType::Remove),
            (TilePosition::new(0, -1), ChangeType::Remove),
            (TilePosition::new(0, 0), ChangeType::Remove),
            (TilePosition::new(1, -1), ChangeType::Add),
            (TilePosition::new(1, 0), ChangeType::Add),
        ];
        assert_eq!(changes, expected);
    }

    #[test]
    fn test_update_within_covered_area_is_ignored_until_reported() {
        let manager = manager();
        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});
        let tile = TilePosition::new(0, 0);
        let generation = manager.get_generation();
        manager.report_navmesh_change(tile, Version::new(generation, manager.get_revision()), Version::new(1, 1));

        assert!(manager.update_object(id, at(150.0, 100.0), AreaType::Ground, |_, _| {}));
        // Back inside the area covered since the last report.
        assert!(!manager.update_object(id, at(120.0, 100.0), AreaType::Ground, |_, _| {}));

        // An older navmesh report is ignored.
        manager.report_navmesh_change(tile, Version::new(generation, manager.get_revision()), Version::new(1, 0));
        assert!(!manager.update_object(id, at(125.0, 100.0), AreaType::Ground, |_, _| {}));

        manager.report_navmesh_change(tile, Version::new(generation, manager.get_revision()), Version::new(1, 2));
        assert!(manager.update_object(id, at(130.0, 100.0), AreaType::Ground, |_, _| {}));
    }

    #[test]
    fn test_update_object_area_type_in_place() {
        let manager = manager();
        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});
        let revision = manager.get_revision();

        let mut changes = Vec::new();
        assert!(manager.update_object(id, at(100.0, 100.0), AreaType::Water, collect(&mut changes)));
        let reported: Vec<_> = changes.iter().map(|(t, _)| *t).collect();
        assert_eq!(reported, tiles(&[(-1, -1), (-1, 0), (0, -1), (0, 0)]));
        assert!(changes.iter().all(|(_, c)| *c == ChangeType::Update));
        assert_eq!(manager.get_revision(), revision + 1);

        // Same area type again is a no-op.
        assert!(!manager.update_object(id, at(100.0, 100.0), AreaType::Water, |_, _| {}));
    }

    #[test]
    fn test_water_is_unique_per_cell() {
        let manager = manager();
        let mut changes = Vec::new();
        assert!(manager.add_water(IVec2::ZERO, 512, 0.0, collect(&mut changes)));
        assert_eq!(changes.len(), 4);
        assert!(!manager.add_water(IVec2::ZERO, 512, 10.0, |_, _| {}));
        assert_eq!(manager.stats().water, 1);

        changes.clear();
        assert!(manager.remove_water(IVec2::ZERO, collect(&mut changes)));
        assert!(changes.iter().all(|(_, c)| *c == ChangeType::Remove));
        assert!(!manager.remove_water(IVec2::ZERO, |_, _| {}));
    }

    #[test]
    fn test_infinite_geometry_needs_other_input() {
        let manager = manager();
        let mut changes = Vec::new();
        assert!(manager.add_heightfield(
            IVec2::ZERO,
            INFINITE_CELL_SIZE,
            HeightfieldShape::Plane { height: 0.0 },
            collect(&mut changes)
        ));
        assert!(changes.is_empty());
        assert!(manager.get_mesh(WORLDSPACE, TilePosition::new(0, 0)).is_none());

        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});
        let mesh = manager.get_mesh(WORLDSPACE, TilePosition::new(0, 0)).unwrap();
        assert_eq!(mesh.flat_heightfields().len(), 1);
        assert!(!mesh.mesh().indices.is_empty());
    }

    #[test]
    fn test_get_mesh_is_cached_until_tile_changes() {
        let manager = manager();
        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});
        manager.take_changed_tiles();
        let tile = TilePosition::new(0, 0);

        let first = manager.get_mesh(WORLDSPACE, tile).unwrap();
        let second = manager.get_mesh(WORLDSPACE, tile).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(manager.get_mesh("other", tile).is_none());

        manager.update_object(id, at(110.0, 100.0), AreaType::Ground, |_, _| {});
        manager.take_changed_tiles();
        let third = manager.get_mesh(WORLDSPACE, tile).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.version() > first.version());
        assert_eq!(manager.stats().tiles, 1);
    }

    #[test]
    fn test_take_changed_tiles_merges_with_remove_priority() {
        let manager = manager();
        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});
        manager.remove_object(id, |_, _| {});

        let changed = manager.take_changed_tiles();
        assert_eq!(changed.len(), 4);
        assert!(changed.values().all(|c| *c == ChangeType::Remove));
        assert!(manager.take_changed_tiles().is_empty());
    }

    #[test]
    fn test_set_range_reports_leaving_and_entering_tiles() {
        let manager = manager();
        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});
        let range = TilesPositionsRange::new(TilePosition::new(-1, -1), TilePosition::new(1, 1));
        manager.set_range(range, |_, _| {});
        manager.get_mesh(WORLDSPACE, TilePosition::new(-1, -1)).unwrap();

        let mut changes = Vec::new();
        let shifted = TilesPositionsRange::new(TilePosition::new(0, 0), TilePosition::new(2, 2));
        manager.set_range(shifted, collect(&mut changes));
        assert_eq!(
            changes,
            vec![
                (TilePosition::new(-1, -1), ChangeType::Remove),
                (TilePosition::new(-1, 0), ChangeType::Remove),
                (TilePosition::new(0, -1), ChangeType::Remove),
            ]
        );
        assert_eq!(manager.stats().tiles, 0);
        assert!(manager.get_mesh(WORLDSPACE, TilePosition::new(-1, -1)).is_none());
        assert_eq!(manager.get_limited_objects_range(), TilesPositionsRange::new(TilePosition::new(0, 0), TilePosition::new(1, 1)));
    }

    #[test]
    fn test_set_worldspace_clears_geometry() {
        let manager = manager();
        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});
        let generation = manager.get_generation();

        assert!(!manager.set_worldspace(WORLDSPACE));
        assert!(manager.set_worldspace("other"));
        assert_eq!(manager.get_generation(), generation + 1);
        assert_eq!(manager.stats(), TileCachedRecastMeshManagerStats::default());
        assert!(manager.get_limited_objects_range().is_empty());
    }

    #[test]
    fn test_for_each_tile_position() {
        let manager = manager();
        let id = manager.create_object_id();
        manager.add_object(id, shape(), at(100.0, 100.0), AreaType::Ground, |_, _| {});
        manager.add_water(IVec2::ZERO, 512, 0.0, |_, _| {});
        let mut visited = Vec::new();
        manager.for_each_tile_position(|tile| visited.push(tile));
        assert_eq!(visited, tiles(&[(-1, -1), (-1, 0), (0, -1), (0, 0)]));
    }
}
