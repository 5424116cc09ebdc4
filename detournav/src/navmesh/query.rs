//! Queries over committed tiles.
//!
//! Cells of all committed tiles of an agent form one global grid; cell
//! `(i, j)` covers `[i * c, (i + 1) * c) x [j * c, (j + 1) * c)` for the real
//! cell size `c`. Moves go to the 8 neighbours of a cell, never cut
//! corners and never climb more than `max_climb`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fmt;
use std::ops::BitOr;

use glam::{IVec2, Vec2, Vec3};
use rand::Rng;

use super::NavMeshCacheItem;
use crate::agent::AgentBounds;
use crate::geometry::AreaType;
use crate::settings::{AreaCosts, DetourSettings, Settings};

/// Movement abilities a query may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flags(u16);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const WALK: Flags = Flags(1);
    pub const SWIM: Flags = Flags(2);
    pub const OPEN_DOOR: Flags = Flags(4);
    pub const USE_PATHGRID: Flags = Flags(8);

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    fn allows(self, area_type: AreaType) -> bool {
        let required = match area_type {
            AreaType::Null => return false,
            AreaType::Water => Flags::SWIM,
            AreaType::Door => Flags::OPEN_DOOR,
            AreaType::Pathgrid => Flags::USE_PATHGRID,
            AreaType::Ground => Flags::WALK,
        };
        self.contains(required)
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl AreaCosts {
    pub fn cost(&self, area_type: AreaType) -> f32 {
        match area_type {
            AreaType::Null => f32::INFINITY,
            AreaType::Water => self.water,
            AreaType::Door => self.door,
            AreaType::Pathgrid => self.pathgrid,
            AreaType::Ground => self.ground,
        }
    }

    fn min_cost(&self) -> f32 {
        self.water
            .min(self.door)
            .min(self.pathgrid)
            .min(self.ground)
            .max(0.0)
    }
}

/// Result code of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    /// The target is unreachable; the path leads to the closest reachable
    /// point.
    PartialPath,
    /// No navmesh exists for the agent.
    NavMeshNotFound,
    StartPolygonNotFound,
    EndPolygonNotFound,
    /// The search could not expand a single node.
    FindPathOverPolygonsFailed,
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success | Status::PartialPath)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Success => "success",
            Status::PartialPath => "partial path is found",
            Status::NavMeshNotFound => "navmesh is not found",
            Status::StartPolygonNotFound => "polygon for start position is not found on navmesh",
            Status::EndPolygonNotFound => "polygon for end position is not found on navmesh",
            Status::FindPathOverPolygonsFailed => "failed to find path over polygons",
        };
        f.write_str(text)
    }
}

/// Path found by [`NavMeshQuery::find_path`].
#[derive(Clone, Debug, PartialEq)]
pub struct PathResult {
    pub status: Status,
    pub path: Vec<Vec3>,
}

impl PathResult {
    pub fn failed(status: Status) -> Self {
        Self {
            status,
            path: Vec::new(),
        }
    }
}

/// Search box around query positions.
pub fn search_area_half_extents(agent: &AgentBounds, settings: &Settings) -> Vec3 {
    let horizontal = 2.0 * agent.radius() + settings.recast.real_cell_size();
    Vec3::new(horizontal, horizontal, agent.height())
}

const NEIGHBOURS: [IVec2; 8] = [
    IVec2::new(1, 0),
    IVec2::new(-1, 0),
    IVec2::new(0, 1),
    IVec2::new(0, -1),
    IVec2::new(1, 1),
    IVec2::new(1, -1),
    IVec2::new(-1, 1),
    IVec2::new(-1, -1),
];

#[derive(Clone, Copy, PartialEq)]
struct OpenNode {
    estimate: f32,
    cost: f32,
    cell: IVec2,
}

impl Eq for OpenNode {}

impl Ord for OpenNode {
    // Reversed for a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| self.cost.total_cmp(&other.cost))
            .then_with(|| (other.cell.x, other.cell.y).cmp(&(self.cell.x, self.cell.y)))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Visited {
    cost: f32,
    parent: Option<IVec2>,
    closed: bool,
}

/// Read-only query view of one agent's navmesh.
pub struct NavMeshQuery<'a> {
    navmesh: &'a NavMeshCacheItem,
    detour: &'a DetourSettings,
    cell_size: f32,
    tile_size: i32,
    max_climb: f32,
}

impl<'a> NavMeshQuery<'a> {
    pub fn new(navmesh: &'a NavMeshCacheItem, settings: &'a Settings) -> Self {
        Self {
            navmesh,
            detour: &settings.detour,
            cell_size: settings.recast.real_cell_size(),
            tile_size: settings.recast.tile_size.max(1),
            max_climb: settings.recast.max_climb,
        }
    }

    fn cell_of(&self, point: Vec2) -> IVec2 {
        let cell = (point / self.cell_size).floor();
        IVec2::new(cell.x as i32, cell.y as i32)
    }

    fn center(&self, cell: IVec2) -> Vec2 {
        (cell.as_vec2() + 0.5) * self.cell_size
    }

    fn sample(&self, cell: IVec2, flags: Flags) -> Option<(AreaType, f32)> {
        let tile = crate::coord::TilePosition::new(
            cell.x.div_euclid(self.tile_size),
            cell.y.div_euclid(self.tile_size),
        );
        let data = self.navmesh.get_tile(tile)?;
        let local_x = cell.x.rem_euclid(self.tile_size) as usize;
        let local_y = cell.y.rem_euclid(self.tile_size) as usize;
        let (area_type, height) = data.cell(local_x, local_y)?;
        flags.allows(area_type).then_some((area_type, height))
    }

    fn height(&self, cell: IVec2, flags: Flags) -> Option<f32> {
        self.sample(cell, flags).map(|(_, height)| height)
    }

    /// Surface point of a cell, at `point` when it lies in that cell.
    fn surface_point(&self, cell: IVec2, height: f32, point: Vec3) -> Vec3 {
        if self.cell_of(point.truncate()) == cell {
            point.truncate().extend(height)
        } else {
            self.center(cell).extend(height)
        }
    }

    fn find_nearest_cell(&self, position: Vec3, half_extents: Vec3, flags: Flags) -> Option<(IVec2, f32)> {
        if !position.is_finite() || !half_extents.is_finite() {
            return None;
        }
        let min = self.cell_of(position.truncate() - half_extents.truncate());
        let max = self.cell_of(position.truncate() + half_extents.truncate());
        let mut best: Option<(IVec2, f32, f32)> = None;
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                let cell = IVec2::new(x, y);
                let Some(height) = self.height(cell, flags) else {
                    continue;
                };
                if (height - position.z).abs() > half_extents.z {
                    continue;
                }
                let surface = self.surface_point(cell, height, position);
                let distance = surface.distance_squared(position);
                if best.map_or(true, |(_, _, d)| distance < d) {
                    best = Some((cell, height, distance));
                }
            }
        }
        best.map(|(cell, height, _)| (cell, height))
    }

    fn step_allowed(&self, from: IVec2, to: IVec2, flags: Flags) -> Option<(AreaType, f32)> {
        let from_height = self.height(from, flags)?;
        let (area_type, height) = self.sample(to, flags)?;
        if (height - from_height).abs() > self.max_climb {
            return None;
        }
        let delta = to - from;
        if delta.x != 0 && delta.y != 0 {
            self.height(IVec2::new(from.x + delta.x, from.y), flags)?;
            self.height(IVec2::new(from.x, from.y + delta.y), flags)?;
        }
        Some((area_type, height))
    }

    /// Whether a straight move between two cells stays on walkable cells.
    fn line_walkable(&self, from: Vec2, to: Vec2, flags: Flags) -> bool {
        let length = from.distance(to);
        let steps = (length / (self.cell_size * 0.25)).ceil().max(1.0) as usize;
        let mut previous = match self.height(self.cell_of(from), flags) {
            Some(height) => height,
            None => return false,
        };
        for step in 1..=steps {
            let point = from.lerp(to, step as f32 / steps as f32);
            let Some(height) = self.height(self.cell_of(point), flags) else {
                return false;
            };
            if (height - previous).abs() > self.max_climb {
                return false;
            }
            previous = height;
        }
        true
    }

    fn octile(&self, from: IVec2, to: IVec2) -> f32 {
        let d = (to - from).abs();
        let (long, short) = (d.x.max(d.y) as f32, d.x.min(d.y) as f32);
        (long - short + short * std::f32::consts::SQRT_2) * self.cell_size
    }

    /// Finds a walkable path between two positions.
    pub fn find_path(
        &self,
        agent: &AgentBounds,
        settings: &Settings,
        start: Vec3,
        end: Vec3,
        flags: Flags,
    ) -> PathResult {
        let extents = search_area_half_extents(agent, settings);
        let Some((start_cell, start_height)) = self.find_nearest_cell(start, extents, flags) else {
            return PathResult::failed(Status::StartPolygonNotFound);
        };
        let Some((end_cell, end_height)) = self.find_nearest_cell(end, extents, flags) else {
            return PathResult::failed(Status::EndPolygonNotFound);
        };
        if self.detour.max_navmesh_query_nodes == 0 {
            return PathResult::failed(Status::FindPathOverPolygonsFailed);
        }

        let (cells, reached) = self.search(start_cell, end_cell, flags, &self.detour.area_costs);
        let mut cells = cells;
        let mut complete = reached;
        if cells.len() > self.detour.max_polygon_path_size.max(1) {
            cells.truncate(self.detour.max_polygon_path_size.max(1));
            complete = false;
        }

        let mut path = vec![self.surface_point(start_cell, start_height, start)];
        let mut anchor = 0;
        while anchor + 1 < cells.len() {
            let mut next = anchor + 1;
            for candidate in (anchor + 2..cells.len()).rev() {
                if self.line_walkable(self.center(cells[anchor]), self.center(cells[candidate]), flags) {
                    next = candidate;
                    break;
                }
            }
            let last = next + 1 == cells.len();
            let point = if last && complete {
                self.surface_point(end_cell, end_height, end)
            } else {
                let cell = cells[next];
                self.center(cell)
                    .extend(self.height(cell, flags).unwrap_or(end_height))
            };
            path.push(point);
            anchor = next;
        }
        if cells.len() == 1 && complete && self.cell_of(start.truncate()) != self.cell_of(end.truncate()) {
            path.push(self.surface_point(end_cell, end_height, end));
        }
        path.truncate(self.detour.max_smooth_path_size.max(1));

        PathResult {
            status: if complete {
                Status::Success
            } else {
                Status::PartialPath
            },
            path,
        }
    }

    /// A* over cells. Returns the cell path to `end` or, when unreachable
    /// within the node budget, to the visited cell closest to it.
    fn search(&self, start: IVec2, end: IVec2, flags: Flags, costs: &AreaCosts) -> (Vec<IVec2>, bool) {
        let min_cost = costs.min_cost();
        let mut open = BinaryHeap::new();
        let mut visited: HashMap<IVec2, Visited> = HashMap::new();
        visited.insert(
            start,
            Visited {
                cost: 0.0,
                parent: None,
                closed: false,
            },
        );
        open.push(OpenNode {
            estimate: self.octile(start, end) * min_cost,
            cost: 0.0,
            cell: start,
        });

        let mut closest = (start, self.octile(start, end));
        let mut expanded = 0;
        let mut reached = false;
        while let Some(node) = open.pop() {
            let Some(entry) = visited.get_mut(&node.cell) else {
                continue;
            };
            if entry.closed || node.cost > entry.cost {
                continue;
            }
            entry.closed = true;
            if node.cell == end {
                reached = true;
                closest.0 = end;
                break;
            }
            expanded += 1;
            if expanded >= self.detour.max_navmesh_query_nodes {
                break;
            }
            let remaining = self.octile(node.cell, end);
            if remaining < closest.1 {
                closest = (node.cell, remaining);
            }

            for offset in NEIGHBOURS {
                let next = node.cell + offset;
                let Some((area_type, _)) = self.step_allowed(node.cell, next, flags) else {
                    continue;
                };
                let step = if offset.x != 0 && offset.y != 0 {
                    std::f32::consts::SQRT_2
                } else {
                    1.0
                };
                let cost = node.cost + step * self.cell_size * costs.cost(area_type);
                let better = visited
                    .get(&next)
                    .map_or(true, |v| !v.closed && cost < v.cost);
                if !better {
                    continue;
                }
                visited.insert(
                    next,
                    Visited {
                        cost,
                        parent: Some(node.cell),
                        closed: false,
                    },
                );
                open.push(OpenNode {
                    estimate: cost + self.octile(next, end) * min_cost,
                    cost,
                    cell: next,
                });
            }
        }

        let mut cells = vec![closest.0];
        let mut current = closest.0;
        while let Some(parent) = visited.get(&current).and_then(|v| v.parent) {
            cells.push(parent);
            current = parent;
        }
        cells.reverse();
        (cells, reached)
    }

    /// Casts a walking ray. Returns the last walkable point before an
    /// obstacle, or `end` on the surface when nothing blocks the way.
    pub fn raycast(
        &self,
        agent: &AgentBounds,
        settings: &Settings,
        start: Vec3,
        end: Vec3,
        flags: Flags,
    ) -> Option<Vec3> {
        let extents = search_area_half_extents(agent, settings);
        let (start_cell, start_height) = self.find_nearest_cell(start, extents, flags)?;
        let origin = self.surface_point(start_cell, start_height, start);
        let from = origin.truncate();
        let to = end.truncate();
        let steps = (from.distance(to) / (self.cell_size * 0.25)).ceil().max(1.0) as usize;
        let mut last = origin;
        for step in 1..=steps {
            let point = from.lerp(to, step as f32 / steps as f32);
            let height = self.height(self.cell_of(point), flags);
            match height {
                Some(height) if (height - last.z).abs() <= self.max_climb => {
                    last = point.extend(height);
                }
                _ => return Some(last),
            }
        }
        Some(last)
    }

    /// Random reachable point within `max_radius` of `start`.
    pub fn find_random_point_around_circle(
        &self,
        agent: &AgentBounds,
        settings: &Settings,
        start: Vec3,
        max_radius: f32,
        flags: Flags,
        rng: &mut impl Rng,
    ) -> Option<Vec3> {
        let extents = search_area_half_extents(agent, settings);
        let (start_cell, _) = self.find_nearest_cell(start, extents, flags)?;
        let origin = start.truncate();
        let limit = self.detour.max_navmesh_query_nodes.max(1);

        let mut reachable = vec![start_cell];
        let mut seen = std::collections::HashSet::from([start_cell]);
        let mut queue = VecDeque::from([start_cell]);
        while let Some(cell) = queue.pop_front() {
            if reachable.len() >= limit {
                break;
            }
            for offset in NEIGHBOURS {
                let next = cell + offset;
                if seen.contains(&next) || self.center(next).distance(origin) > max_radius {
                    continue;
                }
                if self.step_allowed(cell, next, flags).is_none() {
                    continue;
                }
                seen.insert(next);
                reachable.push(next);
                queue.push_back(next);
            }
        }

        let cell = reachable[rng.random_range(0..reachable.len())];
        let height = self.height(cell, flags)?;
        Some(self.center(cell).extend(height))
    }

    /// Closest walkable position inside the search box.
    pub fn find_nearest_position(&self, position: Vec3, half_extents: Vec3, flags: Flags) -> Option<Vec3> {
        let (cell, height) = self.find_nearest_cell(position, half_extents, flags)?;
        Some(self.surface_point(cell, height, position))
    }
}
