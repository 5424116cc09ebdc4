//! Tile build jobs.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::agent::AgentBounds;
use crate::build::PreparedNavMeshData;
use crate::coord::TilePosition;
use crate::db::TileData;
use crate::manager::ChangeType;
use crate::navmesh::GuardedNavMeshCacheItem;
use crate::recast::RecastMesh;

// =============================================================================
// Job Identity
// =============================================================================

static NEXT_JOB_ID: AtomicUsize = AtomicUsize::new(1);

fn next_job_id() -> usize {
    NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of the tile a job builds. At most one job per key is pending
/// and at most one is being built.
pub(crate) type JobKey = (AgentBounds, TilePosition);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JobState {
    Initial,
    /// Returned from the database worker with `cached_tile_data` filled
    /// when a row was found.
    WithDbResult,
}

/// Outcome of processing a job on an updater worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JobStatus {
    Done,
    Fail,
    /// Not in the memory cache; the database has to be consulted.
    MemoryCacheMiss,
}

// =============================================================================
// Job
// =============================================================================

pub(crate) struct Job {
    pub id: usize,
    pub agent: AgentBounds,
    pub navmesh: Weak<GuardedNavMeshCacheItem>,
    pub worldspace: String,
    pub changed_tile: TilePosition,
    pub change_type: ChangeType,
    /// The job is not processed before this instant.
    pub process_time: Instant,
    pub state: JobState,
    /// Geometry snapshot captured before the database round trip.
    pub recast_mesh: Option<Arc<RecastMesh>>,
    /// Serialized tile input, the database lookup key.
    pub input: Vec<u8>,
    pub cached_tile_data: Option<TileData>,
    /// Freshly built data waiting to be written to the database.
    pub generated_navmesh_data: Option<Arc<PreparedNavMeshData>>,
}

impl Job {
    pub fn new(
        agent: AgentBounds,
        navmesh: Weak<GuardedNavMeshCacheItem>,
        worldspace: &str,
        changed_tile: TilePosition,
        change_type: ChangeType,
        process_time: Instant,
    ) -> Box<Self> {
        Box::new(Self {
            id: next_job_id(),
            agent,
            navmesh,
            worldspace: worldspace.to_string(),
            changed_tile,
            change_type,
            process_time,
            state: JobState::Initial,
            recast_mesh: None,
            input: Vec::new(),
            cached_tile_data: None,
            generated_navmesh_data: None,
        })
    }

    pub fn key(&self) -> JobKey {
        (self.agent, self.changed_tile)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("agent", &self.agent)
            .field("worldspace", &self.worldspace)
            .field("changed_tile", &self.changed_tile)
            .field("change_type", &self.change_type)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::CollisionShapeType;
    use glam::Vec3;

    #[test]
    fn test_job_ids_are_unique() {
        let agent = AgentBounds::new(CollisionShapeType::Aabb, Vec3::new(29.0, 29.0, 66.0));
        let now = Instant::now();
        let first = Job::new(agent, Weak::new(), "sys::default", TilePosition::new(0, 0), ChangeType::Add, now);
        let second = Job::new(agent, Weak::new(), "sys::default", TilePosition::new(0, 0), ChangeType::Add, now);
        assert!(second.id > first.id);
        assert_eq!(first.key(), second.key());
        assert_eq!(first.state, JobState::Initial);
    }
}
