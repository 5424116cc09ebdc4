//! Database worker.
//!
//! A single thread owns the [`NavMeshDb`]. Updater workers hand it jobs
//! that missed the memory cache (reads) and jobs that generated data worth
//! persisting (writes). Read jobs are sent back to the updater with the row
//! found, if any; write jobs end here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::job::{Job, JobState};
use super::queue::SpatialJobQueue;
use super::UpdaterShared;
use crate::build::serialization::{
    serialize_data, serialize_input, DbRefGeometryObject, NAVMESH_FORMAT_VERSION,
};
use crate::build::BuildError;
use crate::coord::TilePosition;
use crate::db::{DbError, NavMeshDb, ShapeId, TileId};
use crate::error::{NavigatorError, NavigatorResult};
use crate::recast::RecastMesh;
use crate::settings::RecastSettings;

#[derive(Debug, Error)]
enum DbJobError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

// =============================================================================
// Queue
// =============================================================================

/// Database queue counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DbJobQueueStats {
    pub reading_jobs: usize,
    pub writing_jobs: usize,
}

/// Database worker counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DbWorkerStats {
    pub jobs: DbJobQueueStats,
    pub get_tile_count: usize,
}

#[derive(Default)]
struct DbQueueState {
    reading: SpatialJobQueue,
    writing: VecDeque<Box<Job>>,
    player_tile: TilePosition,
    should_stop: bool,
}

/// Jobs waiting for the database worker.
///
/// Reads are served nearest to the player first and before any write.
#[derive(Default)]
pub(crate) struct DbJobQueue {
    state: Mutex<DbQueueState>,
    has_job: Condvar,
}

impl DbJobQueue {
    /// Queues a job. Jobs carrying generated data are writes.
    ///
    /// Returns the job back when the queue is stopped.
    pub fn push(&self, job: Box<Job>) -> Result<(), Box<Job>> {
        let mut state = self.state.lock();
        if state.should_stop {
            return Err(job);
        }
        if job.generated_navmesh_data.is_some() {
            state.writing.push_back(job);
        } else {
            state.reading.push(job);
        }
        drop(state);
        self.has_job.notify_all();
        Ok(())
    }

    /// Blocks until a job is available. `None` once stopped.
    pub fn pop(&self) -> Option<Box<Job>> {
        let mut state = self.state.lock();
        loop {
            if state.should_stop {
                return None;
            }
            let player_tile = state.player_tile;
            if let Some(job) = state.reading.pop(player_tile) {
                return Some(job);
            }
            if let Some(job) = state.writing.pop_front() {
                return Some(job);
            }
            self.has_job.wait(&mut state);
        }
    }

    pub fn update(&self, player_tile: TilePosition) {
        self.state.lock().player_tile = player_tile;
    }

    /// Takes every queued job out and wakes the worker up for good.
    pub fn stop(&self) -> Vec<Box<Job>> {
        let mut state = self.state.lock();
        state.should_stop = true;
        let mut jobs: Vec<Box<Job>> = state.reading.drain().collect();
        jobs.extend(state.writing.drain(..));
        drop(state);
        self.has_job.notify_all();
        jobs
    }

    pub fn stats(&self) -> DbJobQueueStats {
        let state = self.state.lock();
        DbJobQueueStats {
            reading_jobs: state.reading.len(),
            writing_jobs: state.writing.len(),
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Handle of the database worker thread.
pub(crate) struct DbWorker {
    queue: Arc<DbJobQueue>,
    get_tile_count: Arc<AtomicUsize>,
    thread: Option<JoinHandle<()>>,
}

impl DbWorker {
    pub fn start(
        db: NavMeshDb,
        settings: RecastSettings,
        write_to_db: bool,
        queue: Arc<DbJobQueue>,
        updater: Arc<UpdaterShared>,
    ) -> NavigatorResult<Self> {
        let next_tile_id = db.get_max_tile_id()?.next();
        let next_shape_id = db.get_max_shape_id()?.next();
        let get_tile_count = Arc::new(AtomicUsize::new(0));
        info!(
            next_tile_id = next_tile_id.0,
            next_shape_id = next_shape_id.0,
            write_to_db,
            "Starting navmesh database worker"
        );

        let mut runner = DbWorkerThread {
            db,
            queue: Arc::clone(&queue),
            updater,
            settings,
            write_to_db,
            next_tile_id,
            next_shape_id,
            get_tile_count: Arc::clone(&get_tile_count),
        };
        let thread = thread::Builder::new()
            .name("navmeshdb-worker".to_string())
            .spawn(move || runner.run())
            .map_err(NavigatorError::ThreadSpawn)?;

        Ok(Self {
            queue,
            get_tile_count,
            thread: Some(thread),
        })
    }

    pub fn update_player_tile(&self, player_tile: TilePosition) {
        self.queue.update(player_tile);
    }

    pub fn stats(&self) -> DbWorkerStats {
        DbWorkerStats {
            jobs: self.queue.stats(),
            get_tile_count: self.get_tile_count.load(Ordering::Relaxed),
        }
    }

    /// Stops the worker thread. Returns the jobs still queued.
    pub fn stop(&mut self) -> Vec<Box<Job>> {
        let dropped = self.queue.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Navmesh database worker panicked");
            }
        }
        dropped
    }
}

impl Drop for DbWorker {
    fn drop(&mut self) {
        let dropped = self.stop();
        if !dropped.is_empty() {
            warn!(jobs = dropped.len(), "Dropped queued navmesh database jobs");
        }
    }
}

struct DbWorkerThread {
    db: NavMeshDb,
    queue: Arc<DbJobQueue>,
    updater: Arc<UpdaterShared>,
    settings: RecastSettings,
    write_to_db: bool,
    next_tile_id: TileId,
    next_shape_id: ShapeId,
    get_tile_count: Arc<AtomicUsize>,
}

impl DbWorkerThread {
    fn run(&mut self) {
        while let Some(job) = self.queue.pop() {
            self.process_job(job);
        }
        debug!("Navmesh database worker stopped");
    }

    fn process_job(&mut self, mut job: Box<Job>) {
        if job.generated_navmesh_data.is_some() {
            if let Err(e) = self.process_writing_job(&mut job) {
                self.handle_error(&job, e);
            }
            self.updater.remove_job();
            return;
        }

        if let Err(e) = self.process_reading_job(&mut job) {
            self.handle_error(&job, e);
        }
        job.state = JobState::WithDbResult;
        self.updater.enqueue_job(job);
    }

    fn process_reading_job(&mut self, job: &mut Job) -> Result<(), DbJobError> {
        self.get_tile_count.fetch_add(1, Ordering::Relaxed);
        debug!(job_id = job.id, "Processing db read job");

        let Some(recast_mesh) = job.recast_mesh.clone() else {
            return Ok(());
        };
        if job.input.is_empty() {
            let insert_shapes = self.write_to_db;
            let Some(objects) = self.resolve_mesh_sources(&recast_mesh, insert_shapes)? else {
                debug!(job_id = job.id, "Tile input has unresolved mesh sources");
                return Ok(());
            };
            job.input = serialize_input(&self.settings, &job.agent, &recast_mesh, &objects)?;
        }

        job.cached_tile_data = self
            .db
            .get_tile_data(&job.worldspace, job.changed_tile, &job.input)?;
        Ok(())
    }

    fn process_writing_job(&mut self, job: &mut Job) -> Result<(), DbJobError> {
        if !self.write_to_db {
            debug!(job_id = job.id, "Ignored db write job");
            return Ok(());
        }
        let (Some(recast_mesh), Some(generated)) =
            (job.recast_mesh.clone(), job.generated_navmesh_data.clone())
        else {
            return Ok(());
        };
        debug!(job_id = job.id, "Processing db write job");

        if job.input.is_empty() {
            let Some(objects) = self.resolve_mesh_sources(&recast_mesh, true)? else {
                return Ok(());
            };
            job.input = serialize_input(&self.settings, &job.agent, &recast_mesh, &objects)?;
        }

        let mut data = generated.as_ref().clone();

        if let Some(cached) = &job.cached_tile_data {
            debug!(job_id = job.id, tile_id = cached.tile_id.0, "Update db tile");
            data.user_id = cached.tile_id.0;
            self.db
                .update_tile(cached.tile_id, NAVMESH_FORMAT_VERSION, &serialize_data(&data)?)?;
            return Ok(());
        }

        if let Some(existing) = self.db.find_tile(&job.worldspace, job.changed_tile, &job.input)? {
            if existing.version == NAVMESH_FORMAT_VERSION {
                debug!(job_id = job.id, "Ignore existing db tile");
                return Ok(());
            }
        }

        let tile_id = self.next_tile_id;
        data.user_id = tile_id.0;
        debug!(job_id = job.id, tile_id = tile_id.0, "Insert db tile");
        self.db.insert_tile(
            tile_id,
            &job.worldspace,
            job.changed_tile,
            NAVMESH_FORMAT_VERSION,
            &job.input,
            &serialize_data(&data)?,
        )?;
        self.next_tile_id = tile_id.next();
        Ok(())
    }

    /// Maps every mesh source of a tile to a persisted shape.
    ///
    /// `None` when the tile cannot be described by shapes: a source has no
    /// shape identity, or a shape is unknown and `insert` is off.
    fn resolve_mesh_sources(
        &mut self,
        recast_mesh: &RecastMesh,
        insert: bool,
    ) -> Result<Option<Vec<DbRefGeometryObject>>, DbJobError> {
        let mut objects = Vec::with_capacity(recast_mesh.mesh_sources().len());
        for source in recast_mesh.mesh_sources() {
            let Some(shape_source) = &source.shape.source else {
                return Ok(None);
            };
            let shape_type = source.shape.shape_type;
            let shape_id = match self
                .db
                .find_shape_id(&shape_source.name, shape_type, &shape_source.hash)?
            {
                Some(id) => id,
                None if insert => {
                    let id = self.next_shape_id;
                    self.db
                        .insert_shape(id, &shape_source.name, shape_type, &shape_source.hash)?;
                    self.next_shape_id = id.next();
                    id
                }
                None => return Ok(None),
            };
            objects.push(DbRefGeometryObject::new(
                shape_id,
                source.transform,
                source.area_type,
            ));
        }
        Ok(Some(objects))
    }

    fn handle_error(&mut self, job: &Job, e: DbJobError) {
        error!(job_id = job.id, error = %e, "Navmesh database worker failed to process job");
        if !self.write_to_db {
            return;
        }
        match e {
            DbJobError::Db(DbError::StorageExhausted) => {
                self.write_to_db = false;
                warn!("Writes to navmeshdb are disabled because file size limit is reached or disk is full");
            }
            DbJobError::Db(DbError::Locked) => {
                self.write_to_db = false;
                warn!("Writes to navmeshdb are disabled to avoid concurrent writes from multiple processes");
            }
            DbJobError::Db(DbError::DuplicateTileId) => {
                warn!(tile_id = self.next_tile_id.0, "Found duplicate navmeshdb tile id");
                match self.db.get_max_tile_id() {
                    Ok(max) => {
                        self.next_tile_id = max.next();
                        info!(tile_id = self.next_tile_id.0, "Updated next navmeshdb tile id");
                    }
                    Err(e) => {
                        self.write_to_db = false;
                        warn!(error = %e, "Failed to update next tile id, writes to navmeshdb are disabled");
                    }
                }
            }
            _ => {}
        }
    }
}
