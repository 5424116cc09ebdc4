//! Asynchronous navmesh updater.
//!
//! [`AsyncNavMeshUpdater`] runs a pool of worker threads that turn changed
//! tiles into committed navmesh tiles. For every job a worker:
//!
//! 1. Locks the `(agent, tile)` pair so no other worker builds it
//! 2. Takes the current geometry snapshot from the manager
//! 3. Looks the tile up in the memory cache, then in the database through
//!    the database worker, and only then builds it
//! 4. Commits the result into the agent's navmesh
//!
//! Workers sleep on a condition variable until a job is ready or the next
//! delayed job is due. Barriers in [`AsyncNavMeshUpdater::wait`] are woken
//! on every state change.

mod db_worker;
mod job;
mod queue;
mod wait;

pub use db_worker::{DbJobQueueStats, DbWorkerStats};
pub use queue::JobQueueStats;
pub use wait::{Listener, NoopListener, WaitConditionType};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use db_worker::{DbJobQueue, DbWorker};
use job::{Job, JobKey, JobState, JobStatus};
use queue::JobQueue;
use wait::ProgressReporter;

use crate::agent::AgentBounds;
use crate::build::serialization::{deserialize_data, NAVMESH_FORMAT_VERSION};
use crate::build::{BuildError, PreparedNavMeshData, TileBuilder};
use crate::cache::{CachedNavMeshData, NavMeshTilesCache, NavMeshTilesCacheStats};
use crate::coord::{should_add_tile, TilePosition};
use crate::db::NavMeshDb;
use crate::error::{NavigatorError, NavigatorResult};
use crate::manager::{ChangeType, TileCachedRecastMeshManager};
use crate::navmesh::{SharedNavMeshCacheItem, UpdateNavMeshStatus};
use crate::recast::{RecastMesh, Version};
use crate::settings::Settings;

/// Longest sleep of an idle worker before it cleans up and looks again.
const IDLE_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest sleep of a barrier between two progress reports.
const WAIT_STEP: Duration = Duration::from_millis(20);

// =============================================================================
// Statistics
// =============================================================================

/// Updater counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AsyncNavMeshUpdaterStats {
    /// Jobs alive anywhere: waiting, in flight or queued for the database.
    pub jobs: usize,
    pub waiting: JobQueueStats,
    pub pushed: usize,
    pub processing: usize,
    pub db: Option<DbWorkerStats>,
    pub cache: NavMeshTilesCacheStats,
    pub db_get_tile_hits: usize,
}

impl fmt::Display for AsyncNavMeshUpdaterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NavMesh jobs: {}", self.jobs)?;
        writeln!(f, "NavMesh removing tile jobs: {}", self.waiting.removing)?;
        writeln!(f, "NavMesh updating tile jobs: {}", self.waiting.updating)?;
        writeln!(f, "NavMesh delayed jobs: {}", self.waiting.delayed)?;
        writeln!(f, "NavMesh pushed: {}", self.pushed)?;
        writeln!(f, "NavMesh processing: {}", self.processing)?;
        if let Some(db) = &self.db {
            writeln!(f, "DbJobQueue read jobs: {}", db.jobs.reading_jobs)?;
            writeln!(f, "DbJobQueue write jobs: {}", db.jobs.writing_jobs)?;
            writeln!(f, "DbWorker get tile count: {}", db.get_tile_count)?;
        }
        writeln!(f, "NavMesh db get tile hits: {}", self.db_get_tile_hits)?;
        writeln!(f, "NavMesh cache size: {}", self.cache.navmesh_cache_size)?;
        writeln!(f, "NavMesh cache used tiles: {}", self.cache.used_navmesh_tiles)?;
        writeln!(f, "NavMesh cache cached tiles: {}", self.cache.cached_navmesh_tiles)?;
        writeln!(f, "NavMesh cache get count: {}", self.cache.get_count)?;
        write!(f, "NavMesh cache hit count: {}", self.cache.hit_count)
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct UpdaterState {
    jobs: usize,
    waiting: JobQueue,
    pushed: BTreeSet<JobKey>,
    processing: BTreeSet<JobKey>,
    present_tiles: BTreeSet<JobKey>,
    last_updates: BTreeMap<JobKey, Instant>,
    player_tile: TilePosition,
}

impl UpdaterState {
    /// Whether a tile close to the player is pending or in flight without
    /// being committed.
    fn has_absent_tile_close_to(&self, player_tile: TilePosition, distance: i32) -> bool {
        self.pushed
            .iter()
            .chain(self.processing.iter())
            .any(|key| {
                !self.present_tiles.contains(key)
                    && key.1.manhattan_distance(&player_tile) < i64::from(distance)
            })
    }
}

/// Jobs between a memory cache miss and their database result keep the
/// tile locked; written jobs released it before they were queued.
fn holds_tile_lock(job: &Job) -> bool {
    job.recast_mesh.is_some() && job.generated_navmesh_data.is_none()
}

/// State shared between the updater handle, its workers and the database
/// worker.
pub(crate) struct UpdaterShared {
    settings: Settings,
    manager: Arc<TileCachedRecastMeshManager>,
    builder: Arc<dyn TileBuilder>,
    cache: NavMeshTilesCache,
    db_queue: Option<Arc<DbJobQueue>>,
    state: Mutex<UpdaterState>,
    /// Workers wait here for ready jobs.
    has_job: Condvar,
    /// Barriers wait here for any progress.
    changed: Condvar,
    should_stop: AtomicBool,
    db_get_tile_hits: AtomicUsize,
}

impl UpdaterShared {
    fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::Acquire)
    }

    /// Hands a job back from the database worker.
    pub(crate) fn enqueue_job(&self, job: Box<Job>) {
        debug!(job_id = job.id, "Enqueued job back from the database");
        let mut state = self.state.lock();
        state.waiting.push(job, Instant::now());
        drop(state);
        self.has_job.notify_all();
    }

    /// Forgets jobs that will never run again, releasing the tiles they
    /// hold.
    fn forget_jobs(&self, jobs: &[Box<Job>]) {
        let mut state = self.state.lock();
        for job in jobs {
            if holds_tile_lock(job) {
                state.processing.remove(&job.key());
            }
        }
        state.jobs = state.jobs.saturating_sub(jobs.len());
        drop(state);
        self.changed.notify_all();
    }

    /// Forgets a finished job.
    pub(crate) fn remove_job(&self) {
        let mut state = self.state.lock();
        state.jobs = state.jobs.saturating_sub(1);
        drop(state);
        self.changed.notify_all();
    }

    fn unlock_tile(&self, key: JobKey) {
        self.state.lock().processing.remove(&key);
        self.changed.notify_all();
    }

    fn set_present(&self, key: JobKey, present: bool) {
        let mut state = self.state.lock();
        if present {
            state.present_tiles.insert(key);
        } else {
            state.present_tiles.remove(&key);
        }
    }

    fn player_tile(&self) -> TilePosition {
        self.state.lock().player_tile
    }

    // =========================================================================
    // Worker loop
    // =========================================================================

    fn run_worker(&self) {
        while !self.should_stop() {
            match self.get_next_job() {
                Some(job) => self.run_job(job),
                None => self.cleanup_last_updates(),
            }
        }
        debug!("Navmesh updater worker stopped");
    }

    fn get_next_job(&self) -> Option<Box<Job>> {
        let mut state = self.state.lock();
        let now = loop {
            let now = Instant::now();
            if self.should_stop() || state.waiting.has_job(now) {
                break now;
            }
            let deadline = state
                .waiting
                .next_process_time()
                .map_or(now + IDLE_TIMEOUT, |time| time.min(now + IDLE_TIMEOUT));
            if self.has_job.wait_until(&mut state, deadline).timed_out() {
                let now = Instant::now();
                if !state.waiting.has_job(now) {
                    if state.jobs == 0 {
                        self.changed.notify_all();
                    }
                    return None;
                }
                break now;
            }
        };

        if self.should_stop() {
            return None;
        }

        let player_tile = state.player_tile;
        let mut job = state.waiting.pop(player_tile, now)?;

        if job.recast_mesh.is_some() {
            return Some(job);
        }

        let key = job.key();
        if !state.processing.insert(key) {
            debug!(job_id = job.id, tile = %job.changed_tile, "Tile is being processed, delaying job");
            job.process_time = now + self.settings.min_update_interval;
            state.waiting.push(job, now);
            return None;
        }

        if job.change_type == ChangeType::Update {
            state.last_updates.insert(key, now);
        }
        state.pushed.remove(&key);

        Some(job)
    }

    fn run_job(&self, mut job: Box<Job>) {
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process_job(&mut job)));

        let status = match result {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(
                    job_id = job.id,
                    worldspace = %job.worldspace,
                    agent = %job.agent,
                    tile = %job.changed_tile,
                    change_type = %job.change_type,
                    error = %e,
                    "Failed to process navmesh job"
                );
                JobStatus::Fail
            }
            Err(_) => {
                warn!(
                    job_id = job.id,
                    worldspace = %job.worldspace,
                    agent = %job.agent,
                    tile = %job.changed_tile,
                    change_type = %job.change_type,
                    "Navmesh job panicked"
                );
                JobStatus::Fail
            }
        };

        debug!(
            job_id = job.id,
            status = ?status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Processed job"
        );

        match status {
            JobStatus::Done => {
                self.unlock_tile(job.key());
                if job.generated_navmesh_data.is_some() {
                    self.enqueue_db_job(job);
                } else {
                    self.remove_job();
                }
            }
            JobStatus::Fail => {
                self.unlock_tile(job.key());
                self.remove_job();
            }
            JobStatus::MemoryCacheMiss => self.enqueue_db_job(job),
        }
    }

    fn enqueue_db_job(&self, job: Box<Job>) {
        let rejected = match &self.db_queue {
            Some(queue) => queue.push(job).err(),
            None => Some(job),
        };
        if let Some(job) = rejected {
            // Only reachable while stopping.
            self.unlock_tile(job.key());
            self.remove_job();
        }
    }

    fn cleanup_last_updates(&self) {
        let now = Instant::now();
        let interval = self.settings.min_update_interval;
        self.state
            .lock()
            .last_updates
            .retain(|_, last| now.saturating_duration_since(*last) <= interval);
    }

    // =========================================================================
    // Job processing
    // =========================================================================

    fn process_job(&self, job: &mut Job) -> Result<JobStatus, BuildError> {
        debug!(
            job_id = job.id,
            agent = %job.agent,
            tile = %job.changed_tile,
            change_type = %job.change_type,
            "Processing job"
        );

        let Some(navmesh) = job.navmesh.upgrade() else {
            return Ok(JobStatus::Done);
        };

        if !should_add_tile(job.changed_tile, self.player_tile(), self.settings.max_tiles_number) {
            debug!(job_id = job.id, "Remove tile outside of player range");
            job.change_type = ChangeType::Remove;
            navmesh.write().remove_tile(job.changed_tile);
            self.set_present(job.key(), false);
            return Ok(JobStatus::Done);
        }

        match job.state {
            JobState::Initial => self.process_initial_job(job, &navmesh),
            JobState::WithDbResult => self.process_job_with_db_result(job, &navmesh),
        }
    }

    fn process_initial_job(
        &self,
        job: &mut Job,
        navmesh: &SharedNavMeshCacheItem,
    ) -> Result<JobStatus, BuildError> {
        let recast_mesh = match self.manager.get_mesh(&job.worldspace, job.changed_tile) {
            Some(mesh) if !mesh.is_empty() => mesh,
            _ => {
                debug!(job_id = job.id, "Empty recast mesh");
                self.mark_as_empty(job, navmesh);
                return Ok(JobStatus::Done);
            }
        };

        let cached = match self.cache.get(&job.agent, job.changed_tile, &recast_mesh) {
            Some(cached) => cached,
            None => {
                if job.change_type != ChangeType::Update && self.db_queue.is_some() {
                    job.recast_mesh = Some(recast_mesh);
                    return Ok(JobStatus::MemoryCacheMiss);
                }

                let Some(prepared) = self.build(job, &recast_mesh)? else {
                    self.mark_as_empty(job, navmesh);
                    return Ok(JobStatus::Done);
                };

                if job.change_type == ChangeType::Update {
                    return Ok(self.commit(job, navmesh, &recast_mesh, None, Arc::new(prepared)));
                }

                match self.cache.set(&job.agent, job.changed_tile, &recast_mesh, prepared) {
                    Ok(cached) => cached,
                    Err(prepared) => {
                        return Ok(self.commit(job, navmesh, &recast_mesh, None, Arc::new(prepared)))
                    }
                }
            }
        };

        let data = cached.shared();
        Ok(self.commit(job, navmesh, &recast_mesh, Some(cached), data))
    }

    fn process_job_with_db_result(
        &self,
        job: &mut Job,
        navmesh: &SharedNavMeshCacheItem,
    ) -> Result<JobStatus, BuildError> {
        let Some(recast_mesh) = job.recast_mesh.clone() else {
            return Err(BuildError::Failed("job returned from database without geometry".to_string()));
        };

        let mut generated = false;
        let from_db = job
            .cached_tile_data
            .as_ref()
            .filter(|tile_data| tile_data.version == NAVMESH_FORMAT_VERSION)
            .and_then(|tile_data| match deserialize_data(&tile_data.data) {
                Ok(mut data) => {
                    data.user_id = tile_data.tile_id.0;
                    Some(data)
                }
                Err(e) => {
                    debug!(job_id = job.id, error = %e, "Discarding unreadable db tile");
                    None
                }
            });

        let prepared = match from_db {
            Some(data) => {
                self.db_get_tile_hits.fetch_add(1, Ordering::Relaxed);
                data
            }
            None => {
                generated = true;
                match self.build(job, &recast_mesh)? {
                    Some(data) => data,
                    None => {
                        self.mark_as_empty(job, navmesh);
                        return Ok(JobStatus::Done);
                    }
                }
            }
        };

        let (cached, data) = match self.cache.set(&job.agent, job.changed_tile, &recast_mesh, prepared) {
            Ok(cached) => {
                let data = cached.shared();
                (Some(cached), data)
            }
            Err(prepared) => (None, Arc::new(prepared)),
        };

        let status = self.commit(job, navmesh, &recast_mesh, cached, Arc::clone(&data));

        if status == JobStatus::Done
            && generated
            && job.change_type != ChangeType::Update
            && self.settings.write_to_navmeshdb
        {
            job.generated_navmesh_data = Some(data);
        }

        Ok(status)
    }

    fn build(
        &self,
        job: &Job,
        recast_mesh: &RecastMesh,
    ) -> Result<Option<PreparedNavMeshData>, BuildError> {
        self.builder.build(
            recast_mesh,
            &job.worldspace,
            job.changed_tile,
            &job.agent,
            &self.settings.recast,
        )
    }

    fn mark_as_empty(&self, job: &Job, navmesh: &SharedNavMeshCacheItem) {
        navmesh.write().mark_as_empty(job.changed_tile);
        self.set_present(job.key(), false);
    }

    fn commit(
        &self,
        job: &Job,
        navmesh: &SharedNavMeshCacheItem,
        recast_mesh: &RecastMesh,
        cached: Option<CachedNavMeshData>,
        data: Arc<PreparedNavMeshData>,
    ) -> JobStatus {
        let (status, navmesh_version) = {
            let mut item = navmesh.write();
            let status = item.update_tile(job.changed_tile, cached, data, recast_mesh.version());
            (status, item.version())
        };
        self.handle_update_navmesh_status(job, status, recast_mesh.version(), navmesh_version)
    }

    fn handle_update_navmesh_status(
        &self,
        job: &Job,
        status: UpdateNavMeshStatus,
        recast_version: Version,
        navmesh_version: Version,
    ) -> JobStatus {
        debug!(job_id = job.id, tile = %job.changed_tile, %status, "Updated navmesh tile");
        self.manager
            .report_navmesh_change(job.changed_tile, recast_version, navmesh_version);
        match status {
            UpdateNavMeshStatus::Removed | UpdateNavMeshStatus::Lost => {
                self.set_present(job.key(), false)
            }
            UpdateNavMeshStatus::Ignored => {}
            _ if status.is_success() => self.set_present(job.key(), true),
            _ => {}
        }
        if status.is_success() {
            JobStatus::Done
        } else {
            JobStatus::Fail
        }
    }
}

// =============================================================================
// Updater
// =============================================================================

/// Worker pool building navmesh tiles in the background.
pub struct AsyncNavMeshUpdater {
    shared: Arc<UpdaterShared>,
    threads: Vec<JoinHandle<()>>,
    db_worker: Option<DbWorker>,
}

impl AsyncNavMeshUpdater {
    /// Starts the worker pool and, with a database, the database worker.
    pub fn new(
        settings: Settings,
        manager: Arc<TileCachedRecastMeshManager>,
        builder: Arc<dyn TileBuilder>,
        db: Option<NavMeshDb>,
    ) -> NavigatorResult<Self> {
        settings.validate()?;
        let db_queue = db.as_ref().map(|_| Arc::new(DbJobQueue::default()));
        let shared = Arc::new(UpdaterShared {
            cache: NavMeshTilesCache::new(settings.max_navmesh_tiles_cache_size),
            settings,
            manager,
            builder,
            db_queue: db_queue.clone(),
            state: Mutex::new(UpdaterState {
                jobs: 0,
                waiting: JobQueue::default(),
                pushed: BTreeSet::new(),
                processing: BTreeSet::new(),
                present_tiles: BTreeSet::new(),
                last_updates: BTreeMap::new(),
                player_tile: TilePosition::default(),
            }),
            has_job: Condvar::new(),
            changed: Condvar::new(),
            should_stop: AtomicBool::new(false),
            db_get_tile_hits: AtomicUsize::new(0),
        });

        let mut updater = Self {
            shared: Arc::clone(&shared),
            threads: Vec::new(),
            db_worker: None,
        };

        if let (Some(db), Some(queue)) = (db, db_queue) {
            updater.db_worker = Some(DbWorker::start(
                db,
                shared.settings.recast.clone(),
                shared.settings.write_to_navmeshdb,
                queue,
                Arc::clone(&shared),
            )?);
        }

        for index in 0..shared.settings.async_navmesh_updater_threads {
            let worker = Arc::clone(&shared);
            let thread = thread::Builder::new()
                .name(format!("navmesh-updater-{index}"))
                .spawn(move || worker.run_worker())
                .map_err(NavigatorError::ThreadSpawn)?;
            updater.threads.push(thread);
        }

        info!(
            threads = updater.threads.len(),
            db = updater.db_worker.is_some(),
            "Started async navmesh updater"
        );
        Ok(updater)
    }

    /// Queues jobs for changed tiles of one agent.
    ///
    /// A tile already waiting for this agent is not queued twice. `update`
    /// jobs for a tile rebuilt within the minimum update interval are
    /// delayed until the interval has passed.
    pub fn post(
        &self,
        agent: &AgentBounds,
        navmesh: &SharedNavMeshCacheItem,
        player_tile: TilePosition,
        worldspace: &str,
        changed_tiles: &BTreeMap<TilePosition, ChangeType>,
    ) {
        let shared = &self.shared;
        let player_tile_changed = {
            let mut state = shared.state.lock();
            let player_tile_changed = state.player_tile != player_tile;
            state.player_tile = player_tile;

            if !player_tile_changed && changed_tiles.is_empty() {
                return;
            }

            let now = Instant::now();
            if player_tile_changed {
                state
                    .waiting
                    .update(player_tile, shared.settings.max_tiles_number, now);
            }

            for (&tile, &change_type) in changed_tiles {
                let key = (*agent, tile);
                if !state.pushed.insert(key) {
                    continue;
                }
                let process_time = match (change_type, state.last_updates.get(&key)) {
                    (ChangeType::Update, Some(last)) => *last + shared.settings.min_update_interval,
                    _ => now,
                };
                let job = Job::new(
                    *agent,
                    Arc::downgrade(navmesh),
                    worldspace,
                    tile,
                    change_type,
                    process_time,
                );
                debug!(
                    job_id = job.id,
                    agent = %agent,
                    tile = %tile,
                    change_type = %change_type,
                    "Posted job"
                );
                state.jobs += 1;
                state.waiting.push(job, now);
            }
            player_tile_changed
        };

        shared.has_job.notify_all();

        if player_tile_changed {
            if let Some(db_worker) = &self.db_worker {
                db_worker.update_player_tile(player_tile);
            }
        }
    }

    /// Drops every waiting job, e.g. after the worldspace changed.
    ///
    /// Jobs already taken by a worker or the database worker finish
    /// normally.
    pub fn discard_pending_jobs(&self) {
        let jobs = {
            let mut state = self.shared.state.lock();
            state.pushed.clear();
            state.present_tiles.clear();
            state.last_updates.clear();
            state.waiting.drain()
        };
        self.shared.forget_jobs(&jobs);
        debug!(discarded = jobs.len(), "Discarded pending navmesh jobs");
    }

    /// Blocks until `condition` holds, reporting progress to `listener`.
    pub fn wait(&self, listener: &mut dyn Listener, condition: WaitConditionType) {
        match condition {
            WaitConditionType::RequiredTilesPresent => {
                let distance = self.shared.settings.wait_until_min_distance_to_player;
                if distance <= 0 {
                    return;
                }
                self.wait_until(listener, "Building navigation mesh", |state| {
                    state.jobs == 0 || !state.has_absent_tile_close_to(state.player_tile, distance)
                });
            }
            WaitConditionType::AllJobsDone => {
                self.wait_until(listener, "Building navigation mesh", |state| {
                    state.jobs == 0 && state.processing.is_empty()
                });
            }
        }
    }

    fn wait_until(
        &self,
        listener: &mut dyn Listener,
        label: &str,
        is_done: impl Fn(&UpdaterState) -> bool,
    ) {
        let mut state = self.shared.state.lock();
        if is_done(&state) {
            return;
        }
        let initial_jobs = state.jobs;
        let mut reporter =
            MutexGuard::unlocked(&mut state, || ProgressReporter::start(listener, label, initial_jobs));
        loop {
            if is_done(&state) || self.shared.should_stop() {
                break;
            }
            self.shared.changed.wait_for(&mut state, WAIT_STEP);
            let jobs_left = state.jobs;
            MutexGuard::unlocked(&mut state, || reporter.report(listener, jobs_left));
        }
    }

    pub fn stats(&self) -> AsyncNavMeshUpdaterStats {
        let state = self.shared.state.lock();
        AsyncNavMeshUpdaterStats {
            jobs: state.jobs,
            waiting: state.waiting.stats(),
            pushed: state.pushed.len(),
            processing: state.processing.len(),
            db: self.db_worker.as_ref().map(DbWorker::stats),
            cache: self.shared.cache.stats(),
            db_get_tile_hits: self.shared.db_get_tile_hits.load(Ordering::Relaxed),
        }
    }

    /// Stops all workers. Queued jobs are dropped; jobs in flight finish.
    pub fn stop(&mut self) {
        if self.shared.should_stop.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(db_worker) = &mut self.db_worker {
            let dropped = db_worker.stop();
            debug!(jobs = dropped.len(), "Dropped queued navmesh database jobs");
            self.shared.forget_jobs(&dropped);
        }
        let dropped = self.shared.state.lock().waiting.drain();
        self.shared.forget_jobs(&dropped);
        self.shared.has_job.notify_all();
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                warn!("Navmesh updater worker panicked");
            }
        }
        info!("Stopped async navmesh updater");
    }
}

impl Drop for AsyncNavMeshUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}
