//! Waiting job queues.
//!
//! [`JobQueue`] orders pending jobs the way workers should take them:
//!
//! 1. Removals, newest first
//! 2. The job whose tile is nearest to the player, FIFO per tile
//! 3. Delayed jobs once their process time has come
//!
//! Tiles drifting out of the player window while waiting are turned into
//! removals by [`JobQueue::update`].

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use super::job::Job;
use crate::coord::{should_add_tile, TilePosition};
use crate::manager::ChangeType;

// =============================================================================
// Spatial Queue
// =============================================================================

/// Jobs grouped by tile, popped nearest to the player first.
#[derive(Debug, Default)]
pub(crate) struct SpatialJobQueue {
    tiles: BTreeMap<TilePosition, VecDeque<Box<Job>>>,
    size: usize,
}

impl SpatialJobQueue {
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn push(&mut self, job: Box<Job>) {
        self.tiles.entry(job.changed_tile).or_default().push_back(job);
        self.size += 1;
    }

    pub fn pop(&mut self, player_tile: TilePosition) -> Option<Box<Job>> {
        let tile = *self
            .tiles
            .keys()
            .min_by(|a, b| a.distance(&player_tile).total_cmp(&b.distance(&player_tile)))?;
        let jobs = self.tiles.get_mut(&tile)?;
        let job = jobs.pop_front();
        if jobs.is_empty() {
            self.tiles.remove(&tile);
        }
        if job.is_some() {
            self.size -= 1;
        }
        job
    }

    /// Moves jobs of tiles outside the player window to `removing`.
    pub fn update(
        &mut self,
        player_tile: TilePosition,
        max_tiles: i32,
        removing: &mut Vec<Box<Job>>,
    ) {
        let far: Vec<TilePosition> = self
            .tiles
            .keys()
            .copied()
            .filter(|tile| !should_add_tile(*tile, player_tile, max_tiles))
            .collect();
        for tile in far {
            let Some(jobs) = self.tiles.remove(&tile) else {
                continue;
            };
            self.size -= jobs.len();
            for mut job in jobs {
                job.change_type = ChangeType::Remove;
                removing.push(job);
            }
        }
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Box<Job>> {
        self.size = 0;
        std::mem::take(&mut self.tiles).into_values().flatten()
    }
}

// =============================================================================
// Job Queue
// =============================================================================

/// Waiting job counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobQueueStats {
    pub removing: usize,
    pub updating: usize,
    pub delayed: usize,
}

#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    removing: Vec<Box<Job>>,
    updating: SpatialJobQueue,
    delayed: VecDeque<Box<Job>>,
}

impl JobQueue {
    pub fn has_job(&self, now: Instant) -> bool {
        !self.removing.is_empty()
            || !self.updating.is_empty()
            || self.delayed.front().is_some_and(|job| job.process_time <= now)
    }

    /// Process time of the next delayed job.
    pub fn next_process_time(&self) -> Option<Instant> {
        self.delayed.front().map(|job| job.process_time)
    }

    pub fn push(&mut self, job: Box<Job>, now: Instant) {
        if job.process_time > now {
            self.delayed.push_back(job);
        } else if job.change_type == ChangeType::Remove {
            self.removing.push(job);
        } else {
            self.updating.push(job);
        }
    }

    pub fn pop(&mut self, player_tile: TilePosition, now: Instant) -> Option<Box<Job>> {
        if let Some(job) = self.removing.pop() {
            return Some(job);
        }
        if let Some(job) = self.updating.pop(player_tile) {
            return Some(job);
        }
        if self.delayed.front().is_some_and(|job| job.process_time <= now) {
            return self.delayed.pop_front();
        }
        None
    }

    /// Reorders the queue for a new player tile and releases due delayed jobs.
    pub fn update(&mut self, player_tile: TilePosition, max_tiles: i32, now: Instant) {
        self.updating.update(player_tile, max_tiles, &mut self.removing);
        while self.delayed.front().is_some_and(|job| job.process_time <= now) {
            let Some(mut job) = self.delayed.pop_front() else {
                break;
            };
            if should_add_tile(job.changed_tile, player_tile, max_tiles) {
                self.updating.push(job);
            } else {
                job.change_type = ChangeType::Remove;
                self.removing.push(job);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.removing.len() + self.updating.len() + self.delayed.len()
    }

    /// Takes every waiting job out of the queue.
    pub fn drain(&mut self) -> Vec<Box<Job>> {
        let mut jobs: Vec<Box<Job>> = self.removing.drain(..).collect();
        jobs.extend(self.updating.drain());
        jobs.extend(self.delayed.drain(..));
        jobs
    }

    pub fn stats(&self) -> JobQueueStats {
        JobQueueStats {
            removing: self.removing.len(),
            updating: self.updating.len(),
            delayed: self.delayed.len(),
        }
    }
}
