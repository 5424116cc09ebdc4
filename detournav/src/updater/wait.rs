//! Barrier conditions and progress reporting for [`super::AsyncNavMeshUpdater::wait`].

/// What a caller of `wait` blocks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitConditionType {
    /// Every tile near the player that is pending or being built has been
    /// committed or turned out empty.
    RequiredTilesPresent,
    /// No job is left at all, database writes included.
    AllJobsDone,
}

/// Progress sink for a blocking wait.
///
/// All methods default to no-ops.
pub trait Listener {
    fn set_label(&mut self, _label: &str) {}

    fn set_progress_range(&mut self, _range: usize) {}

    fn increase_progress(&mut self, _increment: usize) {}

    fn set_progress(&mut self, _value: usize) {}
}

/// Listener ignoring all progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl Listener for NoopListener {}

/// Turns a shrinking number of remaining jobs into listener calls.
///
/// When more jobs arrive than were initially known the range grows and the
/// progress is reset against it.
#[derive(Debug)]
pub(crate) struct ProgressReporter {
    max_progress: usize,
    prev_jobs_left: usize,
}

impl ProgressReporter {
    pub fn start(listener: &mut dyn Listener, label: &str, initial_jobs: usize) -> Self {
        listener.set_label(label);
        listener.set_progress_range(initial_jobs);
        Self {
            max_progress: initial_jobs,
            prev_jobs_left: initial_jobs,
        }
    }

    pub fn report(&mut self, listener: &mut dyn Listener, jobs_left: usize) {
        if self.max_progress < jobs_left {
            self.max_progress = jobs_left;
            listener.set_progress_range(self.max_progress);
            listener.set_progress(self.max_progress - jobs_left);
        } else if jobs_left < self.prev_jobs_left {
            listener.increase_progress(self.prev_jobs_left - jobs_left);
        }
        self.prev_jobs_left = jobs_left;
    }
}
