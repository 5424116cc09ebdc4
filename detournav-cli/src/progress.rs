//! Terminal progress bar for navmesh generation.

use std::time::Duration;

use detournav::Listener;
use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};

const TEMPLATE: &str = "{prefix:>14} {msg:24} [{elapsed_precise}] {wide_bar} {pos:>7}/{len:7}";

/// [`Listener`] drawing an indicatif progress bar.
pub struct ProgressBarListener {
    bar: ProgressBar,
}

impl ProgressBarListener {
    pub fn new(prefix: impl Into<String>) -> Self {
        let style = ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = ProgressBar::new(0)
            .with_style(style)
            .with_prefix(prefix.into())
            .with_finish(ProgressFinish::AndLeave);
        bar.enable_steady_tick(Duration::from_millis(250));
        Self { bar }
    }

    /// Hidden bar, for non-interactive runs.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.bar.set_prefix(prefix.into());
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }
}

impl Listener for ProgressBarListener {
    fn set_label(&mut self, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn set_progress_range(&mut self, range: usize) {
        self.bar.set_length(range as u64);
    }

    fn increase_progress(&mut self, increment: usize) {
        self.bar.inc(increment as u64);
    }

    fn set_progress(&mut self, value: usize) {
        self.bar.set_position(value as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_drives_bar() {
        let mut listener = ProgressBarListener::hidden();
        listener.set_label("Building");
        listener.set_progress_range(10);
        listener.increase_progress(3);
        listener.increase_progress(2);
        assert_eq!(listener.position(), 5);
        assert_eq!(listener.length(), Some(10));

        listener.set_progress_range(20);
        listener.set_progress(15);
        assert_eq!(listener.position(), 15);
        assert_eq!(listener.length(), Some(20));
    }
}
