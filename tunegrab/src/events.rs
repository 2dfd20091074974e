//! Event surface between the orchestrators and any presentation layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

/// Callbacks emitted while a run is in flight. All methods default to
/// no-ops so a sink only implements what it cares about; none of them may
/// block for long; they run on the orchestration task.
pub trait EventSink: Send + Sync {
    fn on_log(&self, _msg: &str) {}
    fn on_row_start(&self, _row: usize, _x: u32, _y: u32) {}
    fn on_row_complete(&self, _row: usize, _folder: &str) {}
    fn on_row_duplicate(&self, _row: usize, _name: &str, _duration: &str) {}
    fn on_row_failed(&self, _row: usize) {}
    fn on_progress(&self, _current: usize, _total: usize) {}
    fn on_scroll(&self, _round: usize) {}
    fn on_icons_found(&self, _count: usize, _round: usize) {}
}

/// Sink that forwards every callback to `tracing`.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_log(&self, msg: &str) {
        info!("{msg}");
    }

    fn on_row_start(&self, row: usize, x: u32, y: u32) {
        info!(row, x, y, "row started");
    }

    fn on_row_complete(&self, row: usize, folder: &str) {
        info!(row, folder, "row complete");
    }

    fn on_row_duplicate(&self, row: usize, name: &str, duration: &str) {
        info!(row, name, duration, "row is a duplicate");
    }

    fn on_row_failed(&self, row: usize) {
        warn!(row, "row failed");
    }

    fn on_progress(&self, current: usize, total: usize) {
        info!(current, total, "progress");
    }

    fn on_scroll(&self, round: usize) {
        info!(round, "scrolling down for more rows");
    }

    fn on_icons_found(&self, count: usize, round: usize) {
        info!(count, round, "action icons found");
    }
}

/// Sink that swallows everything.
pub struct NullSink;

impl EventSink for NullSink {}

/// Cooperative stop flag, checked before every sleep and at row boundaries.
/// Cancellation is coarse-grained: a click already issued completes.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of one processed catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// All available formats landed in the named project folder.
    Ok(String),
    /// The matching project folder already had files; nothing re-downloaded.
    Duplicate(String),
    Failed,
}

/// Per-run counters, owned by the scan loop and reset for every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub duplicates: usize,
    pub failures: usize,
    pub processed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &RowOutcome) {
        self.processed += 1;
        match outcome {
            RowOutcome::Ok(_) => self.completed += 1,
            RowOutcome::Duplicate(_) => self.duplicates += 1,
            RowOutcome::Failed => self.failures += 1,
        }
    }
}
