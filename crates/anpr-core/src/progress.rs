use crate::retention::sweep::SweepSummary;
use chrono::NaiveDate;

/// Trait for reporting sweep progress.
///
/// CLI implements with indicatif/colored output, the scheduler defaults to silence.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_sweep_start(&self, _day: NaiveDate, _reports: usize) {}
    fn on_duplicates_selected(&self, _groups: usize, _duplicates: usize) {}
    fn on_rows_deleted(&self, _deleted: usize, _requested: usize) {}
    fn on_reclaim_progress(&self, _reclaimed: usize, _total: usize) {}
    fn on_sweep_complete(&self, _summary: &SweepSummary) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
