use anpr_core::{ProgressReporter, SweepSummary};
use chrono::NaiveDate;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, PoisonError};

/// CLI progress reporter for manual sweeps.
///
/// - Selection: one status line
/// - Image reclaim: progress bar (total known after row deletion)
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_sweep_start(&self, day: NaiveDate, reports: usize) {
        eprintln!("  Sweeping {} ({} reports)", day.to_string().cyan(), reports);
    }

    fn on_duplicates_selected(&self, groups: usize, duplicates: usize) {
        eprintln!(
            "  {} detection groups, {} duplicates",
            groups,
            format!("{}", duplicates).red()
        );
    }

    fn on_rows_deleted(&self, deleted: usize, _requested: usize) {
        let pb = ProgressBar::new(deleted as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "  {bar:30.cyan/blue} {pos}/{len} duplicate images reclaimed",
        ) {
            pb.set_style(style);
        }
        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = guard.replace(pb) {
            old.finish_and_clear();
        }
    }

    fn on_reclaim_progress(&self, reclaimed: usize, _total: usize) {
        let guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = guard.as_ref() {
            pb.set_position(reclaimed as u64);
        }
    }

    fn on_sweep_complete(&self, summary: &SweepSummary) {
        self.finish_bar();
        let mark = if summary.succeeded && summary.asset_failures == 0 {
            "✓".green()
        } else if summary.succeeded {
            "!".yellow()
        } else {
            "✗".red()
        };
        eprintln!(
            "  {} Sweep complete in {}ms: {}",
            mark, summary.duration_ms, summary.message
        );
    }
}
