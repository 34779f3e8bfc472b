use ahash::AHashSet;
use chrono::NaiveDate;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::assets::{reclaim, AssetStore, ReclaimOutcome};
use super::selector::select_duplicates;
use crate::config::RetentionConfig;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::storage::ReportStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Timer,
    Write,
    Manual,
}

/// Outcome of one sweep, returned for every trigger source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub day: NaiveDate,
    pub trigger: TriggerSource,
    pub removed_duplicates: usize,
    pub remaining_entries: usize,
    pub assets_removed: usize,
    pub assets_missing: usize,
    pub asset_failures: usize,
    pub succeeded: bool,
    pub message: String,
    pub duration_ms: u64,
}

impl SweepSummary {
    pub fn failed(day: NaiveDate, trigger: TriggerSource, error: &Error, duration_ms: u64) -> Self {
        Self {
            day,
            trigger,
            removed_duplicates: 0,
            remaining_entries: 0,
            assets_removed: 0,
            assets_missing: 0,
            asset_failures: 0,
            succeeded: false,
            message: format!("Sweep aborted: {}", error),
            duration_ms,
        }
    }
}

/// Run one duplicate sweep over `day`.
///
/// Rows are deleted first; images of the confirmed deletions are reclaimed
/// afterwards on a best-effort basis. Store failures abort the sweep and are
/// returned, asset failures only show up in the summary.
pub fn run_sweep(
    store: &dyn ReportStore,
    assets: &dyn AssetStore,
    settings: &RetentionConfig,
    day: NaiveDate,
    trigger: TriggerSource,
    reporter: &dyn ProgressReporter,
) -> Result<SweepSummary, Error> {
    let start = Instant::now();

    let reports = store.fetch_reports_for_day(day, settings.day_offset())?;
    let fetched = reports.len();
    reporter.on_sweep_start(day, fetched);

    let selection = select_duplicates(reports, settings.bucket_width());
    reporter.on_duplicates_selected(selection.survivors.len(), selection.duplicates.len());
    debug!(
        "{}: {} reports in {} groups, {} duplicates",
        day,
        fetched,
        selection.survivors.len(),
        selection.duplicates.len()
    );

    if selection.is_clean() {
        let summary = SweepSummary {
            day,
            trigger,
            removed_duplicates: 0,
            remaining_entries: fetched,
            assets_removed: 0,
            assets_missing: 0,
            asset_failures: 0,
            succeeded: true,
            message: "No duplicate reports found".to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        reporter.on_sweep_complete(&summary);
        return Ok(summary);
    }

    // Phase 1: rows
    let requested = selection.duplicate_ids();
    let deleted: AHashSet<i64> = store
        .delete_reports_by_ids(&requested)?
        .into_iter()
        .collect();
    reporter.on_rows_deleted(deleted.len(), requested.len());
    if deleted.len() < requested.len() {
        warn!(
            "{}: only {} of {} duplicate rows were deleted",
            day,
            deleted.len(),
            requested.len()
        );
    }

    // Phase 2: images of rows that are confirmed gone
    let mut assets_outcome = ReclaimOutcome::default();
    let confirmed: Vec<_> = selection
        .duplicates
        .iter()
        .filter(|report| deleted.contains(&report.id))
        .collect();
    for (index, report) in confirmed.iter().enumerate() {
        assets_outcome.merge(reclaim(report, assets));
        reporter.on_reclaim_progress(index + 1, confirmed.len());
    }

    let mut message = format!(
        "Removed {} duplicate report(s), {} remaining",
        deleted.len(),
        fetched - deleted.len()
    );
    if deleted.len() < requested.len() {
        message.push_str(&format!(
            "; {} duplicate(s) were already gone",
            requested.len() - deleted.len()
        ));
    }
    if !assets_outcome.missing.is_empty() {
        message.push_str(&format!(
            "; {} image(s) already missing",
            assets_outcome.missing.len()
        ));
    }
    if let Some(first) = assets_outcome.failures.first() {
        message.push_str(&format!(
            "; {} image cleanup failure(s), first: {}",
            assets_outcome.failures.len(),
            first
        ));
    }

    let summary = SweepSummary {
        day,
        trigger,
        removed_duplicates: deleted.len(),
        remaining_entries: fetched - deleted.len(),
        assets_removed: assets_outcome.removed.len(),
        assets_missing: assets_outcome.missing.len(),
        asset_failures: assets_outcome.failures.len(),
        succeeded: true,
        message,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!("{} sweep for {}: {}", trigger_label(trigger), day, summary.message);
    reporter.on_sweep_complete(&summary);
    Ok(summary)
}

pub fn trigger_label(trigger: TriggerSource) -> &'static str {
    match trigger {
        TriggerSource::Timer => "Timer",
        TriggerSource::Write => "Write-triggered",
        TriggerSource::Manual => "Manual",
    }
}
