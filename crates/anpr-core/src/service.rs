use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;
use crate::error::{Error, Result};
use crate::retention::assets::{reclaim, reclaim_reference, AssetStore, ReclaimOutcome};
use crate::retention::scheduler::{RetentionScheduler, SkipReason, TriggerOutcome};
use crate::storage::models::{NewReport, Report, ReportFilter, ReportId, ReportUpdate};
use crate::storage::Database;

/// Ingestion entry point and report administration.
pub struct ReportService {
    db: Arc<Database>,
    assets: Arc<dyn AssetStore>,
    settings: RetentionConfig,
    scheduler: Option<Arc<RetentionScheduler>>,
}

impl ReportService {
    pub fn new(db: Arc<Database>, assets: Arc<dyn AssetStore>, settings: RetentionConfig) -> Self {
        Self {
            db,
            assets,
            settings,
            scheduler: None,
        }
    }

    /// Notify `scheduler` after every successful ingestion.
    pub fn with_scheduler(mut self, scheduler: Arc<RetentionScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn scheduler(&self) -> Option<&Arc<RetentionScheduler>> {
        self.scheduler.as_ref()
    }

    /// Validate and persist a report, then fire the write trigger.
    pub fn ingest(&self, report: NewReport) -> Result<Report> {
        let now = Utc::now();
        let prepared = report.prepared(now)?;
        let stored = self.db.insert_report(&prepared, now)?;
        info!(
            "Report {} added: {} from {}",
            stored.id, stored.number_plate, stored.device_name
        );

        if let Some(scheduler) = &self.scheduler {
            match scheduler.on_report_inserted() {
                TriggerOutcome::Ran(summary) => {
                    debug!("Write-triggered sweep: {}", summary.message)
                }
                TriggerOutcome::Skipped(SkipReason::Cooldown { remaining }) => debug!(
                    "Write-triggered sweep skipped, next allowed in {}s",
                    remaining.as_secs()
                ),
                TriggerOutcome::Skipped(reason) => {
                    debug!("Write-triggered sweep skipped: {:?}", reason)
                }
            }
        }
        Ok(stored)
    }

    pub fn list(&self, filter: &ReportFilter) -> Result<(Vec<Report>, i64)> {
        self.db.list_reports(filter, self.settings.day_offset())
    }

    pub fn get(&self, id: ReportId) -> Result<Report> {
        self.db.get_report(id)?.ok_or(Error::NotFound(id))
    }

    /// Partial update. Images that were replaced are reclaimed afterwards.
    pub fn update(&self, id: ReportId, update: &ReportUpdate) -> Result<Report> {
        if update.is_empty() {
            return Err(Error::Validation("Nothing to update".to_string()));
        }
        let (previous, updated) = self
            .db
            .update_report(id, update, Utc::now())?
            .ok_or(Error::NotFound(id))?;

        let mut outcome = ReclaimOutcome::default();
        for old in previous.image_refs() {
            if !updated.image_refs().contains(&old) {
                reclaim_reference(id, old, self.assets.as_ref(), &mut outcome);
            }
        }
        log_cleanup(id, &outcome);
        info!("Report {} updated", id);
        Ok(updated)
    }

    /// Remove a report row, then its images.
    pub fn delete(&self, id: ReportId) -> Result<Report> {
        let removed = self.db.delete_report(id)?.ok_or(Error::NotFound(id))?;
        let outcome = reclaim(&removed, self.assets.as_ref());
        log_cleanup(id, &outcome);
        info!("Report {} deleted", id);
        Ok(removed)
    }
}

fn log_cleanup(id: ReportId, outcome: &ReclaimOutcome) {
    if !outcome.failures.is_empty() {
        warn!(
            "Report {}: {} image(s) could not be reclaimed",
            id,
            outcome.failures.len()
        );
    }
}
