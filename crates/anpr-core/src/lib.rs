pub mod config;
pub mod error;
pub mod progress;
pub mod retention;
pub mod service;
pub mod storage;

pub use config::{AppConfig, RetentionConfig};
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
pub use retention::scheduler::{RetentionScheduler, SkipReason, TriggerOutcome};
pub use retention::sweep::{SweepSummary, TriggerSource};
pub use service::ReportService;
pub use storage::models::{NewReport, Report, ReportFilter, ReportId, ReportUpdate};
pub use storage::{Database, ReportStore};
