use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::assets::AssetStore;
use super::sweep::{run_sweep, trigger_label, SweepSummary, TriggerSource};
use crate::config::RetentionConfig;
use crate::progress::{ProgressReporter, SilentReporter};
use crate::storage::ReportStore;

/// Monotonic time source for cooldown checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Used to drive cooldowns in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A write trigger arrived before the cooldown elapsed.
    Cooldown { remaining: Duration },
    /// Another sweep holds the guard.
    InFlight,
    /// Automatic retention is switched off in configuration.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Ran(SweepSummary),
    Skipped(SkipReason),
}

impl TriggerOutcome {
    pub fn summary(&self) -> Option<&SweepSummary> {
        match self {
            TriggerOutcome::Ran(summary) => Some(summary),
            TriggerOutcome::Skipped(_) => None,
        }
    }
}

/// Marks a sweep as running for as long as it lives.
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        RunningFlag(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct SweepState {
    last_sweep_at: Option<Instant>,
    last_summary: Option<SweepSummary>,
    sweeps_run: u64,
}

/// Decides when a sweep runs. One instance per process, shared by handle
/// between the timer loop and the ingestion path.
pub struct RetentionScheduler {
    store: Arc<dyn ReportStore>,
    assets: Arc<dyn AssetStore>,
    settings: RetentionConfig,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ProgressReporter>,
    /// Held for the whole sweep; automatic triggers only try-acquire it.
    run_lock: Mutex<()>,
    /// Set while `run_lock` is held; read by `is_running` without touching the lock.
    running: AtomicBool,
    state: Mutex<SweepState>,
}

impl RetentionScheduler {
    pub fn new(
        store: Arc<dyn ReportStore>,
        assets: Arc<dyn AssetStore>,
        settings: RetentionConfig,
    ) -> Self {
        Self {
            store,
            assets,
            settings,
            clock: Arc::new(SystemClock),
            reporter: Arc::new(SilentReporter),
            run_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            state: Mutex::new(SweepState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &RetentionConfig {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, SweepState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Monotonic reading taken when the last sweep started.
    pub fn last_sweep_at(&self) -> Option<Instant> {
        self.state().last_sweep_at
    }

    pub fn last_summary(&self) -> Option<SweepSummary> {
        self.state().last_summary.clone()
    }

    pub fn sweeps_run(&self) -> u64 {
        self.state().sweeps_run
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Periodic trigger. Ignores the cooldown but never overlaps a running sweep.
    pub fn on_timer(&self) -> TriggerOutcome {
        self.try_trigger(TriggerSource::Timer)
    }

    /// Post-insert trigger. Runs only if the cooldown has elapsed since the last sweep.
    pub fn on_report_inserted(&self) -> TriggerOutcome {
        self.try_trigger(TriggerSource::Write)
    }

    /// Operator-requested sweep. Waits for an in-flight sweep instead of
    /// dropping, ignores cooldown and the `enabled` switch.
    pub fn run_manual(&self, day: Option<NaiveDate>) -> SweepSummary {
        let _guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _running = RunningFlag::raise(&self.running);
        self.stamp();
        let day = day.unwrap_or_else(|| self.settings.today());
        self.execute(TriggerSource::Manual, day)
    }

    fn try_trigger(&self, source: TriggerSource) -> TriggerOutcome {
        if !self.settings.enabled {
            debug!("{} trigger ignored: retention disabled", trigger_label(source));
            return TriggerOutcome::Skipped(SkipReason::Disabled);
        }

        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!(
                    "{} trigger skipped: sweep already in flight",
                    trigger_label(source)
                );
                return TriggerOutcome::Skipped(SkipReason::InFlight);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        if source == TriggerSource::Write {
            if let Some(remaining) = self.cooldown_remaining() {
                debug!(
                    "Write trigger skipped: cooldown has {:.1}s left",
                    remaining.as_secs_f64()
                );
                return TriggerOutcome::Skipped(SkipReason::Cooldown { remaining });
            }
        }

        let _running = RunningFlag::raise(&self.running);
        self.stamp();
        let day = self.settings.today();
        TriggerOutcome::Ran(self.execute(source, day))
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        let last = self.state().last_sweep_at?;
        let elapsed = self.clock.now().saturating_duration_since(last);
        let cooldown = self.settings.cooldown();
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// Enter Running: record the start time before any store I/O.
    fn stamp(&self) {
        let now = self.clock.now();
        let mut state = self.state();
        state.last_sweep_at = Some(now);
        state.sweeps_run += 1;
    }

    fn execute(&self, source: TriggerSource, day: NaiveDate) -> SweepSummary {
        let start = Instant::now();
        let summary = match run_sweep(
            self.store.as_ref(),
            self.assets.as_ref(),
            &self.settings,
            day,
            source,
            self.reporter.as_ref(),
        ) {
            Ok(summary) => summary,
            Err(err) => {
                error!("{} sweep for {} failed: {}", trigger_label(source), day, err);
                let summary =
                    SweepSummary::failed(day, source, &err, start.elapsed().as_millis() as u64);
                self.reporter.on_sweep_complete(&summary);
                summary
            }
        };
        if summary.asset_failures > 0 {
            warn!("{}", summary.message);
        }
        self.state().last_summary = Some(summary.clone());
        summary
    }
}

/// Fire `on_timer` every `sweep_interval` until `cancel` is triggered.
/// The first sweep runs one interval after start.
pub async fn run_timer(scheduler: Arc<RetentionScheduler>, cancel: CancellationToken) {
    let period = scheduler.settings().sweep_interval();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Retention timer started ({}s interval)", period.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let scheduler = Arc::clone(&scheduler);
                match tokio::task::spawn_blocking(move || scheduler.on_timer()).await {
                    Ok(TriggerOutcome::Ran(summary)) => {
                        debug!("Timer sweep finished: {}", summary.message);
                    }
                    Ok(TriggerOutcome::Skipped(reason)) => {
                        debug!("Timer sweep skipped: {:?}", reason);
                    }
                    Err(err) => error!("Timer sweep task failed: {}", err),
                }
            }
            _ = cancel.cancelled() => {
                info!("Retention timer shutting down");
                break;
            }
        }
    }
}
