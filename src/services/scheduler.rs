use crate::metrics::Metrics;
use crate::models::{MappingStore, Selection};
use crate::obs::ControlError;
use crate::services::periodic::PeriodicTask;
use crate::services::updater::{SourceUpdater, UpdateOutcome};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;

/// Supplies the groups to refresh, read once per pass
pub trait SelectionProvider: Send + Sync {
    fn selection(&self) -> Selection;
}

impl SelectionProvider for Selection {
    fn selection(&self) -> Selection {
        self.clone()
    }
}

/// Scheduler state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running { interval: Duration },
}

impl SchedulerState {
    pub fn is_running(&self) -> bool {
        matches!(self, SchedulerState::Running { .. })
    }
}

/// Errors returned by scheduler commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// What [`RefreshScheduler::start`] did
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// Ran the immediate pass and armed the timer
    Started(PassReport),

    /// The scheduler was already running; nothing changed
    AlreadyRunning,
}

/// Outcome of one source within a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub group: String,
    pub source: String,
    pub outcome: UpdateOutcome,
}

/// Everything a single pass did
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// One entry per attempted update, in pass order
    pub outcomes: Vec<SourceOutcome>,

    /// Sources left alone because their path is empty
    pub skipped: Vec<String>,

    /// Selected groups that are not in the mapping store
    pub missing_groups: Vec<String>,

    pub duration: Duration,
}

impl PassReport {
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.applied()
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// Names of the sources whose update failed
    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| !o.outcome.is_applied())
            .map(|o| o.source.as_str())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} applied, {} failed, {} skipped",
            self.applied(),
            self.failed(),
            self.skipped.len()
        )
    }
}

/// Apply the selected groups of `mapping` through `updater`.
///
/// Every (source, path) pair of every selected group is attempted once,
/// except pairs with an empty path. A failing update is logged and recorded;
/// it never stops the pass.
pub fn refresh_pass(
    selection: &Selection,
    mapping: &MappingStore,
    updater: &SourceUpdater,
) -> PassReport {
    let started = Instant::now();
    let mut report = PassReport::default();

    for group in selection.iter() {
        let Some(sources) = mapping.group(group) else {
            tracing::warn!("Selected group '{}' is not in the mapping store", group);
            report.missing_groups.push(group.to_string());
            continue;
        };

        for (source, path) in sources {
            if path.is_empty() {
                tracing::debug!("Skipping '{}' in '{}': empty path", source, group);
                report.skipped.push(source.clone());
                continue;
            }

            report.outcomes.push(SourceOutcome {
                group: group.to_string(),
                source: source.clone(),
                outcome: updater.apply(source, path),
            });
        }
    }

    report.duration = started.elapsed();
    tracing::info!(
        "Refresh pass over {} group(s): {} ({:?})",
        selection.len(),
        report.summary(),
        report.duration
    );

    report
}

/// Parse the interval field of the UI.
///
/// Accepts a positive whole number of seconds, surrounding whitespace allowed.
pub fn parse_interval(text: &str) -> Result<u64, SchedulerError> {
    match text.trim().parse::<u64>() {
        Ok(0) => Err(SchedulerError::InvalidArgument(
            "Refresh interval must be at least 1 second".to_string(),
        )),
        Ok(secs) => Ok(secs),
        Err(_) => Err(SchedulerError::InvalidArgument(format!(
            "Refresh interval must be a whole number of seconds, got '{}'",
            text.trim()
        ))),
    }
}

/// Callback receiving the report of every completed pass
pub type PassListener = Arc<dyn Fn(&PassReport) + Send + Sync>;

/// Runs passes and publishes their reports; cloned into the periodic task
#[derive(Clone)]
struct PassRunner {
    updater: SourceUpdater,
    mapping: Arc<MappingStore>,
    listener: Option<PassListener>,
    metrics: Arc<Metrics>,
}

impl PassRunner {
    fn run(&self, selection: &Selection) -> PassReport {
        let report = refresh_pass(selection, &self.mapping, &self.updater);

        self.metrics.record_pass(&report);
        if let Some(listener) = &self.listener {
            listener(&report);
        }

        report
    }
}

/// Process-wide handles owned by the scheduler: the control connection
/// (through the updater), the mapping store, the runtime the timer lives on,
/// and the active timer while running.
pub struct SchedulerContext {
    runner: PassRunner,
    runtime: Handle,
    timer: Option<PeriodicTask>,
}

impl SchedulerContext {
    pub fn new(updater: SourceUpdater, mapping: Arc<MappingStore>, runtime: Handle) -> Self {
        Self {
            runner: PassRunner {
                updater,
                mapping,
                listener: None,
                metrics: Arc::new(Metrics::new()),
            },
            runtime,
            timer: None,
        }
    }

    /// Publish every pass report to `listener`
    pub fn with_pass_listener(mut self, listener: PassListener) -> Self {
        self.runner.listener = Some(listener);
        self
    }

    /// Record passes into a shared metrics instance
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.runner.metrics = metrics;
        self
    }
}

/// The auto-refresh state machine
///
/// `Idle` → [`start`](Self::start) → `Running` → [`stop`](Self::stop) → `Idle`.
///
/// While running, a [`PeriodicTask`] performs one pass per interval. The task
/// reads the selection afresh on every tick, so toggling groups takes effect
/// on the next pass without restarting.
///
/// All commands take `&self`; the scheduler is shared as an `Arc` between the
/// UI callbacks and the shutdown path.
pub struct RefreshScheduler {
    context: Mutex<SchedulerContext>,
}

impl RefreshScheduler {
    pub fn new(context: SchedulerContext) -> Self {
        Self {
            context: Mutex::new(context),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SchedulerState {
        match &self.lock().timer {
            Some(timer) => SchedulerState::Running {
                interval: timer.interval(),
            },
            None => SchedulerState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn mapping(&self) -> Arc<MappingStore> {
        Arc::clone(&self.lock().runner.mapping)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.lock().runner.metrics)
    }

    /// Start auto-refreshing every `interval_secs` seconds.
    ///
    /// Runs one pass immediately, then arms the timer. Starting while already
    /// running is a no-op.
    ///
    /// Blocks for the whole immediate pass, which makes one round trip per
    /// source. The context stays locked meanwhile, so `state()`, `stop()` and
    /// friends wait for it too; call this off the UI thread.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidArgument`] if `interval_secs` is zero or the
    /// selection is empty. The scheduler stays idle and no update is made.
    pub fn start(
        &self,
        interval_secs: u64,
        selection: Arc<dyn SelectionProvider>,
    ) -> Result<StartOutcome, SchedulerError> {
        let mut context = self.lock();

        if context.timer.is_some() {
            tracing::warn!("Start requested while already running - ignoring");
            return Ok(StartOutcome::AlreadyRunning);
        }

        if interval_secs == 0 {
            return Err(SchedulerError::InvalidArgument(
                "Refresh interval must be at least 1 second".to_string(),
            ));
        }

        let snapshot = selection.selection();
        if snapshot.is_empty() {
            return Err(SchedulerError::InvalidArgument(
                "Select at least one group".to_string(),
            ));
        }

        // Held across the pass: a second start() must see either Idle before
        // this one began or Running after it
        let report = context.runner.run(&snapshot);

        let interval = Duration::from_secs(interval_secs);
        let runner = context.runner.clone();
        let timer = PeriodicTask::spawn(&context.runtime, interval, move || {
            runner.run(&selection.selection());
        });
        context.timer = Some(timer);

        tracing::info!("Auto-refresh started (interval: {}s)", interval_secs);
        Ok(StartOutcome::Started(report))
    }

    /// Stop auto-refreshing.
    ///
    /// Waits for a pass already in flight; no pass starts after this returns.
    /// Returns whether the scheduler was running. Calling it while idle does
    /// nothing.
    pub fn stop(&self) -> bool {
        // The context stays locked until the in-flight tick is done, so a
        // concurrent start() cannot begin its immediate pass alongside it.
        // Ticks run on a cloned runner and never take this lock.
        let mut context = self.lock();

        match context.timer.take() {
            Some(timer) => {
                timer.cancel();
                tracing::info!("Auto-refresh stopped");
                true
            }
            None => false,
        }
    }

    /// Run a single pass without touching the timer
    pub fn refresh_now(&self, selection: &Selection) -> PassReport {
        let runner = self.lock().runner.clone();
        runner.run(selection)
    }

    /// Open (or re-open) the control connection
    pub fn connect(&self) -> Result<(), ControlError> {
        let api = Arc::clone(self.lock().runner.updater.api());
        api.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().runner.updater.api().is_connected()
    }

    /// Stop the timer, then close the control connection.
    pub fn shutdown(&self) -> Result<(), ControlError> {
        self.stop();
        let api = Arc::clone(self.lock().runner.updater.api());
        api.disconnect()
    }
}
