//! Integration tests for RefreshScheduler and refresh passes
//!
//! These tests drive the scheduler against an in-memory control API that
//! records every call, on tokio's paused clock:
//! - Immediate pass on start, then one pass per interval
//! - No pass once stop() has returned
//! - Argument validation leaves the scheduler idle
//! - One failing source never stops the others
//!
//! The tests at the end use real time on a multi-thread runtime with a slow
//! control API, to check that passes never overlap.

use obs_refresh::obs::{ControlApi, ControlError, InputSettings};
use obs_refresh::services::{
    PassReport, RefreshScheduler, SchedulerContext, SchedulerError, SchedulerState,
    SourceUpdater, StartOutcome, refresh_pass,
};
use obs_refresh::{MappingStore, Selection};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

/// Control API double that records `set_input_settings` calls
#[derive(Default)]
struct RecordingApi {
    writes: Mutex<Vec<(String, String, Instant)>>,
    failing: HashSet<String>,
}

impl RecordingApi {
    fn failing_on(sources: &[&str]) -> Self {
        Self {
            failing: sources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn writes(&self) -> Vec<(String, String)> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(source, path, _)| (source.clone(), path.clone()))
            .collect()
    }

    fn write_times(&self) -> Vec<Instant> {
        self.writes.lock().unwrap().iter().map(|(_, _, at)| *at).collect()
    }
}

impl ControlApi for RecordingApi {
    fn connect(&self) -> Result<(), ControlError> {
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ControlError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn get_input_settings(&self, input_name: &str) -> Result<InputSettings, ControlError> {
        if self.failing.contains(input_name) {
            return Err(ControlError::Request {
                request_type: "GetInputSettings".to_string(),
                code: 600,
                comment: format!("No source was found by the name of `{}`.", input_name),
            });
        }

        let mut settings = InputSettings::new();
        settings.insert("file".to_string(), json!("/old.png"));
        settings.insert("unload".to_string(), json!(true));
        Ok(settings)
    }

    fn set_input_settings(
        &self,
        input_name: &str,
        settings: InputSettings,
        overlay: bool,
    ) -> Result<(), ControlError> {
        assert!(!overlay, "settings must be replaced, not overlaid");
        assert_eq!(settings.get("unload"), Some(&json!(true)));

        let path = settings
            .get("file")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.writes
            .lock()
            .unwrap()
            .push((input_name.to_string(), path, Instant::now()));
        Ok(())
    }
}

fn scene_store() -> MappingStore {
    [
        ("Scene1", vec![("imgA", "/p/new1.png"), ("imgB", "")]),
        ("Scene2", vec![("imgC", "/p/c.png")]),
    ]
    .into_iter()
    .collect()
}

fn scheduler_with(api: Arc<RecordingApi>, store: MappingStore) -> RefreshScheduler {
    let api: Arc<dyn ControlApi> = api;
    let context = SchedulerContext::new(SourceUpdater::new(api), Arc::new(store), Handle::current());
    RefreshScheduler::new(context)
}

fn selection(groups: &[&str]) -> Arc<Selection> {
    Arc::new(groups.iter().copied().collect())
}

#[tokio::test(start_paused = true)]
async fn test_single_group_scenario_updates_only_non_empty_paths() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = scheduler_with(Arc::clone(&api), scene_store());

    let outcome = assert_ok!(scheduler.start(60, selection(&["Scene1"])));
    let StartOutcome::Started(report) = outcome else {
        panic!("expected the scheduler to start");
    };

    assert_eq!(api.writes(), vec![("imgA".to_string(), "/p/new1.png".to_string())]);
    assert_eq!(report.applied(), 1);
    assert_eq!(report.skipped, vec!["imgB".to_string()]);

    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_empty_selection_is_rejected() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = scheduler_with(Arc::clone(&api), scene_store());

    let err = assert_err!(scheduler.start(1, selection(&[])));
    assert!(matches!(err, SchedulerError::InvalidArgument(_)));
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(api.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_is_rejected() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = scheduler_with(Arc::clone(&api), scene_store());

    assert_err!(scheduler.start(0, selection(&["Scene1"])));
    assert!(!scheduler.is_running());
    assert!(api.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_passes_repeat_at_interval_until_stopped() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = scheduler_with(Arc::clone(&api), scene_store());
    let started_at = Instant::now();

    assert_ok!(scheduler.start(2, selection(&["Scene2"])));
    assert_eq!(
        scheduler.state(),
        SchedulerState::Running {
            interval: Duration::from_secs(2)
        }
    );
    assert_eq!(api.writes().len(), 1);

    tokio::time::sleep(Duration::from_millis(6500)).await;

    let times = api.write_times();
    assert_eq!(times.len(), 4, "immediate pass plus one at 2s, 4s and 6s");
    assert_eq!(times[0], started_at);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(2));
    }

    assert!(scheduler.stop());
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.writes().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_idle_is_harmless() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = scheduler_with(api, scene_store());

    assert!(!scheduler.stop());
    assert!(!scheduler.stop());
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_changes_nothing() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = scheduler_with(Arc::clone(&api), scene_store());

    assert_ok!(scheduler.start(2, selection(&["Scene2"])));
    let outcome = assert_ok!(scheduler.start(5, selection(&["Scene1", "Scene2"])));

    assert!(matches!(outcome, StartOutcome::AlreadyRunning));
    assert_eq!(api.writes().len(), 1);
    assert_eq!(
        scheduler.state(),
        SchedulerState::Running {
            interval: Duration::from_secs(2)
        }
    );

    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_selection_is_read_on_every_tick() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = scheduler_with(Arc::clone(&api), scene_store());
    let state = obs_refresh::StateManager::new();
    state.set_group_selected("Scene2", true);

    assert_ok!(scheduler.start(1, Arc::new(state.clone())));
    state.set_group_selected("Scene1", true);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    scheduler.stop();

    let sources: Vec<String> = api.writes().into_iter().map(|(s, _)| s).collect();
    assert_eq!(sources, vec!["imgC", "imgC", "imgA"]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_source_does_not_stop_the_pass_or_the_timer() {
    let api = Arc::new(RecordingApi::failing_on(&["imgA"]));
    let scheduler = scheduler_with(Arc::clone(&api), scene_store());

    let outcome = assert_ok!(scheduler.start(1, selection(&["Scene1", "Scene2"])));
    let StartOutcome::Started(report) = outcome else {
        panic!("expected the scheduler to start");
    };
    assert_eq!(report.failed(), 1);
    assert_eq!(report.applied(), 1);
    assert_eq!(report.failures().collect::<Vec<_>>(), vec!["imgA"]);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop();

    // imgC is written by all three passes even though imgA fails each time
    assert_eq!(
        api.writes(),
        vec![("imgC".to_string(), "/p/c.png".to_string()); 3]
    );
    assert_eq!(scheduler.metrics().passes(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_pass_listener_sees_every_pass() {
    let api: Arc<dyn ControlApi> = Arc::new(RecordingApi::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);

    let context = SchedulerContext::new(
        SourceUpdater::new(api),
        Arc::new(scene_store()),
        Handle::current(),
    )
    .with_pass_listener(Arc::new(move |report: &PassReport| {
        seen_clone.lock().unwrap().push(report.applied());
    }));
    let scheduler = RefreshScheduler::new(context);

    assert_ok!(scheduler.start(1, selection(&["Scene1", "Scene2"])));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    scheduler.stop();

    assert_eq!(*seen.lock().unwrap(), vec![2, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_timer() {
    let api = Arc::new(RecordingApi::default());
    let scheduler = scheduler_with(Arc::clone(&api), scene_store());

    assert_ok!(scheduler.start(1, selection(&["Scene2"])));
    assert_ok!(scheduler.shutdown());
    assert!(!scheduler.is_running());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(api.writes().len(), 1);
}

/// Control API double whose reads take `delay` of wall-clock time.
/// Tracks how many reads overlap.
struct SlowApi {
    delay: std::time::Duration,
    started: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    writes: Mutex<Vec<std::time::Instant>>,
}

impl SlowApi {
    fn new(delay_ms: u64) -> Self {
        Self {
            delay: std::time::Duration::from_millis(delay_ms),
            started: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        }
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn writes(&self) -> Vec<std::time::Instant> {
        self.writes.lock().unwrap().clone()
    }

    /// Block until at least `count` reads have begun
    fn wait_for_started(&self, count: usize) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while self.started() < count {
            assert!(std::time::Instant::now() < deadline, "no pass started");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }
}

impl ControlApi for SlowApi {
    fn connect(&self) -> Result<(), ControlError> {
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ControlError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn get_input_settings(&self, _input_name: &str) -> Result<InputSettings, ControlError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(InputSettings::new())
    }

    fn set_input_settings(
        &self,
        _input_name: &str,
        _settings: InputSettings,
        _overlay: bool,
    ) -> Result<(), ControlError> {
        self.writes.lock().unwrap().push(std::time::Instant::now());
        Ok(())
    }
}

fn multi_thread_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn slow_scheduler(api: Arc<SlowApi>, runtime: &tokio::runtime::Runtime) -> RefreshScheduler {
    let api: Arc<dyn ControlApi> = api;
    let context = SchedulerContext::new(
        SourceUpdater::new(api),
        Arc::new(scene_store()),
        runtime.handle().clone(),
    );
    RefreshScheduler::new(context)
}

#[test]
fn test_stop_waits_for_in_flight_pass() {
    let runtime = multi_thread_runtime();
    let api = Arc::new(SlowApi::new(300));
    let scheduler = slow_scheduler(Arc::clone(&api), &runtime);

    assert_ok!(scheduler.start(1, selection(&["Scene2"])));
    assert_eq!(api.writes().len(), 1);

    // First ticked pass is reading
    api.wait_for_started(2);
    let stop_called = std::time::Instant::now();
    assert!(scheduler.stop());

    assert!(stop_called.elapsed() >= std::time::Duration::from_millis(100));
    assert_eq!(api.writes().len(), 2, "the in-flight pass completed");

    std::thread::sleep(std::time::Duration::from_millis(2500));
    assert_eq!(api.started(), 2);
    assert_eq!(api.writes().len(), 2);
}

#[test]
fn test_restart_during_stop_never_overlaps_passes() {
    let runtime = multi_thread_runtime();
    let api = Arc::new(SlowApi::new(400));
    let scheduler = Arc::new(slow_scheduler(Arc::clone(&api), &runtime));

    assert_ok!(scheduler.start(1, selection(&["Scene2"])));
    api.wait_for_started(2);

    let stopper = {
        let scheduler = Arc::clone(&scheduler);
        std::thread::spawn(move || scheduler.stop())
    };
    std::thread::sleep(std::time::Duration::from_millis(50));
    let outcome = assert_ok!(scheduler.start(1, selection(&["Scene2"])));

    assert!(stopper.join().unwrap());
    assert!(matches!(outcome, StartOutcome::Started(_)));
    assert_eq!(api.max_active(), 1);

    scheduler.stop();
}

#[test]
fn test_pass_slower_than_interval_delays_next_tick() {
    let runtime = multi_thread_runtime();
    let api = Arc::new(SlowApi::new(1200));
    let scheduler = slow_scheduler(Arc::clone(&api), &runtime);

    assert_ok!(scheduler.start(1, selection(&["Scene2"])));
    api.wait_for_started(3);
    scheduler.stop();

    let writes = api.writes();
    assert_eq!(api.max_active(), 1);
    assert!(writes.len() >= 2);
    // Each tick waits a full interval after the previous pass finished
    for pair in writes.windows(2) {
        assert!(pair[1] - pair[0] >= std::time::Duration::from_millis(2200));
    }
}

fn arbitrary_store() -> impl Strategy<Value = MappingStore> {
    prop::collection::vec(
        (
            "[A-Z][a-z]{0,5}",
            prop::collection::vec(("[a-z]{1,6}", prop_oneof![Just(String::new()), "/[a-z]{1,8}\\.png"]), 0..5),
        ),
        1..5,
    )
    .prop_map(|groups| groups.into_iter().collect::<MappingStore>())
}

proptest! {
    #[test]
    fn prop_pass_updates_each_non_empty_pair_once(store in arbitrary_store(), pick in any::<prop::sample::Index>()) {
        let names: Vec<String> = store.group_names().map(str::to_string).collect();
        let chosen = &names[..=pick.index(names.len())];
        let selection: Selection = chosen.iter().cloned().collect();

        let api = Arc::new(RecordingApi::default());
        let dyn_api: Arc<dyn ControlApi> = api.clone();
        let report = refresh_pass(&selection, &store, &SourceUpdater::new(dyn_api));

        let pairs: Vec<(String, String)> = chosen
            .iter()
            .flat_map(|group| store.group(group).into_iter().flatten())
            .map(|(source, path)| (source.clone(), path.clone()))
            .collect();
        let expected: Vec<(String, String)> =
            pairs.iter().filter(|(_, path)| !path.is_empty()).cloned().collect();

        prop_assert_eq!(api.writes(), expected);
        prop_assert_eq!(report.failed(), 0);
        prop_assert_eq!(report.skipped.len(), pairs.len() - report.applied());
    }
}
