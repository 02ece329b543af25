// GUI Controller - Bridges Slint UI with Rust State Management
//
// This module contains the GuiController which coordinates between:
// - Slint UI (MainWindow)
// - StateManager (groups, selection, pass results)
// - RefreshScheduler (auto-refresh lifecycle)
// - EventLoopBridge (async/GUI coordination)

use crate::metrics::Metrics;
use crate::models::AppConfig;
use crate::services::{RefreshScheduler, SchedulerError, SelectionProvider, StartOutcome, parse_interval};
use crate::state::{StateChange, StateManager};
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use anyhow::{Context, Result};
use slint::{ModelRc, SharedString, VecModel};
use std::sync::Arc;

// Include the generated Slint code
slint::include_modules!();

/// GUI Controller that wires up the Slint UI with application state and the scheduler
///
/// # Example
/// ```ignore
/// let controller = GuiController::new(
///     state_manager,
///     scheduler,
///     &app_config,
///     runtime.handle().clone(),
/// )?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    ui: MainWindow,
    _bridge: EventLoopBridge<MainWindow>,
    scheduler: Arc<RefreshScheduler>,
}

impl GuiController {
    /// Create a new GUI controller
    ///
    /// # Arguments
    /// * `state_manager` - Shared application state manager
    /// * `scheduler` - The refresh scheduler driven by the Start/Stop buttons
    /// * `app_config` - Settings providing the endpoint label and the default interval
    /// * `tokio_handle` - Handle to the tokio runtime for spawning async tasks
    pub fn new(
        state_manager: Arc<StateManager>,
        scheduler: Arc<RefreshScheduler>,
        app_config: &AppConfig,
        tokio_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;

        let metrics: Arc<Metrics> = scheduler.metrics();
        let bridge = EventLoopBridge::new(&ui, tokio_handle, metrics)?;

        ui.set_obs_endpoint(app_config.obs.url().into());
        ui.set_interval_text(app_config.refresh.default_interval.to_string().into());
        Self::sync_ui_with_state(&ui, &state_manager);

        Self::setup_callbacks(&ui, &bridge, &state_manager, &scheduler);
        Self::setup_state_subscription(&bridge, &state_manager);

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
            scheduler,
        })
    }

    /// Run the GUI (blocks until window is closed)
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        let result = self.ui.run();

        // The window may also go away without a close request (e.g. event loop quit)
        self.scheduler.stop();
        result
    }

    /// Push the full state into the UI; used at startup
    fn sync_ui_with_state(ui: &MainWindow, state_manager: &StateManager) {
        let state = state_manager.snapshot();

        ui.set_groups(Self::group_model(&state.groups, |g| state.selection.contains(g)));
        ui.set_is_running(state.is_running);
        ui.set_is_connected(state.is_connected);
        ui.set_status_message(state.status_message.clone().into());
        if let Some(secs) = state.interval_secs {
            ui.set_interval_text(secs.to_string().into());
        }

        ui.set_pass_count(state.passes_completed as i32);
        ui.set_last_applied(state.last_applied as i32);
        ui.set_last_failed(state.last_failed as i32);
        ui.set_last_skipped(state.last_skipped as i32);
    }

    fn group_model(groups: &[String], is_checked: impl Fn(&str) -> bool) -> ModelRc<GroupItem> {
        let items: Vec<GroupItem> = groups
            .iter()
            .map(|name| GroupItem {
                name: name.as_str().into(),
                checked: is_checked(name),
            })
            .collect();
        ModelRc::new(VecModel::from(items))
    }

    fn setup_callbacks(
        ui: &MainWindow,
        bridge: &EventLoopBridge<MainWindow>,
        state_manager: &Arc<StateManager>,
        scheduler: &Arc<RefreshScheduler>,
    ) {
        // Group checkboxes
        let state = Arc::clone(state_manager);
        ui.on_group_toggled(move |name: SharedString, checked: bool| {
            tracing::debug!("Group '{}' toggled: {}", name, checked);
            state.set_group_selected(name.as_str(), checked);
        });

        // Start auto-refresh
        let bridge_handle = bridge.clone_handle();
        let state = Arc::clone(state_manager);
        let scheduler_clone = Arc::clone(scheduler);
        ui.on_start_refresh(move |interval_text: SharedString| {
            tracing::info!("Start auto-refresh clicked (interval: '{}')", interval_text);

            let secs = match parse_interval(interval_text.as_str()) {
                Ok(secs) => secs,
                Err(e) => {
                    Self::report_start_error(&bridge_handle, &e);
                    return;
                }
            };

            // Fail fast before going async so the dialog appears immediately
            if state.read(|s| s.selection.is_empty()) {
                Self::report_start_error(
                    &bridge_handle,
                    &SchedulerError::InvalidArgument("Select at least one group".to_string()),
                );
                return;
            }

            state.reset_pass_stats();
            state.set_status("Starting auto-refresh...");

            let bridge_handle = bridge_handle.clone();
            let state = Arc::clone(&state);
            let scheduler = Arc::clone(&scheduler_clone);
            bridge_handle.clone().spawn_async(move || async move {
                let provider: Arc<dyn SelectionProvider> = Arc::new(state.as_ref().clone());
                let result =
                    tokio::task::spawn_blocking(move || scheduler.start(secs, provider)).await;

                match result {
                    Ok(Ok(StartOutcome::Started(report))) => {
                        state.set_running(Some(secs));
                        state.set_status(format!(
                            "Auto-refresh every {}s - first pass: {}",
                            secs,
                            report.summary()
                        ));
                    }
                    Ok(Ok(StartOutcome::AlreadyRunning)) => {
                        tracing::debug!("Scheduler was already running");
                    }
                    Ok(Err(e)) => {
                        state.set_status("Auto-refresh not started");
                        Self::report_start_error(&bridge_handle, &e);
                    }
                    Err(e) => {
                        tracing::error!("Start task failed: {}", e);
                        state.set_status("Auto-refresh not started");
                    }
                }
            });
        });

        // Stop auto-refresh
        let state = Arc::clone(state_manager);
        let scheduler_clone = Arc::clone(scheduler);
        ui.on_stop_refresh(move || {
            tracing::info!("Stop auto-refresh clicked");
            if scheduler_clone.stop() {
                state.set_running(None);
                state.set_status("Auto-refresh stopped");
            }
        });

        // Reconnect to OBS
        let bridge_handle = bridge.clone_handle();
        let state = Arc::clone(state_manager);
        let scheduler_clone = Arc::clone(scheduler);
        ui.on_reconnect(move || {
            tracing::info!("Reconnect clicked");
            state.set_status("Connecting to OBS...");

            let bridge_handle = bridge_handle.clone();
            let state = Arc::clone(&state);
            let scheduler = Arc::clone(&scheduler_clone);
            bridge_handle.clone().spawn_async(move || async move {
                let result = tokio::task::spawn_blocking(move || scheduler.connect()).await;

                match result {
                    Ok(Ok(())) => {
                        state.set_connected(true);
                        state.set_status("Connected to OBS");
                    }
                    Ok(Err(e)) => {
                        tracing::error!("Reconnect failed: {}", e);
                        state.set_connected(false);
                        state.set_status("Not connected to OBS");
                        let details = e.to_string();
                        bridge_handle.update_ui(move |ui| {
                            Self::show_error_dialog(
                                ui,
                                "Connection Failed",
                                "Could not connect to OBS. Check that OBS is running and the WebSocket server is enabled.",
                                details,
                            );
                        });
                    }
                    Err(e) => tracing::error!("Reconnect task failed: {}", e),
                }
            });
        });

        let ui_weak = ui.as_weak();
        ui.on_error_dialog_dismissed(move || {
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_error_dialog(false);
            }
        });

        // Closing the window stops the timer before the event loop exits
        let scheduler_clone = Arc::clone(scheduler);
        ui.window().on_close_requested(move || {
            tracing::info!("Close requested - stopping auto-refresh");
            scheduler_clone.stop();
            slint::CloseRequestResponse::HideWindow
        });

        tracing::debug!("UI callbacks configured");
    }

    /// Subscribe to state changes and update UI accordingly
    ///
    /// The receiving thread never touches the UI directly; every update goes
    /// through the bridge onto the event loop.
    fn setup_state_subscription(
        bridge: &EventLoopBridge<MainWindow>,
        state_manager: &Arc<StateManager>,
    ) {
        let bridge_handle = bridge.clone_handle();
        let state_manager_clone = Arc::clone(state_manager);
        let mut rx = state_manager.subscribe();

        std::thread::spawn(move || {
            tracing::debug!("State subscription thread started");

            loop {
                match rx.blocking_recv() {
                    Ok(change) => {
                        tracing::trace!("State change received: {:?}", change);
                        Self::apply_change(&bridge_handle, &state_manager_clone, change);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("State subscription lagged by {} events; resyncing", skipped);
                        let state = state_manager_clone.snapshot();
                        bridge_handle.update_ui(move |ui| {
                            ui.set_is_running(state.is_running);
                            ui.set_is_connected(state.is_connected);
                            ui.set_status_message(state.status_message.into());
                            ui.set_pass_count(state.passes_completed as i32);
                        });
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            tracing::debug!("State subscription thread terminated");
        });
    }

    fn apply_change(
        bridge_handle: &EventLoopBridgeHandle<MainWindow>,
        state_manager: &StateManager,
        change: StateChange,
    ) {
        match change {
            StateChange::SelectionChanged { .. } => {
                let (groups, selection) =
                    state_manager.read(|s| (s.groups.clone(), s.selection.clone()));
                bridge_handle.update_ui(move |ui| {
                    ui.set_groups(Self::group_model(&groups, |g| selection.contains(g)));
                });
            }
            StateChange::SchedulerStarted { interval_secs } => {
                bridge_handle.update_ui(move |ui| {
                    ui.set_is_running(true);
                    ui.set_interval_text(interval_secs.to_string().into());
                });
            }
            StateChange::SchedulerStopped => {
                bridge_handle.update_ui(|ui| ui.set_is_running(false));
            }
            StateChange::PassCompleted {
                applied,
                failed,
                skipped,
            } => {
                let passes = state_manager.read(|s| s.passes_completed);
                bridge_handle.update_ui(move |ui| {
                    ui.set_pass_count(passes as i32);
                    ui.set_last_applied(applied as i32);
                    ui.set_last_failed(failed as i32);
                    ui.set_last_skipped(skipped as i32);
                });
            }
            StateChange::ConnectionChanged { connected } => {
                bridge_handle.update_ui(move |ui| ui.set_is_connected(connected));
            }
            StateChange::StatusChanged { message } => {
                bridge_handle.update_ui(move |ui| ui.set_status_message(message.into()));
            }
            StateChange::StateReset => {
                bridge_handle.update_ui(|ui| {
                    ui.set_pass_count(0);
                    ui.set_last_applied(0);
                    ui.set_last_failed(0);
                    ui.set_last_skipped(0);
                });
            }
        }
    }

    fn report_start_error(bridge_handle: &EventLoopBridgeHandle<MainWindow>, error: &SchedulerError) {
        tracing::warn!("Cannot start auto-refresh: {}", error);
        let message = match error {
            SchedulerError::InvalidArgument(reason) => reason.clone(),
        };
        bridge_handle.update_ui(move |ui| {
            Self::show_error_dialog(ui, "Cannot Start Auto-Refresh", message, "");
        });
    }

    /// Show an error dialog with title, message, and details
    fn show_error_dialog(
        ui: &MainWindow,
        title: impl Into<SharedString>,
        message: impl Into<SharedString>,
        details: impl Into<SharedString>,
    ) {
        ui.set_error_title(title.into());
        ui.set_error_message(message.into());
        ui.set_error_details(details.into());
        ui.set_show_error_dialog(true);
    }
}
