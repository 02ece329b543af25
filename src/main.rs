//! OBS Refresh - periodically re-points OBS image sources at their configured files
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! This binary crate provides the Slint GUI frontend. It initializes:
//! - Configuration loading ([`ConfigManager`]) and logging
//! - Tokio async runtime (runs the refresh timer)
//! - The OBS control connection ([`ObsClient`])
//! - State management ([`StateManager`]) and the [`RefreshScheduler`]
//! - GUI controller ([`GuiController`])
//!
//! # Threading
//!
//! - **Main thread**: Runs the Slint event loop
//! - **Tokio workers**: Run refresh passes and reconnect attempts
//! - **State listener**: Background std::thread forwarding state changes to the UI
//!
//! # Files
//!
//! Expected in `OBS Refresh Data/`:
//! - `OBS Refresh Config.yaml`: connection and refresh settings (written with defaults if absent)
//! - `data.json` (or the file named by `refresh.mapping_file`): group → source → path

use anyhow::{Context, Result};
use obs_refresh::services::{PassListener, PassReport};
use obs_refresh::ui::GuiController;
use obs_refresh::{
    APP_NAME, ConfigManager, ControlApi, Metrics, ObsClient, RefreshScheduler, SchedulerContext,
    SourceUpdater, StateManager, VERSION,
};
use std::sync::Arc;
use std::time::Duration;

const CONFIG_DIR: &str = "OBS Refresh Data";
const WORKER_THREADS: usize = 2;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new(CONFIG_DIR)?;
    let wrote_defaults = config_manager.ensure_app_config()?;
    let app_config = config_manager.load_app_config()?;

    // Keep the guard alive until main returns or buffered log lines are lost
    let _log_guard = obs_refresh::logging::setup_logging_with_console(
        "logs",
        "obs_refresh",
        app_config.debug_mode,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    if wrote_defaults {
        tracing::info!(
            "Wrote default settings to {}",
            config_manager.app_config_path()
        );
    }

    let mapping_path = config_manager.mapping_path(&app_config);
    let mapping = config_manager
        .load_mapping_store(&mapping_path)
        .with_context(|| format!("Cannot start without a mapping document ({})", mapping_path))
        .inspect_err(|e| tracing::error!("{:#}", e))?;
    let mapping = Arc::new(mapping);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("obs-refresh-worker")
        .build()?;

    tracing::info!(
        "Tokio runtime initialized with {} worker threads",
        WORKER_THREADS
    );

    let state_manager = Arc::new(StateManager::new());
    state_manager.load_groups(&mapping);

    let client = Arc::new(ObsClient::new(app_config.obs.clone()));
    match client.connect() {
        Ok(()) => {
            state_manager.set_connected(true);
            state_manager.set_status("Connected to OBS");
        }
        Err(e) => {
            tracing::error!("Could not connect to OBS: {}", e);
            state_manager.set_connected(false);
            state_manager.set_status(format!("Not connected to OBS: {}", e));
        }
    }

    let metrics = Arc::new(Metrics::new());
    let api: Arc<dyn ControlApi> = client.clone();
    let updater = SourceUpdater::with_path_field(api, app_config.refresh.path_field.clone());

    // Every pass, scheduled or immediate, lands in the state manager
    let listener: PassListener = {
        let state = Arc::clone(&state_manager);
        let client = Arc::clone(&client);
        Arc::new(move |report: &PassReport| {
            state.record_pass(report);
            state.set_connected(client.is_connected());
        })
    };

    let context = SchedulerContext::new(updater, Arc::clone(&mapping), runtime.handle().clone())
        .with_pass_listener(listener)
        .with_metrics(Arc::clone(&metrics));
    let scheduler = Arc::new(RefreshScheduler::new(context));

    let gui_controller = GuiController::new(
        Arc::clone(&state_manager),
        Arc::clone(&scheduler),
        &app_config,
        runtime.handle().clone(),
    )?;
    tracing::info!("GUI controller initialized, launching window");

    // Blocks until the window is closed
    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");

    // Timer first, then the connection
    if let Err(e) = scheduler.shutdown() {
        tracing::warn!("Error while closing the OBS connection: {}", e);
    }
    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
