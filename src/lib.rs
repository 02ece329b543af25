// OBS Refresh - keeps OBS image sources pointed at their configured files
//
// This is the library crate containing the core logic and data structures.
// The binary crate (main.rs) provides the GUI entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod obs;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use crate::config::ConfigManager;
pub use metrics::Metrics;
pub use models::{AppConfig, AppState, MappingStore, Selection};
pub use obs::{ControlApi, ControlError, ObsClient};
pub use services::{RefreshScheduler, SchedulerContext, SourceUpdater};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
