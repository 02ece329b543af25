//! Data models for the OBS refresh application.
//!
//! This module contains the core data structures used throughout the application:
//! - [`AppState`]: The central state container holding groups, selection, scheduler status and pass statistics
//! - [`AppConfig`]: Connection and refresh settings loaded from `OBS Refresh Config.yaml`
//! - [`MappingStore`]: The ordered group → source → path document driving every refresh pass
//! - [`Selection`]: Snapshot of the groups the user has checked
//!
//! # Architecture Note
//!
//! The models are designed to be:
//! - **Serializable**: Config and mapping structs derive `Serialize`/`Deserialize`
//! - **Cloneable**: AppState is wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager) for thread-safe access
//! - **Ordered**: Groups and sources keep document order via `indexmap`

pub mod app_state;
pub mod config;
pub mod mapping;

pub use app_state::AppState;
pub use config::{AppConfig, ObsSettings, RefreshSettings};
pub use mapping::{MappingStore, Selection, SourcePaths};
