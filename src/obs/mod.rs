//! Control-API layer - talking to OBS Studio through obs-websocket v5.
//!
//! # Components
//!
//! - [`ControlApi`]: The four calls the rest of the application needs. The
//!   [`SourceUpdater`](crate::services::SourceUpdater) only ever sees this trait,
//!   which keeps it testable with mocks and fakes.
//! - [`ObsClient`]: Blocking obs-websocket v5 implementation of [`ControlApi`].
//! - [`protocol`]: Wire messages and the authentication digest.
//!
//! # Connection Lifecycle
//!
//! The connection is process-wide: opened once at startup, shared by every
//! update call through an `Arc<dyn ControlApi>`, and closed exactly once at
//! shutdown after the scheduler has been stopped.

pub mod client;
pub mod protocol;

pub use client::ObsClient;

use serde_json::{Map, Value};
use thiserror::Error;

/// Settings bag of an OBS input, as returned by `GetInputSettings`
pub type InputSettings = Map<String, Value>;

/// Errors raised by the control API
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Not connected to OBS")]
    NotConnected,

    #[error("Failed to connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("WebSocket error: {0}")]
    Transport(#[from] Box<tungstenite::Error>),

    #[error("Unexpected message from OBS: {0}")]
    Protocol(String),

    #[error("OBS rejected {request_type} (code {code}): {comment}")]
    Request {
        request_type: String,
        code: u16,
        comment: String,
    },

    #[error("Invalid JSON payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tungstenite::Error> for ControlError {
    fn from(error: tungstenite::Error) -> Self {
        ControlError::Transport(Box::new(error))
    }
}

/// The control-API calls used by the refresh core
///
/// Calls are blocking from the caller's point of view. Any of them may fail
/// with a transport or remote-side error.
#[cfg_attr(test, mockall::automock)]
pub trait ControlApi: Send + Sync {
    /// Open the connection and complete the handshake
    fn connect(&self) -> Result<(), ControlError>;

    /// Close the connection; a no-op when already closed
    fn disconnect(&self) -> Result<(), ControlError>;

    fn is_connected(&self) -> bool;

    /// Read the current settings of an input
    fn get_input_settings(&self, input_name: &str) -> Result<InputSettings, ControlError>;

    /// Write settings of an input
    ///
    /// With `overlay = false` the given bag replaces the input's settings
    /// wholesale, so callers send back everything they read.
    fn set_input_settings(
        &self,
        input_name: &str,
        settings: InputSettings,
        overlay: bool,
    ) -> Result<(), ControlError>;
}
