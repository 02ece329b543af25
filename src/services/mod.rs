//! Services module - Pure business logic for refreshing OBS sources.
//!
//! The services are **framework-agnostic** and have no dependencies on the UI
//! layer: they only see the [`ControlApi`](crate::obs::ControlApi) trait, which
//! keeps them testable with mocks.
//!
//! # Components
//!
//! - [`SourceUpdater`]: Changes the path of one source with a read-modify-write
//!   of its settings (`GetInputSettings` then `SetInputSettings`, `overlay = false`).
//!   Failures come back as [`UpdateError::UpdateFailed`].
//!
//! - [`refresh_pass`]: Applies every non-empty path of the selected groups,
//!   logging and recording failures without stopping. Returns a [`PassReport`].
//!
//! - [`RefreshScheduler`]: The `Idle`/`Running` state machine. `start` runs one
//!   pass immediately and arms a [`PeriodicTask`]; `stop` cancels it.
//!
//! - [`PeriodicTask`]: Self-rescheduling tick on the tokio runtime with a
//!   cancellable handle. At most one tick is ever in flight.
//!
//! # Error Policy
//!
//! Remote-call errors are caught where they happen (the updater) and never
//! unwind past a pass. Only invalid user input ([`SchedulerError`]) is returned
//! to the caller of a scheduler command.

pub mod periodic;
pub mod scheduler;
pub mod updater;

pub use periodic::PeriodicTask;
pub use scheduler::{
    PassListener, PassReport, RefreshScheduler, SchedulerContext, SchedulerError, SchedulerState,
    SelectionProvider, SourceOutcome, StartOutcome, parse_interval, refresh_pass,
};
pub use updater::{SourceUpdater, UpdateError, UpdateOutcome};
