// Shared application state
//
// `StateManager` owns the `AppState` behind a lock and publishes a
// `StateChange` for every field group that actually changed, so the window
// never polls.

use crate::models::{AppState, MappingStore, Selection};
use crate::services::{PassReport, SelectionProvider};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Events that slow subscribers may miss before they lag
const EVENT_BUFFER: usize = 100;

/// What changed in the last update
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The set of checked groups changed
    SelectionChanged { selected: usize },

    /// Auto-refresh has started
    SchedulerStarted { interval_secs: u64 },

    /// Auto-refresh has stopped
    SchedulerStopped,

    /// A refresh pass has finished
    PassCompleted {
        applied: usize,
        failed: usize,
        skipped: usize,
    },

    /// The control connection opened or closed
    ConnectionChanged { connected: bool },

    /// The status line changed
    StatusChanged { message: String },

    /// Pass statistics were cleared before a new run
    StateReset,
}

/// Lock-protected [`AppState`] plus a broadcast of [`StateChange`]s.
///
/// Cloning is cheap and every clone sees the same state. The scheduler holds
/// one as its [`SelectionProvider`] and reads the live selection on each tick;
/// the GUI controller subscribes to the events.
pub struct StateManager {
    state: Arc<RwLock<AppState>>,
    events: broadcast::Sender<StateChange>,
}

impl StateManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            events,
        }
    }

    /// Owned copy of the whole state
    pub fn snapshot(&self) -> AppState {
        self.read(AppState::clone)
    }

    /// Run `f` under the read lock
    ///
    /// ```ignore
    /// let running = state_manager.read(|state| state.is_running);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Mutate the state, then broadcast what changed.
    ///
    /// Events go out after the write lock is released, so subscribers may
    /// call back into the manager. Returns the events sent.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let before = state.clone();

        update_fn(&mut state);

        let changes = Self::diff(&before, &state);
        drop(state);

        for change in &changes {
            // No subscribers is fine
            let _ = self.events.send(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    fn diff(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.selection != new.selection {
            changes.push(StateChange::SelectionChanged {
                selected: new.selection.len(),
            });
        }

        if old.is_running != new.is_running {
            if new.is_running {
                changes.push(StateChange::SchedulerStarted {
                    interval_secs: new.interval_secs.unwrap_or_default(),
                });
            } else {
                changes.push(StateChange::SchedulerStopped);
            }
        }

        if old.passes_completed != new.passes_completed {
            changes.push(StateChange::PassCompleted {
                applied: new.last_applied,
                failed: new.last_failed,
                skipped: new.last_skipped,
            });
        }

        if old.is_connected != new.is_connected {
            changes.push(StateChange::ConnectionChanged {
                connected: new.is_connected,
            });
        }

        if old.status_message != new.status_message {
            changes.push(StateChange::StatusChanged {
                message: new.status_message.clone(),
            });
        }

        changes
    }

    /// Replace the group list with the groups of the mapping store
    ///
    /// Clears the selection: the previous one may name groups that no longer exist.
    pub fn load_groups(&self, mapping: &MappingStore) -> Vec<StateChange> {
        self.update(|state| {
            state.groups = mapping.group_names().map(str::to_string).collect();
            state.selection = Selection::new();
        })
    }

    /// Check or uncheck a group
    pub fn set_group_selected(&self, group: &str, selected: bool) -> Vec<StateChange> {
        self.update(|state| {
            if selected {
                state.selection.insert(group);
            } else {
                state.selection.remove(group);
            }
        })
    }

    /// Current selection snapshot
    pub fn selection(&self) -> Selection {
        self.read(|state| state.selection.clone())
    }

    /// Mirror the scheduler state
    pub fn set_running(&self, interval_secs: Option<u64>) -> Vec<StateChange> {
        self.update(|state| {
            state.is_running = interval_secs.is_some();
            state.interval_secs = interval_secs;
        })
    }

    /// Record the result of a refresh pass
    pub fn record_pass(&self, report: &PassReport) -> Vec<StateChange> {
        self.update(|state| {
            state.last_applied = report.applied();
            state.last_failed = report.failed();
            state.last_skipped = report.skipped.len();
            state.last_failures = report.failures().map(str::to_string).collect();

            state.passes_completed += 1;
            state.total_applied += report.applied();
            state.total_failed += report.failed();
        })
    }

    pub fn set_connected(&self, connected: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.is_connected = connected;
        })
    }

    pub fn set_status(&self, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        self.update(|state| {
            state.status_message = message;
        })
    }

    /// Reset pass statistics
    pub fn reset_pass_stats(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.reset_pass_stats();
        });

        // Sent even when every counter was already zero
        let _ = self.events.send(StateChange::StateReset);
        changes.push(StateChange::StateReset);

        changes
    }
}

impl SelectionProvider for StateManager {
    fn selection(&self) -> Selection {
        StateManager::selection(self)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
        }
    }
}
