use crate::models::Selection;

/// Everything the window shows: the group list, the live selection,
/// scheduler and connection status, and pass statistics.
///
/// Owned by [`StateManager`](crate::state::StateManager); mutate it through
/// [`update()`](crate::state::StateManager::update) so change events go out.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Groups from the mapping store, in document order
    pub groups: Vec<String>,

    // Checked groups, read by the scheduler on every tick
    pub selection: Selection,

    // Scheduler status
    pub is_running: bool,
    pub interval_secs: Option<u64>,

    // Control connection
    pub is_connected: bool,

    pub status_message: String,

    // Statistics of the most recent pass
    pub last_applied: usize,
    pub last_failed: usize,
    pub last_skipped: usize,
    pub last_failures: Vec<String>,

    // Aggregate statistics since startup
    pub passes_completed: usize,
    pub total_applied: usize,
    pub total_failed: usize,
}

impl AppState {
    /// Whether the start control should be usable.
    pub fn can_start(&self) -> bool {
        !self.is_running && !self.selection.is_empty()
    }

    /// Get statistics of the last pass.
    ///
    /// Returns a tuple of (applied, failed, skipped).
    pub fn last_pass_stats(&self) -> (usize, usize, usize) {
        (self.last_applied, self.last_failed, self.last_skipped)
    }

    /// Reset pass statistics to initial values.
    pub fn reset_pass_stats(&mut self) {
        self.last_applied = 0;
        self.last_failed = 0;
        self.last_skipped = 0;
        self.last_failures.clear();
        self.passes_completed = 0;
        self.total_applied = 0;
        self.total_failed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert!(!state.is_running);
        assert!(!state.is_connected);
        assert!(state.selection.is_empty());
        assert_eq!(state.interval_secs, None);
        assert_eq!(state.last_pass_stats(), (0, 0, 0));
    }

    #[test]
    fn test_can_start_requires_selection_and_idle() {
        let mut state = AppState::default();
        assert!(!state.can_start());

        state.selection.insert("Scene1");
        assert!(state.can_start());

        state.is_running = true;
        assert!(!state.can_start());
    }

    #[test]
    fn test_reset_pass_stats() {
        let mut state = AppState {
            last_applied: 3,
            last_failed: 1,
            last_skipped: 2,
            last_failures: vec!["imgA".to_string()],
            passes_completed: 4,
            total_applied: 10,
            total_failed: 2,
            ..Default::default()
        };

        state.reset_pass_stats();

        assert_eq!(state.last_pass_stats(), (0, 0, 0));
        assert!(state.last_failures.is_empty());
        assert_eq!(state.passes_completed, 0);
        assert_eq!(state.total_applied, 0);
    }
}
