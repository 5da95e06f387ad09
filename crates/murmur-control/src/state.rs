//! Shared lifecycle state cell with validated transitions.

use std::sync::{Arc, Mutex};

use murmur_core::{AppState, MurmurError};

/// Thread-safe holder for the current [`AppState`].
///
/// All writes go through [`StateCell::transition`], which rejects edges the
/// lifecycle table does not allow; a rejected transition leaves the state
/// untouched. Clones share the underlying cell.
#[derive(Debug, Clone)]
pub struct StateCell {
    state: Arc<Mutex<AppState>>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    /// Creates a cell in the startup `Loading` state.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AppState::Loading)),
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> AppState {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// Attempts to move to `target`, failing if the lifecycle table does not
    /// allow the edge from the current state.
    pub fn transition(&self, target: AppState) -> Result<(), MurmurError> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.can_transition_to(&target) {
            tracing::debug!("Lifecycle state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(MurmurError::Busy(format!(
                "invalid transition {} -> {}",
                *state, target
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_in_loading() {
        let cell = StateCell::new();
        assert_eq!(cell.current(), AppState::Loading);
    }

    #[test]
    fn test_valid_transition_applies() {
        let cell = StateCell::new();
        cell.transition(AppState::Idle).unwrap();
        assert_eq!(cell.current(), AppState::Idle);
        cell.transition(AppState::Recording).unwrap();
        assert_eq!(cell.current(), AppState::Recording);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let cell = StateCell::new();
        let result = cell.transition(AppState::Recording);
        assert!(result.is_err());
        assert_eq!(cell.current(), AppState::Loading);
    }

    #[test]
    fn test_clone_shares_cell() {
        let cell = StateCell::new();
        let other = cell.clone();
        cell.transition(AppState::NoModel).unwrap();
        assert_eq!(other.current(), AppState::NoModel);
    }

    #[test]
    fn test_transition_error_names_both_states() {
        let cell = StateCell::new();
        let err = cell.transition(AppState::Typing).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Loading"));
        assert!(message.contains("Typing"));
    }
}
