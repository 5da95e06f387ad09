//! Observable engine lifecycle state.

use std::fmt;

/// Snapshot of where the engine is in its load lifecycle.
///
/// The engine hands this out by value; it is a plain description and holds
/// no model resources itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// No model in memory.
    Unloaded,
    /// A load is in flight for the named model.
    Loading(String),
    /// The named model is resident and ready to transcribe.
    Loaded(String),
}

impl EngineState {
    /// Whether a model is resident and transcription can run.
    pub fn is_loaded(&self) -> bool {
        matches!(self, EngineState::Loaded(_))
    }

    /// The id of the resident model, if any.
    pub fn loaded_model(&self) -> Option<&str> {
        match self {
            EngineState::Loaded(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Unloaded => write!(f, "unloaded"),
            EngineState::Loading(id) => write!(f, "loading {}", id),
            EngineState::Loaded(id) => write!(f, "loaded {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_loaded_only_for_loaded_variant() {
        assert!(!EngineState::Unloaded.is_loaded());
        assert!(!EngineState::Loading("base".to_string()).is_loaded());
        assert!(EngineState::Loaded("base".to_string()).is_loaded());
    }

    #[test]
    fn test_loaded_model_returns_id() {
        assert_eq!(EngineState::Unloaded.loaded_model(), None);
        assert_eq!(EngineState::Loading("tiny".to_string()).loaded_model(), None);
        assert_eq!(
            EngineState::Loaded("tiny".to_string()).loaded_model(),
            Some("tiny")
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(EngineState::Unloaded.to_string(), "unloaded");
        assert_eq!(EngineState::Loading("base".to_string()).to_string(), "loading base");
        assert_eq!(EngineState::Loaded("base".to_string()).to_string(), "loaded base");
    }
}
