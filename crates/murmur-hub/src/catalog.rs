//! Static registry of the model variants Murmur can download and run.

/// Immutable description of one model variant.
///
/// Built once from [`MODELS`] at process start; never mutated. The
/// `approx_size` and `description` strings exist purely for display in
/// model-selection UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Short identifier used in settings, stats, and commands.
    pub id: &'static str,
    /// Human-readable name for selection UIs.
    pub display_name: &'static str,
    /// Remote hub repository holding the model files.
    pub repo: &'static str,
    /// Rough on-disk footprint, for display only.
    pub approx_size: &'static str,
    /// One-line speed/accuracy tradeoff summary.
    pub description: &'static str,
}

/// All model variants, smallest first.
pub const MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "tiny",
        display_name: "OpenAI Whisper Tiny",
        repo: "Systran/faster-whisper-tiny",
        approx_size: "~75 MB",
        description: "Fastest, basic accuracy",
    },
    ModelDescriptor {
        id: "base",
        display_name: "OpenAI Whisper Base",
        repo: "Systran/faster-whisper-base",
        approx_size: "~150 MB",
        description: "Good balance",
    },
    ModelDescriptor {
        id: "small",
        display_name: "OpenAI Whisper Small",
        repo: "Systran/faster-whisper-small",
        approx_size: "~500 MB",
        description: "Better accuracy",
    },
    ModelDescriptor {
        id: "medium",
        display_name: "OpenAI Whisper Medium",
        repo: "Systran/faster-whisper-medium",
        approx_size: "~1.5 GB",
        description: "High accuracy",
    },
    ModelDescriptor {
        id: "large-v3",
        display_name: "OpenAI Whisper Large V3",
        repo: "Systran/faster-whisper-large-v3",
        approx_size: "~3 GB",
        description: "Best accuracy",
    },
];

/// Look up a model by id.
pub fn find(id: &str) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|m| m.id == id)
}

/// Resolve a model id to its hub repository.
///
/// Ids outside the catalog pass through unchanged, so a power user can point
/// the store at an arbitrary repository without editing the table.
pub fn repo_for(id: &str) -> &str {
    find(id).map(|m| m.repo).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_contains_five_models() {
        assert_eq!(MODELS.len(), 5);
    }

    #[test]
    fn test_find_known_model() {
        let base = find("base").unwrap();
        assert_eq!(base.display_name, "OpenAI Whisper Base");
        assert_eq!(base.repo, "Systran/faster-whisper-base");
        assert_eq!(base.approx_size, "~150 MB");
        assert_eq!(base.description, "Good balance");
    }

    #[test]
    fn test_find_unknown_model_is_none() {
        assert!(find("gigantic-v9").is_none());
    }

    #[test]
    fn test_repo_for_maps_catalog_ids() {
        assert_eq!(repo_for("tiny"), "Systran/faster-whisper-tiny");
        assert_eq!(repo_for("large-v3"), "Systran/faster-whisper-large-v3");
    }

    #[test]
    fn test_repo_for_passes_through_unknown_ids() {
        assert_eq!(repo_for("someorg/custom-model"), "someorg/custom-model");
    }

    #[test]
    fn test_ids_are_unique() {
        for (i, a) in MODELS.iter().enumerate() {
            for b in &MODELS[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }
}
