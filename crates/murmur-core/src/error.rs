use thiserror::Error;

/// Top-level error type for the Murmur system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates construct
/// these variants directly (usually with a human-readable cause string) so
/// that the `?` operator works seamlessly across crate boundaries.
///
/// Precondition variants (`Busy`, `NotDownloaded`, `AlreadyDownloaded`,
/// `DownloadInProgress`, `NotLoaded`) are raised synchronously by the
/// controller before any background work starts; the remaining variants
/// surface from background workers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MurmurError {
    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Model download already in progress: {0}")]
    DownloadInProgress(String),

    #[error("Model already downloaded: {0}")]
    AlreadyDownloaded(String),

    #[error("Model not downloaded: {0}")]
    NotDownloaded(String),

    #[error("No model loaded")]
    NotLoaded,

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Hotkey error: {0}")]
    Hotkey(String),

    #[error("Text injection error: {0}")]
    Inject(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MurmurError {
    fn from(err: serde_json::Error) -> Self {
        MurmurError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Murmur operations.
pub type Result<T> = std::result::Result<T, MurmurError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MurmurError::Settings("missing field".to_string());
        assert_eq!(err.to_string(), "Settings error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let murmur_err: MurmurError = io_err.into();
        assert!(matches!(murmur_err, MurmurError::Io(_)));
        assert!(murmur_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad_json = "{ invalid json }";
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        assert!(err.is_err());
        let murmur_err: MurmurError = err.unwrap_err().into();
        assert!(matches!(murmur_err, MurmurError::Serialization(_)));
    }

    #[test]
    fn test_precondition_error_messages() {
        let cases: Vec<(MurmurError, &str)> = vec![
            (
                MurmurError::DownloadInProgress("tiny".to_string()),
                "Model download already in progress: tiny",
            ),
            (
                MurmurError::AlreadyDownloaded("base".to_string()),
                "Model already downloaded: base",
            ),
            (
                MurmurError::NotDownloaded("small".to_string()),
                "Model not downloaded: small",
            ),
            (MurmurError::NotLoaded, "No model loaded"),
            (
                MurmurError::Busy("transcribing".to_string()),
                "Busy: transcribing",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(MurmurError::Engine("fail".to_string()))
        }

        assert_eq!(returns_ok().unwrap(), 42);
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }

    #[test]
    fn test_error_debug_impl() {
        let err = MurmurError::Download("timed out".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Download"));
        assert!(debug_str.contains("timed out"));
    }
}
