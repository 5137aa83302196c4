use thiserror::Error;

/// Top-level error type for the Quill system.
///
/// Each variant wraps a subsystem-specific error. Subsystem crates return
/// `Result<T>` and propagate with the `?` operator; crate boundaries stay
/// seamless because everything converges on this one enum.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuillError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Hotkey error: {0}")]
    Hotkey(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for QuillError {
    fn from(err: serde_json::Error) -> Self {
        QuillError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Quill operations.
pub type Result<T> = std::result::Result<T, QuillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuillError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: QuillError = io_err.into();
        assert!(matches!(err, QuillError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad_json = "{ invalid json }";
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        let err: QuillError = parsed.unwrap_err().into();
        assert!(matches!(err, QuillError::Serialization(_)));
    }

    #[test]
    fn test_error_display_per_subsystem() {
        let cases: Vec<(QuillError, &str)> = vec![
            (
                QuillError::Session("worker died".to_string()),
                "Session error: worker died",
            ),
            (
                QuillError::Transcription("engine timeout".to_string()),
                "Transcription error: engine timeout",
            ),
            (
                QuillError::Hotkey("bad combination".to_string()),
                "Hotkey error: bad combination",
            ),
            (
                QuillError::Store("write failed".to_string()),
                "Store error: write failed",
            ),
            (
                QuillError::Retrieval("index empty".to_string()),
                "Retrieval error: index empty",
            ),
            (
                QuillError::Completion("service unavailable".to_string()),
                "Completion error: service unavailable",
            ),
            (
                QuillError::Output("keystroke rejected".to_string()),
                "Output error: keystroke rejected",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
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
}
