//! Error types for careline.

use thiserror::Error;

/// Result type alias using careline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for careline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Case not found
    #[error("Case not found: {0}")]
    CaseNotFound(i64),

    /// Case message not found
    #[error("Message not found: {0}")]
    MessageNotFound(i64),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authenticated identity missing or unusable
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// State conflict, e.g. media already claimed by another owner
    #[error("Conflict: {0}")]
    Conflict(String),

    /// External service (email, media store) failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by the request itself rather than the system.
    ///
    /// The scheduled-message worker treats these as terminal.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }

    /// True for any of the not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::CaseNotFound(_) | Error::MessageNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Upstream(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("person 7".to_string());
        assert_eq!(err.to_string(), "Not found: person 7");
    }

    #[test]
    fn test_error_display_case_not_found() {
        let err = Error::CaseNotFound(42);
        assert_eq!(err.to_string(), "Case not found: 42");
    }

    #[test]
    fn test_error_display_message_not_found() {
        let err = Error::MessageNotFound(9);
        assert_eq!(err.to_string(), "Message not found: 9");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("empty body".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty body");
    }

    #[test]
    fn test_error_display_forbidden() {
        let err = Error::Forbidden("not on care team".to_string());
        assert_eq!(err.to_string(), "Forbidden: not on care team");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("media 3 already claimed".to_string());
        assert_eq!(err.to_string(), "Conflict: media 3 already claimed");
    }

    #[test]
    fn test_error_display_upstream() {
        let err = Error::Upstream("email service returned 503".to_string());
        assert_eq!(err.to_string(), "Upstream error: email service returned 503");
    }

    #[test]
    fn test_is_validation() {
        assert!(Error::InvalidInput("x".into()).is_validation());
        assert!(!Error::Forbidden("x".into()).is_validation());
        assert!(!Error::Upstream("x".into()).is_validation());
    }

    #[test]
    fn test_is_not_found_covers_all_variants() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(Error::CaseNotFound(1).is_not_found());
        assert!(Error::MessageNotFound(1).is_not_found());
        assert!(!Error::Internal("x".into()).is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_is_debug() {
        let err = Error::Config("missing DATABASE_URL".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Config"));
    }
}
