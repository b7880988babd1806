//! Unified error handling for the trajectory-matcher library.
//!
//! Every fallible operation returns [`Result`]. Empty outcomes (no corpus,
//! no shared venues) are *not* errors; they come back as empty vectors.

use thiserror::Error;

/// Unified error type for trajectory-matcher operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrajectoryError {
    /// Request rejected before any computation (empty query, empty id set)
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A query point is out of range
    #[error("Invalid point at index {index}: {message}")]
    InvalidPoint { index: usize, message: String },

    /// Corpus or visit-record fetch failed
    #[error("Collaborator unavailable: {message}")]
    CollaboratorUnavailable { message: String },

    /// The caller cancelled the request while comparisons were in flight
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl TrajectoryError {
    /// Shorthand for [`TrajectoryError::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TrajectoryError::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for [`TrajectoryError::CollaboratorUnavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        TrajectoryError::CollaboratorUnavailable {
            message: message.into(),
        }
    }

    /// True for errors caused by the caller's input (reported as 4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TrajectoryError::InvalidInput { .. } | TrajectoryError::InvalidPoint { .. }
        )
    }
}

/// Result type alias for trajectory-matcher operations.
pub type Result<T> = std::result::Result<T, TrajectoryError>;

/// Extension trait for converting Option to TrajectoryError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an invalid input error.
    fn ok_or_invalid_input(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_input(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrajectoryError::invalid_input(message))
    }
}
