//! Core error model.

use thiserror::Error;

/// Result type used across the core layer.
pub type CoreResult<T> = Result<T, CoreError>;

/// Construction-time failure of a core value.
///
/// These surface while route tables and identities are being built, never
/// while a path is being matched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A path template did not parse.
    #[error("invalid path template '{template}': {reason}")]
    InvalidTemplate {
        template: String,
        reason: &'static str,
    },

    /// Subjects must carry at least one character.
    #[error("subject must not be empty")]
    EmptySubject,
}

impl CoreError {
    pub fn template(template: &str, reason: &'static str) -> Self {
        Self::InvalidTemplate {
            template: template.to_string(),
            reason,
        }
    }
}
