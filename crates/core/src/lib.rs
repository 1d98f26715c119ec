//! Shared primitives for all Rust crates in dashprune.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across dashprune crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input, configuration, or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Remote service could not be reached or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote service answered with an unexpected status or malformed payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Usage sample is too small to be trusted for pruning decisions.
    #[error("found fewer logs ({found}) than the lower threshold ({threshold})")]
    UnsafeUsageSample {
        /// Number of log entries found in the lookback window.
        found: usize,
        /// Minimum number of log entries required.
        threshold: usize,
    },

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Prefixes the error message with operation context while keeping its category.
    #[must_use]
    pub fn context(self, context: impl AsRef<str>) -> Self {
        let context = context.as_ref();
        match self {
            Self::Validation(message) => Self::Validation(format!("{context}: {message}")),
            Self::Transport(message) => Self::Transport(format!("{context}: {message}")),
            Self::Protocol(message) => Self::Protocol(format!("{context}: {message}")),
            Self::Internal(message) => Self::Internal(format!("{context}: {message}")),
            unsafe_sample @ Self::UnsafeUsageSample { .. } => unsafe_sample,
        }
    }
}
