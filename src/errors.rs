//! Error taxonomy for the classification engine.
//!
//! Three families of failure exist and they never mix:
//!
//! - **Configuration**: a rule profile is malformed or missing. Raised only while
//!   loading a [`VersionProfile`](crate::profile::VersionProfile); the binary
//!   refuses to serve with a half-loaded profile.
//! - **Validation**: request facts are malformed or out of range. Carries one
//!   [`FieldError`] per offending field so callers can show all of them at once.
//! - **Io**: reading a profile or facts file failed.
//!
//! Out-of-scope results are *not* errors. They are ordinary result variants
//! ([`Classification::OutOfScope`](crate::rules::Classification) and
//! [`Assurance::Terminal`](crate::assurance::Assurance)) because callers report
//! them to end users as "requires specialized authorization".
//!
//! # Example
//!
//! ```rust
//! use soracalc::errors::{FieldError, SoraError};
//!
//! let err = SoraError::validation(vec![FieldError::new("altitude", "must be >= 0")]);
//! assert!(err.is_user_fixable());
//! assert_eq!(err.category(), "Validation");
//! ```

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SoraError>;

/// A single field-level rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Name of the offending fact (or `profile.section.field` path for config).
    pub field: String,
    /// Human-displayable reason.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Main error type for soracalc operations.
#[derive(Debug, Error)]
pub enum SoraError {
    /// Rule profile is malformed, incomplete or inconsistent.
    #[error("Configuration error{}: {message}", location_suffix(.path))]
    Configuration {
        message: String,
        path: Option<PathBuf>,
    },

    /// Request facts were rejected before reaching the resolver.
    #[error("Invalid facts: {}", join_field_errors(.errors))]
    Validation { errors: Vec<FieldError> },

    /// File system errors while reading profiles or facts.
    #[error("I/O error{}: {source}", location_suffix(.path))]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
}

impl SoraError {
    /// Create a configuration error without a file location.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error attributed to a profile file.
    pub fn configuration_at(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Configuration {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create a validation error from accumulated field errors.
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors }
    }

    /// Shorthand for a validation error on a single field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![FieldError::new(field, message)],
        }
    }

    /// Wrap an I/O failure with the path that was being read.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            path: Some(path.into()),
            source,
        }
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "Configuration",
            Self::Validation { .. } => "Validation",
            Self::Io { .. } => "I/O",
        }
    }

    /// Validation failures are fixed by the caller correcting its facts.
    /// Configuration and I/O failures need an operator.
    pub fn is_user_fixable(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Field errors carried by a validation failure (empty otherwise).
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation { errors } => errors,
            _ => &[],
        }
    }
}

fn location_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
