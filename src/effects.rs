//! Validation helpers built on stillwater's `Validation` type.
//!
//! Fact checking must report every bad field of a request, not just the first
//! one. These aliases and helpers accumulate [`FieldError`]s and convert the
//! outcome into the crate's fail-fast [`Result`](crate::errors::Result) at the
//! boundary.
//!
//! # Example
//!
//! ```rust
//! use soracalc::effects::{combine_validations, field_failure, run_validation, validation_success};
//!
//! let checks = vec![
//!     validation_success(()),
//!     field_failure("altitude", "must be >= 0"),
//!     field_failure("mass", "must be > 0"),
//! ];
//! let err = run_validation(combine_validations(checks)).unwrap_err();
//! assert_eq!(err.field_errors().len(), 2);
//! ```

use crate::errors::{FieldError, SoraError};
use stillwater::{NonEmptyVec, Validation};

/// Validation result accumulating field-level errors.
pub type FactValidation<T> = Validation<T, NonEmptyVec<FieldError>>;

/// Create a successful validation result.
pub fn validation_success<T>(value: T) -> FactValidation<T> {
    Validation::Success(value)
}

/// Create a failed validation result with a single field error.
pub fn field_failure<T>(field: impl Into<String>, message: impl Into<String>) -> FactValidation<T> {
    Validation::Failure(NonEmptyVec::new(FieldError::new(field, message), Vec::new()))
}

/// Combine multiple validations, accumulating all errors.
///
/// If any validation fails, every error from every failed validation is kept
/// in input order. If all succeed, the successes are collected.
pub fn combine_validations<T>(validations: Vec<FactValidation<T>>) -> FactValidation<Vec<T>> {
    let mut successes = Vec::new();
    let mut failures: Vec<FieldError> = Vec::new();

    for v in validations {
        match v {
            Validation::Success(value) => successes.push(value),
            Validation::Failure(errors) => failures.extend(errors.into_vec()),
        }
    }

    match NonEmptyVec::from_vec(failures) {
        Some(errors) => Validation::Failure(errors),
        None => Validation::Success(successes),
    }
}

/// Map a function over a validation's success value.
///
/// If the validation is successful, applies the function.
/// If it failed, passes through the errors unchanged.
pub fn validation_map<T, U, F>(validation: FactValidation<T>, f: F) -> FactValidation<U>
where
    F: FnOnce(T) -> U,
{
    match validation {
        Validation::Success(value) => Validation::Success(f(value)),
        Validation::Failure(errors) => Validation::Failure(errors),
    }
}

/// Convert an accumulated validation into the fail-fast `Result` API.
pub fn run_validation<T>(validation: FactValidation<T>) -> Result<T, SoraError> {
    match validation {
        Validation::Success(value) => Ok(value),
        Validation::Failure(errors) => Err(SoraError::validation(errors.into_vec())),
    }
}
