//! Validation capability for candidate values
//!
//! Validators run in registration order on every `set` (including the set
//! performed by a rollback). The first failure aborts the mutation.

use std::fmt;
use std::ops::RangeInclusive;

use thiserror::Error;

/// Reason a validator rejected a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    /// Create a validation error with the given reason
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The reason reported by the validator
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Trait for validators that approve or reject candidate values
///
/// Implementations must not call back into `set`/`rollback` on the variable
/// being validated.
pub trait Validator<T>: Send + Sync {
    /// Validate a candidate value
    fn validate(&self, value: &T) -> Result<(), ValidationError>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(&T) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, value: &T) -> Result<(), ValidationError> {
        self(value)
    }
}

/// Inclusive range validator
pub struct RangeValidator<T> {
    range: RangeInclusive<T>,
}

impl<T> RangeValidator<T> {
    /// Accept values in `min..=max`
    pub fn new(min: T, max: T) -> Self {
        Self { range: min..=max }
    }
}

impl<T> Validator<T> for RangeValidator<T>
where
    T: PartialOrd + fmt::Debug + Send + Sync,
{
    fn validate(&self, value: &T) -> Result<(), ValidationError> {
        if !self.range.contains(value) {
            return Err(ValidationError::new(format!(
                "{:?} is outside {:?}",
                value, self.range
            )));
        }
        Ok(())
    }
}

/// Rejects blank strings
pub struct NotEmptyValidator;

impl Validator<String> for NotEmptyValidator {
    fn validate(&self, value: &String) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("value cannot be empty"));
        }
        Ok(())
    }
}

/// Boolean predicate paired with a fixed rejection message
pub struct PredicateValidator<F> {
    predicate: F,
    message: String,
}

impl<F> PredicateValidator<F> {
    /// Create a validator that accepts values for which `predicate` holds
    pub fn new(predicate: F, message: impl Into<String>) -> Self {
        Self {
            predicate,
            message: message.into(),
        }
    }
}

impl<T, F> Validator<T> for PredicateValidator<F>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn validate(&self, value: &T) -> Result<(), ValidationError> {
        if (self.predicate)(value) {
            Ok(())
        } else {
            Err(ValidationError::new(self.message.clone()))
        }
    }
}
