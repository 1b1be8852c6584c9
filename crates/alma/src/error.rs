//! Error types for tracked variables and registries

use thiserror::Error;

use crate::validator::ValidationError;

/// Result type used throughout alma
pub type Result<T> = std::result::Result<T, AlmaError>;

/// Errors that can occur when mutating variables or managing registries
#[derive(Debug, Error)]
pub enum AlmaError {
    /// Mutation attempted while the variable is frozen
    #[error("Variable '{name}' is frozen and cannot be mutated")]
    Frozen {
        /// Name of the frozen variable
        name: String,
    },

    /// A registered validator rejected the candidate value
    #[error("Validation failed for variable '{name}': {source}")]
    Validation {
        /// Name of the variable being set
        name: String,
        /// Reason reported by the validator
        #[source]
        source: ValidationError,
    },

    /// Rollback index outside the recorded history
    #[error("Rollback index {index} is out of range [0, {}] for variable '{name}'", .len.saturating_sub(1))]
    Rollback {
        /// Name of the variable
        name: String,
        /// Requested index
        index: isize,
        /// History length observed when the rollback started
        len: usize,
    },

    /// Name already registered and overwrite was not requested
    #[error("Variable '{0}' is already registered. Use overwrite to replace it")]
    DuplicateName(String),

    /// No variable registered under the name
    #[error("No variable named '{0}' is registered")]
    NotFound(String),

    /// Variable exists but holds a different value type
    #[error("Variable '{name}' holds {actual}, not {expected}")]
    TypeMismatch {
        /// Name of the variable
        name: String,
        /// Type requested by the caller
        expected: &'static str,
        /// Type the variable was registered with
        actual: &'static str,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl AlmaError {
    /// Create a new Frozen error for the named variable
    pub fn frozen(name: impl Into<String>) -> Self {
        Self::Frozen { name: name.into() }
    }

    /// Create a new Validation error wrapping the validator's reason
    pub fn validation(name: impl Into<String>, source: ValidationError) -> Self {
        Self::Validation {
            name: name.into(),
            source,
        }
    }

    /// Create a new Rollback error
    pub fn rollback(name: impl Into<String>, index: isize, len: usize) -> Self {
        Self::Rollback {
            name: name.into(),
            index,
            len,
        }
    }

    /// Create a new DuplicateName error
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    /// Create a new NotFound error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a new TypeMismatch error
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_message_reports_valid_range() {
        let err = AlmaError::rollback("score", 7, 4);
        assert_eq!(
            err.to_string(),
            "Rollback index 7 is out of range [0, 3] for variable 'score'"
        );
    }

    #[test]
    fn test_validation_error_keeps_reason() {
        let err = AlmaError::validation("age", ValidationError::new("-1 is negative"));
        assert!(err.to_string().contains("-1 is negative"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_registry_errors_name_the_variable() {
        assert!(AlmaError::duplicate_name("x").to_string().contains("'x'"));
        assert!(AlmaError::not_found("missing").to_string().contains("'missing'"));
    }

    #[test]
    fn test_type_mismatch_names_both_types() {
        let err = AlmaError::type_mismatch("port", "alloc::string::String", "u16");
        assert_eq!(
            err.to_string(),
            "Variable 'port' holds u16, not alloc::string::String"
        );
    }
}
