//! Error types for model parsing and validation.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing or validating model values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A required field was blank.
    #[error("{field} is required")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// A string did not name a known variant.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// Kind of value being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A time slot was not in `HH:MM` form.
    #[error("invalid time slot: {0}")]
    InvalidTimeSlot(String),

    /// A suggested action payload could not be decoded.
    #[error("invalid action payload: {0}")]
    InvalidAction(String),
}

/// Rejects blank (empty or whitespace-only) values.
pub(crate) fn require(field: &'static str, value: &str) -> ModelResult<()> {
    if value.trim().is_empty() {
        Err(ModelError::MissingField { field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_blank() {
        assert_eq!(
            require("suburb", "   "),
            Err(ModelError::MissingField { field: "suburb" })
        );
        assert!(require("suburb", "Surry Hills").is_ok());
    }

    #[test]
    fn error_display() {
        let err = ModelError::UnknownVariant {
            kind: "category",
            value: "cat_sitting".into(),
        };
        assert_eq!(err.to_string(), "unknown category: cat_sitting");
    }
}
