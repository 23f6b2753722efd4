//! Error types for the formulation engine.
//!
//! Configuration and validation errors are raised before anything is handed to a solver. A
//! [`ModelError::Formulation`] indicates a defect in the engine itself and should never occur
//! for valid input. Infeasibility and timeouts are *not* errors: they are reported through
//! [`SolveStatus`](crate::optimisation::SolveStatus).
use thiserror::Error;

/// An error raised while preparing or solving a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Invalid aggregation, discounting or solver settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Referential or missing-parameter issues in input entities
    #[error("Validation error for {entity}: {message}")]
    Validation {
        /// The entity at fault (e.g. a technology or node ID, possibly with a period)
        entity: String,
        /// What is wrong with it
        message: String,
    },

    /// Internal inconsistency in variable or constraint indexing
    #[error("Formulation error: {0}")]
    Formulation(String),

    /// The solver backend failed without producing a status
    #[error("Solver error: {0}")]
    Solver(String),
}

impl ModelError {
    /// Create a new [`ModelError::Configuration`]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new [`ModelError::Validation`] naming the offending entity
    pub fn validation<E: ToString, S: Into<String>>(entity: E, message: S) -> Self {
        Self::Validation {
            entity: entity.to_string(),
            message: message.into(),
        }
    }

    /// Create a new [`ModelError::Formulation`]
    pub fn formulation<S: Into<String>>(message: S) -> Self {
        Self::Formulation(message.into())
    }
}

/// Convenience alias for results in the formulation engine
pub type ModelResult<T> = Result<T, ModelError>;

/// Return early with a [`ModelError::Configuration`] if a condition is not met
macro_rules! ensure_config {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::ModelError::configuration(format!($($arg)+)));
        }
    };
}
pub(crate) use ensure_config;

/// Return early with a [`ModelError::Validation`] if a condition is not met
macro_rules! ensure_valid {
    ($cond:expr, $entity:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::ModelError::validation($entity, format!($($arg)+)));
        }
    };
}
pub(crate) use ensure_valid;
