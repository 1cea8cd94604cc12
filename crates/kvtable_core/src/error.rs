//! Error types for kvtable core.

use kvtable_engine::EngineError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in kvtable core operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// An argument was rejected before any engine request was issued.
    #[error("validation error: {message}")]
    Validation {
        /// What was wrong.
        message: String,
    },

    /// The table declares no index with this name.
    #[error("unknown index '{index}' on table '{store}'")]
    UnknownIndex {
        /// Store of the table.
        store: String,
        /// Requested index name.
        index: String,
    },

    /// The engine rejected a request.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A record could not be converted to or from a typed value.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The operation is not valid for this object.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the engine error, if the engine rejected the request.
    #[must_use]
    pub fn engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if the transaction had already finished.
    #[must_use]
    pub fn is_transaction_finished(&self) -> bool {
        self.engine().is_some_and(EngineError::is_transaction_finished)
    }

    /// Returns true if a unique index rejected the write.
    #[must_use]
    pub fn is_constraint(&self) -> bool {
        self.engine().is_some_and(EngineError::is_constraint)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvtable_engine::TransactionId;

    #[test]
    fn engine_errors_pass_through() {
        let err: CoreError = EngineError::TransactionFinished {
            id: TransactionId::new(3),
        }
        .into();
        assert!(err.is_transaction_finished());
        assert!(!err.is_constraint());
        assert_eq!(err.to_string(), "engine error: transaction txn:3 has already finished");
    }

    #[test]
    fn validation_message() {
        let err = CoreError::validation("key must not be NaN");
        assert_eq!(err.to_string(), "validation error: key must not be NaN");
        assert!(err.engine().is_none());
    }
}
