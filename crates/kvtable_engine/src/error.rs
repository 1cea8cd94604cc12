//! Error types for engine operations.

use crate::types::TransactionId;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by a storage engine.
///
/// These are surfaced verbatim to callers of the query layer; the table layer
/// turns them into boolean or per-item failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A unique index already maps the key to another record.
    #[error("constraint violation: index '{index}' on store '{store}' already contains {key}")]
    Constraint {
        /// Store owning the index.
        store: String,
        /// Name of the unique index.
        index: String,
        /// Offending index key, rendered for display.
        key: String,
    },

    /// The transaction has committed or aborted.
    #[error("transaction {id} has already finished")]
    TransactionFinished {
        /// The finished transaction.
        id: TransactionId,
    },

    /// A write was issued against a read-only transaction.
    #[error("transaction {id} is read-only")]
    ReadOnly {
        /// The read-only transaction.
        id: TransactionId,
    },

    /// The store does not exist.
    #[error("object store not found: {name}")]
    StoreNotFound {
        /// Name of the store.
        name: String,
    },

    /// The index does not exist on the store.
    #[error("index '{index}' not found on store '{store}'")]
    IndexNotFound {
        /// Store that was searched.
        store: String,
        /// Name of the index.
        index: String,
    },

    /// The store is not part of the transaction scope.
    #[error("store '{store}' is not in the scope of transaction {id}")]
    NotInScope {
        /// The transaction.
        id: TransactionId,
        /// Store outside the scope.
        store: String,
    },

    /// A store or index with the same name already exists.
    #[error("already exists: {name}")]
    AlreadyExists {
        /// Name that collided.
        name: String,
    },

    /// Other connections prevent the operation.
    #[error("blocked: {message}")]
    Blocked {
        /// Description of what is blocking.
        message: String,
    },

    /// The requested version cannot be opened.
    #[error("version error: requested {requested}, current {current}")]
    Version {
        /// Version asked for.
        requested: u64,
        /// Version on record.
        current: u64,
    },

    /// A key or key range is malformed.
    #[error("data error: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// The operation is not allowed in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the state is invalid.
        message: String,
    },

    /// A record could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The upgrade callback failed, the schema change was discarded.
    #[error("upgrade aborted: {message}")]
    UpgradeAborted {
        /// Reason reported by the callback.
        message: String,
    },

    /// The engine dropped a request without settling it.
    #[error("request dropped before it settled")]
    RequestDropped,
}

impl EngineError {
    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a blocked error.
    pub fn blocked(message: impl Into<String>) -> Self {
        Self::Blocked {
            message: message.into(),
        }
    }

    /// Returns true if the error reports a finished transaction.
    #[must_use]
    pub fn is_transaction_finished(&self) -> bool {
        matches!(self, Self::TransactionFinished { .. })
    }

    /// Returns true if the error reports a unique constraint violation.
    #[must_use]
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }
}
