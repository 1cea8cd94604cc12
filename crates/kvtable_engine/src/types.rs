//! Core type definitions shared by engines and their callers.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing per engine and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Reads only; writes fail with `ReadOnly`.
    ReadOnly,
    /// Reads and writes.
    #[default]
    ReadWrite,
}

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and accepts requests.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

impl TransactionState {
    /// Returns true once the transaction can no longer accept requests.
    #[must_use]
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Traversal order of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorDirection {
    /// Ascending, every duplicate visited.
    #[default]
    Next,
    /// Ascending, only the first record of each duplicate key.
    NextUnique,
    /// Descending, every duplicate visited.
    Prev,
    /// Descending, only the first record of each duplicate key.
    PrevUnique,
}

impl CursorDirection {
    /// Returns true for the descending directions.
    #[must_use]
    pub fn is_reverse(self) -> bool {
        matches!(self, Self::Prev | Self::PrevUnique)
    }

    /// Returns true for the directions that skip duplicate keys.
    #[must_use]
    pub fn is_unique(self) -> bool {
        matches!(self, Self::NextUnique | Self::PrevUnique)
    }
}

/// What a read request targets: a store directly or one of its indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// Primary-key semantics.
    Store(String),
    /// Index-key semantics.
    Index {
        /// Store owning the index.
        store: String,
        /// Index name.
        index: String,
    },
}

impl Source {
    /// Returns the store behind this source.
    #[must_use]
    pub fn store_name(&self) -> &str {
        match self {
            Self::Store(name) => name,
            Self::Index { store, .. } => store,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(name) => write!(f, "{name}"),
            Self::Index { store, index } => write!(f, "{store}.{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_flags() {
        assert!(!CursorDirection::Next.is_reverse());
        assert!(CursorDirection::PrevUnique.is_reverse());
        assert!(CursorDirection::PrevUnique.is_unique());
        assert!(!CursorDirection::Prev.is_unique());
        assert_eq!(CursorDirection::default(), CursorDirection::Next);
    }

    #[test]
    fn source_display() {
        assert_eq!(Source::Store("students".into()).to_string(), "students");
        let index = Source::Index {
            store: "students".into(),
            index: "id_time".into(),
        };
        assert_eq!(index.to_string(), "students.id_time");
        assert_eq!(index.store_name(), "students");
    }

    #[test]
    fn finished_states() {
        assert!(!TransactionState::Active.is_finished());
        assert!(TransactionState::Committed.is_finished());
        assert!(TransactionState::Aborted.is_finished());
    }
}
