//! Transaction handles.

use crate::error::CoreResult;
use kvtable_engine::{EngineTransaction, TransactionId, TransactionMode, TransactionState};
use std::fmt;
use std::sync::Arc;

/// A shared handle to an engine transaction.
///
/// Clones refer to the same transaction. Pass one to several calls to make
/// them commit or abort together; the engine commits it on its own once the
/// task stops issuing requests.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<dyn EngineTransaction>,
}

impl Transaction {
    /// Wraps an engine transaction.
    pub fn from_engine(inner: Arc<dyn EngineTransaction>) -> Self {
        Self { inner }
    }

    /// Transaction identifier.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id()
    }

    /// Access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.inner.mode()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.inner.state()
    }

    /// Returns true while requests are accepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Stores in scope.
    #[must_use]
    pub fn scope(&self) -> Vec<String> {
        self.inner.scope()
    }

    /// Commits without waiting for the task to go idle.
    pub fn commit(&self) -> CoreResult<()> {
        Ok(self.inner.commit()?)
    }

    /// Aborts, rolling back every write made through this transaction.
    pub fn abort(&self) -> CoreResult<()> {
        Ok(self.inner.abort()?)
    }

    pub(crate) fn engine(&self) -> &dyn EngineTransaction {
        self.inner.as_ref()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("mode", &self.mode())
            .field("state", &self.state())
            .finish()
    }
}
