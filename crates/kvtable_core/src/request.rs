//! Turning engine requests into core results.

use crate::database::Database;
use crate::error::CoreResult;
use crate::transaction::Transaction;
use kvtable_engine::{Request, TransactionMode};
use tracing::debug;

/// Awaits one engine request, surfacing its error unchanged.
pub async fn settle<T>(op: &'static str, request: Request<T>) -> CoreResult<T> {
    request.await.map_err(|e| {
        debug!(op, error = %e, "request failed");
        e.into()
    })
}

/// Reuses `tx`, or opens an implicit transaction over `store` for one call.
pub(crate) fn exec(
    db: &Database,
    store: &str,
    tx: Option<&Transaction>,
    mode: TransactionMode,
) -> CoreResult<Transaction> {
    match tx {
        Some(tx) => Ok(tx.clone()),
        None => db.transaction(&[store], mode),
    }
}
