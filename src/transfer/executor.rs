//! Transaction Executor
//!
//! Runs a unit of work inside exactly one store transaction.

use futures::future::BoxFuture;

use crate::error::{LedgerError, LedgerResult};
use crate::store::{Store, TxHandle};

/// Opens a transaction, runs the unit of work against it, then commits or
/// rolls back.
#[derive(Debug, Clone)]
pub struct TxExecutor<S> {
    store: S,
}

impl<S: Store> TxExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Run `work` once against a fresh transaction.
    ///
    /// - begin failure: returned as is, `work` never runs
    /// - `work` succeeds: commit, a commit failure is `CommitFailed`
    /// - `work` fails: rollback, the original error is returned; if rollback
    ///   fails too, both are returned as `RollbackFailed`
    ///
    /// If the returned future is dropped mid-flight the transaction handle is
    /// dropped with it, which discards the transaction.
    pub async fn run<T, F>(&self, work: F) -> LedgerResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, LedgerResult<T>> + Send,
    {
        let mut tx = self.store.begin().await?;

        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(LedgerError::commit_failed)?;
                Ok(value)
            }
            Err(err) => match tx.rollback().await {
                Ok(()) => {
                    tracing::warn!("Transaction rolled back: {}", err);
                    Err(err)
                }
                Err(rollback_err) => {
                    tracing::error!("Rollback failed after {}: {}", err, rollback_err);
                    Err(LedgerError::rollback_failed(err, rollback_err))
                }
            },
        }
    }
}
