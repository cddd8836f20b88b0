//! Shared transaction handle.
//!
//! A [`TxHandle`] owns one open `sqlx` transaction behind an async mutex, so a
//! repository bound to it can be cloned freely while statements still run one
//! at a time on the transaction's connection.

use std::sync::Arc;

use sqlx::any::Any;
use sqlx::{AnyConnection, Transaction};
use stowage_data::DataError;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::SqlxErrorExt;

pub(crate) enum TxState {
    Active(Transaction<'static, Any>),
    Committed,
    RolledBack,
}

impl TxState {
    pub(crate) fn connection(&mut self) -> Result<&mut AnyConnection, DataError> {
        match self {
            TxState::Active(tx) => Ok(&mut **tx),
            TxState::Committed | TxState::RolledBack => Err(DataError::TransactionClosed),
        }
    }
}

/// Handle to an open transaction. Clones refer to the same transaction.
///
/// Dropping the last handle of a transaction that was never finished rolls
/// it back.
#[derive(Clone)]
pub struct TxHandle {
    state: Arc<Mutex<TxState>>,
}

impl TxHandle {
    pub(crate) fn new(tx: Transaction<'static, Any>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TxState::Active(tx))),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, TxState> {
        self.state.lock().await
    }

    pub async fn is_active(&self) -> bool {
        matches!(*self.state.lock().await, TxState::Active(_))
    }

    pub async fn commit(&self) -> Result<(), DataError> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, TxState::RolledBack) {
            TxState::Active(tx) => {
                tx.commit().await.map_err(SqlxErrorExt::into_data_error)?;
                *state = TxState::Committed;
                tracing::debug!("transaction committed");
                Ok(())
            }
            finished => {
                *state = finished;
                Err(DataError::TransactionClosed)
            }
        }
    }

    pub async fn rollback(&self) -> Result<(), DataError> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, TxState::RolledBack) {
            TxState::Active(tx) => {
                tx.rollback().await.map_err(SqlxErrorExt::into_data_error)?;
                tracing::debug!("transaction rolled back");
                Ok(())
            }
            finished => {
                *state = finished;
                Err(DataError::TransactionClosed)
            }
        }
    }
}

impl std::fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHandle").finish_non_exhaustive()
    }
}
