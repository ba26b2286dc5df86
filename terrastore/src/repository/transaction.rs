//! Connection handles
//!
//! A repository runs its statements either on the pool or inside a shared
//! transaction. [`DbConnection`] makes the difference explicit, and
//! [`TransactionHandle`] lets several repositories join one unit of work.
//!
//! A transaction is a single connection, so statements issued through a
//! handle are serialised by an async mutex. The lock is held for one
//! statement at a time.

use std::fmt;
use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
use super::translate::translate_error;

type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// A shared, explicitly finished database transaction
///
/// Cloning the handle shares the same transaction. After [`commit`] or
/// [`rollback`] the handle is inactive and every statement issued through it
/// fails with `Validation`.
///
/// [`commit`]: TransactionHandle::commit
/// [`rollback`]: TransactionHandle::rollback
#[derive(Clone)]
pub struct TransactionHandle {
    inner: SharedTransaction,
}

impl TransactionHandle {
    /// Begin a transaction on `pool`
    pub async fn begin(pool: &PgPool) -> RepositoryResult<Self> {
        let transaction = pool
            .begin()
            .await
            .map_err(|e| translate_error(e, RepositoryOperation::Transaction, "transaction"))?;
        debug!("Transaction started");
        Ok(Self {
            inner: Arc::new(Mutex::new(Some(transaction))),
        })
    }

    /// Commit the transaction
    pub async fn commit(&self) -> RepositoryResult<()> {
        let transaction = self.inner.lock().await.take().ok_or_else(inactive)?;
        transaction
            .commit()
            .await
            .map_err(|e| translate_error(e, RepositoryOperation::Transaction, "transaction"))?;
        debug!("Transaction committed");
        Ok(())
    }

    /// Roll the transaction back
    ///
    /// Rolling back a finished transaction is a no-op.
    pub async fn rollback(&self) -> RepositoryResult<()> {
        let Some(transaction) = self.inner.lock().await.take() else {
            return Ok(());
        };
        transaction
            .rollback()
            .await
            .map_err(|e| translate_error(e, RepositoryOperation::Transaction, "transaction"))?;
        debug!("Transaction rolled back");
        Ok(())
    }

    /// Whether the transaction has not been committed or rolled back yet
    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Whether two handles share the same transaction
    pub fn same_transaction(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("shared_with", &Arc::strong_count(&self.inner))
            .finish()
    }
}

/// Where a repository sends its statements
#[derive(Debug, Clone)]
pub enum DbConnection {
    /// A fresh pooled connection per statement
    Pool(PgPool),
    /// A shared, already-open transaction
    Transaction(TransactionHandle),
}

impl DbConnection {
    /// Whether statements run inside a shared transaction
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }

    /// Acquire a connection for one statement
    pub(crate) async fn acquire(&self) -> RepositoryResult<ConnectionGuard<'_>> {
        match self {
            Self::Pool(pool) => pool
                .acquire()
                .await
                .map(ConnectionGuard::Pooled)
                .map_err(|e| translate_error(e, RepositoryOperation::Transaction, "connection")),
            Self::Transaction(handle) => {
                Ok(ConnectionGuard::Transaction(handle.inner.lock().await))
            }
        }
    }
}

impl From<PgPool> for DbConnection {
    fn from(pool: PgPool) -> Self {
        Self::Pool(pool)
    }
}

impl From<TransactionHandle> for DbConnection {
    fn from(handle: TransactionHandle) -> Self {
        Self::Transaction(handle)
    }
}

/// A connection borrowed for the duration of one statement
pub(crate) enum ConnectionGuard<'a> {
    Pooled(PoolConnection<Postgres>),
    Transaction(MutexGuard<'a, Option<Transaction<'static, Postgres>>>),
}

impl ConnectionGuard<'_> {
    pub(crate) fn as_mut(&mut self) -> RepositoryResult<&mut PgConnection> {
        match self {
            Self::Pooled(connection) => Ok(&mut **connection),
            Self::Transaction(guard) => Option::as_mut(&mut **guard)
                .map(|transaction| &mut **transaction)
                .ok_or_else(inactive),
        }
    }
}

fn inactive() -> RepositoryError {
    RepositoryError::new(
        RepositoryOperation::Transaction,
        RepositoryErrorKind::Validation,
        "Transaction is no longer active",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_error() {
        let error = inactive();
        assert_eq!(error.operation, RepositoryOperation::Transaction);
        assert_eq!(error.kind, RepositoryErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_pool_connection_is_not_transaction() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/terrastore")
            .unwrap();
        let connection = DbConnection::from(pool);
        assert!(!connection.is_transaction());
    }
}
