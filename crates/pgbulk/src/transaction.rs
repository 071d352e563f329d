//! Scoped transactions for bulk statements.

use crate::client::{GenericClient, Transactional};
use crate::error::{BulkError, BulkResult};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// A transaction (or savepoint) that rolls back unless committed.
///
/// Obtained from [`Transactional::begin`]. Dropping the scope without calling
/// [`commit`](Self::commit) rolls it back; tokio-postgres issues the
/// rollback when the inner transaction is dropped.
pub struct TransactionScope<'a> {
    inner: Option<tokio_postgres::Transaction<'a>>,
    nested: bool,
}

impl<'a> TransactionScope<'a> {
    pub(crate) fn new(inner: tokio_postgres::Transaction<'a>, nested: bool) -> Self {
        Self {
            inner: Some(inner),
            nested,
        }
    }

    /// Whether this scope is a savepoint inside an outer transaction.
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// Commit (or release the savepoint).
    pub async fn commit(mut self) -> BulkResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.commit().await.map_err(BulkError::from_db_error)?;
        }
        Ok(())
    }

    /// Roll back explicitly.
    pub async fn rollback(mut self) -> BulkResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.rollback().await.map_err(BulkError::from_db_error)?;
        }
        Ok(())
    }

    fn tx(&self) -> BulkResult<&tokio_postgres::Transaction<'a>> {
        self.inner
            .as_ref()
            .ok_or_else(|| BulkError::Other("transaction scope already finished".to_string()))
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                target: "pgbulk.exec",
                nested = self.nested,
                "transaction scope dropped without commit; rolling back"
            );
        }
    }
}

impl GenericClient for TransactionScope<'_> {
    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<u64> {
        GenericClient::execute(self.tx()?, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> BulkResult<()> {
        GenericClient::batch_execute(self.tx()?, sql).await
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<Vec<Row>> {
        GenericClient::query(self.tx()?, sql, params).await
    }
}

impl Transactional for TransactionScope<'_> {
    async fn begin(&mut self) -> BulkResult<TransactionScope<'_>> {
        let tx = self
            .inner
            .as_mut()
            .ok_or_else(|| BulkError::Other("transaction scope already finished".to_string()))?;
        Transactional::begin(tx).await
    }
}
