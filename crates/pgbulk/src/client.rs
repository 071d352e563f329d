//! Connection traits for statement execution.
//!
//! [`GenericClient`] unifies plain connections, transactions and pooled
//! connections so bulk operations accept any of them. [`Transactional`] adds
//! the ability to open a [`TransactionScope`]: a transaction on a plain
//! connection, a savepoint inside an existing one.

use crate::error::{BulkError, BulkResult};
use crate::transaction::TransactionScope;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// A trait that unifies database clients and transactions.
pub trait GenericClient: Send + Sync {
    /// Execute a statement and return the affected row count.
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = BulkResult<u64>> + Send;

    /// Execute one or more parameterless statements (simple protocol).
    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = BulkResult<()>> + Send;

    /// Execute a query and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = BulkResult<Vec<Row>>> + Send;
}

/// A client that can open a transaction scope.
pub trait Transactional: GenericClient {
    /// Begin a transaction, or a savepoint when already inside one.
    fn begin(&mut self) -> impl std::future::Future<Output = BulkResult<TransactionScope<'_>>> + Send;
}

impl GenericClient for tokio_postgres::Client {
    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<u64> {
        tokio_postgres::Client::execute(self, sql, params)
            .await
            .map_err(BulkError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> BulkResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(BulkError::from_db_error)
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<Vec<Row>> {
        tokio_postgres::Client::query(self, sql, params)
            .await
            .map_err(BulkError::from_db_error)
    }
}

impl Transactional for tokio_postgres::Client {
    async fn begin(&mut self) -> BulkResult<TransactionScope<'_>> {
        let tx = self.transaction().await.map_err(BulkError::from_db_error)?;
        Ok(TransactionScope::new(tx, false))
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<u64> {
        tokio_postgres::Transaction::execute(self, sql, params)
            .await
            .map_err(BulkError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> BulkResult<()> {
        tokio_postgres::Transaction::batch_execute(self, sql)
            .await
            .map_err(BulkError::from_db_error)
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<Vec<Row>> {
        tokio_postgres::Transaction::query(self, sql, params)
            .await
            .map_err(BulkError::from_db_error)
    }
}

impl Transactional for tokio_postgres::Transaction<'_> {
    async fn begin(&mut self) -> BulkResult<TransactionScope<'_>> {
        // A nested tokio-postgres transaction is a savepoint.
        let sp = self.transaction().await.map_err(BulkError::from_db_error)?;
        Ok(TransactionScope::new(sp, true))
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<u64> {
        let client: &tokio_postgres::Client = self;
        GenericClient::execute(client, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> BulkResult<()> {
        let client: &tokio_postgres::Client = self;
        GenericClient::batch_execute(client, sql).await
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<Vec<Row>> {
        let client: &tokio_postgres::Client = self;
        GenericClient::query(client, sql, params).await
    }
}

#[cfg(feature = "pool")]
impl Transactional for deadpool_postgres::Client {
    async fn begin(&mut self) -> BulkResult<TransactionScope<'_>> {
        // Go through DerefMut to the driver client so the scope wraps a
        // tokio_postgres::Transaction rather than the deadpool wrapper.
        let client: &mut tokio_postgres::Client = self;
        Transactional::begin(client).await
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Transaction<'_> {
    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<u64> {
        let tx: &tokio_postgres::Transaction<'_> = self;
        GenericClient::execute(tx, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> BulkResult<()> {
        let tx: &tokio_postgres::Transaction<'_> = self;
        GenericClient::batch_execute(tx, sql).await
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<Vec<Row>> {
        let tx: &tokio_postgres::Transaction<'_> = self;
        GenericClient::query(tx, sql, params).await
    }
}

#[cfg(feature = "pool")]
impl Transactional for deadpool_postgres::Transaction<'_> {
    async fn begin(&mut self) -> BulkResult<TransactionScope<'_>> {
        let tx: &mut tokio_postgres::Transaction<'_> = std::ops::DerefMut::deref_mut(self);
        Transactional::begin(tx).await
    }
}
