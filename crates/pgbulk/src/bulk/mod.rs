//! Bulk INSERT, join-based UPDATE and join-based DELETE.
//!
//! | Operation | Statement |
//! |-----------|-----------|
//! | [`Bulk::bulk_insert`] | `INSERT INTO t (c1, c2) VALUES ($1, $2), ($3, $4), ...` |
//! | [`Bulk::bulk_delete`] | `DELETE FROM t AS ut1 USING (<query>) AS jt1 WHERE ut1.pk = jt1.pk` |
//! | [`Bulk::bulk_update`] | `UPDATE t AS ut1 SET c = $1, ... FROM (<query>) AS jt1 WHERE ut1.pk = jt1.pk` |
//!
//! Delete and update join the target table against the compiled row-set
//! query on the primary key, so they touch exactly the rows the query returns
//! however complex its filter is.
//!
//! # Example
//!
//! ```ignore
//! use pgbulk::{Bulk, BulkExt, MemberInit, Query, field};
//!
//! // One multi-row INSERT in a transaction.
//! client.bulk_insert(&categories, false).await?;
//!
//! // UPDATE ... SET name = CAST(ut1.id AS text) || '-Update'
//! let updater = MemberInit::new("Category")
//!     .set("name", field("id").to_text().concat("-Update"));
//! client
//!     .bulk_update(Query::<Category>::all().filter(field("id").ge(500)), &updater.into(), false)
//!     .await?;
//!
//! // DELETE ... USING (SELECT ... WHERE c.id < 500)
//! client.bulk_delete::<Category>(field("id").lt(500), false).await?;
//! ```

mod delete;
mod insert;
mod update;

#[cfg(test)]
mod tests;

use crate::client::Transactional;
use crate::compiler::{PgQueryCompiler, QueryCompiler};
use crate::config::BulkConfig;
use crate::error::{BulkError, BulkResult};
use crate::executor::execute;
use crate::expr::Expr;
use crate::meta::{Entity, EntityMeta};
use crate::query::{Query, QueryParts};
use crate::statement::BulkStatement;

/// Entry point for bulk operations.
///
/// Holds a query compiler and configuration; no other state survives a call.
/// Metadata is resolved through [`Entity::meta`] on every operation.
#[derive(Debug, Clone, Default)]
pub struct Bulk<Q = PgQueryCompiler> {
    compiler: Q,
    config: BulkConfig,
}

impl Bulk {
    /// Default compiler and configuration.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<Q: QueryCompiler> Bulk<Q> {
    /// Use a custom query compiler.
    pub fn with_compiler(compiler: Q) -> Self {
        Self {
            compiler,
            config: BulkConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BulkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    pub fn compiler(&self) -> &Q {
        &self.compiler
    }

    fn resolve<E: Entity>(&self) -> BulkResult<EntityMeta> {
        self.config.validate()?;
        let meta = E::meta()?;
        meta.validate()?;
        Ok(meta)
    }

    fn entity_shaped(meta: &EntityMeta, parts: &QueryParts) -> BulkResult<()> {
        if parts.is_entity_shaped() {
            return Ok(());
        }
        Err(BulkError::unsupported(format!(
            "query over '{}' must select whole rows; a projected query cannot drive a bulk statement",
            meta.name()
        )))
    }

    /// Build the INSERT for `rows`; `None` when there is nothing to insert.
    pub fn insert_statement<E: Entity>(&self, rows: &[E]) -> BulkResult<Option<BulkStatement>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let meta = self.resolve::<E>()?;
        insert::build_insert(&meta, rows, &self.config)
    }

    /// Build the join-based DELETE for the rows `query` returns.
    pub fn delete_statement<E: Entity>(&self, query: impl Into<Query<E>>) -> BulkResult<BulkStatement> {
        let parts = query.into().into_parts();
        let meta = self.resolve::<E>()?;
        Self::entity_shaped(&meta, &parts)?;
        let compiled = self.compiler.compile(&meta, &parts)?;
        delete::build_delete(&meta, &compiled, &self.config)
    }

    /// Build the join-based UPDATE applying `updater` to the rows `query` returns.
    pub fn update_statement<E: Entity>(
        &self,
        query: impl Into<Query<E>>,
        updater: &Expr,
    ) -> BulkResult<BulkStatement> {
        let parts = query.into().into_parts();
        let meta = self.resolve::<E>()?;
        Self::entity_shaped(&meta, &parts)?;
        update::build_update(&meta, &self.compiler, &parts, updater, &self.config)
    }

    /// Insert `rows` with one multi-row INSERT.
    ///
    /// Empty input returns 0 without contacting the store.
    pub async fn bulk_insert<E, C>(
        &self,
        conn: &mut C,
        rows: &[E],
        disable_transaction: bool,
    ) -> BulkResult<u64>
    where
        E: Entity,
        C: Transactional,
    {
        let Some(statement) = self.insert_statement(rows)? else {
            return Ok(0);
        };
        execute(conn, &statement, disable_transaction, &self.config).await
    }

    /// Delete the rows `query` returns.
    pub async fn bulk_delete<E, C>(
        &self,
        conn: &mut C,
        query: impl Into<Query<E>>,
        disable_transaction: bool,
    ) -> BulkResult<u64>
    where
        E: Entity,
        C: Transactional,
    {
        let statement = self.delete_statement(query)?;
        execute(conn, &statement, disable_transaction, &self.config).await
    }

    /// Apply `updater` (a member-initializer) to the rows `query` returns.
    pub async fn bulk_update<E, C>(
        &self,
        conn: &mut C,
        query: impl Into<Query<E>>,
        updater: &Expr,
        disable_transaction: bool,
    ) -> BulkResult<u64>
    where
        E: Entity,
        C: Transactional,
    {
        let statement = self.update_statement(query, updater)?;
        execute(conn, &statement, disable_transaction, &self.config).await
    }
}

/// Bulk operations directly on a connection, with the default [`Bulk`].
pub trait BulkExt: Transactional + Sized {
    fn bulk_insert<E: Entity>(
        &mut self,
        rows: &[E],
        disable_transaction: bool,
    ) -> impl std::future::Future<Output = BulkResult<u64>> + Send;

    fn bulk_delete<E: Entity>(
        &mut self,
        query: impl Into<Query<E>> + Send,
        disable_transaction: bool,
    ) -> impl std::future::Future<Output = BulkResult<u64>> + Send;

    fn bulk_update<E: Entity>(
        &mut self,
        query: impl Into<Query<E>> + Send,
        updater: &Expr,
        disable_transaction: bool,
    ) -> impl std::future::Future<Output = BulkResult<u64>> + Send;
}

impl<C: Transactional> BulkExt for C {
    async fn bulk_insert<E: Entity>(&mut self, rows: &[E], disable_transaction: bool) -> BulkResult<u64> {
        let bulk = Bulk::new();
        bulk.bulk_insert::<E, _>(self, rows, disable_transaction).await
    }

    async fn bulk_delete<E: Entity>(
        &mut self,
        query: impl Into<Query<E>> + Send,
        disable_transaction: bool,
    ) -> BulkResult<u64> {
        let bulk = Bulk::new();
        bulk.bulk_delete::<E, _>(self, query, disable_transaction).await
    }

    async fn bulk_update<E: Entity>(
        &mut self,
        query: impl Into<Query<E>> + Send,
        updater: &Expr,
        disable_transaction: bool,
    ) -> BulkResult<u64> {
        let bulk = Bulk::new();
        bulk.bulk_update::<E, _>(self, query, updater, disable_transaction).await
    }
}
