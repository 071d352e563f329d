//! # pgbulk
//!
//! Bulk INSERT and join-based UPDATE/DELETE for PostgreSQL, synthesized from
//! typed expression trees and entity mapping metadata.
//!
//! ## Features
//!
//! - **One statement per operation**: any number of rows is inserted,
//!   updated or deleted by a single SQL statement
//! - **Query-driven**: UPDATE/DELETE join the target table against the
//!   compiled row-set query on the primary key
//! - **Expression updaters**: `new Entity { member = expr }` initializers,
//!   with row-independent parts evaluated in-process and bound as parameters
//!   and row-derived parts compiled and inlined as SQL
//! - **Transaction-friendly**: runs on a client, a transaction or a pooled
//!   connection, inside its own transaction scope unless disabled
//!
//! ## Example
//!
//! ```ignore
//! use pgbulk::prelude::*;
//!
//! struct Category { id: i64, name: String }
//!
//! impl Entity for Category {
//!     fn meta() -> BulkResult<EntityMeta> {
//!         Ok(EntityMeta::new("Category", "categories")?
//!             .column(ColumnMeta::new("id", "id")?.key())
//!             .column(ColumnMeta::new("name", "name")?))
//!     }
//!
//!     fn get(&self, member: &str) -> Option<Value> {
//!         match member {
//!             "id" => Some(self.id.into()),
//!             "name" => Some(self.name.as_str().into()),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! client.bulk_insert(&rows, false).await?;
//!
//! let updater = MemberInit::new("Category")
//!     .set("name", field("id").to_text().concat("-Update"));
//! client
//!     .bulk_update::<Category>(field("id").ge(500), &updater.into(), false)
//!     .await?;
//!
//! client.bulk_delete::<Category>(field("id").lt(500), false).await?;
//! ```

pub mod binder;
pub mod bulk;
pub mod client;
pub mod compiler;
pub mod config;
pub mod decompose;
pub mod error;
pub mod eval;
pub mod executor;
pub mod expr;
pub mod ident;
pub mod meta;
pub mod prelude;
pub mod query;
pub mod statement;
pub mod transaction;
pub mod value;

pub use binder::{Assignment, AssignmentValue, bind_updater};
pub use bulk::{Bulk, BulkExt};
pub use client::{GenericClient, Transactional};
pub use compiler::{PgQueryCompiler, QueryCompiler};
pub use config::BulkConfig;
pub use decompose::{
    DerivedQuery, Projection, SessionSetting, decompose_projection, merge_prelude, split_prelude,
};
pub use error::{BulkError, BulkResult};
pub use eval::evaluate;
pub use expr::{
    BinaryOp, Expr, Func, MemberBinding, MemberInit, UnaryOp, captured, field, lit, null,
};
pub use ident::{Ident, QualifiedName};
pub use meta::{ColumnMeta, Entity, EntityMeta, ValueConverter, ValueGenerated};
pub use query::{OrderBy, Query, QueryParts};
pub use statement::{BulkStatement, StatementKind};
pub use transaction::TransactionScope;
pub use value::Value;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
