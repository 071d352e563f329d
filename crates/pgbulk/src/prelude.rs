//! Convenient imports for typical `pgbulk` usage.
//!
//! ```ignore
//! use pgbulk::prelude::*;
//! ```

pub use crate::{
    Bulk, BulkConfig, BulkError, BulkExt, BulkResult, ColumnMeta, Entity, EntityMeta, Expr,
    GenericClient, MemberInit, Query, Transactional, Value, ValueGenerated, captured, field, lit,
    null,
};

#[cfg(feature = "pool")]
pub use crate::{create_pool, create_pool_with_config};
