//! Row-set descriptions passed to delete and update.
//!
//! A [`Query<E>`] carries a filter, ordering, limit/offset and an optional
//! single-column projection. It is inert data; the
//! [`QueryCompiler`](crate::QueryCompiler) turns it into SQL text.

use crate::expr::Expr;
use std::fmt;
use std::marker::PhantomData;

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

/// The untyped parts of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParts {
    pub filter: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// `None` projects the whole entity.
    pub projection: Option<Expr>,
}

impl QueryParts {
    /// Whether the query projects the entity shape (every mapped column).
    pub fn is_entity_shaped(&self) -> bool {
        self.projection.is_none()
    }
}

/// A query over rows of entity `E`.
pub struct Query<E> {
    parts: QueryParts,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Query<E> {
    /// Every row.
    pub fn all() -> Self {
        Self {
            parts: QueryParts::default(),
            _entity: PhantomData,
        }
    }

    /// Add a predicate; repeated calls are AND-combined.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.parts.filter = Some(match self.parts.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by_asc(mut self, expr: Expr) -> Self {
        self.parts.order_by.push(OrderBy {
            expr,
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, expr: Expr) -> Self {
        self.parts.order_by.push(OrderBy {
            expr,
            descending: true,
        });
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.parts.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.parts.offset = Some(n);
        self
    }

    /// Project a single value per row.
    pub fn select(mut self, expr: Expr) -> Self {
        self.parts.projection = Some(expr);
        self
    }

    pub fn parts(&self) -> &QueryParts {
        &self.parts
    }

    pub fn into_parts(self) -> QueryParts {
        self.parts
    }
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            parts: self.parts.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> Default for Query<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("parts", &self.parts).finish()
    }
}

/// A bare predicate filters every row.
impl<E> From<Expr> for Query<E> {
    fn from(predicate: Expr) -> Self {
        Query::all().filter(predicate)
    }
}
