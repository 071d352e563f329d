//! Binding of updater member-initializers to column assignments.

use crate::error::{BulkError, BulkResult};
use crate::eval::evaluate;
use crate::expr::{Expr, MemberBinding};
use crate::meta::{ColumnMeta, EntityMeta};
use crate::value::Value;

/// Right-hand side of a SET clause.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentValue {
    /// Row-independent; evaluated and converted for storage.
    Constant(Value),
    /// References the row; compiled into the statement.
    Computed(Expr),
}

/// One `column = value` pair of an UPDATE.
#[derive(Debug, Clone)]
pub struct Assignment<'m> {
    pub column: &'m ColumnMeta,
    pub value: AssignmentValue,
}

impl Assignment<'_> {
    pub fn is_computed(&self) -> bool {
        matches!(self.value, AssignmentValue::Computed(_))
    }
}

/// Classify each member binding of `updater` as constant or computed.
///
/// Assignments come back in binding order. Constants have already been
/// through the column's converter.
pub fn bind_updater<'m>(meta: &'m EntityMeta, updater: &Expr) -> BulkResult<Vec<Assignment<'m>>> {
    let Expr::MemberInit(init) = updater else {
        return Err(BulkError::unsupported(format!(
            "updater must be a member-initializer, got `{updater}`"
        )));
    };
    if init.entity != meta.name() {
        return Err(BulkError::binding(format!(
            "updater constructs '{}' but the target entity is '{}'",
            init.entity,
            meta.name()
        )));
    }
    if init.bindings.is_empty() {
        return Err(BulkError::validation(format!(
            "updater for '{}' assigns no members",
            meta.name()
        )));
    }

    let mut assignments: Vec<Assignment<'m>> = Vec::with_capacity(init.bindings.len());
    for binding in &init.bindings {
        let MemberBinding::Assign { member, expr } = binding else {
            return Err(BulkError::binding(format!(
                "member '{}' uses a nested initializer; only direct assignments are supported",
                binding.member()
            )));
        };
        let column = meta.column_for(member).ok_or_else(|| {
            BulkError::binding(format!(
                "entity '{}' has no mapped member '{member}'",
                meta.name()
            ))
        })?;
        if assignments.iter().any(|a| a.column.member() == column.member()) {
            return Err(BulkError::binding(format!(
                "member '{member}' is assigned more than once"
            )));
        }
        if matches!(expr, Expr::MemberInit(_)) {
            return Err(BulkError::binding(format!(
                "member '{member}' is assigned a member-initializer"
            )));
        }

        let value = if expr.references_row() {
            AssignmentValue::Computed(expr.clone())
        } else {
            AssignmentValue::Constant(column.to_store(evaluate(expr)?)?)
        };
        assignments.push(Assignment { column, value });
    }
    Ok(assignments)
}
