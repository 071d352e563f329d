use crate::binder::{AssignmentValue, bind_updater};
use crate::compiler::QueryCompiler;
use crate::config::BulkConfig;
use crate::decompose::{DerivedQuery, decompose_projection, merge_prelude};
use crate::error::BulkResult;
use crate::expr::Expr;
use crate::meta::EntityMeta;
use crate::query::QueryParts;
use crate::statement::{BulkStatement, StatementKind};
use crate::value::Value;

/// `UPDATE t AS ut SET c1 = $1, c2 = NULL, c3 = <expr> FROM (<compiled>) AS jt
/// WHERE ut.pk = jt.pk [AND ...]`
///
/// Constant assignments bind parameters in assignment order. Computed ones
/// are compiled as a one-column projection of the same query and inlined
/// with their source alias rewritten to `ut`.
pub(crate) fn build_update<Q: QueryCompiler>(
    meta: &EntityMeta,
    compiler: &Q,
    parts: &QueryParts,
    updater: &Expr,
    config: &BulkConfig,
) -> BulkResult<BulkStatement> {
    let assignments = bind_updater(meta, updater)?;
    let keys = meta.key_columns()?;
    let derived = DerivedQuery::parse(&compiler.compile(meta, parts)?)?;
    let ut = config.update_alias.as_str();
    let jt = config.join_alias.as_str();

    let mut prelude = derived.prelude;
    let mut stmt = BulkStatement::new(StatementKind::Update, meta.table());
    stmt.push("UPDATE ")
        .push_table(meta.table())
        .push(" AS ")
        .push(ut)
        .push(" SET ");

    for (k, assignment) in assignments.into_iter().enumerate() {
        if k > 0 {
            stmt.push(", ");
        }
        // SET targets cannot be qualified in PostgreSQL.
        stmt.push_ident(assignment.column.column()).push(" = ");
        match assignment.value {
            AssignmentValue::Constant(Value::Null) => {
                stmt.push("NULL");
            }
            AssignmentValue::Constant(value) => {
                stmt.push_bind(value);
            }
            AssignmentValue::Computed(expr) => {
                let projected = QueryParts {
                    projection: Some(expr),
                    ..parts.clone()
                };
                let projection = decompose_projection(&compiler.compile(meta, &projected)?)?;
                merge_prelude(&mut prelude, projection.prelude.iter().cloned())?;
                stmt.push(&projection.realias(ut)?);
            }
        }
    }

    stmt.push(" FROM (")
        .push(&derived.body)
        .push(") AS ")
        .push(jt)
        .push(" WHERE ");
    for (k, key) in keys.iter().enumerate() {
        if k > 0 {
            stmt.push(" AND ");
        }
        stmt.push(ut)
            .push(".")
            .push_ident(key.column())
            .push(" = ")
            .push(jt)
            .push(".")
            .push_ident(key.column());
    }

    for setting in prelude {
        stmt.push_prelude(setting.statement);
    }
    Ok(stmt)
}
