use crate::config::BulkConfig;
use crate::decompose::DerivedQuery;
use crate::error::BulkResult;
use crate::meta::EntityMeta;
use crate::statement::{BulkStatement, StatementKind};

/// `DELETE FROM t AS ut USING (<compiled>) AS jt WHERE ut.pk = jt.pk [AND ...]`
///
/// The target is aliased so a table named like the join alias still
/// resolves.
pub(crate) fn build_delete(
    meta: &EntityMeta,
    compiled: &str,
    config: &BulkConfig,
) -> BulkResult<BulkStatement> {
    let keys = meta.key_columns()?;
    let derived = DerivedQuery::parse(compiled)?;
    let ut = config.update_alias.as_str();
    let jt = config.join_alias.as_str();

    let mut stmt = BulkStatement::new(StatementKind::Delete, meta.table());
    for setting in derived.prelude {
        stmt.push_prelude(setting.statement);
    }
    stmt.push("DELETE FROM ")
        .push_table(meta.table())
        .push(" AS ")
        .push(ut)
        .push(" USING (")
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
    Ok(stmt)
}
