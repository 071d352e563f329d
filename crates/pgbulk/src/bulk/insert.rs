use crate::config::BulkConfig;
use crate::error::{BulkError, BulkResult};
use crate::meta::{Entity, EntityMeta};
use crate::statement::{BulkStatement, StatementKind};

/// `INSERT INTO t (c1, .., cC) VALUES ($1, .., $C), ($C+1, ..), ...`
///
/// Row `i`, column `j` binds parameter index `j + i*C`. Store-generated
/// columns are left out. Returns `None` when there are no rows or no
/// insertable columns.
pub(crate) fn build_insert<E: Entity>(
    meta: &EntityMeta,
    rows: &[E],
    config: &BulkConfig,
) -> BulkResult<Option<BulkStatement>> {
    let columns = meta.insertable_columns();
    if rows.is_empty() || columns.is_empty() {
        return Ok(None);
    }

    let total = rows
        .len()
        .checked_mul(columns.len())
        .filter(|&n| n <= config.max_parameters)
        .ok_or_else(|| {
            BulkError::validation(format!(
                "inserting {} rows x {} columns into {} exceeds the limit of {} parameters",
                rows.len(),
                columns.len(),
                meta.table(),
                config.max_parameters
            ))
        })?;

    let mut stmt = BulkStatement::new(StatementKind::Insert, meta.table());
    stmt.push("INSERT INTO ").push_table(meta.table()).push(" (");
    for (j, col) in columns.iter().enumerate() {
        if j > 0 {
            stmt.push(", ");
        }
        stmt.push_ident(col.column());
    }
    stmt.push(") VALUES ");

    for (i, row) in rows.iter().enumerate() {
        stmt.push(if i == 0 { "(" } else { ", (" });
        for (j, col) in columns.iter().enumerate() {
            if j > 0 {
                stmt.push(", ");
            }
            let value = row.get(col.member()).ok_or_else(|| {
                BulkError::metadata(format!(
                    "entity '{}' does not expose mapped member '{}'",
                    meta.name(),
                    col.member()
                ))
            })?;
            stmt.push_bind(col.to_store(value)?);
        }
        stmt.push(")");
    }

    debug_assert_eq!(stmt.params().len(), total);
    Ok(Some(stmt))
}
