//! Statement execution.

use crate::client::{GenericClient, Transactional};
use crate::config::BulkConfig;
use crate::error::BulkResult;
use crate::statement::BulkStatement;

/// Run a statement and return the store's affected-row count.
///
/// Unless `disable_transaction` is set, the prelude and the statement run in
/// one [`TransactionScope`](crate::TransactionScope) that commits on success.
/// On failure the scope is dropped uncommitted and the error is returned as
/// reported by the store.
pub async fn execute<C>(
    conn: &mut C,
    statement: &BulkStatement,
    disable_transaction: bool,
    config: &BulkConfig,
) -> BulkResult<u64>
where
    C: Transactional,
{
    statement.validate(config.max_parameters)?;
    let sql = statement.sql();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        target: "pgbulk.sql",
        kind = %statement.kind(),
        table = statement.table(),
        param_count = statement.params().len(),
        prelude = statement.prelude().len(),
        transaction = !disable_transaction,
        sql = %truncate_sql(&sql, config.max_log_sql_length),
        "executing bulk statement"
    );

    let affected = if disable_transaction {
        run(&*conn, statement, &sql).await?
    } else {
        let scope = conn.begin().await?;
        #[cfg(feature = "tracing")]
        tracing::trace!(target: "pgbulk.exec", nested = scope.is_nested(), "transaction scope opened");
        let affected = run(&scope, statement, &sql).await?;
        scope.commit().await?;
        affected
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
        target: "pgbulk.exec",
        kind = %statement.kind(),
        table = statement.table(),
        affected,
        "bulk statement finished"
    );

    Ok(affected)
}

async fn run<C: GenericClient>(client: &C, statement: &BulkStatement, sql: &str) -> BulkResult<u64> {
    for setting in statement.prelude() {
        client.batch_execute(setting).await?;
    }
    client.execute(sql, &statement.params_ref()).await
}

#[cfg(feature = "tracing")]
fn truncate_sql(sql: &str, max: usize) -> std::borrow::Cow<'_, str> {
    if sql.len() <= max {
        return std::borrow::Cow::Borrowed(sql);
    }
    let mut end = max;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!("{}...", &sql[..end]))
}
