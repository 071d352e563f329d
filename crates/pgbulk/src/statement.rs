//! Synthesized bulk statements.
//!
//! [`BulkStatement`] keeps SQL pieces and parameters apart and generates
//! `$1, $2, ...` placeholders when rendered, so placeholder `$n` always binds
//! `params[n - 1]`. Session settings that must run before the statement are
//! carried alongside in [`BulkStatement::prelude`].

use crate::error::{BulkError, BulkResult};
use crate::ident::{Ident, QualifiedName};
use crate::value::Value;
use std::fmt;
use std::fmt::Write;
use tokio_postgres::types::ToSql;

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Raw(String),
    Param,
}

/// Which bulk operation a statement performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ready-to-run statement: prelude, SQL text and positional parameters.
#[must_use]
#[derive(Debug, Clone)]
pub struct BulkStatement {
    kind: StatementKind,
    table: String,
    prelude: Vec<String>,
    parts: Vec<Part>,
    params: Vec<Value>,
}

impl BulkStatement {
    pub(crate) fn new(kind: StatementKind, table: &QualifiedName) -> Self {
        Self {
            kind,
            table: table.to_sql(),
            prelude: Vec::new(),
            parts: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Target table as rendered in the statement.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Append raw SQL.
    pub(crate) fn push(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(Part::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(Part::Raw(sql.to_string())),
        }
        self
    }

    /// Append a validated identifier.
    pub(crate) fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        match self.parts.last_mut() {
            Some(Part::Raw(last)) => ident.write_sql(last),
            _ => self.parts.push(Part::Raw(ident.to_sql())),
        }
        self
    }

    pub(crate) fn push_table(&mut self, table: &QualifiedName) -> &mut Self {
        match self.parts.last_mut() {
            Some(Part::Raw(last)) => table.write_sql(last),
            _ => self.parts.push(Part::Raw(table.to_sql())),
        }
        self
    }

    /// Append a placeholder and bind its value.
    pub(crate) fn push_bind(&mut self, value: Value) -> &mut Self {
        self.parts.push(Part::Param);
        self.params.push(value);
        self
    }

    /// Add a statement to run before this one, in the same scope.
    pub(crate) fn push_prelude(&mut self, statement: impl Into<String>) -> &mut Self {
        self.prelude.push(statement.into());
        self
    }

    /// Render SQL with `$1, $2, ...` placeholders.
    pub fn sql(&self) -> String {
        let cap = self
            .parts
            .iter()
            .map(|p| match p {
                Part::Raw(s) => s.len(),
                Part::Param => 6,
            })
            .sum();
        let mut out = String::with_capacity(cap);
        let mut idx = 0usize;
        for part in &self.parts {
            match part {
                Part::Raw(s) => out.push_str(s),
                Part::Param => {
                    idx += 1;
                    let _ = write!(out, "${idx}");
                }
            }
        }
        out
    }

    /// Statements executed before [`sql`](Self::sql), in order.
    pub fn prelude(&self) -> &[String] {
        &self.prelude
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.parts.iter().filter(|p| matches!(p, Part::Param)).count()
    }

    /// Check placeholder/parameter alignment and the protocol limit.
    pub fn validate(&self, max_parameters: usize) -> BulkResult<()> {
        let placeholders = self.placeholder_count();
        if placeholders != self.params.len() {
            return Err(BulkError::validation(format!(
                "{} on {}: placeholders({placeholders}) != params({})",
                self.kind,
                self.table,
                self.params.len()
            )));
        }
        if self.params.len() > max_parameters {
            return Err(BulkError::validation(format!(
                "{} on {} binds {} parameters; the limit is {max_parameters}",
                self.kind,
                self.table,
                self.params.len()
            )));
        }
        Ok(())
    }
}

/// Prelude lines followed by the statement.
impl fmt::Display for BulkStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.prelude {
            writeln!(f, "{line}")?;
        }
        f.write_str(&self.sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> QualifiedName {
        QualifiedName::new("items").unwrap()
    }

    #[test]
    fn placeholders_are_numbered_in_order() {
        let mut stmt = BulkStatement::new(StatementKind::Insert, &table());
        stmt.push("VALUES (")
            .push_bind(Value::Int(1))
            .push(", ")
            .push_bind(Value::from("a"))
            .push(")");
        assert_eq!(stmt.sql(), "VALUES ($1, $2)");
        assert_eq!(stmt.placeholder_count(), 2);
        assert_eq!(stmt.params(), &[Value::Int(1), Value::from("a")]);
        assert_eq!(stmt.params_ref().len(), 2);
    }

    #[test]
    fn idents_are_quoted_when_needed() {
        let mut stmt = BulkStatement::new(StatementKind::Delete, &table());
        stmt.push("DELETE FROM ")
            .push_table(&QualifiedName::new("Items").unwrap())
            .push(" WHERE ")
            .push_ident(&Ident::new("id").unwrap());
        assert_eq!(stmt.sql(), r#"DELETE FROM "Items" WHERE id"#);
    }

    #[test]
    fn validate_enforces_parameter_limit() {
        let mut stmt = BulkStatement::new(StatementKind::Insert, &table());
        for i in 0..3 {
            stmt.push_bind(Value::Int(i));
        }
        assert!(stmt.validate(3).is_ok());
        assert!(matches!(stmt.validate(2), Err(BulkError::Validation(_))));
    }

    #[test]
    fn display_includes_prelude() {
        let mut stmt = BulkStatement::new(StatementKind::Update, &table());
        stmt.push_prelude("SET bulk.n = '1';").push("UPDATE items");
        assert_eq!(stmt.to_string(), "SET bulk.n = '1';\nUPDATE items");
        assert_eq!(stmt.kind().as_str(), "update");
    }
}
