//! Query compilation: [`QueryParts`] to PostgreSQL SELECT text.
//!
//! The compiler is a collaborator seam. Bulk statements only rely on the
//! shape of its output: an optional run of `SET name = 'value';` session
//! settings followed by a single SELECT whose FROM clause aliases the
//! entity table.
//!
//! [`PgQueryCompiler`] inlines literals as SQL literals and hoists captured
//! values into session settings, so compiled text never carries `$n`
//! parameters of its own and can be embedded in a larger statement as is.

use crate::error::{BulkError, BulkResult};
use crate::expr::{Expr, Func, UnaryOp};
use crate::ident::is_bare_name;
use crate::meta::EntityMeta;
use crate::query::QueryParts;
use crate::value::{Value, quote_literal};
use std::fmt::Write;

/// Renders a query over an entity to SQL text.
pub trait QueryCompiler: Send + Sync {
    fn compile(&self, meta: &EntityMeta, parts: &QueryParts) -> BulkResult<String>;
}

/// Default PostgreSQL compiler.
#[derive(Debug, Clone)]
pub struct PgQueryCompiler {
    namespace: String,
}

impl Default for PgQueryCompiler {
    fn default() -> Self {
        Self {
            namespace: "bulk".to_string(),
        }
    }
}

impl PgQueryCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `namespace` as the prefix of hoisted session settings.
    pub fn with_namespace(namespace: impl Into<String>) -> BulkResult<Self> {
        let namespace = namespace.into();
        if !is_bare_name(&namespace) || namespace.contains('$') {
            return Err(BulkError::validation(format!(
                "invalid session setting namespace '{namespace}'"
            )));
        }
        Ok(Self { namespace })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl QueryCompiler for PgQueryCompiler {
    fn compile(&self, meta: &EntityMeta, parts: &QueryParts) -> BulkResult<String> {
        let mut ctx = Context {
            meta,
            alias: table_alias(meta.table().name.as_str()),
            namespace: &self.namespace,
            settings: Vec::new(),
        };

        let mut select = String::from("SELECT ");
        match &parts.projection {
            None => {
                for (i, col) in meta.columns().iter().enumerate() {
                    if i > 0 {
                        select.push_str(", ");
                    }
                    select.push_str(&ctx.alias);
                    select.push('.');
                    col.column().write_sql(&mut select);
                }
            }
            Some(Expr::MemberInit(init)) => {
                return Err(BulkError::unsupported(format!(
                    "cannot select member-initializer for '{}'; project a single value",
                    init.entity
                )));
            }
            Some(expr) => ctx.render(expr, &mut select)?,
        }

        select.push_str(" FROM ");
        meta.table().write_sql(&mut select);
        select.push_str(" AS ");
        select.push_str(&ctx.alias);

        if let Some(filter) = &parts.filter {
            select.push_str(" WHERE ");
            ctx.render(filter, &mut select)?;
        }
        if !parts.order_by.is_empty() {
            select.push_str(" ORDER BY ");
            for (i, term) in parts.order_by.iter().enumerate() {
                if i > 0 {
                    select.push_str(", ");
                }
                ctx.render(&term.expr, &mut select)?;
                if term.descending {
                    select.push_str(" DESC");
                }
            }
        }
        if let Some(limit) = parts.limit {
            let _ = write!(select, " LIMIT {limit}");
        }
        if let Some(offset) = parts.offset {
            let _ = write!(select, " OFFSET {offset}");
        }

        if ctx.settings.is_empty() {
            return Ok(select);
        }
        let mut out = String::new();
        for (name, value) in &ctx.settings {
            let text = value.to_text().unwrap_or_default();
            let _ = writeln!(out, "SET {}.{name} = {};", self.namespace, quote_literal(&text));
        }
        out.push_str(&select);
        Ok(out)
    }
}

/// First ASCII letter of the table name, lower-cased.
fn table_alias(table: &str) -> String {
    table
        .chars()
        .find(char::is_ascii_alphabetic)
        .map_or_else(|| "t".to_string(), |c| c.to_ascii_lowercase().to_string())
}

struct Context<'a> {
    meta: &'a EntityMeta,
    alias: String,
    namespace: &'a str,
    settings: Vec<(String, Value)>,
}

impl Context<'_> {
    fn render(&mut self, expr: &Expr, out: &mut String) -> BulkResult<()> {
        match expr {
            Expr::Literal(v) => out.push_str(&v.to_sql_literal()),
            Expr::Captured { name, value } => self.render_captured(name, value, out)?,
            Expr::Field(member) => {
                let col = self.meta.column_for(member).ok_or_else(|| {
                    BulkError::metadata(format!(
                        "entity '{}' has no mapped member '{member}'",
                        self.meta.name()
                    ))
                })?;
                out.push_str(&self.alias);
                out.push('.');
                col.column().write_sql(out);
            }
            Expr::Unary { op, expr } => {
                out.push('(');
                match op {
                    UnaryOp::Not => {
                        out.push_str("NOT ");
                        self.render(expr, out)?;
                    }
                    UnaryOp::Neg => {
                        out.push('-');
                        self.render(expr, out)?;
                    }
                    UnaryOp::IsNull => {
                        self.render(expr, out)?;
                        out.push_str(" IS NULL");
                    }
                    UnaryOp::IsNotNull => {
                        self.render(expr, out)?;
                        out.push_str(" IS NOT NULL");
                    }
                }
                out.push(')');
            }
            Expr::Binary { op, lhs, rhs } => {
                out.push('(');
                self.render(lhs, out)?;
                out.push(' ');
                out.push_str(op.sql());
                out.push(' ');
                self.render(rhs, out)?;
                out.push(')');
            }
            Expr::Call { func, args } => self.render_call(*func, args, out)?,
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    out.push_str(if *negated { "TRUE" } else { "FALSE" });
                    return Ok(());
                }
                out.push('(');
                self.render(expr, out)?;
                out.push_str(if *negated { " NOT IN (" } else { " IN (" });
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render(item, out)?;
                }
                out.push_str("))");
            }
            Expr::MemberInit(init) => {
                return Err(BulkError::unsupported(format!(
                    "member-initializer for '{}' cannot appear inside a query",
                    init.entity
                )));
            }
        }
        Ok(())
    }

    fn render_captured(&mut self, name: &str, value: &Value, out: &mut String) -> BulkResult<()> {
        if value.is_null() {
            out.push_str("NULL");
            return Ok(());
        }
        let name = name.to_ascii_lowercase();
        if !is_bare_name(&name) || name.contains('$') {
            return Err(BulkError::unsupported(format!(
                "captured variable '{name}' cannot be used as a session setting name"
            )));
        }
        match self.settings.iter().find(|(n, _)| *n == name) {
            Some((_, existing)) if existing != value => {
                return Err(BulkError::unsupported(format!(
                    "captured variable '{name}' is bound to two different values"
                )));
            }
            Some(_) => {}
            None => self.settings.push((name.clone(), value.clone())),
        }
        let _ = write!(out, "current_setting('{}.{name}')", self.namespace);
        if let Some(cast) = value.pg_cast() {
            out.push_str("::");
            out.push_str(cast);
        }
        Ok(())
    }

    fn render_call(&mut self, func: Func, args: &[Expr], out: &mut String) -> BulkResult<()> {
        let arity_ok = match func {
            Func::Coalesce => !args.is_empty(),
            _ => args.len() == 1,
        };
        if !arity_ok {
            return Err(BulkError::unsupported(format!(
                "{func:?} called with {} arguments",
                args.len()
            )));
        }
        let (open, close) = match func {
            Func::ToText => ("CAST(", " AS text)"),
            Func::Lower => ("lower(", ")"),
            Func::Upper => ("upper(", ")"),
            Func::Trim => ("btrim(", ")"),
            Func::Length => ("char_length(", ")"),
            Func::Abs => ("abs(", ")"),
            Func::Coalesce => ("COALESCE(", ")"),
        };
        out.push_str(open);
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.render(arg, out)?;
        }
        out.push_str(close);
        Ok(())
    }
}
