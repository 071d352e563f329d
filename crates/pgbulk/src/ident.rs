//! Safe SQL identifier handling.
//!
//! Table, schema and column names come from entity metadata and are spliced
//! into statement text (Postgres does not allow parameterized identifiers).
//! [`Ident`] renders a name bare when that is unambiguous and quoted otherwise:
//!
//! - bare: matches `[a-z_][a-z0-9_$]*` and is not a reserved word
//! - quoted: anything else except NUL, with `"` escaped as `""`
//!
//! # Example
//! ```ignore
//! use pgbulk::Ident;
//!
//! assert_eq!(Ident::new("categories")?.to_sql(), "categories");
//! assert_eq!(Ident::new("Categories")?.to_sql(), r#""Categories""#);
//! # Ok::<(), pgbulk::BulkError>(())
//! ```

use crate::error::{BulkError, BulkResult};
use std::fmt;

/// Words that cannot appear bare as a table or column name.
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_date",
    "current_role", "current_time", "current_timestamp", "current_user", "default",
    "deferrable", "desc", "distinct", "do", "else", "end", "except", "false", "fetch", "for",
    "foreign", "from", "grant", "group", "having", "in", "initially", "intersect", "into",
    "join", "lateral", "leading", "limit", "localtime", "localtimestamp", "not", "null",
    "offset", "on", "only", "or", "order", "placing", "primary", "references", "returning",
    "select", "session_user", "set", "some", "symmetric", "table", "then", "to", "trailing",
    "true", "union", "unique", "user", "using", "variadic", "when", "where", "window", "with",
];

/// A single SQL identifier (schema, table, column or alias).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    name: String,
}

impl Ident {
    /// Validate a raw name.
    pub fn new(name: impl Into<String>) -> BulkResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(BulkError::metadata("Identifier cannot be empty"));
        }
        if name.contains('\0') {
            return Err(BulkError::metadata(
                "Identifier cannot contain NUL character",
            ));
        }
        Ok(Self { name })
    }

    /// The raw (unquoted) name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Whether the name can be written without quotes.
    pub fn is_bare(&self) -> bool {
        is_bare_name(&self.name)
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::with_capacity(self.name.len() + 2);
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        if self.is_bare() {
            out.push_str(&self.name);
            return;
        }
        out.push('"');
        for ch in self.name.chars() {
            if ch == '"' {
                out.push('"');
            }
            out.push(ch);
        }
        out.push('"');
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// `true` for names that are safe unquoted in statement text.
pub(crate) fn is_bare_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first == '_' || first.is_ascii_lowercase()) {
        return false;
    }
    if !chars.all(|c| c == '_' || c == '$' || c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return false;
    }
    !RESERVED.contains(&name)
}

/// An optionally schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: Option<Ident>,
    pub name: Ident,
}

impl QualifiedName {
    /// An unqualified table name.
    pub fn new(name: impl Into<String>) -> BulkResult<Self> {
        Ok(Self {
            schema: None,
            name: Ident::new(name)?,
        })
    }

    /// Set the schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> BulkResult<Self> {
        self.schema = Some(Ident::new(schema)?);
        Ok(self)
    }

    /// Render `schema.name` (or just `name`).
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        if let Some(schema) = &self.schema {
            schema.write_sql(out);
            out.push('.');
        }
        self.name.write_sql(out);
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}
