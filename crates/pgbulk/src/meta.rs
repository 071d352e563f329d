//! Mapping metadata: the contract between entity types and statement synthesis.
//!
//! An [`Entity`] describes its table once through [`EntityMeta`] and exposes
//! its members as [`Value`]s. Metadata is resolved on every bulk call; nothing
//! here is cached.
//!
//! # Example
//! ```ignore
//! use pgbulk::{ColumnMeta, Entity, EntityMeta, BulkResult, Value};
//!
//! struct Category { id: i64, name: String }
//!
//! impl Entity for Category {
//!     fn meta() -> BulkResult<EntityMeta> {
//!         Ok(EntityMeta::new("Category", "categories")?
//!             .column(ColumnMeta::new("id", "id")?.key())
//!             .column(ColumnMeta::new("name", "name")?))
//!     }
//!
//!     fn get(&self, member: &str) -> Option<Value> {
//!         match member {
//!             "id" => Some(self.id.into()),
//!             "name" => Some(self.name.as_str().into()),
//!             _ => None,
//!         }
//!     }
//! }
//! ```

use crate::error::{BulkError, BulkResult};
use crate::ident::{Ident, QualifiedName};
use crate::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Maps an in-memory value to its storage representation.
pub type ValueConverter = Arc<dyn Fn(Value) -> BulkResult<Value> + Send + Sync>;

/// When the store (rather than the client) assigns a column's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueGenerated {
    /// The client always supplies the value.
    #[default]
    Never,
    /// Generated on insert (identity/serial columns, defaults).
    OnAdd,
    /// Generated on insert and on every update.
    OnAddOrUpdate,
}

/// Mapping of one entity member to one column.
#[derive(Clone)]
pub struct ColumnMeta {
    member: &'static str,
    column: Ident,
    generated: ValueGenerated,
    key: bool,
    converter: Option<ValueConverter>,
}

impl ColumnMeta {
    /// Map `member` to `column`.
    pub fn new(member: &'static str, column: impl Into<String>) -> BulkResult<Self> {
        Ok(Self {
            member,
            column: Ident::new(column)?,
            generated: ValueGenerated::Never,
            key: false,
            converter: None,
        })
    }

    /// Mark the column as part of the primary key.
    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Set the generation policy.
    pub fn generated(mut self, generated: ValueGenerated) -> Self {
        self.generated = generated;
        self
    }

    /// Attach a value converter.
    pub fn converter<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> BulkResult<Value> + Send + Sync + 'static,
    {
        self.converter = Some(Arc::new(f));
        self
    }

    pub fn member(&self) -> &'static str {
        self.member
    }

    pub fn column(&self) -> &Ident {
        &self.column
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn generation(&self) -> ValueGenerated {
        self.generated
    }

    /// Whether the store assigns this column on insert.
    pub fn is_store_generated(&self) -> bool {
        self.generated != ValueGenerated::Never
    }

    /// Convert an in-memory value for storage.
    ///
    /// NULL bypasses the converter.
    pub fn to_store(&self, value: Value) -> BulkResult<Value> {
        match &self.converter {
            Some(convert) if !value.is_null() => convert(value).map_err(|e| match e {
                BulkError::Conversion { .. } => e,
                other => BulkError::conversion(self.column.as_str(), other.to_string()),
            }),
            _ => Ok(value),
        }
    }
}

impl fmt::Debug for ColumnMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnMeta")
            .field("member", &self.member)
            .field("column", &self.column)
            .field("generated", &self.generated)
            .field("key", &self.key)
            .field("converter", &self.converter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Table-level mapping of an entity shape.
#[derive(Debug, Clone)]
pub struct EntityMeta {
    name: &'static str,
    table: QualifiedName,
    columns: Vec<ColumnMeta>,
}

impl EntityMeta {
    /// Describe the entity `name` stored in `table`.
    pub fn new(name: &'static str, table: impl Into<String>) -> BulkResult<Self> {
        Ok(Self {
            name,
            table: QualifiedName::new(table)?,
            columns: Vec::new(),
        })
    }

    /// Qualify the table with a schema.
    pub fn schema(mut self, schema: impl Into<String>) -> BulkResult<Self> {
        self.table = self.table.with_schema(schema)?;
        Ok(self)
    }

    /// Append a column mapping (declaration order is column order).
    pub fn column(mut self, column: ColumnMeta) -> Self {
        self.columns.push(column);
        self
    }

    /// The entity shape name, matched against member-initializer targets.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn table(&self) -> &QualifiedName {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Look up the column mapped to `member`.
    pub fn column_for(&self, member: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.member == member)
    }

    /// Columns the client supplies on insert, in declaration order.
    pub fn insertable_columns(&self) -> Vec<&ColumnMeta> {
        self.columns
            .iter()
            .filter(|c| !c.is_store_generated())
            .collect()
    }

    /// Primary-key columns in declaration order.
    ///
    /// Errors when the entity has no key: a join on an empty key set would
    /// match every row.
    pub fn key_columns(&self) -> BulkResult<Vec<&ColumnMeta>> {
        let keys: Vec<&ColumnMeta> = self.columns.iter().filter(|c| c.key).collect();
        if keys.is_empty() {
            return Err(BulkError::metadata(format!(
                "entity '{}' has no primary key columns",
                self.name
            )));
        }
        Ok(keys)
    }

    /// Check structural consistency.
    pub fn validate(&self) -> BulkResult<()> {
        if self.columns.is_empty() {
            return Err(BulkError::metadata(format!(
                "entity '{}' maps no columns",
                self.name
            )));
        }
        let mut members = HashSet::new();
        let mut columns = HashSet::new();
        for col in &self.columns {
            if !members.insert(col.member) {
                return Err(BulkError::metadata(format!(
                    "entity '{}' maps member '{}' twice",
                    self.name, col.member
                )));
            }
            if !columns.insert(col.column.as_str()) {
                return Err(BulkError::metadata(format!(
                    "entity '{}' maps column '{}' twice",
                    self.name,
                    col.column.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// A row type with mapping metadata.
pub trait Entity: Send + Sync {
    /// Resolve the mapping metadata for this shape.
    fn meta() -> BulkResult<EntityMeta>;

    /// Read a mapped member. `None` means the member does not exist.
    fn get(&self, member: &str) -> Option<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_meta() -> EntityMeta {
        EntityMeta::new("Item", "items")
            .unwrap()
            .column(
                ColumnMeta::new("id", "id")
                    .unwrap()
                    .key()
                    .generated(ValueGenerated::OnAdd),
            )
            .column(ColumnMeta::new("token", "token").unwrap())
            .column(ColumnMeta::new("category_id", "category_id").unwrap())
    }

    #[test]
    fn insertable_columns_skip_store_generated() {
        let meta = item_meta();
        let names: Vec<_> = meta
            .insertable_columns()
            .iter()
            .map(|c| c.column().as_str())
            .collect();
        assert_eq!(names, ["token", "category_id"]);
    }

    #[test]
    fn generation_defaults_to_never() {
        let meta = item_meta();
        let id = meta.column_for("id").unwrap();
        assert_eq!(id.generation(), ValueGenerated::OnAdd);
        assert!(id.is_store_generated());

        let token = meta.column_for("token").unwrap();
        assert_eq!(token.generation(), ValueGenerated::Never);
        assert!(!token.is_store_generated());

        let stamped = ColumnMeta::new("touched", "touched_at")
            .unwrap()
            .generated(ValueGenerated::OnAddOrUpdate);
        assert!(stamped.is_store_generated());
    }

    #[test]
    fn key_columns_in_declaration_order() {
        let meta = EntityMeta::new("Link", "links")
            .unwrap()
            .column(ColumnMeta::new("b", "b_id").unwrap().key())
            .column(ColumnMeta::new("note", "note").unwrap())
            .column(ColumnMeta::new("a", "a_id").unwrap().key());
        let keys: Vec<_> = meta
            .key_columns()
            .unwrap()
            .iter()
            .map(|c| c.member())
            .collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn missing_key_is_an_error() {
        let meta = EntityMeta::new("Log", "logs")
            .unwrap()
            .column(ColumnMeta::new("line", "line").unwrap());
        assert!(matches!(meta.key_columns(), Err(BulkError::Metadata(_))));
    }

    #[test]
    fn duplicate_member_fails_validation() {
        let meta = item_meta().column(ColumnMeta::new("token", "token2").unwrap());
        assert!(meta.validate().is_err());
        assert!(item_meta().validate().is_ok());
    }

    #[test]
    fn converter_skips_null_and_wraps_errors() {
        let col = ColumnMeta::new("status", "status")
            .unwrap()
            .converter(|v| match v {
                Value::Text(s) if s == "active" => Ok(Value::Int(1)),
                _ => Err(BulkError::validation("unknown status")),
            });
        assert_eq!(col.to_store(Value::from("active")).unwrap(), Value::Int(1));
        assert_eq!(col.to_store(Value::Null).unwrap(), Value::Null);
        let err = col.to_store(Value::from("gone")).unwrap_err();
        assert!(matches!(err, BulkError::Conversion { ref column, .. } if column == "status"));
    }
}
