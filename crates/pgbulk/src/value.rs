//! Dynamically typed row values.
//!
//! [`Value`] is what entities hand out per member, what converters map, what
//! the expression interpreter computes and what statements bind. It encodes
//! through `tokio-postgres`' [`ToSql`], adapting integer/float width to the
//! parameter type the server inferred.

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::Write;
use tokio_postgres::types::{IsNull, ToSql, Type};
use uuid::Uuid;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    /// Whether this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
        }
    }

    /// The Postgres type a text form of this value must be cast to.
    ///
    /// `None` for NULL and for text, which need no cast.
    pub fn pg_cast(&self) -> Option<&'static str> {
        match self {
            Value::Null | Value::Text(_) => None,
            Value::Bool(_) => Some("boolean"),
            Value::Int(_) => Some("int8"),
            Value::Float(_) => Some("float8"),
            Value::Bytes(_) => Some("bytea"),
            Value::Uuid(_) => Some("uuid"),
            Value::Timestamp(_) => Some("timestamptz"),
            Value::Json(_) => Some("jsonb"),
        }
    }

    /// Text form of the value, as Postgres would print it. `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(v) => Some(v.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(float_text(*v)),
            Value::Text(v) => Some(v.clone()),
            Value::Bytes(v) => Some(hex_text(v)),
            Value::Uuid(v) => Some(v.to_string()),
            Value::Timestamp(v) => Some(v.to_rfc3339()),
            Value::Json(v) => Some(v.to_string()),
        }
    }

    /// Render the value as an inline SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(v) if *v < 0 => format!("({v})"),
            Value::Int(v) => v.to_string(),
            Value::Float(v) if v.is_finite() && *v < 0.0 => format!("({})", float_text(*v)),
            Value::Float(v) if v.is_finite() => float_text(*v),
            Value::Float(v) => format!("{}::float8", quote_literal(&float_text(*v))),
            Value::Text(v) => quote_literal(v),
            other => {
                let text = other.to_text().unwrap_or_default();
                let cast = other.pg_cast().unwrap_or("text");
                format!("{}::{cast}", quote_literal(&text))
            }
        }
    }
}

/// Quote a string as a standard SQL literal (`'` doubled).
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

fn float_text(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "Infinity".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        // Debug keeps a trailing `.0` for integral floats.
        format!("{v:?}")
    }
}

fn hex_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

// ─── Conversions ────────────────────────────────────────────────────────────

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ─── ToSql ──────────────────────────────────────────────────────────────────

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql_checked(ty, out),
            Value::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql_checked(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql_checked(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql_checked(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql_checked(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Value::Text(v) => v.to_sql_checked(ty, out),
            Value::Bytes(v) => v.to_sql_checked(ty, out),
            Value::Uuid(v) => v.to_sql_checked(ty, out),
            Value::Timestamp(v) => match *ty {
                Type::TIMESTAMP => v.naive_utc().to_sql_checked(ty, out),
                Type::DATE => v.date_naive().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Value::Json(v) => v.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // The variant decides; mismatches surface from the inner encoder.
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_rendering() {
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
        assert_eq!(Value::Bool(true).to_sql_literal(), "TRUE");
        assert_eq!(Value::Int(500).to_sql_literal(), "500");
        assert_eq!(Value::Int(-3).to_sql_literal(), "(-3)");
        assert_eq!(Value::Float(2.0).to_sql_literal(), "2.0");
        assert_eq!(Value::Float(f64::NAN).to_sql_literal(), "'NaN'::float8");
        assert_eq!(Value::from("it's").to_sql_literal(), "'it''s'");
        assert_eq!(
            Value::Bytes(vec![0x0a, 0xff]).to_sql_literal(),
            r"'\x0aff'::bytea"
        );
    }

    #[test]
    fn uuid_literal_is_cast() {
        let id = Uuid::nil();
        assert_eq!(
            Value::from(id).to_sql_literal(),
            "'00000000-0000-0000-0000-000000000000'::uuid"
        );
    }

    #[test]
    fn text_forms() {
        assert_eq!(Value::Int(7).to_text().as_deref(), Some("7"));
        assert_eq!(Value::Bool(false).to_text().as_deref(), Some("false"));
        assert_eq!(Value::Null.to_text(), None);
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Text("a".into()));
    }

    #[test]
    fn int_encodes_to_narrower_column_types() {
        let mut buf = BytesMut::new();
        Value::Int(42).to_sql_checked(&Type::INT4, &mut buf).unwrap();
        assert_eq!(&buf[..], &42_i32.to_be_bytes());

        let mut buf = BytesMut::new();
        assert!(
            Value::Int(i64::MAX)
                .to_sql_checked(&Type::INT2, &mut buf)
                .is_err()
        );
    }

    #[test]
    fn null_encodes_for_any_type() {
        let mut buf = BytesMut::new();
        let is_null = Value::Null.to_sql_checked(&Type::UUID, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
    }
}
