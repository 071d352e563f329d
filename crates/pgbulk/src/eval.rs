//! In-process evaluation of row-independent expressions.
//!
//! Used by the binder to turn constant updater members into bound parameter
//! values. Semantics follow SQL: NULL propagates through arithmetic,
//! comparison and concatenation, AND/OR are three-valued.

use crate::error::{BulkError, BulkResult};
use crate::expr::{BinaryOp, Expr, Func, UnaryOp};
use crate::value::Value;
use std::cmp::Ordering;

/// Evaluate an expression that does not reference the row.
pub fn evaluate(expr: &Expr) -> BulkResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Captured { value, .. } => Ok(value.clone()),
        Expr::Field(member) => Err(BulkError::binding(format!(
            "cannot evaluate row member '{member}' outside a query"
        ))),
        Expr::Unary { op, expr } => unary(*op, evaluate(expr)?),
        Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::And | BinaryOp::Or => logical(*op, evaluate(lhs)?, evaluate(rhs)?),
            _ => binary(*op, evaluate(lhs)?, evaluate(rhs)?),
        },
        Expr::Call { func, args } => {
            let args = args.iter().map(evaluate).collect::<BulkResult<Vec<_>>>()?;
            call(*func, args)
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => in_list(evaluate(expr)?, list, *negated),
        Expr::MemberInit(init) => Err(BulkError::unsupported(format!(
            "member-initializer for '{}' is not a scalar value",
            init.entity
        ))),
    }
}

fn type_error(what: &str, values: &[&Value]) -> BulkError {
    let types: Vec<_> = values.iter().map(|v| v.type_name()).collect();
    BulkError::unsupported(format!("{what} is not defined for {}", types.join(", ")))
}

fn unary(op: UnaryOp, v: Value) -> BulkResult<Value> {
    match op {
        UnaryOp::IsNull => Ok(Value::Bool(v.is_null())),
        UnaryOp::IsNotNull => Ok(Value::Bool(!v.is_null())),
        UnaryOp::Not => match v {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(type_error("NOT", &[&other])),
        },
        UnaryOp::Neg => match v {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| BulkError::validation("integer overflow in negation")),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(type_error("negation", &[&other])),
        },
    }
}

fn truth(v: &Value) -> BulkResult<Option<bool>> {
    match v {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(type_error("boolean logic", &[other])),
    }
}

fn logical(op: BinaryOp, lhs: Value, rhs: Value) -> BulkResult<Value> {
    let (l, r) = (truth(&lhs)?, truth(&rhs)?);
    let out = match op {
        BinaryOp::And => match (l, r) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        _ => match (l, r) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    };
    Ok(out.map_or(Value::Null, Value::Bool))
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> BulkResult<Value> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    match op {
        BinaryOp::Concat => {
            let l = lhs.to_text().unwrap_or_default();
            let r = rhs.to_text().unwrap_or_default();
            Ok(Value::Text(l + &r))
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(&lhs, &rhs)?;
            let result = match op {
                BinaryOp::Eq => ord == Ordering::Equal,
                BinaryOp::Ne => ord != Ordering::Equal,
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        _ => arithmetic(op, lhs, rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> BulkResult<Value> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
                return Err(BulkError::validation("division by zero"));
            }
            let out = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            out.map(Value::Int)
                .ok_or_else(|| BulkError::validation(format!("integer overflow in {a} {} {b}", op.sql())))
        }
        _ => {
            let (Some(a), Some(b)) = (as_float(&lhs), as_float(&rhs)) else {
                return Err(type_error(op.sql(), &[&lhs, &rhs]));
            };
            if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0.0 {
                return Err(BulkError::validation("division by zero"));
            }
            Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
    }
}

fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> BulkResult<Ordering> {
    let ord = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Json(a), Value::Json(b)) if a == b => Some(Ordering::Equal),
        _ => match (as_float(lhs), as_float(rhs)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    ord.ok_or_else(|| type_error("comparison", &[lhs, rhs]))
}

fn in_list(needle: Value, list: &[Expr], negated: bool) -> BulkResult<Value> {
    if needle.is_null() {
        return Ok(Value::Null);
    }
    let mut saw_null = false;
    for item in list {
        let item = evaluate(item)?;
        if item.is_null() {
            saw_null = true;
            continue;
        }
        if compare(&needle, &item)? == Ordering::Equal {
            return Ok(Value::Bool(!negated));
        }
    }
    if saw_null {
        Ok(Value::Null)
    } else {
        Ok(Value::Bool(negated))
    }
}

fn call(func: Func, mut args: Vec<Value>) -> BulkResult<Value> {
    if func == Func::Coalesce {
        return Ok(args
            .into_iter()
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null));
    }
    if args.len() != 1 {
        return Err(BulkError::unsupported(format!(
            "{func:?} takes one argument, got {}",
            args.len()
        )));
    }
    let arg = args.remove(0);
    if arg.is_null() {
        return Ok(Value::Null);
    }
    match (func, arg) {
        (Func::ToText, v) => Ok(v.to_text().map_or(Value::Null, Value::Text)),
        (Func::Lower, Value::Text(s)) => Ok(Value::Text(s.to_lowercase())),
        (Func::Upper, Value::Text(s)) => Ok(Value::Text(s.to_uppercase())),
        (Func::Trim, Value::Text(s)) => Ok(Value::Text(s.trim_matches(' ').to_string())),
        (Func::Length, Value::Text(s)) => Ok(Value::Int(s.chars().count() as i64)),
        (Func::Abs, Value::Int(i)) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| BulkError::validation("integer overflow in abs")),
        (Func::Abs, Value::Float(f)) => Ok(Value::Float(f.abs())),
        (func, other) => Err(type_error(&format!("{func:?}"), &[&other])),
    }
}
