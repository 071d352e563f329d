//! Expression trees for filters, projections and updaters.
//!
//! [`Expr`] is a closed algebra: literals, captured variables, references to
//! members of the row being queried, operators, a handful of scalar functions
//! and member-initializers. Filters and selectors are compiled to SQL by a
//! [`QueryCompiler`](crate::QueryCompiler); row-independent parts of an
//! updater are evaluated in-process by [`eval`](crate::eval).
//!
//! # Example
//! ```ignore
//! use pgbulk::{field, lit, MemberInit};
//!
//! // row => row.id >= 500
//! let filter = field("id").ge(500);
//!
//! // row => new Category { name = row.id.to_string() + "-Update" }
//! let updater = MemberInit::new("Category")
//!     .set("name", field("id").to_text().concat("-Update"));
//! ```

use crate::error::BulkResult;
use crate::meta::Entity;
use crate::value::Value;
use std::fmt;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// SQL spelling of the operator.
    pub fn sql(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Concat => "||",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    /// Text form of any value.
    ToText,
    Lower,
    Upper,
    Trim,
    /// Length in characters.
    Length,
    Abs,
    /// First non-NULL argument.
    Coalesce,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// A named value captured from the caller's scope.
    Captured { name: String, value: Value },
    /// A member of the row parameter.
    Field(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// Construct a value of an entity shape from member assignments.
    MemberInit(MemberInit),
}

/// Reference a member of the row being queried.
pub fn field(member: impl Into<String>) -> Expr {
    Expr::Field(member.into())
}

/// A constant.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// A value captured from the caller's scope under `name`.
///
/// Compilers may hoist captured values into session settings instead of
/// inlining them.
pub fn captured(name: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::Captured {
        name: name.into(),
        value: value.into(),
    }
}

/// The NULL literal.
pub fn null() -> Expr {
    Expr::Literal(Value::Null)
}

impl Expr {
    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs.into()),
        }
    }

    fn call(self, func: Func) -> Expr {
        Expr::Call {
            func,
            args: vec![self],
        }
    }

    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Or, rhs)
    }

    /// String concatenation (`||`).
    pub fn concat(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Concat, rhs)
    }

    pub fn is_null(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::IsNull,
            expr: Box::new(self),
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::IsNotNull,
            expr: Box::new(self),
        }
    }

    pub fn in_list<I, T>(self, list: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::InList {
            expr: Box::new(self),
            list: list.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<I, T>(self, list: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::InList {
            expr: Box::new(self),
            list: list.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn to_text(self) -> Expr {
        self.call(Func::ToText)
    }

    pub fn lower(self) -> Expr {
        self.call(Func::Lower)
    }

    pub fn upper(self) -> Expr {
        self.call(Func::Upper)
    }

    pub fn trim(self) -> Expr {
        self.call(Func::Trim)
    }

    pub fn length(self) -> Expr {
        self.call(Func::Length)
    }

    pub fn abs(self) -> Expr {
        self.call(Func::Abs)
    }

    pub fn coalesce(self, fallback: impl Into<Expr>) -> Expr {
        Expr::Call {
            func: Func::Coalesce,
            args: vec![self, fallback.into()],
        }
    }

    /// Visit this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Captured { .. } | Expr::Field(_) => {}
            Expr::Unary { expr, .. } => expr.walk(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.walk(visit)),
            Expr::InList { expr, list, .. } => {
                expr.walk(visit);
                list.iter().for_each(|e| e.walk(visit));
            }
            Expr::MemberInit(init) => init.walk_bindings(visit),
        }
    }

    /// Whether any node refers to the row parameter.
    pub fn references_row(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::Field(_)) {
                found = true;
            }
        });
        found
    }

    /// Members of the row referenced anywhere in the tree, in visit order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Field(name) = e {
                out.push(name.as_str());
            }
        });
        out
    }
}

// ─── Member initializers ────────────────────────────────────────────────────

/// One binding inside a member-initializer.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberBinding {
    /// `member = expr`
    Assign { member: String, expr: Expr },
    /// `member = { nested bindings }` on a member's own members.
    Nested {
        member: String,
        bindings: Vec<MemberBinding>,
    },
}

impl MemberBinding {
    pub fn member(&self) -> &str {
        match self {
            MemberBinding::Assign { member, .. } | MemberBinding::Nested { member, .. } => member,
        }
    }
}

/// `new Entity { a = .., b = .. }`
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInit {
    /// Entity shape being constructed.
    pub entity: String,
    pub bindings: Vec<MemberBinding>,
}

impl MemberInit {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            bindings: Vec::new(),
        }
    }

    /// Start an initializer for `E`'s shape.
    pub fn of<E: Entity>() -> BulkResult<Self> {
        Ok(Self::new(E::meta()?.name()))
    }

    /// Assign `member`.
    pub fn set(mut self, member: impl Into<String>, expr: impl Into<Expr>) -> Self {
        self.bindings.push(MemberBinding::Assign {
            member: member.into(),
            expr: expr.into(),
        });
        self
    }

    /// Initialize a member's own members.
    pub fn nested(mut self, member: impl Into<String>, bindings: Vec<MemberBinding>) -> Self {
        self.bindings.push(MemberBinding::Nested {
            member: member.into(),
            bindings,
        });
        self
    }

    fn walk_bindings<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        fn walk_list<'a>(bindings: &'a [MemberBinding], visit: &mut impl FnMut(&'a Expr)) {
            for binding in bindings {
                match binding {
                    MemberBinding::Assign { expr, .. } => expr.walk(visit),
                    MemberBinding::Nested { bindings, .. } => walk_list(bindings, visit),
                }
            }
        }
        walk_list(&self.bindings, visit);
    }
}

impl From<MemberInit> for Expr {
    fn from(init: MemberInit) -> Self {
        Expr::MemberInit(init)
    }
}

// ─── Conversions and operators ──────────────────────────────────────────────

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

macro_rules! impl_expr_from_literal {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Expr {
                fn from(v: $t) -> Self {
                    Expr::Literal(Value::from(v))
                }
            }
        )*
    };
}

impl_expr_from_literal!(bool, i16, i32, i64, f64, &str, String);

macro_rules! impl_expr_binary_op {
    ($($trait:ident :: $method:ident => $op:ident),*) => {
        $(
            impl<R: Into<Expr>> std::ops::$trait<R> for Expr {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    self.binary(BinaryOp::$op, rhs)
                }
            }
        )*
    };
}

impl_expr_binary_op!(
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Rem
);

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(self),
        }
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }
}

// ─── Display (for error messages) ───────────────────────────────────────────

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => f.write_str(&v.to_sql_literal()),
            Expr::Captured { name, .. } => write!(f, "{name}"),
            Expr::Field(member) => write!(f, "row.{member}"),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "!({expr})"),
                UnaryOp::Neg => write!(f, "-({expr})"),
                UnaryOp::IsNull => write!(f, "({expr}) is null"),
                UnaryOp::IsNotNull => write!(f, "({expr}) is not null"),
            },
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.sql()),
            Expr::Call { func, args } => {
                write!(f, "{func:?}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::InList { expr, list, negated } => {
                write!(f, "{expr} {}in [", if *negated { "not " } else { "" })?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Expr::MemberInit(init) => {
                write!(f, "new {} {{ ", init.entity)?;
                for (i, binding) in init.bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match binding {
                        MemberBinding::Assign { member, expr } => write!(f, "{member} = {expr}")?,
                        MemberBinding::Nested { member, .. } => write!(f, "{member} = {{ .. }}")?,
                    }
                }
                f.write_str(" }")
            }
        }
    }
}
