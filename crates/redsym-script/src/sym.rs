use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

use redsym_core::Value;
use redsym_core::ir::{BinOp, Conv, Expr, UnaryOp};

/// A symbolic expression. Rust literals convert implicitly through
/// `Into<Sym>`; arithmetic goes through `std::ops`, comparisons and logic
/// through the `*_` methods.
#[derive(Debug, Clone)]
pub struct Sym(pub(crate) Expr);

impl Sym {
    #[must_use]
    pub fn null() -> Self {
        Self(Expr::Lit(Value::Null))
    }

    #[must_use]
    pub fn lit(value: impl Into<Value>) -> Self {
        Self(Expr::Lit(value.into()))
    }

    #[must_use]
    pub(crate) fn expr(self) -> Expr {
        self.0
    }

    /// The underlying IR node. Useful when writing plugins that rewrite
    /// expressions directly.
    #[must_use]
    pub fn into_expr(self) -> Expr {
        self.0
    }

    fn binary(self, op: BinOp, other: impl Into<Sym>) -> Self {
        Self(Expr::Binary {
            op,
            left: Box::new(self.0),
            right: Box::new(other.into().0),
        })
    }

    #[must_use]
    pub fn eq_(self, other: impl Into<Sym>) -> Self {
        self.binary(BinOp::Eq, other)
    }

    #[must_use]
    pub fn ne_(self, other: impl Into<Sym>) -> Self {
        self.binary(BinOp::Ne, other)
    }

    #[must_use]
    pub fn lt_(self, other: impl Into<Sym>) -> Self {
        self.binary(BinOp::Lt, other)
    }

    #[must_use]
    pub fn le_(self, other: impl Into<Sym>) -> Self {
        self.binary(BinOp::Le, other)
    }

    #[must_use]
    pub fn gt_(self, other: impl Into<Sym>) -> Self {
        self.binary(BinOp::Gt, other)
    }

    #[must_use]
    pub fn ge_(self, other: impl Into<Sym>) -> Self {
        self.binary(BinOp::Ge, other)
    }

    /// Short-circuit AND returning the deciding operand's value.
    #[must_use]
    pub fn and_(self, other: impl Into<Sym>) -> Self {
        self.binary(BinOp::And, other)
    }

    /// Short-circuit OR returning the deciding operand's value.
    #[must_use]
    pub fn or_(self, other: impl Into<Sym>) -> Self {
        self.binary(BinOp::Or, other)
    }

    #[must_use]
    pub fn not_(self) -> Self {
        Self(Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self.0),
        })
    }

    /// Ternary: evaluates `then` or `otherwise` by this expression's
    /// truthiness.
    #[must_use]
    pub fn cond(self, then: impl Into<Sym>, otherwise: impl Into<Sym>) -> Self {
        Self(Expr::Cond {
            cond: Box::new(self.0),
            then: Box::new(then.into().0),
            otherwise: Box::new(otherwise.into().0),
        })
    }

    /// 0-based element access; negative indices count from the end.
    #[must_use]
    pub fn at(self, index: impl Into<Sym>) -> Self {
        Self(Expr::Index {
            target: Box::new(self.0),
            index: Box::new(index.into().0),
        })
    }

    #[must_use]
    pub fn len_(self) -> Self {
        Self(Expr::Len(Box::new(self.0)))
    }

    fn convert(self, conv: Conv) -> Self {
        Self(Expr::Convert {
            conv,
            expr: Box::new(self.0),
        })
    }

    #[must_use]
    pub fn to_num(self) -> Self {
        self.convert(Conv::ToNum)
    }

    #[must_use]
    pub fn to_int_str(self) -> Self {
        self.convert(Conv::ToIntStr)
    }

    #[must_use]
    pub fn to_str(self) -> Self {
        self.convert(Conv::ToStr)
    }
}

impl From<Expr> for Sym {
    fn from(expr: Expr) -> Self {
        Self(expr)
    }
}

macro_rules! lit_from {
    ($($ty:ty),+) => {
        $(impl From<$ty> for Sym {
            fn from(value: $ty) -> Self {
                Self(Expr::Lit(value.into()))
            }
        })+
    };
}

lit_from!(Value, bool, i32, i64, f64, &str, String);

impl<T: Into<Sym>> Add<T> for Sym {
    type Output = Sym;

    fn add(self, rhs: T) -> Sym {
        self.binary(BinOp::Add, rhs)
    }
}

impl<T: Into<Sym>> Sub<T> for Sym {
    type Output = Sym;

    fn sub(self, rhs: T) -> Sym {
        self.binary(BinOp::Sub, rhs)
    }
}

impl<T: Into<Sym>> Mul<T> for Sym {
    type Output = Sym;

    fn mul(self, rhs: T) -> Sym {
        self.binary(BinOp::Mul, rhs)
    }
}

impl<T: Into<Sym>> Div<T> for Sym {
    type Output = Sym;

    fn div(self, rhs: T) -> Sym {
        self.binary(BinOp::Div, rhs)
    }
}

impl<T: Into<Sym>> Rem<T> for Sym {
    type Output = Sym;

    fn rem(self, rhs: T) -> Sym {
        self.binary(BinOp::Rem, rhs)
    }
}

impl Neg for Sym {
    type Output = Sym;

    fn neg(self) -> Sym {
        Sym(Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(self.0),
        })
    }
}
