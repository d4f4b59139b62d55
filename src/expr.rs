use crate::Value;
use std::fmt::{self, Display, Write};

/// Closed expression grammar accepted by the lowering engine.
///
/// Every query intent (predicates, projections, ordering, grouping, computed
/// insert/update values) is one of these nodes. Anything the lowering engine
/// does not recognize fails at build time with the offending fragment, it is
/// never silently miscompiled.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to the statement's root entity row (the lambda parameter).
    Param(&'static str),
    /// Constant, becomes a positional query parameter.
    Value(Value),
    /// Property access, resolved through the join scope to `alias.column`.
    Member {
        base: Box<Expr>,
        name: &'static str,
    },
    /// Function call, matched against the dialect intrinsic table.
    Call {
        function: &'static str,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOpType,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOpType,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `CASE WHEN test THEN then ELSE otherwise END`
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Comma-joined element list.
    Array(Vec<Expr>),
    /// Correlated nested select over a navigation target.
    Subselect(Box<Subselect>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpType {
    Not,
    Negative,
    /// Host-side type adjustment, transparent in SQL.
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpType {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Remainder,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

/// The three nested-select shapes: scalar (projection only), predicated and
/// paginated. `source` must resolve to a navigation property; the subselect
/// is correlated on that navigation's join column.
#[derive(Debug, Clone, PartialEq)]
pub struct Subselect {
    pub source: Expr,
    pub projection: Expr,
    pub predicate: Option<Expr>,
    pub order_by: Vec<Ordered>,
    pub offset: u64,
    pub fetch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// An expression with a sort direction, the ORDER BY unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordered {
    pub expression: Expr,
    pub order: Order,
}

pub fn param(symbol: &'static str) -> Expr {
    Expr::Param(symbol)
}

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Value(value.into())
}

pub fn null() -> Expr {
    Expr::Value(Value::Null)
}

pub fn call(function: &'static str, args: Vec<Expr>) -> Expr {
    Expr::Call { function, args }
}

macro_rules! binary {
    ($name:ident, $op:ident) => {
        pub fn $name(self, rhs: impl Into<Expr>) -> Expr {
            Expr::Binary {
                op: BinaryOpType::$op,
                lhs: Box::new(self),
                rhs: Box::new(rhs.into()),
            }
        }
    };
}

impl Expr {
    pub fn member(self, name: &'static str) -> Expr {
        Expr::Member {
            base: Box::new(self),
            name,
        }
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOpType::Not,
            expr: Box::new(self),
        }
    }

    pub fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOpType::Negative,
            expr: Box::new(self),
        }
    }

    pub fn convert(self) -> Expr {
        Expr::Unary {
            op: UnaryOpType::Convert,
            expr: Box::new(self),
        }
    }

    binary!(add, Addition);
    binary!(sub, Subtraction);
    binary!(mul, Multiplication);
    binary!(div, Division);
    binary!(rem, Remainder);
    binary!(eq, Equal);
    binary!(ne, NotEqual);
    binary!(lt, Less);
    binary!(le, LessEqual);
    binary!(gt, Greater);
    binary!(ge, GreaterEqual);
    binary!(and, And);
    binary!(or, Or);

    pub fn is_null(self) -> Expr {
        self.eq(null())
    }

    pub fn conditional(test: Expr, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Expr {
        Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then.into()),
            otherwise: Box::new(otherwise.into()),
        }
    }

    pub fn asc(self) -> Ordered {
        Ordered {
            expression: self,
            order: Order::Asc,
        }
    }

    pub fn desc(self) -> Ordered {
        Ordered {
            expression: self,
            order: Order::Desc,
        }
    }
}

impl<T: Into<Value>> From<T> for Expr {
    fn from(value: T) -> Self {
        Expr::Value(value.into())
    }
}

impl BinaryOpType {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOpType::Addition => "+",
            BinaryOpType::Subtraction => "-",
            BinaryOpType::Multiplication => "*",
            BinaryOpType::Division => "/",
            BinaryOpType::Remainder => "%",
            BinaryOpType::Equal => "=",
            BinaryOpType::NotEqual => "<>",
            BinaryOpType::Less => "<",
            BinaryOpType::LessEqual => "<=",
            BinaryOpType::Greater => ">",
            BinaryOpType::GreaterEqual => ">=",
            BinaryOpType::And => "AND",
            BinaryOpType::Or => "OR",
        }
    }
}

impl Display for Expr {
    /// Pseudo-source rendering, used in unsupported-expression errors.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(symbol) => f.write_str(symbol),
            Expr::Value(v) => write!(f, "{:?}", v),
            Expr::Member { base, name } => write!(f, "{}.{}", base, name),
            Expr::Call { function, args } => {
                write!(f, "{}(", function)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.fmt(f)?;
                }
                f.write_char(')')
            }
            Expr::Unary { op, expr } => match op {
                UnaryOpType::Not => write!(f, "!({})", expr),
                UnaryOpType::Negative => write!(f, "-({})", expr),
                UnaryOpType::Convert => write!(f, "convert({})", expr),
            },
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => write!(f, "({} ? {} : {})", test, then, otherwise),
            Expr::Array(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_char(']')
            }
            Expr::Subselect(s) => write!(f, "{}.select({})", s.source, s.projection),
        }
    }
}
