use crate::{
    BinaryOpType, DialectProfile, Error, Expr, Pagination, Parameter, QueryScope, Resolution,
    Result, Subselect, UnaryOpType, Value, separated_by,
};
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use std::fmt::Write;
use std::mem;

fn unsupported(expr: &Expr) -> Error {
    Error::msg(format!("Unsupported expression fragment `{}`", expr))
}

/// Per-statement lowering context: the join scope, the positional parameter
/// buffer and the dialect facts. Created fresh per statement build.
pub struct Lowerer<'p> {
    pub profile: &'p DialectProfile,
    pub scope: QueryScope,
    pub params: Vec<Parameter>,
    /// Expanded navigation column lists get `AS <property>_<column>` labels,
    /// enabled while lowering a SELECT list.
    pub alias_expansions: bool,
    extra_aliases: usize,
}

impl<'p> Lowerer<'p> {
    pub fn new(profile: &'p DialectProfile, scope: QueryScope) -> Self {
        Self {
            profile,
            scope,
            params: Vec::new(),
            alias_expansions: false,
            extra_aliases: 0,
        }
    }

    /// Append a positional parameter and its placeholder.
    pub fn write_param(&mut self, value: Value, out: &mut String) {
        let index = self.params.len();
        self.profile.placeholder(out, index);
        self.params
            .push(Parameter::input(self.profile.param_name(index), value));
    }

    /// Lower one AST node into `out`, appending discovered parameters.
    /// A parameter-free operator subtree is evaluated host-side first and
    /// bound as a single parameter instead of being translated node by node.
    pub fn lower(&mut self, expr: &Expr, out: &mut String) -> Result<()> {
        if matches!(
            expr,
            Expr::Unary { .. } | Expr::Binary { .. } | Expr::Conditional { .. }
        ) && let Ok(value) = fold(expr)
        {
            self.write_param(value, out);
            return Ok(());
        }
        match expr {
            Expr::Value(v) => {
                self.write_param(v.clone(), out);
                Ok(())
            }
            Expr::Param(_) => match self.scope.resolve(expr) {
                Some(Resolution::Entity(node)) => {
                    self.write_entity_columns(node, out);
                    Ok(())
                }
                _ => Err(unsupported(expr)),
            },
            Expr::Member { .. } => match self.scope.resolve(expr) {
                Some(Resolution::Column { node, column }) => {
                    out.push_str(self.scope.alias(node));
                    out.push('.');
                    self.profile.quote(out, &column);
                    Ok(())
                }
                Some(Resolution::Entity(node)) => {
                    self.write_entity_columns(node, out);
                    Ok(())
                }
                // Outside the mapped grammar: evaluate host-side and pass the
                // result as a single parameter.
                None => self.lower_folded(expr, out),
            },
            Expr::Call { function, args } => self.lower_call(function, args, expr, out),
            Expr::Unary { op, expr: operand } => match op {
                UnaryOpType::Not => {
                    out.push_str("NOT ");
                    self.lower(operand, out)
                }
                UnaryOpType::Negative => {
                    out.push('-');
                    self.lower(operand, out)
                }
                UnaryOpType::Convert => self.lower(operand, out),
            },
            Expr::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, out),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                out.push_str("CASE WHEN ");
                self.lower(test, out)?;
                out.push_str(" THEN ");
                self.lower(then, out)?;
                out.push_str(" ELSE ");
                self.lower(otherwise, out)?;
                out.push_str(" END");
                Ok(())
            }
            Expr::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.lower(item, out)?;
                }
                Ok(())
            }
            Expr::Subselect(subselect) => self.lower_subselect(subselect, expr, out),
        }
    }

    fn lower_call(
        &mut self,
        function: &str,
        args: &[Expr],
        whole: &Expr,
        out: &mut String,
    ) -> Result<()> {
        let canonical = function.to_ascii_lowercase();
        if let Some(spelling) = self.profile.function(&canonical) {
            if args.is_empty() {
                // Zero-argument intrinsics are spelled verbatim (SYSDATE,
                // GETDATE(), ...).
                out.push_str(spelling);
                return Ok(());
            }
            out.push_str(spelling);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                self.lower(arg, out)?;
            }
            out.push(')');
            return Ok(());
        }
        if canonical == "navigate" && args.len() == 1 {
            return match self.scope.resolve(&args[0]) {
                Some(Resolution::Entity(node)) => {
                    self.write_entity_columns(node, out);
                    Ok(())
                }
                _ => Err(unsupported(whole)),
            };
        }
        self.lower_folded(whole, out)
    }

    fn lower_binary(
        &mut self,
        op: BinaryOpType,
        lhs: &Expr,
        rhs: &Expr,
        out: &mut String,
    ) -> Result<()> {
        fn null_const(expr: &Expr) -> bool {
            matches!(expr, Expr::Value(v) if v.is_null())
        }
        if matches!(op, BinaryOpType::Equal | BinaryOpType::NotEqual) {
            let suffix = if op == BinaryOpType::Equal {
                " IS NULL"
            } else {
                " IS NOT NULL"
            };
            if null_const(rhs) {
                self.lower(lhs, out)?;
                out.push_str(suffix);
                return Ok(());
            }
            if null_const(lhs) {
                self.lower(rhs, out)?;
                out.push_str(suffix);
                return Ok(());
            }
        }
        let logical = matches!(op, BinaryOpType::And | BinaryOpType::Or);
        if logical {
            out.push('(');
        }
        self.lower(lhs, out)?;
        out.push(' ');
        out.push_str(op.symbol());
        out.push(' ');
        self.lower(rhs, out)?;
        if logical {
            out.push(')');
        }
        Ok(())
    }

    fn lower_subselect(&mut self, s: &Subselect, whole: &Expr, out: &mut String) -> Result<()> {
        let Expr::Member { base, name } = &s.source else {
            return Err(unsupported(whole));
        };
        let Some(Resolution::Entity(parent)) = self.scope.resolve(base) else {
            return Err(unsupported(whole));
        };
        let parent_alias = self.scope.alias(parent).to_string();
        let Some(navigation) = self.scope.node(parent).descriptor.navigation(name) else {
            return Err(unsupported(whole));
        };
        let child = navigation.child.clone();
        let foreign_key = navigation.foreign_key.clone();
        let identity = child
            .identity()
            .ok_or_else(|| unsupported(whole))?
            .column
            .clone();

        // The nested select gets its own scope; alias numbering continues so
        // every table reference in the statement stays unique.
        let mut sub = Lowerer {
            profile: self.profile,
            scope: QueryScope::offset_by(self.scope.len() + self.extra_aliases),
            params: mem::take(&mut self.params),
            alias_expansions: false,
            extra_aliases: 0,
        };
        let root = sub.scope.add_root(child);
        let alias = sub.scope.alias(root).to_string();

        let mut projection = String::new();
        let result = sub.lower(&s.projection, &mut projection);
        let mut predicate = String::new();
        let result = result.and_then(|_| match &s.predicate {
            Some(p) => sub.lower(p, &mut predicate),
            None => Ok(()),
        });
        let mut order_by = String::new();
        let result = result.and_then(|_| {
            for (i, ordered) in s.order_by.iter().enumerate() {
                if i > 0 {
                    order_by.push_str(", ");
                }
                sub.lower(&ordered.expression, &mut order_by)?;
                if ordered.order == crate::Order::Desc {
                    order_by.push_str(" DESC");
                }
            }
            Ok(())
        });
        self.params = mem::take(&mut sub.params);
        self.extra_aliases += sub.scope.len() + sub.extra_aliases;
        result?;

        out.push_str("(SELECT ");
        out.push_str(&projection);
        out.push_str(" FROM ");
        self.profile.quote(out, &sub.scope.node(root).descriptor.table);
        out.push(' ');
        out.push_str(&alias);
        sub.scope.write_joins(self.profile, out);
        out.push_str(" WHERE ");
        out.push_str(&alias);
        out.push('.');
        self.profile.quote(out, &identity);
        out.push_str(" = ");
        out.push_str(&parent_alias);
        out.push('.');
        self.profile.quote(out, &foreign_key);
        if !predicate.is_empty() {
            out.push_str(" AND ");
            out.push_str(&predicate);
        }
        if !order_by.is_empty() {
            out.push_str(" ORDER BY ");
            out.push_str(&order_by);
        }
        write_pagination(self.profile, out, s.offset, s.fetch);
        out.push(')');
        Ok(())
    }

    /// Expand a joined entity to its full scalar column list, comma-joined.
    pub fn write_entity_columns(&self, node: usize, out: &mut String) {
        let reference = self.scope.node(node);
        separated_by(
            out,
            reference.descriptor.columns.iter(),
            |out, column| {
                out.push_str(&reference.alias);
                out.push('.');
                self.profile.quote(out, &column.column);
                if self.alias_expansions
                    && let Some(property) = reference.property
                {
                    out.push_str(" AS ");
                    self.profile.quote(
                        out,
                        &crate::EntityDescriptor::nested_alias(property, &column.column),
                    );
                }
            },
            ", ",
        );
    }

    fn lower_folded(&mut self, expr: &Expr, out: &mut String) -> Result<()> {
        let value = fold(expr)?;
        self.write_param(value, out);
        Ok(())
    }
}

/// Host-side evaluation of a parameter-free subtree into a single constant.
/// This is the fallback for expressions outside the mapped grammar, e.g.
/// arithmetic over captured values; anything touching the query row fails.
pub fn fold(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Value(v) => Ok(v.clone()),
        Expr::Unary { op, expr: operand } => {
            let value = fold(operand)?;
            match op {
                UnaryOpType::Convert => Ok(value),
                UnaryOpType::Not => match value {
                    Value::Boolean(Some(b)) => Ok(Value::Boolean(Some(!b))),
                    _ => Err(unsupported(expr)),
                },
                // Overflowing negations (iN::MIN) fall back to structural
                // lowering of the operator.
                UnaryOpType::Negative => match value {
                    Value::Int8(Some(v)) => v.checked_neg().map(|v| Value::Int8(Some(v))),
                    Value::Int16(Some(v)) => v.checked_neg().map(|v| Value::Int16(Some(v))),
                    Value::Int32(Some(v)) => v.checked_neg().map(|v| Value::Int32(Some(v))),
                    Value::Int64(Some(v)) => v.checked_neg().map(|v| Value::Int64(Some(v))),
                    Value::Float32(Some(v)) => Some(Value::Float32(Some(-v))),
                    Value::Float64(Some(v)) => Some(Value::Float64(Some(-v))),
                    Value::Decimal(Some(v)) => Some(Value::Decimal(Some(-v))),
                    _ => None,
                }
                .ok_or_else(|| unsupported(expr)),
            }
        }
        Expr::Binary { op, lhs, rhs } => fold_binary(*op, lhs, rhs, expr),
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => match fold(test)? {
            Value::Boolean(Some(true)) => fold(then),
            Value::Boolean(Some(false)) => fold(otherwise),
            _ => Err(unsupported(expr)),
        },
        _ => Err(unsupported(expr)),
    }
}

fn fold_binary(op: BinaryOpType, lhs: &Expr, rhs: &Expr, whole: &Expr) -> Result<Value> {
    use BinaryOpType::*;
    let left = fold(lhs)?;
    let right = fold(rhs)?;
    if let (Value::Varchar(Some(l)), Value::Varchar(Some(r)), Addition) = (&left, &right, op) {
        return Ok(Value::Varchar(Some(format!("{}{}", l, r))));
    }
    if let (Value::Boolean(Some(l)), Value::Boolean(Some(r))) = (&left, &right) {
        return match op {
            And => Ok(Value::Boolean(Some(*l && *r))),
            Or => Ok(Value::Boolean(Some(*l || *r))),
            Equal => Ok(Value::Boolean(Some(l == r))),
            NotEqual => Ok(Value::Boolean(Some(l != r))),
            _ => Err(unsupported(whole)),
        };
    }
    let (l, r) = match (decimal_of(&left), decimal_of(&right)) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(unsupported(whole)),
    };
    let arithmetic = |v: Decimal| {
        if matches!(
            (&left, &right),
            (Value::Float32(..) | Value::Float64(..), _) | (_, Value::Float32(..) | Value::Float64(..))
        ) {
            Value::Float64(v.to_f64())
        } else if matches!(
            (&left, &right),
            (Value::Decimal(..), _) | (_, Value::Decimal(..))
        ) {
            Value::Decimal(Some(v))
        } else {
            Value::Int64(v.to_i64())
        }
    };
    match op {
        Addition => Ok(arithmetic(l + r)),
        Subtraction => Ok(arithmetic(l - r)),
        Multiplication => Ok(arithmetic(l * r)),
        Division if !r.is_zero() => Ok(arithmetic(l / r)),
        Remainder if !r.is_zero() => Ok(arithmetic(l % r)),
        Equal => Ok(Value::Boolean(Some(l == r))),
        NotEqual => Ok(Value::Boolean(Some(l != r))),
        Less => Ok(Value::Boolean(Some(l < r))),
        LessEqual => Ok(Value::Boolean(Some(l <= r))),
        Greater => Ok(Value::Boolean(Some(l > r))),
        GreaterEqual => Ok(Value::Boolean(Some(l >= r))),
        _ => Err(unsupported(whole)),
    }
}

fn decimal_of(value: &Value) -> Option<Decimal> {
    match value {
        Value::Int8(Some(v)) => Some(Decimal::from(*v)),
        Value::Int16(Some(v)) => Some(Decimal::from(*v)),
        Value::Int32(Some(v)) => Some(Decimal::from(*v)),
        Value::Int64(Some(v)) => Some(Decimal::from(*v)),
        Value::UInt8(Some(v)) => Some(Decimal::from(*v)),
        Value::UInt16(Some(v)) => Some(Decimal::from(*v)),
        Value::UInt32(Some(v)) => Some(Decimal::from(*v)),
        Value::UInt64(Some(v)) => Some(Decimal::from(*v)),
        Value::Float32(Some(v)) => Decimal::from_f32(*v),
        Value::Float64(Some(v)) => Decimal::from_f64(*v),
        Value::Decimal(Some(v)) => Some(*v),
        _ => None,
    }
}

/// Dialect pagination clause. `fetch = 0` means unbounded after `offset`;
/// offset 0 with unbounded fetch emits nothing at all.
pub fn write_pagination(profile: &DialectProfile, out: &mut String, offset: u64, fetch: u64) {
    if offset == 0 && fetch == 0 {
        return;
    }
    match profile.pagination {
        Pagination::OffsetFetch => {
            let _ = write!(out, " OFFSET {} ROWS", offset);
            if fetch > 0 {
                let _ = write!(out, " FETCH NEXT {} ROWS ONLY", fetch);
            }
        }
        Pagination::LimitOffset => {
            if fetch > 0 {
                let _ = write!(out, " LIMIT {},{}", offset, fetch);
            } else {
                let _ = write!(out, " LIMIT {},{}", offset, profile.limit_all);
            }
        }
        Pagination::OffsetLimit => {
            let _ = write!(out, " OFFSET {}", offset);
            if fetch > 0 {
                let _ = write!(out, " LIMIT {}", fetch);
            }
        }
    }
}

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}
macro_rules! write_float {
    ($out:ident, $value:expr) => {{
        let mut buffer = ryu::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

/// Render a value as a dialect-portable SQL literal. Used by batched inserts,
/// which inline row values instead of parameterizing them.
pub fn write_literal(out: &mut String, value: &Value) {
    if value.is_null() {
        out.push_str("NULL");
        return;
    }
    match value {
        Value::Boolean(Some(v)) => out.push_str(["0", "1"][*v as usize]),
        Value::Int8(Some(v)) => write_integer!(out, *v),
        Value::Int16(Some(v)) => write_integer!(out, *v),
        Value::Int32(Some(v)) => write_integer!(out, *v),
        Value::Int64(Some(v)) => write_integer!(out, *v),
        Value::UInt8(Some(v)) => write_integer!(out, *v),
        Value::UInt16(Some(v)) => write_integer!(out, *v),
        Value::UInt32(Some(v)) => write_integer!(out, *v),
        Value::UInt64(Some(v)) => write_integer!(out, *v),
        Value::Float32(Some(v)) => write_float!(out, *v),
        Value::Float64(Some(v)) => write_float!(out, *v),
        Value::Decimal(Some(v)) => {
            let _ = write!(out, "{}", v);
        }
        Value::Varchar(Some(v)) => {
            out.push('\'');
            for c in v.chars() {
                out.push(c);
                if c == '\'' {
                    out.push('\'');
                }
            }
            out.push('\'');
        }
        Value::Blob(Some(v)) => {
            out.push('\'');
            for b in v.iter() {
                let _ = write!(out, "\\x{:02X}", b);
            }
            out.push('\'');
        }
        Value::Date(Some(v)) => {
            let _ = write!(
                out,
                "'{:04}-{:02}-{:02}'",
                v.year(),
                v.month() as u8,
                v.day()
            );
        }
        Value::Time(Some(v)) => {
            let _ = write!(out, "'{:02}:{:02}:{:02}'", v.hour(), v.minute(), v.second());
        }
        Value::Timestamp(Some(v)) => {
            let _ = write!(
                out,
                "'{:04}-{:02}-{:02} {:02}:{:02}:{:02}'",
                v.year(),
                v.month() as u8,
                v.day(),
                v.hour(),
                v.minute(),
                v.second()
            );
        }
        Value::Uuid(Some(v)) => {
            let _ = write!(out, "'{}'", v);
        }
        _ => out.push_str("NULL"),
    }
}
