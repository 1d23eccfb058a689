//! Defines an enum of all the possible values that a column or an expression can have,
//! and the operations the runtime applies to them.
//!
//! Binary operations expect both operands to already have the same type. The type inference pass
//! inserts explicit casts so that this holds, so mixed-type operands here are an internal error.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use chrono::NaiveDateTime;
use enum_as_inner::EnumAsInner;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::ast::{BinaryOp, UnaryOp};
use crate::sql_type::SqlType;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, EnumAsInner)]
/// can hold any value a data source can produce, or `NULL`.
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Decimal(rust_decimal::Decimal),
    Char(char),
    Text(String),
    DateTime(NaiveDateTime),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Arithmetic overflow in {0}.")]
    Overflow(&'static str),
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Operator {op} cannot be applied to {lhs} and {rhs}.")]
    InvalidOperands {
        op: &'static str,
        lhs: SqlType,
        rhs: SqlType,
    },
    #[error("Unable to convert {value} of type {from} to {to}.")]
    InvalidCast {
        value: String,
        from: SqlType,
        to: SqlType,
    },
}

impl SqlValue {
    pub fn sql_type(&self) -> SqlType {
        match self {
            SqlValue::Null => SqlType::Null,
            SqlValue::Bool(_) => SqlType::Bool,
            SqlValue::Int(_) => SqlType::Int,
            SqlValue::Long(_) => SqlType::Long,
            SqlValue::Double(_) => SqlType::Double,
            SqlValue::Decimal(_) => SqlType::Decimal,
            SqlValue::Char(_) => SqlType::Char,
            SqlValue::Text(_) => SqlType::Text,
            SqlValue::DateTime(_) => SqlType::DateTime,
        }
    }

    /// interprets a predicate result. `NULL` counts as false.
    pub fn is_true(&self) -> bool {
        matches!(self, SqlValue::Bool(true))
    }

    fn invalid_cast(&self, to: SqlType) -> ValueError {
        ValueError::InvalidCast {
            value: self.to_string(),
            from: self.sql_type(),
            to,
        }
    }

    /// converts a value to another type. Widening numeric conversions never fail.
    pub fn cast(&self, to: SqlType) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        if self.sql_type() == to || matches!(to, SqlType::Any | SqlType::Void) {
            return Ok(self.clone());
        }
        let v = match (self, to) {
            (Null, _) => Null,
            (Int(i), SqlType::Long) => Long(*i as i64),
            (Int(i), SqlType::Double) => Double(*i as f64),
            (Int(i), SqlType::Decimal) => Decimal(rust_decimal::Decimal::from(*i)),
            (Long(i), SqlType::Int) => Int(i32::try_from(*i).map_err(|_| self.invalid_cast(to))?),
            (Long(i), SqlType::Double) => Double(*i as f64),
            (Long(i), SqlType::Decimal) => Decimal(rust_decimal::Decimal::from(*i)),
            (Double(d), SqlType::Decimal) => Decimal(
                rust_decimal::Decimal::from_f64(*d).ok_or_else(|| self.invalid_cast(to))?,
            ),
            (Double(d), SqlType::Long) => Long(d.trunc() as i64),
            (Double(d), SqlType::Int) => Int(d.trunc() as i32),
            (Decimal(d), SqlType::Double) => Double(d.to_f64().ok_or_else(|| self.invalid_cast(to))?),
            (Decimal(d), SqlType::Long) => Long(d.trunc().to_i64().ok_or_else(|| self.invalid_cast(to))?),
            (Char(c), SqlType::Text) => Text(c.to_string()),
            (Text(s), SqlType::Char) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Char(c),
                    _ => return Err(self.invalid_cast(to)),
                }
            }
            (Text(s), SqlType::Int) => Int(s.trim().parse().map_err(|_| self.invalid_cast(to))?),
            (Text(s), SqlType::Long) => Long(s.trim().parse().map_err(|_| self.invalid_cast(to))?),
            (Text(s), SqlType::Double) => Double(s.trim().parse().map_err(|_| self.invalid_cast(to))?),
            (Text(s), SqlType::Decimal) => Decimal(s.trim().parse().map_err(|_| self.invalid_cast(to))?),
            (Text(s), SqlType::Bool) => match s.trim().to_lowercase().as_str() {
                "true" => Bool(true),
                "false" => Bool(false),
                _ => return Err(self.invalid_cast(to)),
            },
            (Text(s), SqlType::DateTime) => DateTime(
                NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT)
                    .map_err(|_| self.invalid_cast(to))?,
            ),
            (v, SqlType::Text) => Text(v.to_string()),
            _ => return Err(self.invalid_cast(to)),
        };
        Ok(v)
    }

    fn invalid_operands(&self, op: &'static str, other: &SqlValue) -> ValueError {
        ValueError::InvalidOperands {
            op,
            lhs: self.sql_type(),
            rhs: other.sql_type(),
        }
    }

    pub fn add(&self, other: &SqlValue) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        Ok(match (self, other) {
            (Null, _) | (_, Null) => Null,
            (Int(a), Int(b)) => Int(a.checked_add(*b).ok_or(ValueError::Overflow("+"))?),
            (Long(a), Long(b)) => Long(a.checked_add(*b).ok_or(ValueError::Overflow("+"))?),
            (Double(a), Double(b)) => Double(a + b),
            (Decimal(a), Decimal(b)) => Decimal(a.checked_add(*b).ok_or(ValueError::Overflow("+"))?),
            (Text(a), Text(b)) => Text(format!("{a}{b}")),
            _ => return Err(self.invalid_operands("+", other)),
        })
    }

    pub fn sub(&self, other: &SqlValue) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        Ok(match (self, other) {
            (Null, _) | (_, Null) => Null,
            (Int(a), Int(b)) => Int(a.checked_sub(*b).ok_or(ValueError::Overflow("-"))?),
            (Long(a), Long(b)) => Long(a.checked_sub(*b).ok_or(ValueError::Overflow("-"))?),
            (Double(a), Double(b)) => Double(a - b),
            (Decimal(a), Decimal(b)) => Decimal(a.checked_sub(*b).ok_or(ValueError::Overflow("-"))?),
            _ => return Err(self.invalid_operands("-", other)),
        })
    }

    pub fn mul(&self, other: &SqlValue) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        Ok(match (self, other) {
            (Null, _) | (_, Null) => Null,
            (Int(a), Int(b)) => Int(a.checked_mul(*b).ok_or(ValueError::Overflow("*"))?),
            (Long(a), Long(b)) => Long(a.checked_mul(*b).ok_or(ValueError::Overflow("*"))?),
            (Double(a), Double(b)) => Double(a * b),
            (Decimal(a), Decimal(b)) => Decimal(a.checked_mul(*b).ok_or(ValueError::Overflow("*"))?),
            _ => return Err(self.invalid_operands("*", other)),
        })
    }

    pub fn div(&self, other: &SqlValue) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        Ok(match (self, other) {
            (Null, _) | (_, Null) => Null,
            (Int(_), Int(0)) | (Long(_), Long(0)) => return Err(ValueError::DivisionByZero),
            (Int(a), Int(b)) => Int(a.checked_div(*b).ok_or(ValueError::Overflow("/"))?),
            (Long(a), Long(b)) => Long(a.checked_div(*b).ok_or(ValueError::Overflow("/"))?),
            (Double(a), Double(b)) => Double(a / b),
            (Decimal(_), Decimal(b)) if b.is_zero() => return Err(ValueError::DivisionByZero),
            (Decimal(a), Decimal(b)) => Decimal(a.checked_div(*b).ok_or(ValueError::Overflow("/"))?),
            _ => return Err(self.invalid_operands("/", other)),
        })
    }

    pub fn rem(&self, other: &SqlValue) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        Ok(match (self, other) {
            (Null, _) | (_, Null) => Null,
            (Int(_), Int(0)) | (Long(_), Long(0)) => return Err(ValueError::DivisionByZero),
            (Int(a), Int(b)) => Int(a.checked_rem(*b).ok_or(ValueError::Overflow("%"))?),
            (Long(a), Long(b)) => Long(a.checked_rem(*b).ok_or(ValueError::Overflow("%"))?),
            (Double(a), Double(b)) => Double(a % b),
            (Decimal(_), Decimal(b)) if b.is_zero() => return Err(ValueError::DivisionByZero),
            (Decimal(a), Decimal(b)) => Decimal(a.checked_rem(*b).ok_or(ValueError::Overflow("%"))?),
            _ => return Err(self.invalid_operands("%", other)),
        })
    }

    /// applies a bitwise or shift operator to integer operands.
    pub fn bitwise(&self, op: &'static str, other: &SqlValue) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        fn shift_amount(b: i64) -> Result<u32, ValueError> {
            u32::try_from(b).map_err(|_| ValueError::Overflow("shift"))
        }
        Ok(match (self, other) {
            (Null, _) | (_, Null) => Null,
            (Int(a), Int(b)) => Int(match op {
                "&" => a & b,
                "|" => a | b,
                "^" => a ^ b,
                "<<" => a.checked_shl(shift_amount(*b as i64)?).ok_or(ValueError::Overflow("<<"))?,
                ">>" => a.checked_shr(shift_amount(*b as i64)?).ok_or(ValueError::Overflow(">>"))?,
                _ => return Err(self.invalid_operands(op, other)),
            }),
            (Long(a), Long(b)) => Long(match op {
                "&" => a & b,
                "|" => a | b,
                "^" => a ^ b,
                "<<" => a.checked_shl(shift_amount(*b)?).ok_or(ValueError::Overflow("<<"))?,
                ">>" => a.checked_shr(shift_amount(*b)?).ok_or(ValueError::Overflow(">>"))?,
                _ => return Err(self.invalid_operands(op, other)),
            }),
            _ => return Err(self.invalid_operands(op, other)),
        })
    }

    pub fn negate(&self) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        Ok(match self {
            Null => Null,
            Int(a) => Int(a.checked_neg().ok_or(ValueError::Overflow("-"))?),
            Long(a) => Long(a.checked_neg().ok_or(ValueError::Overflow("-"))?),
            Double(a) => Double(-a),
            Decimal(a) => Decimal(-*a),
            _ => return Err(self.invalid_operands("-", self)),
        })
    }

    pub fn bitwise_not(&self) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        Ok(match self {
            Null => Null,
            Int(a) => Int(!a),
            Long(a) => Long(!a),
            _ => return Err(self.invalid_operands("~", self)),
        })
    }

    /// compares two values of the same type. Returns `None` if either side is `NULL`.
    pub fn compare(&self, other: &SqlValue) -> Result<Option<Ordering>, ValueError> {
        use SqlValue::*;
        Ok(match (self, other) {
            (Null, _) | (_, Null) => None,
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Long(a), Long(b)) => Some(a.cmp(b)),
            (Double(a), Double(b)) => Some(a.total_cmp(b)),
            (Decimal(a), Decimal(b)) => Some(a.cmp(b)),
            (Char(a), Char(b)) => Some(a.cmp(b)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            _ => return Err(self.invalid_operands("compare", other)),
        })
    }

    /// total order used for sorting: `NULL` first, numbers compared across numeric types,
    /// everything else by type and then value.
    pub fn sort_cmp(&self, other: &SqlValue) -> Ordering {
        use SqlValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (a, b) if a.sql_type() == b.sql_type() => a.compare(b).ok().flatten().unwrap_or(Ordering::Equal),
            (a, b) if a.sql_type().is_numeric() && b.sql_type().is_numeric() => {
                let target = if a.sql_type().numeric_rank() > b.sql_type().numeric_rank() {
                    a.sql_type()
                } else {
                    b.sql_type()
                };
                match (a.cast(target), b.cast(target)) {
                    (Ok(x), Ok(y)) => x.compare(&y).ok().flatten().unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                }
            }
            (a, b) => type_order(a.sql_type()).cmp(&type_order(b.sql_type())),
        }
    }

    /// indexes into a string. Out of range yields `NULL`.
    pub fn index(&self, idx: &SqlValue) -> Result<SqlValue, ValueError> {
        use SqlValue::*;
        let position = match idx {
            Null => return Ok(Null),
            Int(i) => *i as i64,
            Long(i) => *i,
            _ => return Err(self.invalid_operands("[]", idx)),
        };
        match self {
            Null => Ok(Null),
            Text(s) => Ok(usize::try_from(position)
                .ok()
                .and_then(|p| s.chars().nth(p))
                .map(Char)
                .unwrap_or(Null)),
            _ => Err(self.invalid_operands("[]", idx)),
        }
    }

    /// applies a binary operator to operands that already have the same type. Comparisons with
    /// `NULL` yield `NULL`; `AND` and `OR` follow three-valued logic.
    pub fn apply(&self, op: BinaryOp, other: &SqlValue) -> Result<SqlValue, ValueError> {
        use BinaryOp::*;
        match op {
            Add => self.add(other),
            Subtract => self.sub(other),
            Multiply => self.mul(other),
            Divide => self.div(other),
            Modulo => self.rem(other),
            ShiftLeft => self.bitwise("<<", other),
            ShiftRight => self.bitwise(">>", other),
            BitAnd => self.bitwise("&", other),
            BitXor => self.bitwise("^", other),
            BitOr => self.bitwise("|", other),
            And => Ok(match (self, other) {
                (SqlValue::Bool(false), _) | (_, SqlValue::Bool(false)) => SqlValue::Bool(false),
                (SqlValue::Bool(true), SqlValue::Bool(true)) => SqlValue::Bool(true),
                _ => SqlValue::Null,
            }),
            Or => Ok(match (self, other) {
                (SqlValue::Bool(true), _) | (_, SqlValue::Bool(true)) => SqlValue::Bool(true),
                (SqlValue::Bool(false), SqlValue::Bool(false)) => SqlValue::Bool(false),
                _ => SqlValue::Null,
            }),
            Eq | NotEq if self.sql_type() != other.sql_type() => {
                // Opaque values of different kinds are simply unequal.
                if matches!(self, SqlValue::Null) || matches!(other, SqlValue::Null) {
                    return Ok(SqlValue::Null);
                }
                Ok(SqlValue::Bool((self == other) == (op == Eq)))
            }
            _ => {
                let ord = match self.compare(other)? {
                    Some(o) => o,
                    None => return Ok(SqlValue::Null),
                };
                Ok(SqlValue::Bool(match op {
                    Eq => ord == Ordering::Equal,
                    NotEq => ord != Ordering::Equal,
                    Lt => ord == Ordering::Less,
                    LtEq => ord != Ordering::Greater,
                    Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }))
            }
        }
    }

    pub fn apply_unary(&self, op: UnaryOp) -> Result<SqlValue, ValueError> {
        match (op, self) {
            (UnaryOp::Negate, v) => v.negate(),
            (UnaryOp::BitNot, v) => v.bitwise_not(),
            (UnaryOp::Not, SqlValue::Null) => Ok(SqlValue::Null),
            (UnaryOp::Not, SqlValue::Bool(b)) => Ok(SqlValue::Bool(!b)),
            (UnaryOp::Not, v) => Err(v.invalid_operands("NOT", v)),
        }
    }
}

fn type_order(t: SqlType) -> u8 {
    match t {
        SqlType::Void | SqlType::Null => 0,
        SqlType::Bool => 1,
        SqlType::Int | SqlType::Long | SqlType::Double | SqlType::Decimal => 2,
        SqlType::Char => 3,
        SqlType::Text => 4,
        SqlType::DateTime => 5,
        SqlType::Any => 6,
    }
}

/// Structural equality: same variant and same value. `NULL` equals `NULL` here, which is what
/// grouping and set operations need. Use `compare` for SQL comparison semantics.
impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        use SqlValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Double(a), Double(b)) => normalized_bits(*a) == normalized_bits(*b),
            (Decimal(a), Decimal(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SqlValue {}

fn normalized_bits(d: f64) -> u64 {
    if d == 0.0 {
        0.0f64.to_bits()
    } else if d.is_nan() {
        f64::NAN.to_bits()
    } else {
        d.to_bits()
    }
}

impl Hash for SqlValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use SqlValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Null => (),
            Bool(b) => b.hash(state),
            Int(i) => i.hash(state),
            Long(i) => i.hash(state),
            Double(d) => normalized_bits(*d).hash(state),
            Decimal(d) => d.normalize().hash(state),
            Char(c) => c.hash(state),
            Text(s) => s.hash(state),
            DateTime(t) => t.hash(state),
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(x) => x.fmt(f),
            SqlValue::Int(x) => x.fmt(f),
            SqlValue::Long(x) => x.fmt(f),
            SqlValue::Double(x) => x.fmt(f),
            SqlValue::Decimal(x) => x.fmt(f),
            SqlValue::Char(x) => x.fmt(f),
            SqlValue::Text(x) => x.fmt(f),
            SqlValue::DateTime(x) => x.format(DATETIME_FORMAT).fmt(f),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i32> for SqlValue {
    fn from(i: i32) -> Self {
        SqlValue::Int(i)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Long(i)
    }
}

impl From<f64> for SqlValue {
    fn from(d: f64) -> Self {
        SqlValue::Double(d)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<rust_decimal::Decimal> for SqlValue {
    fn from(d: rust_decimal::Decimal) -> Self {
        SqlValue::Decimal(d)
    }
}

#[test]
fn test_arithmetic() {
    use SqlValue::*;
    let cases = vec![
        (Int(1), "+", Int(2), Int(3)),
        (Long(10), "-", Long(4), Long(6)),
        (Double(1.5), "*", Double(2.0), Double(3.0)),
        (Int(7), "/", Int(2), Int(3)),
        (Int(7), "%", Int(4), Int(3)),
        (Text("ab".into()), "+", Text("cd".into()), Text("abcd".into())),
        (Null, "+", Int(1), Null),
    ];
    for (lhs, op, rhs, expected) in cases {
        let actual = match op {
            "+" => lhs.add(&rhs),
            "-" => lhs.sub(&rhs),
            "*" => lhs.mul(&rhs),
            "/" => lhs.div(&rhs),
            "%" => lhs.rem(&rhs),
            _ => unreachable!(),
        };
        assert_eq!(actual, Ok(expected), "{lhs} {op} {rhs}");
    }
}

#[test]
fn test_arithmetic_errors() {
    use SqlValue::*;
    assert_eq!(Int(1).div(&Int(0)), Err(ValueError::DivisionByZero));
    assert_eq!(Int(i32::MAX).add(&Int(1)), Err(ValueError::Overflow("+")));
    assert!(Text("a".into()).sub(&Int(1)).is_err());
}

#[test]
fn test_cast_widening() {
    use SqlValue::*;
    assert_eq!(Int(2).cast(SqlType::Long), Ok(Long(2)));
    assert_eq!(Int(2).cast(SqlType::Double), Ok(Double(2.0)));
    assert_eq!(
        Long(2).cast(SqlType::Decimal),
        Ok(Decimal(rust_decimal::Decimal::from(2)))
    );
    assert_eq!(Char('d').cast(SqlType::Text), Ok(Text("d".into())));
    assert_eq!(Null.cast(SqlType::Int), Ok(Null));
}

#[test]
fn test_structural_equality_and_hash() {
    use std::collections::HashSet;
    let mut set = HashSet::new();
    set.insert(SqlValue::Double(0.0));
    assert!(set.contains(&SqlValue::Double(-0.0)));
    assert_ne!(SqlValue::Int(1), SqlValue::Long(1));
    assert_eq!(SqlValue::Null, SqlValue::Null);
}

#[test]
fn test_index_into_text() {
    use SqlValue::*;
    assert_eq!(Text("david".into()).index(&Int(0)), Ok(Char('d')));
    assert_eq!(Text("".into()).index(&Int(0)), Ok(Null));
    assert_eq!(Text("ab".into()).index(&Int(-1)), Ok(Null));
}

#[test]
fn test_sort_cmp_orders_nulls_first() {
    use SqlValue::*;
    let mut values = vec![Int(3), Null, Long(1), Double(2.5)];
    values.sort_by(|a, b| a.sort_cmp(b));
    assert_eq!(values, vec![Null, Long(1), Double(2.5), Int(3)]);
}

#[test]
fn test_apply_three_valued_logic() {
    use SqlValue::{Bool, Null};
    let cases = vec![
        (BinaryOp::And, Bool(true), Null, Null),
        (BinaryOp::And, Bool(false), Null, Bool(false)),
        (BinaryOp::Or, Null, Bool(true), Bool(true)),
        (BinaryOp::Or, Bool(false), Null, Null),
        (BinaryOp::Eq, SqlValue::Int(1), Null, Null),
        (BinaryOp::Lt, SqlValue::Int(1), SqlValue::Int(2), Bool(true)),
        (BinaryOp::Eq, SqlValue::from("a"), SqlValue::Int(1), Bool(false)),
        (BinaryOp::NotEq, SqlValue::from("a"), SqlValue::Int(1), Bool(true)),
    ];
    for (op, l, r, expected) in cases {
        println!("Running case: {} {} {}", l, op, r);
        assert_eq!(l.apply(op, &r), Ok(expected));
    }
    assert_eq!(Bool(true).apply_unary(UnaryOp::Not), Ok(Bool(false)));
}
