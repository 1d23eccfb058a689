//! Defines the value types a column or an expression can have, and routines for conversion to and from string.
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// These are the basic types that a value can have.
/// Notes:
///   - `Void` is the type of a method that returns nothing. Any expression with a `Void` operand is `Void`.
///   - `Null` is the type of the `NULL` literal. It converts to any other type.
///   - `Any` is an opaque value that only supports structural equality.
pub enum SqlType {
    Void,
    Null,
    Bool,
    Int,
    Long,
    Double,
    Decimal,
    Char,
    Text,
    DateTime,
    Any,
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlType::Void => f.write_str("void"),
            SqlType::Null => f.write_str("null"),
            SqlType::Bool => f.write_str("bool"),
            SqlType::Int => f.write_str("int"),
            SqlType::Long => f.write_str("long"),
            SqlType::Double => f.write_str("double"),
            SqlType::Decimal => f.write_str("decimal"),
            SqlType::Char => f.write_str("char"),
            SqlType::Text => f.write_str("string"),
            SqlType::DateTime => f.write_str("datetime"),
            SqlType::Any => f.write_str("any"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unable to parse a type from type name: {0}.")]
    ParseSqlTypeError(String),
}

impl FromStr for SqlType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bool" | "boolean" => Ok(SqlType::Bool),
            "int" | "integer" | "int32" => Ok(SqlType::Int),
            "long" | "int64" | "bigint" => Ok(SqlType::Long),
            "double" | "float" | "real" => Ok(SqlType::Double),
            "decimal" | "money" => Ok(SqlType::Decimal),
            "char" => Ok(SqlType::Char),
            "string" | "text" => Ok(SqlType::Text),
            "datetime" | "timestamp" => Ok(SqlType::DateTime),
            "any" | "object" => Ok(SqlType::Any),
            x => Err(Error::ParseSqlTypeError(String::from(x))),
        }
    }
}

impl SqlType {
    /// Position of a numeric type in the widening order `Int < Long < Double < Decimal`.
    pub fn numeric_rank(self) -> Option<u8> {
        match self {
            SqlType::Int => Some(1),
            SqlType::Long => Some(2),
            SqlType::Double => Some(3),
            SqlType::Decimal => Some(4),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.numeric_rank().is_some()
    }

    pub fn is_integer(self) -> bool {
        matches!(self, SqlType::Int | SqlType::Long)
    }

    /// Reference types can hold a null without being wrapped.
    pub fn is_reference(self) -> bool {
        matches!(self, SqlType::Text | SqlType::Any | SqlType::Null)
    }
}

/// A `SqlType` together with its nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueType {
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl ValueType {
    pub fn new(sql_type: SqlType) -> Self {
        ValueType {
            sql_type,
            nullable: sql_type.is_reference(),
        }
    }

    pub fn nullable(sql_type: SqlType) -> Self {
        ValueType {
            sql_type,
            nullable: true,
        }
    }

    pub const VOID: ValueType = ValueType {
        sql_type: SqlType::Void,
        nullable: false,
    };

    pub const BOOL: ValueType = ValueType {
        sql_type: SqlType::Bool,
        nullable: false,
    };

    pub fn is_void(&self) -> bool {
        self.sql_type == SqlType::Void
    }

    /// wraps value types as nullable. Reference types already are.
    pub fn make_nullable_if_possible(self) -> Self {
        match self.sql_type {
            SqlType::Void => self,
            _ => ValueType::nullable(self.sql_type),
        }
    }

    pub fn with_nullable(self, nullable: bool) -> Self {
        ValueType {
            sql_type: self.sql_type,
            nullable: nullable || self.sql_type.is_reference(),
        }
    }
}

impl From<SqlType> for ValueType {
    fn from(t: SqlType) -> Self {
        ValueType::new(t)
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.nullable && !self.sql_type.is_reference() {
            write!(f, "{}?", self.sql_type)
        } else {
            self.sql_type.fmt(f)
        }
    }
}

impl FromStr for ValueType {
    type Err = Error;

    /// parses declared type names such as `'int'` or `'int?'`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_suffix('?') {
            Some(inner) => Ok(ValueType::nullable(SqlType::from_str(inner)?)),
            None => Ok(ValueType::new(SqlType::from_str(s)?)),
        }
    }
}

#[test]
fn test_parse_type_names() {
    let cases = vec![
        ("int", ValueType::new(SqlType::Int)),
        ("Integer", ValueType::new(SqlType::Int)),
        ("long?", ValueType::nullable(SqlType::Long)),
        ("float", ValueType::new(SqlType::Double)),
        ("decimal", ValueType::new(SqlType::Decimal)),
        ("string", ValueType::nullable(SqlType::Text)),
        ("datetime?", ValueType::nullable(SqlType::DateTime)),
    ];
    for (input, expected) in cases {
        assert_eq!(ValueType::from_str(input), Ok(expected));
    }
    assert!(ValueType::from_str("varchar2").is_err());
}

#[test]
fn test_display_roundtrips_through_from_str() {
    for t in [
        ValueType::new(SqlType::Int),
        ValueType::nullable(SqlType::Bool),
        ValueType::new(SqlType::Text),
        ValueType::nullable(SqlType::Decimal),
    ] {
        assert_eq!(ValueType::from_str(&t.to_string()), Ok(t));
    }
}

#[test]
fn test_make_nullable_if_possible() {
    assert!(ValueType::new(SqlType::Int).make_nullable_if_possible().nullable);
    assert!(!ValueType::VOID.make_nullable_if_possible().nullable);
    assert_eq!(ValueType::new(SqlType::Text).to_string(), "string");
}
