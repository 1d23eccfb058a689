//! Type promotion rules used by inference.
//!
//! Arithmetic goes through the numeric-only path. Comparisons go through the lossy path, which
//! also relates `Char` with `Text`. Equality additionally accepts `Any` with `Any`.

use crate::sql_type::SqlType;

/// The wider of two numeric types, following `Int < Long < Double < Decimal`.
pub fn widen_numeric(l: SqlType, r: SqlType) -> Option<SqlType> {
    let (lr, rr) = (l.numeric_rank()?, r.numeric_rank()?);
    Some(if lr >= rr { l } else { r })
}

/// Result type of `+ - * / %`. `Text + Text` concatenates.
pub fn arithmetic(add: bool, l: SqlType, r: SqlType) -> Option<SqlType> {
    use SqlType::*;
    match (l, r) {
        (Null, x) | (x, Null) if x.is_numeric() || (add && x == Text) => Some(x),
        (Null, Null) => Some(Null),
        (Text, Text) if add => Some(Text),
        _ => widen_numeric(l, r),
    }
}

/// Result type of the bitwise and shift operators, which only accept integers.
pub fn bitwise(l: SqlType, r: SqlType) -> Option<SqlType> {
    use SqlType::*;
    match (l, r) {
        (Null, x) | (x, Null) if x.is_integer() => Some(x),
        _ if l.is_integer() && r.is_integer() => widen_numeric(l, r),
        _ => None,
    }
}

/// The type both sides of an ordering comparison are converted to before comparing.
pub fn comparison(l: SqlType, r: SqlType) -> Option<SqlType> {
    use SqlType::*;
    match (l, r) {
        (Void, _) | (_, Void) | (Any, _) | (_, Any) => None,
        (Null, Null) => Some(Null),
        (Null, x) | (x, Null) => Some(x),
        (Char, Text) | (Text, Char) => Some(Text),
        _ if l == r => Some(l),
        _ => widen_numeric(l, r),
    }
}

/// Like `comparison`, but also accepts structural equality of opaque values.
pub fn equality(l: SqlType, r: SqlType) -> Option<SqlType> {
    use SqlType::*;
    match (l, r) {
        (Any, Any) | (Any, Null) | (Null, Any) => Some(Any),
        _ => comparison(l, r),
    }
}

/// A type every branch of a `CASE` or element of an `IN` list can be converted to.
pub fn common_type(l: SqlType, r: SqlType) -> Option<SqlType> {
    use SqlType::*;
    match (l, r) {
        (Null, x) | (x, Null) => Some(x),
        _ if l == r => Some(l),
        (Char, Text) | (Text, Char) => Some(Text),
        _ => widen_numeric(l, r),
    }
}

/// Whether a value of type `from` can be passed where `to` is expected without an explicit cast.
///
/// `Null` only converts to types that can hold it without wrapping.
pub fn can_convert(from: SqlType, to: SqlType) -> bool {
    use SqlType::*;
    match (from, to) {
        (Void, _) | (_, Void) => false,
        (_, Any) => true,
        (Null, t) => t.is_reference(),
        (f, t) if f == t => true,
        (Char, Text) => true,
        (f, t) => match (f.numeric_rank(), t.numeric_rank()) {
            (Some(a), Some(b)) => a <= b,
            _ => false,
        },
    }
}

#[test]
fn test_arithmetic_promotion() {
    use SqlType::*;
    let cases = vec![
        (Int, Int, Some(Int)),
        (Int, Double, Some(Double)),
        (Decimal, Int, Some(Decimal)),
        (Long, Int, Some(Long)),
        (Double, Decimal, Some(Decimal)),
        (Text, Text, Some(Text)),
        (Text, Int, None),
        (Bool, Bool, None),
        (Null, Long, Some(Long)),
    ];
    for (l, r, expected) in cases {
        println!("Running case: {} + {}", l, r);
        assert_eq!(arithmetic(true, l, r), expected);
    }
    assert_eq!(arithmetic(false, Text, Text), None);
}

#[test]
fn test_comparison_and_equality_paths() {
    use SqlType::*;
    assert_eq!(comparison(Int, Decimal), Some(Decimal));
    assert_eq!(comparison(Char, Text), Some(Text));
    assert_eq!(comparison(Bool, Int), None);
    assert_eq!(comparison(Any, Any), None);
    assert_eq!(equality(Any, Any), Some(Any));
    assert_eq!(equality(Text, Text), Some(Text));
    assert_eq!(equality(DateTime, Null), Some(DateTime));
}

#[test]
fn test_can_convert() {
    use SqlType::*;
    assert!(can_convert(Int, Long));
    assert!(can_convert(Int, Decimal));
    assert!(!can_convert(Double, Int));
    assert!(can_convert(Null, Text));
    assert!(!can_convert(Null, Int));
    assert!(can_convert(Bool, Any));
    assert!(!can_convert(Void, Any));
    assert_eq!(bitwise(Int, Long), Some(Long));
    assert_eq!(bitwise(Int, Double), None);
}
