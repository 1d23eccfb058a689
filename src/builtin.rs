//! The core method library: aggregates and a few string helpers. Calls that no schema library
//! resolves fall back to these.

use anyhow::bail;

use crate::method::{Accumulator, MethodLibrary, ReturnType};
use crate::sql_type::{SqlType, ValueType};
use crate::sql_value::SqlValue;

struct Count {
    n: i32,
}

impl Accumulator for Count {
    fn update(&mut self, args: &[SqlValue]) -> anyhow::Result<()> {
        // With no arguments every row counts; otherwise only non-null values do.
        if args.iter().all(|a| !matches!(a, SqlValue::Null)) {
            self.n += 1;
        }
        Ok(())
    }

    fn finish(&self) -> SqlValue {
        SqlValue::Int(self.n)
    }
}

struct Sum {
    total: SqlValue,
}

impl Accumulator for Sum {
    fn update(&mut self, args: &[SqlValue]) -> anyhow::Result<()> {
        self.total = match (&self.total, &args[0]) {
            (_, SqlValue::Null) => return Ok(()),
            (SqlValue::Null, v) => v.clone(),
            (t, v) => t.add(v)?,
        };
        Ok(())
    }

    fn finish(&self) -> SqlValue {
        self.total.clone()
    }
}

struct Avg {
    sum: SqlValue,
    n: i64,
}

impl Accumulator for Avg {
    fn update(&mut self, args: &[SqlValue]) -> anyhow::Result<()> {
        self.sum = match (&self.sum, &args[0]) {
            (_, SqlValue::Null) => return Ok(()),
            (SqlValue::Null, v) => v.clone(),
            (t, v) => t.add(v)?,
        };
        self.n += 1;
        Ok(())
    }

    fn finish(&self) -> SqlValue {
        let n = match &self.sum {
            SqlValue::Decimal(_) => SqlValue::Decimal(rust_decimal::Decimal::from(self.n)),
            _ => SqlValue::Double(self.n as f64),
        };
        self.sum.div(&n).unwrap_or(SqlValue::Null)
    }
}

/// Keeps the smallest (or largest) non-null value seen.
struct Extreme {
    best: SqlValue,
    want: std::cmp::Ordering,
}

impl Accumulator for Extreme {
    fn update(&mut self, args: &[SqlValue]) -> anyhow::Result<()> {
        let v = &args[0];
        if matches!(v, SqlValue::Null) {
            return Ok(());
        }
        if matches!(self.best, SqlValue::Null) || v.sort_cmp(&self.best) == self.want {
            self.best = v.clone();
        }
        Ok(())
    }

    fn finish(&self) -> SqlValue {
        self.best.clone()
    }
}

fn text_arg(v: &SqlValue) -> Option<&str> {
    v.as_text().map(|s| s.as_str())
}

/// Build the core library.
pub fn core_library() -> MethodLibrary {
    use SqlType::*;
    let mut lib = MethodLibrary::new();
    let fixed = |t: SqlType| ReturnType::Fixed(ValueType::new(t));
    let nullable = |t: SqlType| ReturnType::Fixed(ValueType::nullable(t));

    lib.add_aggregate("Count", vec![], fixed(Int), || Box::new(Count { n: 0 }));
    lib.add_aggregate("Count", vec![Any], fixed(Int), || Box::new(Count { n: 0 }));
    for t in [Long, Double, Decimal] {
        lib.add_aggregate("Sum", vec![t], nullable(t), || {
            Box::new(Sum {
                total: SqlValue::Null,
            })
        });
    }
    for t in [Double, Decimal] {
        lib.add_aggregate("Avg", vec![t], nullable(t), || {
            Box::new(Avg {
                sum: SqlValue::Null,
                n: 0,
            })
        });
    }
    lib.add_aggregate("Min", vec![Any], ReturnType::SameAsArg(0), || {
        Box::new(Extreme {
            best: SqlValue::Null,
            want: std::cmp::Ordering::Less,
        })
    });
    lib.add_aggregate("Max", vec![Any], ReturnType::SameAsArg(0), || {
        Box::new(Extreme {
            best: SqlValue::Null,
            want: std::cmp::Ordering::Greater,
        })
    });

    lib.add_scalar("ToUpper", vec![Text], fixed(Text), |args| {
        Ok(match text_arg(&args[0]) {
            Some(s) => SqlValue::Text(s.to_uppercase()),
            None => SqlValue::Null,
        })
    });
    lib.add_scalar("ToLower", vec![Text], fixed(Text), |args| {
        Ok(match text_arg(&args[0]) {
            Some(s) => SqlValue::Text(s.to_lowercase()),
            None => SqlValue::Null,
        })
    });
    lib.add_scalar("Length", vec![Text], fixed(Int), |args| {
        Ok(match text_arg(&args[0]) {
            Some(s) => SqlValue::Int(i32::try_from(s.chars().count())?),
            None => SqlValue::Null,
        })
    });
    lib.add_scalar("Substring", vec![Text, Int, Int], fixed(Text), |args| {
        let (s, start, len) = match (text_arg(&args[0]), &args[1], &args[2]) {
            (Some(s), SqlValue::Int(start), SqlValue::Int(len)) => (s, *start, *len),
            _ => return Ok(SqlValue::Null),
        };
        if start < 0 || len < 0 {
            bail!("Substring({}, {}, {}): negative position or length", s, start, len);
        }
        Ok(SqlValue::Text(
            s.chars().skip(start as usize).take(len as usize).collect(),
        ))
    });
    lib
}

#[cfg(test)]
fn run_aggregate(name: &str, arg: SqlType, values: Vec<SqlValue>) -> SqlValue {
    use crate::method::{Resolution, ResolvedMethod};
    let lib = core_library();
    let m = match lib.resolve(name, &[ValueType::new(arg)]) {
        Resolution::Found(ResolvedMethod::Aggregate(m)) => m,
        r => panic!("{} did not resolve to an aggregate: {:?}", name, r),
    };
    let target = m.signature.params[0];
    let mut acc = m.accumulator();
    for v in values {
        acc.update(&[v.cast(target).unwrap()]).unwrap();
    }
    acc.finish()
}

#[test]
fn test_aggregates() {
    let ints = || vec![SqlValue::Int(3), SqlValue::Null, SqlValue::Int(1), SqlValue::Int(2)];
    let cases = vec![
        ("Count", SqlType::Int, ints(), SqlValue::Int(3)),
        ("Sum", SqlType::Int, ints(), SqlValue::Long(6)),
        ("Avg", SqlType::Int, ints(), SqlValue::Double(2.0)),
        ("Min", SqlType::Int, ints(), SqlValue::Int(1)),
        ("Max", SqlType::Int, ints(), SqlValue::Int(3)),
        ("Sum", SqlType::Int, vec![], SqlValue::Null),
        ("Count", SqlType::Text, vec![], SqlValue::Int(0)),
    ];
    for (name, arg, values, expected) in cases {
        println!("Running case: {}", name);
        assert_eq!(run_aggregate(name, arg, values), expected);
    }
}

#[test]
fn test_string_helpers() {
    use crate::method::{Resolution, ResolvedMethod};
    let lib = core_library();
    let call = |name: &str, args: Vec<SqlValue>| {
        let types: Vec<ValueType> = args.iter().map(|a| ValueType::new(a.sql_type())).collect();
        match lib.resolve(name, &types) {
            Resolution::Found(ResolvedMethod::Scalar(m)) => m.call(&args).unwrap(),
            r => panic!("{} did not resolve: {:?}", name, r),
        }
    };
    assert_eq!(call("ToUpper", vec!["ada".into()]), SqlValue::from("ADA"));
    assert_eq!(call("length", vec!["héllo".into()]), SqlValue::Int(5));
    assert_eq!(
        call("Substring", vec!["david".into(), 1.into(), 3.into()]),
        SqlValue::from("avi")
    );
}
