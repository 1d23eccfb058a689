//! Registry of methods callable from expressions.
//!
//! Each schema exposes a `MethodLibrary`. Calls are resolved once, at compile time, by name and
//! argument types; the runtime only ever sees the resolved callable.

use std::collections::HashMap;
use std::sync::Arc;

use crate::coercion;
use crate::sql_type::{SqlType, ValueType};
use crate::sql_value::SqlValue;

pub type ScalarFn = Arc<dyn Fn(&[SqlValue]) -> anyhow::Result<SqlValue> + Send + Sync>;
pub type AccumulatorFactory = Arc<dyn Fn() -> Box<dyn Accumulator> + Send + Sync>;

/// Folds the argument values of every row in a group into one result.
pub trait Accumulator: Send {
    fn update(&mut self, args: &[SqlValue]) -> anyhow::Result<()>;
    fn finish(&self) -> SqlValue;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Fixed(ValueType),
    /// The type of the argument at this position.
    SameAsArg(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<SqlType>,
    pub ret: ReturnType,
}

impl Signature {
    /// Cost of passing `args` to this signature, or `None` if they do not fit.
    fn conversion_cost(&self, args: &[ValueType]) -> Option<u32> {
        if args.len() != self.params.len() {
            return None;
        }
        let mut cost = 0;
        for (arg, param) in args.iter().zip(self.params.iter()) {
            if !coercion::can_convert(arg.sql_type, *param) {
                return None;
            }
            cost += match (arg.sql_type, *param) {
                (a, p) if a == p => 0,
                (_, SqlType::Any) => 10,
                (a, p) => match (a.numeric_rank(), p.numeric_rank()) {
                    (Some(x), Some(y)) => (y - x) as u32,
                    _ => 1,
                },
            };
        }
        Some(cost)
    }

    /// Whether the call would fit if every `Null` argument were of the expected type.
    fn fits_ignoring_nulls(&self, args: &[ValueType]) -> bool {
        args.len() == self.params.len()
            && args.iter().zip(self.params.iter()).all(|(a, p)| {
                a.sql_type == SqlType::Null || coercion::can_convert(a.sql_type, *p)
            })
    }

    pub fn return_type(&self, args: &[ValueType]) -> ValueType {
        match self.ret {
            ReturnType::Fixed(t) => t,
            ReturnType::SameAsArg(i) => args.get(i).copied().unwrap_or(ValueType::VOID),
        }
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        write!(f, "{}({})", self.name, params.join(", "))
    }
}

#[derive(Clone)]
pub struct ScalarMethod {
    pub signature: Signature,
    func: ScalarFn,
}

impl ScalarMethod {
    pub fn call(&self, args: &[SqlValue]) -> anyhow::Result<SqlValue> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for ScalarMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScalarMethod({})", self.signature)
    }
}

#[derive(Clone)]
pub struct AggregateMethod {
    pub signature: Signature,
    factory: AccumulatorFactory,
}

impl AggregateMethod {
    pub fn accumulator(&self) -> Box<dyn Accumulator> {
        (self.factory)()
    }
}

impl std::fmt::Debug for AggregateMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AggregateMethod({})", self.signature)
    }
}

#[derive(Debug, Clone)]
pub enum ResolvedMethod {
    Scalar(Arc<ScalarMethod>),
    Aggregate(Arc<AggregateMethod>),
}

impl ResolvedMethod {
    pub fn signature(&self) -> &Signature {
        match self {
            ResolvedMethod::Scalar(m) => &m.signature,
            ResolvedMethod::Aggregate(m) => &m.signature,
        }
    }

    /// The type of a call with `args`. Scalar results are nullable when any argument is.
    pub fn return_type(&self, args: &[ValueType]) -> ValueType {
        let t = self.signature().return_type(args);
        match self {
            ResolvedMethod::Scalar(_) => t.with_nullable(t.nullable || args.iter().any(|a| a.nullable)),
            ResolvedMethod::Aggregate(m) => match m.signature.ret {
                ReturnType::SameAsArg(_) => t.make_nullable_if_possible(),
                ReturnType::Fixed(_) => t,
            },
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, ResolvedMethod::Aggregate(_))
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Found(ResolvedMethod),
    /// Some overload would fit, but a `NULL` argument cannot be passed to it.
    NullArgument,
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct MethodLibrary {
    methods: HashMap<String, Vec<ResolvedMethod>>,
}

impl MethodLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scalar<F>(&mut self, name: &str, params: Vec<SqlType>, ret: ReturnType, func: F)
    where
        F: Fn(&[SqlValue]) -> anyhow::Result<SqlValue> + Send + Sync + 'static,
    {
        let m = ScalarMethod {
            signature: Signature {
                name: name.to_string(),
                params,
                ret,
            },
            func: Arc::new(func),
        };
        self.insert(ResolvedMethod::Scalar(Arc::new(m)));
    }

    pub fn add_aggregate<F>(&mut self, name: &str, params: Vec<SqlType>, ret: ReturnType, factory: F)
    where
        F: Fn() -> Box<dyn Accumulator> + Send + Sync + 'static,
    {
        let m = AggregateMethod {
            signature: Signature {
                name: name.to_string(),
                params,
                ret,
            },
            factory: Arc::new(factory),
        };
        self.insert(ResolvedMethod::Aggregate(Arc::new(m)));
    }

    fn insert(&mut self, m: ResolvedMethod) {
        self.methods
            .entry(m.signature().name.to_lowercase())
            .or_default()
            .push(m);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(&name.to_lowercase())
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.methods
            .get(&name.to_lowercase())
            .map(|ms| ms.iter().any(|m| m.is_aggregate()))
            .unwrap_or(false)
    }

    /// Pick the overload of `name` that fits `args` at the lowest conversion cost. Ties go to
    /// the overload registered first.
    pub fn resolve(&self, name: &str, args: &[ValueType]) -> Resolution {
        let candidates = match self.methods.get(&name.to_lowercase()) {
            Some(c) => c,
            None => return Resolution::NotFound,
        };
        let best = candidates
            .iter()
            .filter_map(|m| m.signature().conversion_cost(args).map(|c| (c, m)))
            .min_by_key(|(c, _)| *c);
        match best {
            Some((_, m)) => Resolution::Found(m.clone()),
            None if args.iter().any(|a| a.sql_type == SqlType::Null)
                && candidates.iter().any(|m| m.signature().fits_ignoring_nulls(args)) =>
            {
                Resolution::NullArgument
            }
            None => Resolution::NotFound,
        }
    }
}

#[cfg(test)]
fn test_library() -> MethodLibrary {
    let mut lib = MethodLibrary::new();
    lib.add_scalar(
        "Twice",
        vec![SqlType::Long],
        ReturnType::Fixed(ValueType::new(SqlType::Long)),
        |args| Ok(args[0].add(&args[0])?),
    );
    lib.add_scalar(
        "Twice",
        vec![SqlType::Double],
        ReturnType::Fixed(ValueType::new(SqlType::Double)),
        |args| Ok(args[0].add(&args[0])?),
    );
    lib
}

#[test]
fn test_resolve_prefers_cheapest_overload() {
    let lib = test_library();
    let cases = vec![
        (SqlType::Int, Some(SqlType::Long)),
        (SqlType::Long, Some(SqlType::Long)),
        (SqlType::Double, Some(SqlType::Double)),
        (SqlType::Text, None),
    ];
    for (arg, expected) in cases {
        println!("Running case: Twice({})", arg);
        match lib.resolve("twice", &[ValueType::new(arg)]) {
            Resolution::Found(m) => assert_eq!(Some(m.signature().params[0]), expected),
            _ => assert_eq!(expected, None),
        }
    }
}

#[test]
fn test_resolve_reports_null_argument() {
    let lib = test_library();
    assert!(matches!(
        lib.resolve("Twice", &[ValueType::new(SqlType::Null)]),
        Resolution::NullArgument
    ));
    assert!(matches!(lib.resolve("Thrice", &[]), Resolution::NotFound));
}

#[test]
fn test_scalar_return_type_propagates_nullability() {
    let lib = test_library();
    let arg = ValueType::nullable(SqlType::Int);
    match lib.resolve("Twice", &[arg]) {
        Resolution::Found(m) => assert!(m.return_type(&[arg]).nullable),
        r => panic!("unexpected {:?}", r),
    }
}
