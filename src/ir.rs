//! `ir` defines the typed intermediate representation (IR) produced by binding a script.
//!
//! The AST and IR are separate. The AST is what the user wrote; the IR is what it means:
//! every column reference is resolved to a slot in the combined row of its block, every
//! method call to a callable, and every expression carries its `ValueType`. Implicit
//! conversions are explicit `Cast` nodes.
//!
//! For example, given a source `#a.entities()` with columns `Id int` and `Name string`,
//!
//! ```text
//! SELECT Name FROM #a.entities() f WHERE f.Id + 1.5 > 3
//! ```
//!
//! binds to a block whose filter is
//!
//! ```text
//! Binary(>,
//!     Binary(+, Cast(Column(f.Id, slot 0) as double), Literal(1.5)),
//!     Cast(Literal(3) as double))
//! ```
//!
//! Each expression has an `id()`: a hash of its canonical text and type. Two subtrees with the
//! same id compute the same value, which is how GROUP BY keys are matched against select items.

use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use xxhash_rust::xxh3::xxh3_64;

use crate::ast;
use crate::method::{AggregateMethod, ScalarMethod};
use crate::source_info::QuerySourceInfo;
use crate::sql_type::{SqlType, ValueType};
use crate::sql_value::SqlValue;
use crate::symbol::{ScopeArena, ScopeRef, SymbolColumn, TableSymbol};

#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub kind: ExprKind,
    pub ty: ValueType,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(SqlValue),
    Column {
        alias: String,
        name: String,
        slot: usize,
    },
    /// Converts the inner value to `ty`.
    Cast(Box<TypedExpr>),
    Unary {
        op: ast::UnaryOp,
        expr: Box<TypedExpr>,
    },
    Binary {
        op: ast::BinaryOp,
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    Index {
        expr: Box<TypedExpr>,
        index: Box<TypedExpr>,
    },
    IsNull {
        expr: Box<TypedExpr>,
        negated: bool,
    },
    InList {
        expr: Box<TypedExpr>,
        list: Vec<TypedExpr>,
        negated: bool,
    },
    Like {
        expr: Box<TypedExpr>,
        pattern: Box<TypedExpr>,
        negated: bool,
    },
    Case {
        whens: Vec<(TypedExpr, TypedExpr)>,
        otherwise: Option<Box<TypedExpr>>,
    },
    Call {
        method: Arc<ScalarMethod>,
        args: Vec<TypedExpr>,
    },
    /// The value of `Grouping::aggregates[index]` for the current group.
    Aggregate { index: usize },
    /// The value of `Grouping::keys[index]` for the current group.
    GroupKey { index: usize },
}

impl TypedExpr {
    /// Build a node. A `Void` child makes the node `Void`.
    pub fn new(kind: ExprKind, ty: ValueType) -> Self {
        let mut e = TypedExpr { kind, ty };
        if e.children().iter().any(|c| c.ty.is_void()) {
            e.ty = ValueType::VOID;
        }
        e
    }

    pub fn literal(v: SqlValue) -> Self {
        let ty = match v.sql_type() {
            SqlType::Null => ValueType::nullable(SqlType::Null),
            t => ValueType::new(t),
        };
        TypedExpr {
            kind: ExprKind::Literal(v),
            ty,
        }
    }

    /// Wrap in a cast to `to` unless the value already has that type.
    pub fn cast_to(self, to: SqlType) -> TypedExpr {
        if self.ty.sql_type == to || to == SqlType::Any || self.ty.sql_type == SqlType::Null {
            return self;
        }
        let ty = ValueType::new(to).with_nullable(self.ty.nullable);
        TypedExpr::new(ExprKind::Cast(Box::new(self)), ty)
    }

    /// Structural identity: equal ids mean equal canonical text and type.
    pub fn id(&self) -> u64 {
        xxh3_64(format!("{}::{}", self, self.ty).as_bytes())
    }

    pub fn children(&self) -> Vec<&TypedExpr> {
        use ExprKind::*;
        match &self.kind {
            Literal(_) | Column { .. } | Aggregate { .. } | GroupKey { .. } => vec![],
            Cast(e) | Unary { expr: e, .. } | IsNull { expr: e, .. } => vec![e.as_ref()],
            Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Index { expr, index } => vec![expr.as_ref(), index.as_ref()],
            InList { expr, list, .. } => std::iter::once(expr.as_ref()).chain(list.iter()).collect(),
            Like { expr, pattern, .. } => vec![expr.as_ref(), pattern.as_ref()],
            Case { whens, otherwise } => whens
                .iter()
                .flat_map(|(w, t)| [w, t])
                .chain(otherwise.iter().map(|o| o.as_ref()))
                .collect(),
            Call { args, .. } => args.iter().collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut TypedExpr> {
        use ExprKind::*;
        match &mut self.kind {
            Literal(_) | Column { .. } | Aggregate { .. } | GroupKey { .. } => vec![],
            Cast(e) | Unary { expr: e, .. } | IsNull { expr: e, .. } => vec![e.as_mut()],
            Binary { lhs, rhs, .. } => vec![lhs.as_mut(), rhs.as_mut()],
            Index { expr, index } => vec![expr.as_mut(), index.as_mut()],
            InList { expr, list, .. } => {
                std::iter::once(expr.as_mut()).chain(list.iter_mut()).collect()
            }
            Like { expr, pattern, .. } => vec![expr.as_mut(), pattern.as_mut()],
            Case { whens, otherwise } => whens
                .iter_mut()
                .flat_map(|(w, t)| [w, t])
                .chain(otherwise.iter_mut().map(|o| o.as_mut()))
                .collect(),
            Call { args, .. } => args.iter_mut().collect(),
        }
    }

    /// True if `pred` holds for this node or any descendant.
    pub fn any(&self, pred: &dyn Fn(&TypedExpr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }

    /// Every column referenced, as `(alias, name)`.
    pub fn columns(&self) -> Vec<(&str, &str)> {
        let mut out = vec![];
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<(&'a str, &'a str)>) {
        if let ExprKind::Column { alias, name, .. } = &self.kind {
            out.push((alias.as_str(), name.as_str()));
        }
        for c in self.children() {
            c.collect_columns(out);
        }
    }

    pub fn has_call(&self) -> bool {
        self.any(&|e| matches!(e.kind, ExprKind::Call { .. } | ExprKind::Aggregate { .. }))
    }
}

fn fmt_literal(v: &SqlValue, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match v {
        SqlValue::Null => f.write_str("NULL"),
        SqlValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        SqlValue::Char(c) => write!(f, "'{}'", c),
        v => write!(f, "{}", v),
    }
}

impl std::fmt::Display for TypedExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ExprKind::*;
        match &self.kind {
            Literal(v) => fmt_literal(v, f),
            Column { alias, name, .. } => write!(f, "{}.{}", alias, name),
            Cast(e) => write!(f, "CAST({} AS {})", e, self.ty.sql_type),
            Unary {
                op: ast::UnaryOp::Not,
                expr,
            } => write!(f, "(NOT {})", expr),
            Unary {
                op: ast::UnaryOp::Negate,
                expr,
            } => write!(f, "(-{})", expr),
            Unary {
                op: ast::UnaryOp::BitNot,
                expr,
            } => write!(f, "(~{})", expr),
            Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
            Index { expr, index } => write!(f, "{}[{}]", expr, index),
            IsNull { expr, negated } => {
                write!(f, "({} IS {}NULL)", expr, if *negated { "NOT " } else { "" })
            }
            InList {
                expr,
                list,
                negated,
            } => write!(
                f,
                "({} {}IN ({}))",
                expr,
                if *negated { "NOT " } else { "" },
                list.iter().join(", ")
            ),
            Like {
                expr,
                pattern,
                negated,
            } => write!(
                f,
                "({} {}LIKE {})",
                expr,
                if *negated { "NOT " } else { "" },
                pattern
            ),
            Case { whens, otherwise } => {
                f.write_str("CASE")?;
                for (w, t) in whens {
                    write!(f, " WHEN {} THEN {}", w, t)?;
                }
                if let Some(o) = otherwise {
                    write!(f, " ELSE {}", o)?;
                }
                f.write_str(" END")
            }
            Call { method, args } => {
                write!(f, "{}({})", method.signature.name, args.iter().join(", "))
            }
            Aggregate { index } => write!(f, "$agg{}", index),
            GroupKey { index } => write!(f, "$key{}", index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub name: String,
    pub ty: ValueType,
}

#[derive(Debug, Clone)]
pub enum BoundItem {
    /// `*` or `alias.*`, replaced by explicit columns before code generation.
    Star { qualifier: Option<String> },
    Expr { expr: TypedExpr, name: String },
}

#[derive(Debug, Clone)]
pub struct BoundOrder {
    pub expr: TypedExpr,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub struct AggregateCall {
    pub method: Arc<AggregateMethod>,
    /// Evaluated against each input row.
    pub args: Vec<TypedExpr>,
    /// How many levels above the full group key the call accumulates.
    pub level: usize,
    pub ty: ValueType,
}

#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub keys: Vec<TypedExpr>,
    pub aggregates: Vec<AggregateCall>,
}

#[derive(Debug, Clone)]
pub enum SourceKind {
    /// A schema invocation; details are in `BoundScript::sources` under this positional id.
    Schema { id: String },
    Cte { name: String },
    SubQuery(Box<BoundBody>),
}

#[derive(Debug, Clone)]
pub struct BoundSource {
    pub alias: String,
    pub kind: SourceKind,
    pub columns: Vec<SymbolColumn>,
}

#[derive(Debug, Clone)]
pub enum BoundFrom {
    Source(BoundSource),
    Join {
        left: Box<BoundFrom>,
        right: Box<BoundFrom>,
        kind: ast::JoinKind,
        on: TypedExpr,
    },
}

impl BoundFrom {
    /// Number of slots a row produced by this node has.
    pub fn width(&self) -> usize {
        match self {
            BoundFrom::Source(s) => s.columns.len(),
            BoundFrom::Join { left, right, .. } => left.width() + right.width(),
        }
    }

    /// Sources in left-to-right order.
    pub fn sources(&self) -> Vec<&BoundSource> {
        match self {
            BoundFrom::Source(s) => vec![s],
            BoundFrom::Join { left, right, .. } => {
                let mut v = left.sources();
                v.extend(right.sources());
                v
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundSelect {
    pub scope: ScopeRef,
    pub from: Option<BoundFrom>,
    pub symbol: TableSymbol,
    pub filter: Option<TypedExpr>,
    /// WHERE conjuncts that only involve one schema source, keyed by its positional id.
    pub pushdown: IndexMap<String, Vec<TypedExpr>>,
    pub grouping: Option<Grouping>,
    pub having: Option<TypedExpr>,
    pub items: Vec<BoundItem>,
    pub order_by: Vec<BoundOrder>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    /// Duplicate output rows must be removed. Only set when DISTINCT could not become GROUP BY.
    pub distinct: bool,
}

impl BoundSelect {
    pub fn columns(&self) -> Vec<OutputColumn> {
        let mut out = vec![];
        for item in &self.items {
            match item {
                BoundItem::Star { qualifier } => {
                    for (alias, col, _) in self.symbol.columns() {
                        if qualifier.as_deref().map(|q| q == alias).unwrap_or(true) {
                            out.push(OutputColumn {
                                name: col.name.clone(),
                                ty: col.ty,
                            });
                        }
                    }
                }
                BoundItem::Expr { expr, name } => out.push(OutputColumn {
                    name: name.clone(),
                    ty: expr.ty,
                }),
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub enum BoundBody {
    Select(Box<BoundSelect>),
    SetOperation {
        left: Box<BoundBody>,
        op: ast::SetOperator,
        right: Box<BoundBody>,
        columns: Vec<OutputColumn>,
    },
}

impl BoundBody {
    pub fn as_select(&self) -> Option<&BoundSelect> {
        match self {
            BoundBody::Select(s) => Some(s),
            BoundBody::SetOperation { .. } => None,
        }
    }

    pub fn as_select_mut(&mut self) -> Option<&mut BoundSelect> {
        match self {
            BoundBody::Select(s) => Some(s),
            BoundBody::SetOperation { .. } => None,
        }
    }

    pub fn columns(&self) -> Vec<OutputColumn> {
        match self {
            BoundBody::Select(s) => s.columns(),
            BoundBody::SetOperation { columns, .. } => columns.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundCte {
    pub name: String,
    pub body: BoundBody,
}

#[derive(Debug, Clone)]
pub struct BoundScript {
    /// Canonical text of the script the IR was bound from.
    pub text: String,
    pub ctes: Vec<BoundCte>,
    pub body: BoundBody,
    /// One entry per schema invocation, keyed by positional id.
    pub sources: IndexMap<String, QuerySourceInfo>,
    pub scopes: ScopeArena,
}

#[cfg(test)]
fn col(alias: &str, name: &str, slot: usize, t: SqlType) -> TypedExpr {
    TypedExpr::new(
        ExprKind::Column {
            alias: alias.to_string(),
            name: name.to_string(),
            slot,
        },
        ValueType::new(t),
    )
}

#[test]
fn test_id_depends_on_shape_and_type() {
    let a = col("f", "Id", 0, SqlType::Int);
    let b = col("f", "Id", 3, SqlType::Int);
    let c = col("f", "Id", 0, SqlType::Long);
    let d = col("g", "Id", 0, SqlType::Int);
    assert_eq!(a.id(), b.id());
    assert_ne!(a.id(), c.id());
    assert_ne!(a.id(), d.id());
}

#[test]
fn test_void_child_makes_parent_void() {
    let v = TypedExpr::new(ExprKind::Literal(SqlValue::Null), ValueType::VOID);
    let e = TypedExpr::new(
        ExprKind::IsNull {
            expr: Box::new(v),
            negated: false,
        },
        ValueType::BOOL,
    );
    assert!(e.ty.is_void());
}

#[test]
fn test_cast_to_wraps_only_when_needed() {
    let a = col("f", "Id", 0, SqlType::Int);
    assert!(matches!(a.clone().cast_to(SqlType::Int).kind, ExprKind::Column { .. }));
    let c = a.cast_to(SqlType::Double);
    assert_eq!(c.ty.sql_type, SqlType::Double);
    assert_eq!(c.to_string(), "CAST(f.Id AS double)");
}

#[test]
fn test_literal_display() {
    let cases = vec![
        (SqlValue::Null, "NULL"),
        (SqlValue::Int(7), "7"),
        (SqlValue::Double(1.5), "1.5"),
        (SqlValue::Text("it's".to_string()), "'it''s'"),
    ];
    for (v, want) in cases {
        println!("Running case: {}", want);
        assert_eq!(TypedExpr::literal(v).to_string(), want);
    }
}
