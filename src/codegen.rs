//! Turns a bound, rewritten script into an executable `Artifact`.
//!
//! Every typed expression is compiled once into a closure over an `EvalContext`. Method calls
//! hold the method resolved at bind time, so evaluation never looks anything up by name.
//!
//! Generation also decides the per-source hints and, when the configuration asks for it,
//! which joins run as sort-merge joins.

use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use thiserror::Error;
use tracing::debug;

use crate::artifact::{
    AggregatePlan, Artifact, BodyPlan, CtePlan, GroupPlan, JoinPlan, MergeKeys, OrderKey, Plan,
    SelectPlan, SourceColumn,
};
use crate::ast::{self, BinaryOp};
use crate::config::{EngineConfig, JoinStrategy};
use crate::ir::{BoundBody, BoundFrom, BoundScript, BoundSelect, BoundSource, ExprKind, SourceKind, TypedExpr};
use crate::project;
use crate::source_info::{QueryHints, QuerySourceInfo};
use crate::sql_value::{SqlValue, ValueError};
use crate::stream::CancellationToken;

/// What a compiled expression can read.
pub trait EvalContext {
    fn slot(&self, index: usize) -> SqlValue;
    fn group_key(&self, index: usize) -> SqlValue;
    fn aggregate(&self, index: usize) -> SqlValue;
}

/// A plain row. Group keys and aggregates are not available.
pub struct RowContext<'a>(pub &'a [SqlValue]);

impl<'a> EvalContext for RowContext<'a> {
    fn slot(&self, index: usize) -> SqlValue {
        self.0.get(index).cloned().unwrap_or(SqlValue::Null)
    }

    fn group_key(&self, _: usize) -> SqlValue {
        SqlValue::Null
    }

    fn aggregate(&self, _: usize) -> SqlValue {
        SqlValue::Null
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("Method {name} failed: {message}")]
    Method { name: String, message: String },
}

pub type CompiledExpr = Arc<dyn Fn(&dyn EvalContext) -> Result<SqlValue, EvalError> + Send + Sync>;

pub fn compiled<F>(f: F) -> CompiledExpr
where
    F: Fn(&dyn EvalContext) -> Result<SqlValue, EvalError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Select items must be expanded before code generation.")]
    UnexpandedStar,
    #[error("No source information for {0}.")]
    MissingSource(String),
    #[error("Expression {0} has no type.")]
    UntypedExpression(String),
    #[error("Compilation was cancelled.")]
    Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// `%` matches any run of characters, `_` exactly one. Matching is case-sensitive.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}

fn text_of(v: &SqlValue) -> Option<String> {
    match v {
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Char(c) => Some(c.to_string()),
        SqlValue::Null => None,
        v => Some(v.to_string()),
    }
}

/// Compile `e` into a closure.
pub fn compile_expr(e: &TypedExpr) -> CompiledExpr {
    let ty = e.ty.sql_type;
    match &e.kind {
        ExprKind::Literal(v) => {
            let v = v.clone();
            compiled(move |_| Ok(v.clone()))
        }
        ExprKind::Column { slot, .. } => {
            let slot = *slot;
            compiled(move |ctx| Ok(ctx.slot(slot)))
        }
        ExprKind::Cast(inner) => {
            let inner = compile_expr(inner);
            compiled(move |ctx| Ok(inner(ctx)?.cast(ty)?))
        }
        ExprKind::Unary { op, expr } => {
            let op = *op;
            let x = compile_expr(expr);
            compiled(move |ctx| Ok(x(ctx)?.apply_unary(op)?))
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let op = *op;
            let l = compile_expr(lhs);
            let r = compile_expr(rhs);
            match op {
                BinaryOp::And => compiled(move |ctx| {
                    let a = l(ctx)?;
                    if a == SqlValue::Bool(false) {
                        return Ok(a);
                    }
                    Ok(a.apply(op, &r(ctx)?)?)
                }),
                BinaryOp::Or => compiled(move |ctx| {
                    let a = l(ctx)?;
                    if a == SqlValue::Bool(true) {
                        return Ok(a);
                    }
                    Ok(a.apply(op, &r(ctx)?)?)
                }),
                _ => compiled(move |ctx| Ok(l(ctx)?.apply(op, &r(ctx)?)?)),
            }
        }
        ExprKind::Index { expr, index } => {
            let x = compile_expr(expr);
            let i = compile_expr(index);
            compiled(move |ctx| Ok(x(ctx)?.index(&i(ctx)?)?))
        }
        ExprKind::IsNull { expr, negated } => {
            let negated = *negated;
            let x = compile_expr(expr);
            compiled(move |ctx| Ok(SqlValue::Bool((x(ctx)? == SqlValue::Null) != negated)))
        }
        ExprKind::InList {
            expr,
            list,
            negated,
        } => {
            let negated = *negated;
            let x = compile_expr(expr);
            let list: Vec<CompiledExpr> = list.iter().map(compile_expr).collect();
            compiled(move |ctx| {
                let v = x(ctx)?;
                if v == SqlValue::Null {
                    return Ok(SqlValue::Null);
                }
                let mut saw_null = false;
                for item in &list {
                    match v.apply(BinaryOp::Eq, &item(ctx)?)? {
                        SqlValue::Bool(true) => return Ok(SqlValue::Bool(!negated)),
                        SqlValue::Null => saw_null = true,
                        _ => {}
                    }
                }
                Ok(match saw_null {
                    true => SqlValue::Null,
                    false => SqlValue::Bool(negated),
                })
            })
        }
        ExprKind::Like {
            expr,
            pattern,
            negated,
        } => {
            let negated = *negated;
            let x = compile_expr(expr);
            let p = compile_expr(pattern);
            compiled(move |ctx| {
                match (text_of(&x(ctx)?), text_of(&p(ctx)?)) {
                    (Some(t), Some(p)) => Ok(SqlValue::Bool(like_match(&t, &p) != negated)),
                    _ => Ok(SqlValue::Null),
                }
            })
        }
        ExprKind::Case { whens, otherwise } => {
            let whens: Vec<(CompiledExpr, CompiledExpr)> = whens
                .iter()
                .map(|(w, t)| (compile_expr(w), compile_expr(t)))
                .collect();
            let otherwise = otherwise.as_ref().map(|o| compile_expr(o));
            compiled(move |ctx| {
                for (w, t) in &whens {
                    if w(ctx)?.is_true() {
                        return t(ctx);
                    }
                }
                match &otherwise {
                    Some(o) => o(ctx),
                    None => Ok(SqlValue::Null),
                }
            })
        }
        ExprKind::Call { method, args } => {
            let method = method.clone();
            let args: Vec<CompiledExpr> = args.iter().map(compile_expr).collect();
            compiled(move |ctx| {
                let values = args
                    .iter()
                    .map(|a| a(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                method.call(&values).map_err(|e| EvalError::Method {
                    name: method.signature.name.clone(),
                    message: format!("{:#}", e),
                })
            })
        }
        ExprKind::Aggregate { index } => {
            let index = *index;
            compiled(move |ctx| Ok(ctx.aggregate(index)))
        }
        ExprKind::GroupKey { index } => {
            let index = *index;
            compiled(move |ctx| Ok(ctx.group_key(index)))
        }
    }
}

fn collect_slots(e: &TypedExpr, out: &mut Vec<usize>) {
    if let ExprKind::Column { slot, .. } = &e.kind {
        out.push(*slot);
    }
    for c in e.children() {
        collect_slots(c, out);
    }
}

fn shift_slots(e: &mut TypedExpr, by: usize) {
    if let ExprKind::Column { slot, .. } = &mut e.kind {
        *slot -= by;
    }
    for c in e.children_mut() {
        shift_slots(c, by);
    }
}

pub(crate) fn flip(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::LtEq => BinaryOp::GtEq,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::GtEq => BinaryOp::LtEq,
        op => op,
    }
}

/// `Some(true)` if `e` only reads left slots, `Some(false)` if it only reads right slots.
fn side(e: &TypedExpr, left_width: usize) -> Option<bool> {
    let mut slots = vec![];
    collect_slots(e, &mut slots);
    if slots.is_empty() {
        None
    } else if slots.iter().all(|s| *s < left_width) {
        Some(true)
    } else if slots.iter().all(|s| *s >= left_width) {
        Some(false)
    } else {
        None
    }
}

/// Keys for a sort-merge join, if `on` is one comparison of a left-only and a right-only side.
pub fn merge_keys(on: &TypedExpr, left_width: usize) -> Option<MergeKeys> {
    let (op, lhs, rhs) = match &on.kind {
        ExprKind::Binary { op, lhs, rhs }
            if matches!(
                op,
                BinaryOp::Eq
                    | BinaryOp::NotEq
                    | BinaryOp::Lt
                    | BinaryOp::LtEq
                    | BinaryOp::Gt
                    | BinaryOp::GtEq
            ) =>
        {
            (*op, lhs.as_ref(), rhs.as_ref())
        }
        _ => return None,
    };
    let (op, left, right) = match (side(lhs, left_width)?, side(rhs, left_width)?) {
        (true, false) => (op, lhs, rhs),
        (false, true) => (flip(op), rhs, lhs),
        _ => return None,
    };
    let mut right = right.clone();
    shift_slots(&mut right, left_width);
    Some(MergeKeys {
        left: compile_expr(left),
        right: compile_expr(&right),
        op,
    })
}

fn check_typed(e: &TypedExpr) -> Result<()> {
    match e.ty.is_void() {
        true => Err(Error::UntypedExpression(e.to_string())),
        false => Ok(()),
    }
}

struct Generator<'a> {
    config: &'a EngineConfig,
    cancellation: &'a CancellationToken,
    sources: IndexMap<String, QuerySourceInfo>,
    lines: Vec<String>,
}

impl<'a> Generator<'a> {
    fn line(&mut self, depth: usize, text: String) {
        self.lines.push(format!("{}{}", "  ".repeat(depth), text));
    }

    fn body(&mut self, body: &BoundBody, depth: usize) -> Result<BodyPlan> {
        match body {
            BoundBody::Select(s) => Ok(BodyPlan::Select(Box::new(self.select(s, depth)?))),
            BoundBody::SetOperation {
                left,
                op,
                right,
                columns,
            } => {
                self.line(depth, op.to_string());
                let left = self.body(left, depth + 1)?;
                let right = self.body(right, depth + 1)?;
                Ok(BodyPlan::SetOperation {
                    left: Box::new(left),
                    op: *op,
                    right: Box::new(right),
                    columns: columns.clone(),
                })
            }
        }
    }

    fn set_hints(&mut self, s: &BoundSelect) {
        let id = match &s.from {
            Some(BoundFrom::Source(BoundSource {
                kind: SourceKind::Schema { id },
                ..
            })) => id,
            _ => return,
        };
        if s.filter.is_some() || s.grouping.is_some() || !s.order_by.is_empty() {
            return;
        }
        let hints = match s.distinct {
            true => QueryHints {
                skip: None,
                take: None,
                distinct: true,
            },
            false => QueryHints {
                skip: s.skip,
                take: s.take,
                distinct: false,
            },
        };
        if let Some(info) = self.sources.get_mut(id) {
            info.hints = hints;
        }
    }

    fn select(&mut self, s: &BoundSelect, depth: usize) -> Result<SelectPlan> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.set_hints(s);
        let (project, columns) = project::build_project(&s.items)?;
        self.line(depth, format!("Select {}", columns.iter().map(|c| &c.name).join(", ")));
        let d = depth + 1;
        if s.skip.is_some() || s.take.is_some() {
            let skip = s.skip.map(|n| format!(" Skip {}", n)).unwrap_or_default();
            let take = s.take.map(|n| format!(" Take {}", n)).unwrap_or_default();
            self.line(d, format!("Limit{}{}", skip, take));
        }
        if s.distinct {
            self.line(d, "Distinct".to_string());
        }
        let mut order_by = vec![];
        for o in &s.order_by {
            check_typed(&o.expr)?;
            order_by.push(OrderKey {
                expr: compile_expr(&o.expr),
                descending: o.descending,
            });
        }
        if !s.order_by.is_empty() {
            let keys = s
                .order_by
                .iter()
                .map(|o| format!("{}{}", o.expr, if o.descending { " DESC" } else { "" }))
                .join(", ");
            self.line(d, format!("OrderBy {}", keys));
        }
        let having = match &s.having {
            Some(h) => {
                self.line(d, format!("Having {}", h));
                Some(compile_expr(h))
            }
            None => None,
        };
        let grouping = match &s.grouping {
            Some(g) => {
                let aggregates = g
                    .aggregates
                    .iter()
                    .map(|a| {
                        let level = match a.level {
                            0 => String::new(),
                            n => format!("@{}", n),
                        };
                        format!("{}({}){}", a.method.signature.name, a.args.iter().join(", "), level)
                    })
                    .join(", ");
                self.line(d, format!("Group [{}] [{}]", g.keys.iter().join(", "), aggregates));
                Some(GroupPlan {
                    keys: g.keys.iter().map(compile_expr).collect(),
                    aggregates: g
                        .aggregates
                        .iter()
                        .map(|a| AggregatePlan {
                            method: a.method.clone(),
                            args: a.args.iter().map(compile_expr).collect(),
                            level: a.level,
                        })
                        .collect(),
                })
            }
            None => None,
        };
        let filter = match &s.filter {
            Some(f) => {
                self.line(d, format!("Filter {}", f));
                Some(compile_expr(f))
            }
            None => None,
        };
        let input = match &s.from {
            Some(from) => self.from(from, d)?,
            None => {
                self.line(d, "Empty".to_string());
                Plan::Empty
            }
        };
        Ok(SelectPlan {
            input,
            filter,
            grouping,
            having,
            project,
            order_by,
            skip: s.skip,
            take: s.take,
            distinct: s.distinct,
            columns,
        })
    }

    fn from(&mut self, from: &BoundFrom, depth: usize) -> Result<Plan> {
        match from {
            BoundFrom::Source(s) => self.source(s, depth),
            BoundFrom::Join {
                left,
                right,
                kind,
                on,
            } => {
                let left_width = left.width();
                let merge = match self.config.join_strategy {
                    JoinStrategy::SortMerge => merge_keys(on, left_width),
                    JoinStrategy::NestedLoop => None,
                };
                let name = match merge {
                    Some(_) => "SortMergeJoin",
                    None => "NestedLoopJoin",
                };
                let kind_name = match kind {
                    ast::JoinKind::Inner => "INNER",
                    ast::JoinKind::LeftOuter => "LEFT",
                    ast::JoinKind::RightOuter => "RIGHT",
                };
                self.line(depth, format!("{} {} ON {}", name, kind_name, on));
                let left_plan = self.from(left, depth + 1)?;
                let right_plan = self.from(right, depth + 1)?;
                Ok(Plan::Join(Box::new(JoinPlan {
                    left: left_plan,
                    right: right_plan,
                    kind: *kind,
                    on: compile_expr(on),
                    merge,
                    left_width,
                    right_width: right.width(),
                })))
            }
        }
    }

    fn source(&mut self, s: &BoundSource, depth: usize) -> Result<Plan> {
        match &s.kind {
            SourceKind::Schema { id } => {
                let info = self
                    .sources
                    .get(id)
                    .ok_or_else(|| Error::MissingSource(id.clone()))?;
                let columns: Vec<SourceColumn> = s
                    .columns
                    .iter()
                    .map(|c| SourceColumn {
                        name: c.name.clone(),
                        used: info.uses(&c.name),
                        cast: match info.has_external_types {
                            true => Some(c.ty.sql_type),
                            false => None,
                        },
                    })
                    .collect();
                let mut text = format!(
                    "Source {} used [{}] where {}",
                    info.from,
                    info.used_columns.iter().map(|c| &c.name).join(", "),
                    info.where_node
                );
                if info.hints != QueryHints::default() {
                    text.push_str(&format!(" hints {:?}", info.hints));
                }
                let plan = Plan::Source {
                    id: id.clone(),
                    schema: info.from.schema.clone(),
                    method: info.from.method.clone(),
                    args: info.from.args.clone(),
                    ordinal: info.from.ordinal,
                    columns,
                };
                self.line(depth, text);
                Ok(plan)
            }
            SourceKind::Cte { name } => {
                self.line(depth, format!("Cte {} AS {}", name, s.alias));
                Ok(Plan::Cte { name: name.clone() })
            }
            SourceKind::SubQuery(body) => {
                self.line(depth, format!("SubQuery {}", s.alias));
                Ok(Plan::SubQuery(Box::new(self.body(body, depth + 1)?)))
            }
        }
    }
}

/// Generate the artifact for `bound`. `signature` is the cache key it will be stored under.
pub fn generate(
    bound: &BoundScript,
    signature: &str,
    config: &EngineConfig,
    cancellation: &CancellationToken,
) -> Result<Artifact> {
    let mut g = Generator {
        config,
        cancellation,
        sources: bound.sources.clone(),
        lines: vec![],
    };
    let mut ctes = vec![];
    for cte in &bound.ctes {
        g.line(0, format!("With {}", cte.name));
        let body = g.body(&cte.body, 1)?;
        ctes.push(CtePlan {
            name: cte.name.clone(),
            body,
        });
    }
    let body = g.body(&bound.body, 0)?;
    debug!(signature, sources = g.sources.len(), "generated artifact");
    Ok(Artifact {
        signature: signature.to_string(),
        text: bound.text.clone(),
        ctes,
        body,
        sources: g.sources,
        explain: g.lines.join("\n"),
    })
}

#[cfg(test)]
fn artifact_with(text: &str, config: &EngineConfig) -> Result<Artifact> {
    let provider = crate::memory::sample_provider();
    let core = crate::builtin::core_library();
    let memo = crate::ast_to_ir::TableMemo::new();
    let script = crate::parser::parse_query_text(text).unwrap();
    let bound = crate::rewrite::RewritePipeline::new(&provider, &core, &memo, config.pushdown)
        .run(script)
        .unwrap();
    generate(&bound, "test", config, &CancellationToken::new())
}

#[cfg(test)]
fn first_item(text: &str) -> TypedExpr {
    let provider = crate::memory::sample_provider();
    let core = crate::builtin::core_library();
    let memo = crate::ast_to_ir::TableMemo::new();
    let script = crate::parser::parse_query_text(text).unwrap();
    let bound = crate::ast_to_ir::bind(&script, &provider, &core, &memo, true).unwrap();
    match &bound.body.as_select().unwrap().items[0] {
        crate::ir::BoundItem::Expr { expr, .. } => expr.clone(),
        i => panic!("unexpected item {:?}", i),
    }
}

#[test]
fn test_compile_expr() {
    let row = vec![
        SqlValue::Int(3),
        SqlValue::from("david.jones@x.com"),
        SqlValue::from("Paris"),
    ];
    let cases = vec![
        ("Id + 1", SqlValue::Int(4)),
        ("Id / 2", SqlValue::Int(1)),
        ("1 + 2.5", SqlValue::Double(3.5)),
        ("Name[0]", SqlValue::Char('d')),
        ("Name LIKE 'd%@x.com'", SqlValue::Bool(true)),
        ("Name LIKE 'D%'", SqlValue::Bool(false)),
        ("Name NOT LIKE '%y.org'", SqlValue::Bool(true)),
        ("Id IN (1, 2)", SqlValue::Bool(false)),
        ("Id NOT IN (1, 2)", SqlValue::Bool(true)),
        ("City IS NULL", SqlValue::Bool(false)),
        ("Id > 2 AND City = 'Paris'", SqlValue::Bool(true)),
        ("Id > 5 OR City = 'Oslo'", SqlValue::Bool(false)),
        ("CASE WHEN Id > 2 THEN 'big' ELSE 'small' END", SqlValue::from("big")),
        ("ToUpper(City)", SqlValue::from("PARIS")),
        ("a.Domain(Name)", SqlValue::from("x.com")),
    ];
    for (expr, expected) in cases {
        println!("Running case: {}", expr);
        let e = first_item(&format!("SELECT {} FROM #a.entities() a", expr));
        let f = compile_expr(&e);
        assert_eq!(f(&RowContext(&row)).unwrap(), expected);
    }
}

#[test]
fn test_evaluation_errors_and_short_circuit() {
    let row = vec![SqlValue::Int(3), SqlValue::from("x"), SqlValue::Null];
    let f = compile_expr(&first_item("SELECT Id / 0 FROM #a.entities()"));
    assert_eq!(
        f(&RowContext(&row)),
        Err(EvalError::Value(ValueError::DivisionByZero))
    );
    let f = compile_expr(&first_item("SELECT Id > 5 AND Id / 0 = 1 FROM #a.entities()"));
    assert_eq!(f(&RowContext(&row)).unwrap(), SqlValue::Bool(false));
    let f = compile_expr(&first_item("SELECT City = 'Paris' FROM #a.entities()"));
    assert_eq!(f(&RowContext(&row)).unwrap(), SqlValue::Null);
}

#[test]
fn test_like_match() {
    let cases = vec![
        ("abc", "abc", true),
        ("abc", "a%", true),
        ("abc", "%c", true),
        ("abc", "a_c", true),
        ("abc", "a_", false),
        ("abc", "%", true),
        ("", "%", true),
        ("", "_", false),
        ("a.b.c", "%.%.c", true),
        ("abc", "ABC", false),
    ];
    for (text, pattern, expected) in cases {
        println!("Running case: {} LIKE {}", text, pattern);
        assert_eq!(like_match(text, pattern), expected);
    }
}

#[test]
fn test_merge_keys_need_one_side_each() {
    let sort_merge = EngineConfig {
        join_strategy: JoinStrategy::SortMerge,
        ..Default::default()
    };
    let cases = vec![
        ("SELECT e.Id FROM #a.entities() e JOIN #a.orders() o ON e.Id = o.EntityId", true),
        ("SELECT e.Id FROM #a.entities() e JOIN #a.orders() o ON o.EntityId > e.Id", true),
        ("SELECT e.Id FROM #a.entities() e JOIN #a.orders() o ON e.Id + o.Id = 11", false),
        ("SELECT e.Id FROM #a.entities() e JOIN #a.orders() o ON e.Id = 1", false),
        ("SELECT e.Id FROM #a.entities() e JOIN #a.orders() o ON e.Id = o.EntityId AND o.Id > 1", false),
    ];
    for (text, expected) in cases {
        println!("Running case: {}", text);
        let a = artifact_with(text, &sort_merge).unwrap();
        assert_eq!(a.explain().contains("SortMergeJoin"), expected);
        let a = artifact_with(text, &EngineConfig::default()).unwrap();
        assert!(a.explain().contains("NestedLoopJoin"));
    }
}

#[test]
fn test_hints() {
    let cases = vec![
        (
            "SELECT Name FROM #a.entities() SKIP 1 TAKE 2",
            QueryHints { skip: Some(1), take: Some(2), distinct: false },
        ),
        ("SELECT Name FROM #a.entities() WHERE Id > 1 TAKE 2", QueryHints::default()),
        ("SELECT Name FROM #a.entities() ORDER BY Name TAKE 2", QueryHints::default()),
        ("SELECT City FROM #a.entities() GROUP BY City TAKE 2", QueryHints::default()),
        (
            "SELECT DISTINCT * FROM #a.entities() TAKE 2",
            QueryHints { skip: None, take: None, distinct: true },
        ),
        (
            "SELECT e.Name FROM #a.entities() e JOIN #a.orders() o ON e.Id = o.EntityId TAKE 2",
            QueryHints::default(),
        ),
    ];
    for (text, expected) in cases {
        println!("Running case: {}", text);
        let a = artifact_with(text, &EngineConfig::default()).unwrap();
        assert_eq!(a.sources[0].hints, expected);
    }
}

#[test]
fn test_explain() {
    let a = artifact_with(
        "SELECT Name FROM #a.entities() WHERE Id > 1 ORDER BY Name DESC TAKE 2",
        &EngineConfig::default(),
    )
    .unwrap();
    assert_eq!(
        a.explain(),
        "Select Name\n  Limit Take 2\n  OrderBy entities.Name DESC\n  Filter (entities.Id > 1)\n  \
         Source #a.entities() entities:0 used [Id, Name] where Id > 1"
    );
    assert_eq!(a.columns()[0].name, "Name");
}

#[test]
fn test_generation_stops_when_cancelled() {
    let provider = crate::memory::sample_provider();
    let core = crate::builtin::core_library();
    let memo = crate::ast_to_ir::TableMemo::new();
    let script = crate::parser::parse_query_text("SELECT Name FROM #a.entities()").unwrap();
    let bound = crate::rewrite::RewritePipeline::new(&provider, &core, &memo, true)
        .run(script)
        .unwrap();
    let token = CancellationToken::new();
    token.cancel();
    assert_eq!(
        generate(&bound, "x", &EngineConfig::default(), &token).unwrap_err(),
        Error::Cancelled
    );
}

#[test]
fn test_store_to_disk() {
    let a = artifact_with("SELECT Id FROM #b.entities()", &EngineConfig::default()).unwrap();
    let dir = std::env::temp_dir().join(format!("anyql-store-{}", std::process::id()));
    let path = a.store_to_disk(&dir).unwrap();
    assert_eq!(path.file_name().unwrap(), "test.plan");
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("SELECT Id FROM #b.entities()\n\nSelect Id"));
    std::fs::remove_dir_all(&dir).unwrap();
}
