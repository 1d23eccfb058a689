//! Rewrites of the typed IR that run after binding.
//!
//! - `expand_stars` replaces `*` and `alias.*` with explicit column references.
//! - `finalize_pushdown` turns the WHERE fragments recorded for each schema source into
//!   alias-free `ast::Expr`s and stores them in the source's `QuerySourceInfo`.
//!
//! Both passes only replace the nodes they rewrite.

use indexmap::IndexMap;

use crate::ast;
use crate::ir::{BoundBody, BoundFrom, BoundItem, BoundScript, BoundSelect, ExprKind, SourceKind, TypedExpr};
use crate::source_info::QuerySourceInfo;
use crate::sql_value::SqlValue;
use crate::token::{NumberKind, NumericSuffix};

/// Call `f` on every select block of `body`, including subqueries in FROM, innermost first.
pub fn for_each_select(body: &mut BoundBody, f: &mut dyn FnMut(&mut BoundSelect)) {
    fn visit_from(from: &mut BoundFrom, f: &mut dyn FnMut(&mut BoundSelect)) {
        match from {
            BoundFrom::Source(s) => {
                if let SourceKind::SubQuery(body) = &mut s.kind {
                    for_each_select(body, f);
                }
            }
            BoundFrom::Join { left, right, .. } => {
                visit_from(left, f);
                visit_from(right, f);
            }
        }
    }
    match body {
        BoundBody::Select(s) => {
            if let Some(from) = &mut s.from {
                visit_from(from, f);
            }
            f(s);
        }
        BoundBody::SetOperation { left, right, .. } => {
            for_each_select(left, f);
            for_each_select(right, f);
        }
    }
}

fn for_each_script_select(script: &mut BoundScript, f: &mut dyn FnMut(&mut BoundSelect)) {
    for cte in &mut script.ctes {
        for_each_select(&mut cte.body, f);
    }
    for_each_select(&mut script.body, f);
}

fn expand_select(select: &mut BoundSelect) -> bool {
    if !select.items.iter().any(|i| matches!(i, BoundItem::Star { .. })) {
        return false;
    }
    let mut items = Vec::with_capacity(select.items.len());
    for item in select.items.drain(..) {
        match item {
            BoundItem::Star { qualifier } => {
                for (alias, col, slot) in select.symbol.columns() {
                    if qualifier.as_deref().map(|q| q != alias).unwrap_or(false) {
                        continue;
                    }
                    let expr = TypedExpr::new(
                        ExprKind::Column {
                            alias: alias.to_string(),
                            name: col.name.clone(),
                            slot,
                        },
                        col.ty,
                    );
                    items.push(BoundItem::Expr {
                        expr,
                        name: col.name.clone(),
                    });
                }
            }
            item => items.push(item),
        }
    }
    select.items = items;
    true
}

/// Replace star items with the columns they stand for, in slot order. Returns the number of
/// blocks changed.
pub fn expand_stars(script: &mut BoundScript) -> usize {
    let mut n = 0;
    for_each_script_select(script, &mut |s: &mut BoundSelect| {
        if expand_select(s) {
            n += 1;
        }
    });
    n
}

/// `n` as a literal that reads back as `n`. Negative numbers become a negation.
fn number(text: String, kind: NumberKind, suffix: Option<NumericSuffix>) -> ast::Expr {
    match text.strip_prefix('-') {
        Some(positive) => ast::Expr::Unary {
            op: ast::UnaryOp::Negate,
            expr: Box::new(ast::Expr::Literal(ast::Literal::Number {
                text: positive.to_string(),
                kind,
                suffix,
            })),
        },
        None => ast::Expr::Literal(ast::Literal::Number { text, kind, suffix }),
    }
}

fn literal_to_ast(v: &SqlValue) -> Option<ast::Expr> {
    Some(match v {
        SqlValue::Null => ast::Expr::Literal(ast::Literal::Null),
        SqlValue::Bool(b) => ast::Expr::Literal(ast::Literal::Bool(*b)),
        SqlValue::Int(i) => number(i.to_string(), NumberKind::Integer, None),
        SqlValue::Long(i) => number(i.to_string(), NumberKind::Integer, Some(NumericSuffix::Long)),
        SqlValue::Double(d) if d.is_finite() => {
            let mut text = d.to_string();
            if !text.contains('.') {
                text.push_str(".0");
            }
            number(text, NumberKind::Real, Some(NumericSuffix::Double))
        }
        SqlValue::Double(_) => return None,
        SqlValue::Decimal(d) => {
            let text = d.normalize().to_string();
            let kind = match text.contains('.') {
                true => NumberKind::Real,
                false => NumberKind::Integer,
            };
            number(text, kind, Some(NumericSuffix::Decimal))
        }
        SqlValue::Char(c) => ast::Expr::Literal(ast::Literal::String(c.to_string())),
        v @ (SqlValue::Text(_) | SqlValue::DateTime(_)) => {
            ast::Expr::Literal(ast::Literal::String(v.to_string()))
        }
    })
}

/// The expression over unqualified column names, or `None` if it cannot be expressed without
/// the engine (method calls, aggregates, non-finite numbers).
pub fn to_alias_free(e: &TypedExpr) -> Option<ast::Expr> {
    let boxed = |x: &TypedExpr| to_alias_free(x).map(Box::new);
    Some(match &e.kind {
        ExprKind::Literal(v) => literal_to_ast(v)?,
        ExprKind::Column { name, .. } => ast::Expr::column(None, name),
        ExprKind::Cast(inner) => to_alias_free(inner)?,
        ExprKind::Unary { op, expr } => ast::Expr::Unary {
            op: *op,
            expr: boxed(expr)?,
        },
        ExprKind::Binary { op, lhs, rhs } => ast::Expr::Binary {
            lhs: boxed(lhs)?,
            op: *op,
            rhs: boxed(rhs)?,
        },
        ExprKind::Index { expr, index } => ast::Expr::Index {
            expr: boxed(expr)?,
            index: boxed(index)?,
        },
        ExprKind::IsNull { expr, negated } => ast::Expr::IsNull {
            expr: boxed(expr)?,
            negated: *negated,
        },
        ExprKind::InList {
            expr,
            list,
            negated,
        } => ast::Expr::InList {
            expr: boxed(expr)?,
            list: list.iter().map(to_alias_free).collect::<Option<_>>()?,
            negated: *negated,
        },
        ExprKind::Like {
            expr,
            pattern,
            negated,
        } => ast::Expr::Like {
            expr: boxed(expr)?,
            pattern: boxed(pattern)?,
            negated: *negated,
        },
        ExprKind::Case { whens, otherwise } => ast::Expr::Case {
            whens: whens
                .iter()
                .map(|(w, t)| Some((to_alias_free(w)?, to_alias_free(t)?)))
                .collect::<Option<_>>()?,
            otherwise: match otherwise {
                Some(o) => Some(boxed(o)?),
                None => None,
            },
        },
        ExprKind::Call { .. } | ExprKind::Aggregate { .. } | ExprKind::GroupKey { .. } => {
            return None
        }
    })
}

fn conjunction(parts: Vec<ast::Expr>) -> Option<ast::Expr> {
    parts
        .into_iter()
        .reduce(|acc, e| ast::Expr::binary(acc, ast::BinaryOp::And, e))
}

fn finalize_fragments(
    fragments: &IndexMap<String, Vec<TypedExpr>>,
    sources: &mut IndexMap<String, QuerySourceInfo>,
) -> usize {
    let mut n = 0;
    for (id, exprs) in fragments {
        let info = match sources.get_mut(id) {
            Some(i) => i,
            None => continue,
        };
        let parts: Vec<ast::Expr> = exprs.iter().filter_map(to_alias_free).collect();
        if let Some(w) = conjunction(parts) {
            info.where_node = w;
            n += 1;
        }
    }
    n
}

/// Store each source's pushed-down WHERE in its `QuerySourceInfo`. Sources with nothing
/// pushable keep the `TRUE` fallback. Returns the number of sources that received a filter.
pub fn finalize_pushdown(script: &mut BoundScript) -> usize {
    let mut fragments = vec![];
    for_each_script_select(script, &mut |s: &mut BoundSelect| {
        if !s.pushdown.is_empty() {
            fragments.push(std::mem::take(&mut s.pushdown));
        }
    });
    fragments
        .iter()
        .map(|f| finalize_fragments(f, &mut script.sources))
        .sum()
}

#[cfg(test)]
fn bound(text: &str) -> BoundScript {
    let provider = crate::memory::sample_provider();
    let core = crate::builtin::core_library();
    let memo = crate::ast_to_ir::TableMemo::new();
    let script = crate::parser::parse_query_text(text).unwrap();
    crate::ast_to_ir::bind(&script, &provider, &core, &memo, true).unwrap()
}

#[cfg(test)]
fn item_texts(s: &BoundSelect) -> Vec<String> {
    s.items
        .iter()
        .map(|i| match i {
            BoundItem::Expr { expr, name } => format!("{} AS {}", expr, name),
            BoundItem::Star { .. } => "*".to_string(),
        })
        .collect()
}

#[test]
fn test_expand_stars() {
    let cases = vec![
        (
            "SELECT * FROM #b.entities()",
            vec!["entities.Id AS Id", "entities.Name AS Name"],
        ),
        (
            "SELECT o.*, e.Id FROM #a.entities() e JOIN #a.orders() o ON e.Id = o.EntityId",
            vec!["o.Id AS Id", "o.EntityId AS EntityId", "o.Amount AS Amount", "e.Id AS Id"],
        ),
    ];
    for (input, expected) in cases {
        println!("Running case: {}", input);
        let mut b = bound(input);
        let before = b.body.columns();
        assert_eq!(expand_stars(&mut b), 1);
        assert_eq!(item_texts(b.body.as_select().unwrap()), expected);
        assert_eq!(b.body.columns(), before);
    }
}

#[test]
fn test_expanded_star_slots_follow_symbol() {
    let mut b = bound("SELECT o.* FROM #a.entities() e JOIN #a.orders() o ON e.Id = o.EntityId");
    expand_stars(&mut b);
    let slots: Vec<usize> = b
        .body
        .as_select()
        .unwrap()
        .items
        .iter()
        .filter_map(|i| match i {
            BoundItem::Expr { expr, .. } => match expr.kind {
                ExprKind::Column { slot, .. } => Some(slot),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(slots, vec![3, 4, 5]);
}

#[test]
fn test_finalize_pushdown() {
    let mut b = bound(
        "SELECT a.Name FROM #a.entities() a JOIN #b.entities() b ON a.Id = b.Id \
         WHERE a.Id = 1 AND b.Id = 2 AND a.City = 'Paris' AND a.Id + 0.5 > 1",
    );
    assert_eq!(finalize_pushdown(&mut b), 2);
    let texts: Vec<(String, String)> = b
        .sources
        .iter()
        .map(|(id, info)| (id.clone(), info.where_node.to_string()))
        .collect();
    assert_eq!(
        texts,
        vec![
            (
                "a:0".to_string(),
                "Id = 1 AND City = 'Paris' AND Id + 0.5d > 1".to_string()
            ),
            ("b:1".to_string(), "Id = 2".to_string()),
        ]
    );
    assert!(b.body.as_select().unwrap().pushdown.is_empty());
}

#[test]
fn test_unpushable_sources_keep_true() {
    let mut b = bound("SELECT Name FROM #a.entities() WHERE Length(Name) > 3");
    assert_eq!(finalize_pushdown(&mut b), 0);
    assert_eq!(b.sources["entities:0"].where_node.to_string(), "TRUE");
}

#[test]
fn test_literals_read_back() {
    let cases = vec![
        (SqlValue::Long(-3), "-3l"),
        (SqlValue::Double(2.0), "2.0d"),
        (SqlValue::Decimal(rust_decimal::Decimal::new(1250, 2)), "12.5m"),
        (SqlValue::Char('x'), "'x'"),
    ];
    for (v, expected) in cases {
        println!("Running case: {}", expected);
        let e = literal_to_ast(&v).unwrap();
        assert_eq!(e.to_string(), expected);
        assert_eq!(crate::parser::parse_expression(expected).unwrap(), e);
    }
    assert!(literal_to_ast(&SqlValue::Double(f64::NAN)).is_none());
}
