//! Joins of two row streams.
//!
//! The outer side streams and the inner side is collected first. For INNER and LEFT joins the
//! left side is outer; RIGHT joins iterate the right side as the outer loop. Output rows are
//! always laid out left slots first, and an outer row without matches is padded with `NULL`s
//! unless the join is INNER.
//!
//! With merge keys the inner rows are sorted by key once and each outer row finds its matches by
//! binary search. Matches are returned in inner order, so both strategies produce the same rows
//! in the same order. `NULL` keys never match.

use std::cmp::Ordering;

use crate::artifact::JoinPlan;
use crate::ast::{BinaryOp, JoinKind};
use crate::codegen::{self, RowContext};
use crate::runtime::{Result, Row, RowStream};
use crate::sql_value::SqlValue;

struct Inner {
    rows: Vec<Row>,
    /// Non-null keys with their row index, sorted by key. Only built for merge joins.
    sorted: Vec<(SqlValue, usize)>,
}

fn ordered(outer_is_left: bool, outer: &[SqlValue], inner: &[SqlValue]) -> Row {
    let (l, r) = match outer_is_left {
        true => (outer, inner),
        false => (inner, outer),
    };
    let mut row = Vec::with_capacity(l.len() + r.len());
    row.extend_from_slice(l);
    row.extend_from_slice(r);
    row
}

fn prepare(plan: &JoinPlan, inner: RowStream<'_>, outer_is_left: bool) -> Result<Inner> {
    let rows = inner.collect::<Result<Vec<Row>>>()?;
    let mut sorted = vec![];
    if let Some(keys) = &plan.merge {
        let key = match outer_is_left {
            true => &keys.right,
            false => &keys.left,
        };
        for (i, row) in rows.iter().enumerate() {
            match key(&RowContext(row))? {
                SqlValue::Null => {}
                k => sorted.push((k, i)),
            }
        }
        sorted.sort_by(|a, b| a.0.sort_cmp(&b.0));
    }
    Ok(Inner { rows, sorted })
}

/// Indexes of sorted inner keys `k` with `outer op k`.
fn merge_range(sorted: &[(SqlValue, usize)], outer: &SqlValue, op: BinaryOp) -> Vec<usize> {
    let lo = sorted.partition_point(|(k, _)| k.sort_cmp(outer) == Ordering::Less);
    let hi = sorted.partition_point(|(k, _)| k.sort_cmp(outer) != Ordering::Greater);
    let picked: Vec<&(SqlValue, usize)> = match op {
        BinaryOp::Eq => sorted[lo..hi].iter().collect(),
        BinaryOp::NotEq => sorted[..lo].iter().chain(sorted[hi..].iter()).collect(),
        BinaryOp::Lt => sorted[hi..].iter().collect(),
        BinaryOp::LtEq => sorted[lo..].iter().collect(),
        BinaryOp::Gt => sorted[..lo].iter().collect(),
        BinaryOp::GtEq => sorted[..hi].iter().collect(),
        _ => vec![],
    };
    let mut found: Vec<usize> = picked.into_iter().map(|(_, i)| *i).collect();
    found.sort_unstable();
    found
}

fn matches(plan: &JoinPlan, outer: &Row, inner: &Inner, outer_is_left: bool) -> Result<Vec<usize>> {
    if let Some(keys) = &plan.merge {
        let (key, op) = match outer_is_left {
            true => (&keys.left, keys.op),
            false => (&keys.right, codegen::flip(keys.op)),
        };
        return Ok(match key(&RowContext(outer))? {
            SqlValue::Null => vec![],
            k => merge_range(&inner.sorted, &k, op),
        });
    }
    let mut found = vec![];
    for (i, row) in inner.rows.iter().enumerate() {
        let combined = ordered(outer_is_left, outer, row);
        if (plan.on)(&RowContext(&combined))?.is_true() {
            found.push(i);
        }
    }
    Ok(found)
}

/// Join `left` and `right` as described by `plan`.
pub fn join<'a>(plan: &'a JoinPlan, left: RowStream<'a>, right: RowStream<'a>) -> RowStream<'a> {
    let outer_is_left = plan.kind != JoinKind::RightOuter;
    let (outer, inner) = match outer_is_left {
        true => (left, right),
        false => (right, left),
    };
    let inner = match prepare(plan, inner, outer_is_left) {
        Ok(i) => i,
        Err(e) => return Box::new(std::iter::once(Err(e))),
    };
    let pad = plan.kind != JoinKind::Inner;
    let inner_width = match outer_is_left {
        true => plan.right_width,
        false => plan.left_width,
    };
    Box::new(outer.flat_map(move |o| -> Vec<Result<Row>> {
        let o = match o {
            Ok(o) => o,
            Err(e) => return vec![Err(e)],
        };
        let found = match matches(plan, &o, &inner, outer_is_left) {
            Ok(f) => f,
            Err(e) => return vec![Err(e)],
        };
        if found.is_empty() {
            return match pad {
                true => vec![Ok(ordered(outer_is_left, &o, &vec![SqlValue::Null; inner_width]))],
                false => vec![],
            };
        }
        found
            .into_iter()
            .map(|i| Ok(ordered(outer_is_left, &o, &inner.rows[i])))
            .collect()
    }))
}

#[cfg(test)]
fn plan(kind: JoinKind, op: BinaryOp, merge: bool) -> JoinPlan {
    use crate::artifact::{MergeKeys, Plan};
    use crate::codegen::compiled;
    JoinPlan {
        left: Plan::Empty,
        right: Plan::Empty,
        kind,
        on: compiled(move |ctx| Ok(ctx.slot(0).apply(op, &ctx.slot(2))?)),
        merge: match merge {
            true => Some(MergeKeys {
                left: compiled(|ctx| Ok(ctx.slot(0))),
                right: compiled(|ctx| Ok(ctx.slot(0))),
                op,
            }),
            false => None,
        },
        left_width: 2,
        right_width: 1,
    }
}

#[cfg(test)]
fn stream(rows: &[Row]) -> RowStream<'static> {
    Box::new(rows.to_vec().into_iter().map(Ok))
}

#[test]
fn test_sort_merge_equals_nested_loop() {
    use SqlValue::*;
    let left: Vec<Row> = vec![
        vec![Int(1), Text("a".into())],
        vec![Int(2), Text("b".into())],
        vec![Null, Text("n".into())],
        vec![Int(3), Text("c".into())],
        vec![Int(2), Text("d".into())],
    ];
    let right: Vec<Row> = vec![vec![Int(2)], vec![Int(1)], vec![Null], vec![Int(2)], vec![Int(5)]];
    let ops = [BinaryOp::Eq, BinaryOp::NotEq, BinaryOp::Lt, BinaryOp::LtEq, BinaryOp::Gt, BinaryOp::GtEq];
    let kinds = [JoinKind::Inner, JoinKind::LeftOuter, JoinKind::RightOuter];
    for kind in kinds {
        for op in ops {
            println!("Running case: {:?} {}", kind, op);
            let nested = plan(kind, op, false);
            let merged = plan(kind, op, true);
            let expected: Vec<Row> = join(&nested, stream(&left), stream(&right))
                .collect::<Result<_>>()
                .unwrap();
            let actual: Vec<Row> = join(&merged, stream(&left), stream(&right))
                .collect::<Result<_>>()
                .unwrap();
            assert_eq!(actual, expected);
        }
    }
}

#[test]
fn test_outer_joins_pad_with_nulls() {
    use SqlValue::*;
    let left: Vec<Row> = vec![vec![Int(1), Text("a".into())], vec![Int(4), Text("d".into())]];
    let right: Vec<Row> = vec![vec![Int(1)], vec![Int(7)]];
    let cases = vec![
        (JoinKind::Inner, vec![vec![Int(1), Text("a".into()), Int(1)]]),
        (
            JoinKind::LeftOuter,
            vec![
                vec![Int(1), Text("a".into()), Int(1)],
                vec![Int(4), Text("d".into()), Null],
            ],
        ),
        (
            JoinKind::RightOuter,
            vec![
                vec![Int(1), Text("a".into()), Int(1)],
                vec![Null, Null, Int(7)],
            ],
        ),
    ];
    for (kind, expected) in cases {
        println!("Running case: {:?}", kind);
        let p = plan(kind, BinaryOp::Eq, false);
        let rows: Vec<Row> = join(&p, stream(&left), stream(&right))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows, expected);
    }
}

#[test]
fn test_left_order_is_preserved() {
    use SqlValue::*;
    let left: Vec<Row> = (0..6).rev().map(|i| vec![Int(i % 3), Int(i)]).collect();
    let right: Vec<Row> = vec![vec![Int(2)], vec![Int(0)]];
    let p = plan(JoinKind::Inner, BinaryOp::Eq, true);
    let seconds: Vec<SqlValue> = join(&p, stream(&left), stream(&right))
        .map(|r| r.unwrap()[1].clone())
        .collect();
    assert_eq!(seconds, vec![Int(5), Int(3), Int(2), Int(0)]);
}
