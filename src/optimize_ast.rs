//! rewrites ast trees before binding.
//! - turns `SELECT DISTINCT` into an equivalent `GROUP BY`, so that one grouping implementation
//!   handles both.

use crate::ast;

/// Decides whether a call names an aggregate. Receives the call's qualifier and name.
pub type AggregateTest<'a> = &'a dyn Fn(Option<&str>, &str) -> bool;

fn has_aggregate(e: &ast::Expr, is_aggregate: AggregateTest) -> bool {
    e.any(&|x| match x {
        ast::Expr::Call {
            qualifier, name, ..
        } => is_aggregate(qualifier.as_deref(), name),
        _ => false,
    })
}

/// Rewrite one select block. Returns true if it changed.
///
/// `SELECT DISTINCT a, b FROM t` becomes `SELECT a, b FROM t GROUP BY a, b` when the block has
/// no GROUP BY, HAVING, star or aggregate.
pub fn distinct_to_group_by(select: &mut ast::Select, is_aggregate: AggregateTest) -> bool {
    if !select.distinct || !select.group_by.is_empty() || select.having.is_some() {
        return false;
    }
    let mut keys = vec![];
    for item in &select.items {
        match item {
            ast::SelectItem::Expr { expr, .. } if !has_aggregate(expr, is_aggregate) => {
                keys.push(expr.clone())
            }
            _ => return false,
        }
    }
    select.group_by = keys;
    select.distinct = false;
    true
}

fn rewrite_body(body: &mut ast::QueryBody, is_aggregate: AggregateTest) -> usize {
    match body {
        ast::QueryBody::Select(s) => {
            let mut n = 0;
            if let Some(from) = &mut s.from {
                let factors = std::iter::once(&mut from.first)
                    .chain(from.joins.iter_mut().map(|j| &mut j.factor));
                for f in factors {
                    if let ast::FromFactor::SubQuery { body, .. } = f {
                        n += rewrite_body(body, is_aggregate);
                    }
                }
            }
            if distinct_to_group_by(s, is_aggregate) {
                n += 1;
            }
            n
        }
        ast::QueryBody::SetOperation { left, right, .. } => {
            rewrite_body(left, is_aggregate) + rewrite_body(right, is_aggregate)
        }
    }
}

/// Apply `distinct_to_group_by` to every block of `script`. Returns the number of blocks changed.
pub fn rewrite_distinct(script: &mut ast::Script, is_aggregate: AggregateTest) -> usize {
    let mut n = 0;
    for cte in &mut script.query.ctes {
        n += rewrite_body(&mut cte.body, is_aggregate);
    }
    n + rewrite_body(&mut script.query.body, is_aggregate)
}

/// Names of the schemas invoked anywhere in `script`, including coupled ones.
pub fn schema_names(script: &ast::Script) -> Vec<String> {
    fn from_body(body: &ast::QueryBody, out: &mut Vec<String>) {
        match body {
            ast::QueryBody::Select(s) => {
                if let Some(from) = &s.from {
                    let factors =
                        std::iter::once(&from.first).chain(from.joins.iter().map(|j| &j.factor));
                    for f in factors {
                        match f {
                            ast::FromFactor::Schema { schema, .. } => {
                                if !out.contains(schema) {
                                    out.push(schema.clone());
                                }
                            }
                            ast::FromFactor::SubQuery { body, .. } => from_body(body, out),
                            _ => {}
                        }
                    }
                }
            }
            ast::QueryBody::SetOperation { left, right, .. } => {
                from_body(left, out);
                from_body(right, out);
            }
        }
    }
    let mut out = vec![];
    for d in &script.declarations {
        if let ast::Declaration::Couple(c) = d {
            if !out.contains(&c.schema) {
                out.push(c.schema.clone());
            }
        }
    }
    for cte in &script.query.ctes {
        from_body(&cte.body, &mut out);
    }
    from_body(&script.query.body, &mut out);
    out
}

#[cfg(test)]
fn core_aggregates(_: Option<&str>, name: &str) -> bool {
    crate::builtin::core_library().is_aggregate(name)
}

#[test]
fn test_distinct_to_group_by() {
    struct Case {
        desc: &'static str,
        input: &'static str,
        expected: &'static str,
    }
    let cases = vec![
        Case {
            desc: "plain distinct",
            input: "SELECT DISTINCT City FROM #a.entities()",
            expected: "SELECT City FROM #a.entities() GROUP BY City",
        },
        Case {
            desc: "aliases are kept on the item",
            input: "SELECT DISTINCT City AS c, Id % 2 FROM #a.entities()",
            expected: "SELECT City AS c, Id % 2 FROM #a.entities() GROUP BY City, Id % 2",
        },
        Case {
            desc: "star is left alone",
            input: "SELECT DISTINCT * FROM #a.entities()",
            expected: "SELECT DISTINCT * FROM #a.entities()",
        },
        Case {
            desc: "aggregates are left alone",
            input: "SELECT DISTINCT Count() FROM #a.entities()",
            expected: "SELECT DISTINCT Count() FROM #a.entities()",
        },
        Case {
            desc: "existing grouping is left alone",
            input: "SELECT DISTINCT City FROM #a.entities() GROUP BY City, Id",
            expected: "SELECT DISTINCT City FROM #a.entities() GROUP BY City, Id",
        },
        Case {
            desc: "nested blocks",
            input: "WITH c AS (SELECT DISTINCT Name FROM #a.entities()) SELECT DISTINCT x.City FROM (SELECT DISTINCT City FROM #b.entities()) x",
            expected: "WITH c AS (SELECT Name FROM #a.entities() GROUP BY Name) SELECT x.City FROM (SELECT City FROM #b.entities() GROUP BY City) x GROUP BY x.City",
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        let mut script = crate::parser::parse_query_text(case.input).unwrap();
        rewrite_distinct(&mut script, &core_aggregates);
        assert_eq!(script.to_string(), case.expected);
    }
}

#[test]
fn test_schema_names() {
    let script = crate::parser::parse_query_text(
        "TABLE t { Id 'int' };\nCOUPLE #c.m WITH TABLE t AS tt;\n\
         SELECT 1 FROM #a.x() JOIN (SELECT 1 FROM #b.y()) s ON 1 = 1 JOIN #a.z() ON 1 = 1",
    )
    .unwrap();
    assert_eq!(schema_names(&script), vec!["c", "a", "b"]);
}
