use std::collections::HashMap;
use std::sync::Arc;

use anyql::ast_to_ir;
use anyql::config::JoinStrategy;
use anyql::memory::{sample_provider, MemoryProvider};
use anyql::sql_type::SqlType;
use anyql::sql_value::SqlValue;
use anyql::{CancellationToken, Engine, EngineConfig, Error, ErrorKind, ExecutionOptions};

fn engine_with(config: EngineConfig) -> (Engine, Arc<MemoryProvider>) {
    let provider = Arc::new(sample_provider());
    (Engine::new(provider.clone(), config), provider)
}

fn engine() -> (Engine, Arc<MemoryProvider>) {
    engine_with(EngineConfig::default())
}

fn rows(engine: &Engine, text: &str) -> Vec<Vec<SqlValue>> {
    engine
        .run(text, &ExecutionOptions::default())
        .unwrap_or_else(|e| panic!("{}: {}", text, e))
        .rows()
        .to_vec()
}

fn text(s: &str) -> SqlValue {
    SqlValue::from(s)
}

#[test]
fn test_indexer_on_name() {
    let (e, _) = engine();
    let result = rows(&e, "SELECT Name FROM #a.entities() f WHERE f.Name[0] = 'd'");
    assert_eq!(result, vec![vec![text("david.jones@x.com")]]);
}

#[test]
fn test_distinct_equals_group_by() {
    let (e, _) = engine();
    let distinct = rows(&e, "SELECT DISTINCT City FROM #a.entities()");
    let grouped = rows(&e, "SELECT City FROM #a.entities() GROUP BY City");
    assert_eq!(distinct, grouped);
    assert_eq!(
        distinct,
        vec![
            vec![text("Paris")],
            vec![text("Berlin")],
            vec![SqlValue::Null],
            vec![text("Oslo")],
        ]
    );
}

#[test]
fn test_pushdown_reaches_only_its_source() {
    let (e, provider) = engine();
    let result = rows(
        &e,
        "SELECT a.Id FROM #a.entities() a JOIN #b.entities() b ON a.Id = b.Id WHERE a.Id = 1 AND b.Id = 2",
    );
    assert!(result.is_empty());
    let log = provider.source_log();
    let wheres: HashMap<String, String> = log
        .iter()
        .map(|c| (c.info.from.alias.clone(), c.info.where_node.to_string()))
        .collect();
    assert_eq!(wheres["a"], "Id = 1");
    assert_eq!(wheres["b"], "Id = 2");
}

#[test]
fn test_pushdown_disabled_sends_true() {
    let (e, provider) = engine_with(EngineConfig {
        pushdown: false,
        ..Default::default()
    });
    let result = rows(&e, "SELECT Id FROM #a.entities() WHERE Id = 4");
    assert_eq!(result, vec![vec![SqlValue::Int(4)]]);
    assert_eq!(provider.source_log()[0].info.where_node.to_string(), "TRUE");
}

#[test]
fn test_ambiguous_column_is_reported() {
    let (e, _) = engine();
    let err = e
        .compile("SELECT Id FROM #a.entities() a JOIN #b.entities() b ON a.Id = b.Id")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Semantic);
    match err {
        Error::Semantic(ast_to_ir::Error::AmbiguousColumn { column, .. }) => assert_eq!(column, "Id"),
        e => panic!("unexpected error {:?}", e),
    }
}

#[test]
fn test_type_promotion() {
    let (e, _) = engine();
    let cases = vec![
        ("SELECT 1 + 2.5", SqlType::Double),
        ("SELECT 1m + 2", SqlType::Decimal),
        ("SELECT Id + 1l FROM #a.entities()", SqlType::Long),
    ];
    for (query, expected) in cases {
        println!("Running case: {}", query);
        let artifact = e.compile(query).unwrap();
        assert_eq!(artifact.columns()[0].ty.sql_type, expected);
        let table = e.execute(&artifact, &ExecutionOptions::default()).unwrap();
        assert_eq!(table.rows()[0][0].sql_type(), expected);
    }
}

#[test]
fn test_artifacts_are_cached_and_failures_are_not() {
    let (e, _) = engine();
    let first = e.compile("SELECT Id FROM #a.entities()").unwrap();
    let second = e.compile("SELECT Id FROM #a.entities()").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(e.cached_artifacts(), 1);

    assert!(e.compile("SELECT Id FROM #zz.entities()").is_err());
    assert_eq!(e.cached_artifacts(), 1);

    e.clear_caches();
    let third = e.compile("SELECT Id FROM #a.entities()").unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
}

#[test]
fn test_cancellation() {
    let (e, _) = engine();
    let token = CancellationToken::new();
    token.cancel();
    let err = e.compile_with("SELECT Id FROM #a.entities()", &token).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(e.cached_artifacts(), 0);

    let artifact = e.compile("SELECT Id FROM #a.entities()").unwrap();
    let options = ExecutionOptions {
        cancellation: token,
        ..Default::default()
    };
    let err = e.execute(&artifact, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_source_failure_fails_the_query() {
    let (e, _) = engine();
    let err = e
        .run("SELECT Name FROM #a.broken()", &ExecutionOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(err.to_string().contains("could not be read"), "{}", err);
}

#[test]
fn test_environment_by_ordinal() {
    let (e, provider) = engine();
    let mut options = ExecutionOptions::default();
    options
        .environment_variables
        .insert(1, HashMap::from([("token".to_string(), "s3cret".to_string())]));
    e.run(
        "SELECT e.Id FROM #a.entities() e JOIN #a.orders() o ON e.Id = o.EntityId",
        &options,
    )
    .unwrap();
    let log = provider.source_log();
    assert_eq!(log.len(), 2);
    for call in log {
        let expected = match call.info.from.ordinal {
            1 => Some("s3cret".to_string()),
            _ => None,
        };
        assert_eq!(call.environment.get("token").cloned(), expected);
    }
}

#[test]
fn test_take_stops_sources_early() {
    let (e, provider) = engine_with(EngineConfig {
        chunk_size: 4,
        ..Default::default()
    });
    let result = rows(&e, "SELECT N FROM #a.numbers(1000000) TAKE 3");
    assert_eq!(
        result,
        vec![vec![SqlValue::Long(0)], vec![SqlValue::Long(1)], vec![SqlValue::Long(2)]]
    );
    let hints = provider.source_log()[0].info.hints;
    assert_eq!(hints.take, Some(3));
    assert!(!hints.distinct);

    let result = rows(&e, "SELECT N FROM #a.numbers(1000000) WHERE N > 5 SKIP 1 TAKE 2");
    assert_eq!(result, vec![vec![SqlValue::Long(7)], vec![SqlValue::Long(8)]]);
}

#[test]
fn test_outer_joins_under_both_strategies() {
    use SqlValue::*;
    let left_join = "SELECT e.Id, o.Id FROM #a.entities() e LEFT JOIN #a.orders() o ON e.Id = o.EntityId";
    let right_join = "SELECT e.Id, o.Id FROM #a.entities() e RIGHT JOIN #a.orders() o ON e.Id = o.EntityId";
    let inequality = "SELECT e.Id, o.Id FROM #a.entities() e JOIN #a.orders() o ON e.Id > o.EntityId";
    let (nested, _) = engine();
    let (merged, _) = engine_with(EngineConfig {
        join_strategy: JoinStrategy::SortMerge,
        ..Default::default()
    });
    assert_eq!(
        rows(&nested, left_join),
        vec![
            vec![Int(1), Int(10)],
            vec![Int(1), Int(11)],
            vec![Int(2), Null],
            vec![Int(3), Int(12)],
            vec![Int(4), Null],
            vec![Int(5), Int(13)],
        ]
    );
    assert_eq!(
        rows(&nested, right_join),
        vec![
            vec![Int(1), Int(10)],
            vec![Int(1), Int(11)],
            vec![Int(3), Int(12)],
            vec![Int(5), Int(13)],
            vec![Null, Int(14)],
        ]
    );
    for query in [left_join, right_join, inequality] {
        println!("Running case: {}", query);
        assert_eq!(rows(&nested, query), rows(&merged, query));
    }
    assert!(merged.compile(left_join).unwrap().explain().contains("SortMergeJoin LEFT"));
}

#[test]
fn test_set_operations_and_ctes() {
    use SqlValue::*;
    let (e, _) = engine();
    let cases = vec![
        (
            "SELECT Id FROM #a.entities() WHERE Id < 3 UNION SELECT Id FROM #b.entities()",
            vec![Int(1), Int(2), Int(3)],
        ),
        (
            "WITH big AS (SELECT Id FROM #a.entities() WHERE Id > 3) SELECT Id FROM big ORDER BY Id DESC",
            vec![Int(5), Int(4)],
        ),
        (
            "SELECT s.Id FROM (SELECT Id FROM #a.entities() WHERE City = 'Paris') s",
            vec![Int(1), Int(3)],
        ),
    ];
    for (query, expected) in cases {
        println!("Running case: {}", query);
        let ids: Vec<SqlValue> = rows(&e, query).into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, expected);
    }
}

#[test]
fn test_level_aggregates() {
    use SqlValue::*;
    let (e, _) = engine();
    let result = rows(
        &e,
        "SELECT City, Name, Count(), Count(Id, 1) FROM #a.entities() GROUP BY City, Name",
    );
    assert_eq!(
        result,
        vec![
            vec![text("Paris"), text("alice.smith@x.com"), Int(1), Int(2)],
            vec![text("Berlin"), text("bob.brown@y.org"), Int(1), Int(1)],
            vec![text("Paris"), text("david.jones@x.com"), Int(1), Int(2)],
            vec![Null, text("carol.white@y.org"), Int(1), Int(1)],
            vec![text("Oslo"), text("erin.black@x.com"), Int(1), Int(1)],
        ]
    );
    let err = e
        .compile("SELECT Count(Id, 2) FROM #a.entities() GROUP BY City")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Semantic);
}

#[test]
fn test_aggregate_over_empty_input() {
    let (e, _) = engine();
    assert_eq!(
        rows(&e, "SELECT Count() FROM #a.entities() WHERE Id > 100"),
        vec![vec![SqlValue::Int(0)]]
    );
    assert!(rows(&e, "SELECT City, Count() FROM #a.entities() WHERE Id > 100 GROUP BY City").is_empty());
}

#[test]
fn test_coupled_table_uses_declared_types() {
    let (e, provider) = engine();
    let query = "TABLE Person { Id 'long', Name 'string' };\nCOUPLE #a.entities WITH TABLE Person AS People;\nSELECT Id, Name FROM People() p WHERE Id = 2";
    let table = e.run(query, &ExecutionOptions::default()).unwrap();
    assert_eq!(table.rows(), &[vec![SqlValue::Long(2), text("bob.brown@y.org")]]);
    assert!(provider.source_log()[0].info.has_external_types);
}

#[test]
fn test_schema_methods_and_result_index() {
    let (e, _) = engine();
    let table = e
        .run(
            "SELECT Id, f.Domain(Name) AS Domain FROM #a.entities() f",
            &ExecutionOptions::default(),
        )
        .unwrap();
    let x = table.rows_with_key("Domain", &text("x.com")).unwrap();
    let ids: Vec<SqlValue> = x.iter().map(|r| r[0].clone()).collect();
    assert_eq!(ids, vec![SqlValue::Int(1), SqlValue::Int(3), SqlValue::Int(5)]);
}

#[test]
fn test_store_artifacts() {
    let dir = std::env::temp_dir().join(format!("anyql-plans-{}", std::process::id()));
    let (e, _) = engine_with(EngineConfig {
        store_artifacts: Some(dir.clone()),
        ..Default::default()
    });
    let artifact = e.compile("SELECT Id FROM #a.entities() TAKE 1").unwrap();
    let path = dir.join(format!("{}.plan", artifact.signature));
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("SELECT Id FROM #a.entities() TAKE 1"));
    assert!(contents.contains("Source #a.entities()"));
    let _ = std::fs::remove_dir_all(&dir);
}
