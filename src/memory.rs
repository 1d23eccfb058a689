//! An in-memory schema provider.
//!
//! Tables are vectors of rows held by a `MemorySchema`. Every started row source is logged, so
//! callers can inspect what the engine asked of a source. Sources honor the row limit hint and
//! ignore the pushed-down filter, which the engine re-applies anyway.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use parking_lot::Mutex;

use crate::method::{MethodLibrary, ReturnType};
use crate::schema::{
    ObjectResolver, RowIter, RowShape, RowSource, RuntimeContext, Schema, SchemaProvider,
    SchemaTable, ShapedRow, TableContext,
};
use crate::source_info::QuerySourceInfo;
use crate::sql_type::{SqlType, ValueType};
use crate::sql_value::SqlValue;

/// One started row source.
#[derive(Debug, Clone)]
pub struct SourceCall {
    pub info: QuerySourceInfo,
    pub environment: HashMap<String, String>,
}

type SourceLog = Arc<Mutex<Vec<SourceCall>>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    columns: Vec<(String, ValueType)>,
    rows: Vec<Vec<SqlValue>>,
    /// Fail with an error instead of producing this row.
    fail_at: Option<usize>,
}

impl MemoryTable {
    pub fn new(columns: Vec<(&str, ValueType)>) -> Self {
        MemoryTable {
            columns: columns
                .into_iter()
                .map(|(n, t)| (n.to_string(), t))
                .collect(),
            rows: vec![],
            fail_at: None,
        }
    }

    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn failing_at(mut self, row: usize) -> Self {
        self.fail_at = Some(row);
        self
    }

    fn schema_table(&self) -> SchemaTable {
        SchemaTable::new(self.columns.iter().map(|(n, t)| (n.as_str(), *t)).collect())
    }
}

pub struct MemorySchema {
    name: String,
    tables: HashMap<String, MemoryTable>,
    methods: MethodLibrary,
    log: SourceLog,
}

/// Name of the generated method `numbers(n)`, which yields `N` from 0 to n - 1.
const NUMBERS: &str = "numbers";

impl MemorySchema {
    pub fn new(name: &str) -> Self {
        MemorySchema {
            name: name.to_string(),
            tables: HashMap::new(),
            methods: MethodLibrary::new(),
            log: SourceLog::default(),
        }
    }

    /// Expose `table` as method `name`. Method names are case-insensitive.
    pub fn with_table(mut self, name: &str, table: MemoryTable) -> Self {
        self.tables.insert(name.to_lowercase(), table);
        self
    }

    pub fn with_methods(mut self, methods: MethodLibrary) -> Self {
        self.methods = methods;
        self
    }

    fn numbers_count(args: &[SqlValue]) -> anyhow::Result<u64> {
        match args {
            [SqlValue::Int(n)] if *n >= 0 => Ok(*n as u64),
            [SqlValue::Long(n)] if *n >= 0 => Ok(*n as u64),
            _ => bail!("numbers expects one non-negative integer argument"),
        }
    }
}

impl Schema for MemorySchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_table_by_name(
        &self,
        name: &str,
        _ctx: &TableContext,
        args: &[SqlValue],
    ) -> anyhow::Result<Option<SchemaTable>> {
        if name.eq_ignore_ascii_case(NUMBERS) {
            Self::numbers_count(args)?;
            return Ok(Some(SchemaTable::new(vec![(
                "N",
                ValueType::new(SqlType::Long),
            )])));
        }
        if !args.is_empty() {
            bail!("{} takes no arguments", name);
        }
        Ok(self.tables.get(&name.to_lowercase()).map(|t| t.schema_table()))
    }

    fn get_row_source(
        &self,
        name: &str,
        ctx: &RuntimeContext,
        args: &[SqlValue],
    ) -> anyhow::Result<Box<dyn RowSource>> {
        self.log.lock().push(SourceCall {
            info: ctx.info.clone(),
            environment: ctx.environment.clone(),
        });
        let limit = ctx.info.hints.row_limit();
        if name.eq_ignore_ascii_case(NUMBERS) {
            let n = Self::numbers_count(args)?;
            return Ok(Box::new(NumbersSource {
                shape: Arc::new(RowShape::new(&["N"])),
                n: limit.map(|l| l.min(n)).unwrap_or(n),
            }));
        }
        let table = self
            .tables
            .get(&name.to_lowercase())
            .ok_or_else(|| anyhow!("{}.{} does not exist", self.name, name))?;
        let names: Vec<&str> = table.columns.iter().map(|(n, _)| n.as_str()).collect();
        Ok(Box::new(MemoryRowSource {
            shape: Arc::new(RowShape::new(&names)),
            rows: table.rows.clone(),
            limit: limit.map(|l| l as usize),
            fail_at: table.fail_at,
        }))
    }

    fn methods(&self) -> &MethodLibrary {
        &self.methods
    }
}

struct MemoryRowSource {
    shape: Arc<RowShape>,
    rows: Vec<Vec<SqlValue>>,
    limit: Option<usize>,
    fail_at: Option<usize>,
}

impl RowSource for MemoryRowSource {
    fn rows(self: Box<Self>) -> RowIter {
        let MemoryRowSource {
            shape,
            rows,
            limit,
            fail_at,
        } = *self;
        let limit = limit.unwrap_or(usize::MAX);
        Box::new(
            rows.into_iter()
                .enumerate()
                .take(limit)
                .map(move |(i, values)| -> anyhow::Result<Box<dyn ObjectResolver>> {
                    if fail_at == Some(i) {
                        bail!("row {} could not be read", i);
                    }
                    Ok(Box::new(ShapedRow::new(shape.clone(), values)))
                }),
        )
    }
}

struct NumbersSource {
    shape: Arc<RowShape>,
    n: u64,
}

impl RowSource for NumbersSource {
    fn rows(self: Box<Self>) -> RowIter {
        let shape = self.shape;
        Box::new((0..self.n).map(move |i| -> anyhow::Result<Box<dyn ObjectResolver>> {
            Ok(Box::new(ShapedRow::new(
                shape.clone(),
                vec![SqlValue::Long(i as i64)],
            )))
        }))
    }
}

#[derive(Default)]
pub struct MemoryProvider {
    identity: String,
    schemas: HashMap<String, Arc<MemorySchema>>,
    log: SourceLog,
}

impl MemoryProvider {
    pub fn new(identity: &str) -> Self {
        MemoryProvider {
            identity: identity.to_string(),
            ..Default::default()
        }
    }

    pub fn add_schema(&mut self, mut schema: MemorySchema) {
        schema.log = self.log.clone();
        self.schemas
            .insert(schema.name.clone(), Arc::new(schema));
    }

    /// Every row source started so far, in start order.
    pub fn source_log(&self) -> Vec<SourceCall> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }
}

impl SchemaProvider for MemoryProvider {
    fn get_schema(&self, name: &str) -> Option<Arc<dyn Schema>> {
        self.schemas
            .get(name)
            .map(|s| s.clone() as Arc<dyn Schema>)
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }
}

fn domain_methods() -> MethodLibrary {
    let mut lib = MethodLibrary::new();
    lib.add_scalar(
        "Domain",
        vec![SqlType::Text],
        ReturnType::Fixed(ValueType::new(SqlType::Text)),
        |args| {
            Ok(match &args[0] {
                SqlValue::Text(s) => match s.split_once('@') {
                    Some((_, d)) => SqlValue::from(d),
                    None => SqlValue::Null,
                },
                _ => SqlValue::Null,
            })
        },
    );
    lib
}

fn entities() -> MemoryTable {
    let int = ValueType::new(SqlType::Int);
    let text = ValueType::new(SqlType::Text);
    let row = |id: i32, name: &str, city: Option<&str>| {
        vec![
            SqlValue::Int(id),
            SqlValue::from(name),
            city.map(SqlValue::from).unwrap_or(SqlValue::Null),
        ]
    };
    MemoryTable::new(vec![("Id", int), ("Name", text), ("City", text)])
        .row(row(1, "alice.smith@x.com", Some("Paris")))
        .row(row(2, "bob.brown@y.org", Some("Berlin")))
        .row(row(3, "david.jones@x.com", Some("Paris")))
        .row(row(4, "carol.white@y.org", None))
        .row(row(5, "erin.black@x.com", Some("Oslo")))
}

fn orders() -> MemoryTable {
    let int = ValueType::new(SqlType::Int);
    let decimal = ValueType::new(SqlType::Decimal);
    let row = |id: i32, entity: i32, amount: i64| {
        vec![
            SqlValue::Int(id),
            SqlValue::Int(entity),
            SqlValue::Decimal(rust_decimal::Decimal::new(amount, 2)),
        ]
    };
    MemoryTable::new(vec![
        ("Id", int),
        ("EntityId", int),
        ("Amount", decimal),
    ])
    .row(row(10, 1, 1250))
    .row(row(11, 1, 300))
    .row(row(12, 3, 9999))
    .row(row(13, 5, 100))
    .row(row(14, 9, 500))
}

/// A provider with two schemas used by tests and the demo.
///
/// Schema `a` has `entities()` (Id, Name, City), `orders()` (Id, EntityId, Amount),
/// `broken()` which fails on its second row, and `numbers(n)`. Schema `b` has its own
/// `entities()`. Both define a scalar method `Domain(string)`.
pub fn sample_provider() -> MemoryProvider {
    let mut provider = MemoryProvider::new("memory:sample");
    provider.add_schema(
        MemorySchema::new("a")
            .with_table("entities", entities())
            .with_table("orders", orders())
            .with_table("broken", entities().failing_at(1))
            .with_methods(domain_methods()),
    );
    let int = ValueType::new(SqlType::Int);
    let text = ValueType::new(SqlType::Text);
    provider.add_schema(
        MemorySchema::new("b")
            .with_table(
                "entities",
                MemoryTable::new(vec![("Id", int), ("Name", text)])
                    .row(vec![SqlValue::Int(1), SqlValue::from("zed@b.net")])
                    .row(vec![SqlValue::Int(3), SqlValue::from("yan@b.net")]),
            )
            .with_methods(domain_methods()),
    );
    provider
}

#[cfg(test)]
fn runtime_context(info: QuerySourceInfo) -> RuntimeContext {
    RuntimeContext {
        info,
        cancellation: crate::stream::CancellationToken::new(),
        environment: HashMap::new(),
    }
}

#[cfg(test)]
fn info_for(method: &str, take: Option<u64>) -> QuerySourceInfo {
    use crate::source_info::{QueryHints, SchemaFromNode};
    let mut info = QuerySourceInfo::new(SchemaFromNode {
        schema: "a".to_string(),
        method: method.to_string(),
        args: vec![],
        alias: method.to_string(),
        ordinal: 0,
    });
    info.hints = QueryHints {
        skip: None,
        take,
        distinct: false,
    };
    info
}

#[test]
fn test_memory_source_honors_row_limit_and_logs() {
    let provider = sample_provider();
    let schema = provider.get_schema("a").unwrap();
    let ctx = runtime_context(info_for("entities", Some(2)));
    let rows: Vec<_> = schema
        .get_row_source("Entities", &ctx, &[])
        .unwrap()
        .rows()
        .collect::<anyhow::Result<_>>()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("Name"), Some(SqlValue::from("bob.brown@y.org")));
    assert_eq!(provider.source_log().len(), 1);
}

#[test]
fn test_memory_tables_and_errors() {
    let provider = sample_provider();
    let schema = provider.get_schema("a").unwrap();
    let tctx = TableContext {
        alias: "n".to_string(),
        ordinal: 0,
    };
    let t = schema
        .get_table_by_name("numbers", &tctx, &[SqlValue::Int(3)])
        .unwrap()
        .unwrap();
    assert_eq!(t.columns[0].name, "N");
    assert!(schema.get_table_by_name("numbers", &tctx, &[]).is_err());
    assert!(schema.get_table_by_name("missing", &tctx, &[]).unwrap().is_none());
    assert!(provider.get_schema("c").is_none());

    let ctx = runtime_context(info_for("broken", None));
    let results: Vec<_> = schema
        .get_row_source("broken", &ctx, &[])
        .unwrap()
        .rows()
        .collect();
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}
