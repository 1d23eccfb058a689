//! Executes an `Artifact` against a schema provider and materializes the result.
//!
//! Every schema source runs on its own producer thread (see `stream`), converting resolver rows
//! into slot vectors laid out as the plan expects. A select block pulls rows from its input,
//! filters them, then either projects them directly or feeds them to a `GroupArena`. When a block
//! neither groups nor sorts, it stops pulling as soon as `SKIP + TAKE` rows are out, which drops
//! the source streams and ends their producers early.
//!
//! CTEs are run once, in declaration order, before the main body.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::{Artifact, BodyPlan, Plan, SelectPlan, SourceColumn};
use crate::ast::SetOperator;
use crate::codegen::{EvalContext, EvalError, RowContext};
use crate::config::EngineConfig;
use crate::group::GroupArena;
use crate::ir::OutputColumn;
use crate::join;
use crate::project;
use crate::schema::{ObjectResolver, RuntimeContext, SchemaProvider};
use crate::sql_type::SqlType;
use crate::sql_value::SqlValue;
use crate::stream::{self, CancellationToken, ChunkedRows};
use crate::table::{self, Table};

pub type Row = Vec<SqlValue>;

pub type RowStream<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema {0} is not available from the provider.")]
    UnknownSchema(String),
    #[error("Row source {source_name} could not be started: {message}")]
    SourceStart {
        source_name: String,
        message: String,
    },
    #[error(transparent)]
    Stream(#[from] stream::Error),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("Aggregation failed: {message}")]
    Aggregate { message: String },
    #[error(transparent)]
    Table(#[from] table::Error),
    #[error("Common table expression {0} was not materialized.")]
    MissingCte(String),
    #[error("Execution was cancelled.")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-execution inputs that are not part of the compiled artifact.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Variables handed to the row source with the given ordinal.
    pub environment_variables: HashMap<usize, HashMap<String, String>>,
    pub cancellation: CancellationToken,
}

struct Executor<'a> {
    artifact: &'a Artifact,
    provider: &'a dyn SchemaProvider,
    config: &'a EngineConfig,
    options: &'a ExecutionOptions,
    ctes: HashMap<String, Vec<Row>>,
}

/// Build a slot vector from one resolver row.
fn convert_row(columns: &[SourceColumn], row: &dyn ObjectResolver) -> anyhow::Result<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for c in columns {
        if !c.used {
            values.push(SqlValue::Null);
            continue;
        }
        let v = row.get(&c.name).unwrap_or(SqlValue::Null);
        values.push(match c.cast {
            Some(t) if v.sql_type() != t && v != SqlValue::Null => v.cast(t)?,
            _ => v,
        });
    }
    Ok(values)
}

/// Bring values to their column's type. Branches of a set operation can differ by numeric
/// promotion.
fn conform(rows: Vec<Row>, columns: &[OutputColumn]) -> Result<Vec<Row>> {
    let mut out = Vec::with_capacity(rows.len());
    for mut row in rows {
        for (v, c) in row.iter_mut().zip(columns) {
            let t = c.ty.sql_type;
            if matches!(t, SqlType::Any | SqlType::Null | SqlType::Void) || v.sql_type() == t {
                continue;
            }
            if *v != SqlValue::Null {
                *v = v.cast(t).map_err(EvalError::from)?;
            }
        }
        out.push(row);
    }
    Ok(out)
}

/// Keep the first occurrence of each row.
fn distinct(rows: impl Iterator<Item = Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.filter(|r| seen.insert(r.clone())).collect()
}

/// Rows of a select block before sorting and limits, with their order keys.
struct Collected {
    rows: Vec<(Row, Vec<SqlValue>)>,
    seen: Option<HashSet<Row>>,
}

impl Collected {
    fn new(distinct: bool) -> Self {
        Collected {
            rows: vec![],
            seen: distinct.then(HashSet::new),
        }
    }

    fn push(&mut self, s: &SelectPlan, ctx: &dyn EvalContext) -> Result<()> {
        let row = project::project_row(&s.project, ctx)?;
        if let Some(seen) = &mut self.seen {
            if !seen.insert(row.clone()) {
                return Ok(());
            }
        }
        let mut keys = Vec::with_capacity(s.order_by.len());
        for o in &s.order_by {
            keys.push((o.expr)(ctx)?);
        }
        self.rows.push((row, keys));
        Ok(())
    }
}

impl<'a> Executor<'a> {
    fn check_cancelled(&self) -> Result<()> {
        match self.options.cancellation.is_cancelled() {
            true => Err(Error::Cancelled),
            false => Ok(()),
        }
    }

    fn source_stream(
        &self,
        id: &str,
        schema: &str,
        method: &str,
        args: &[SqlValue],
        ordinal: usize,
        columns: &[SourceColumn],
    ) -> Result<RowStream<'static>> {
        let s = self
            .provider
            .get_schema(schema)
            .ok_or_else(|| Error::UnknownSchema(schema.to_string()))?;
        let info = self
            .artifact
            .sources
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SourceStart {
                source_name: id.to_string(),
                message: "no source information".to_string(),
            })?;
        let name = info.from.to_string();
        let environment = self
            .options
            .environment_variables
            .get(&ordinal)
            .cloned()
            .unwrap_or_default();
        let ctx = RuntimeContext {
            info,
            cancellation: self.options.cancellation.clone(),
            environment,
        };
        let source = s
            .get_row_source(method, &ctx, args)
            .map_err(|e| Error::SourceStart {
                source_name: name.clone(),
                message: format!("{:#}", e),
            })?;
        debug!(source = %name, "started row source");
        let columns = columns.to_vec();
        let rows = source
            .rows()
            .map(move |r| r.and_then(|r| convert_row(&columns, r.as_ref())));
        let chunks = ChunkedRows::spawn(
            &name,
            rows,
            self.config.chunk_size,
            self.config.channel_capacity,
            self.options.cancellation.clone(),
        );
        let token = self.options.cancellation.clone();
        let cancelled =
            std::iter::once_with(move || token.is_cancelled().then_some(Err(Error::Cancelled)));
        Ok(Box::new(
            chunks
                .map(|r| r.map_err(Error::from))
                .chain(cancelled.flatten()),
        ))
    }

    fn plan_rows<'s>(&'s self, plan: &'s Plan) -> Result<RowStream<'s>> {
        Ok(match plan {
            Plan::Empty => Box::new(std::iter::once(Ok(vec![]))),
            Plan::Source {
                id,
                schema,
                method,
                args,
                ordinal,
                columns,
            } => self.source_stream(id, schema, method, args, *ordinal, columns)?,
            Plan::Cte { name } => {
                let rows = self
                    .ctes
                    .get(name)
                    .ok_or_else(|| Error::MissingCte(name.clone()))?;
                Box::new(rows.iter().cloned().map(Ok))
            }
            Plan::SubQuery(body) => Box::new(self.body(body)?.into_iter().map(Ok)),
            Plan::Join(j) => {
                let left = self.plan_rows(&j.left)?;
                let right = self.plan_rows(&j.right)?;
                join::join(j, left, right)
            }
        })
    }

    fn select(&self, s: &SelectPlan) -> Result<Vec<Row>> {
        let input = self.plan_rows(&s.input)?;
        let mut collected = Collected::new(s.distinct);
        let limit = match s.is_streaming() {
            true => s.take.map(|t| (t + s.skip.unwrap_or(0)) as usize),
            false => None,
        };
        let mut arena = s.grouping.as_ref().map(|g| {
            GroupArena::new(
                g.keys.len(),
                g.aggregates
                    .iter()
                    .map(|a| (a.method.clone(), a.level))
                    .collect(),
            )
        });
        for row in input {
            self.check_cancelled()?;
            let row = row?;
            let ctx = RowContext(&row);
            if let Some(f) = &s.filter {
                if !f(&ctx)?.is_true() {
                    continue;
                }
            }
            match (&s.grouping, &mut arena) {
                (Some(g), Some(arena)) => {
                    let mut key = Vec::with_capacity(g.keys.len());
                    for k in &g.keys {
                        key.push(k(&ctx)?);
                    }
                    let mut args = Vec::with_capacity(g.aggregates.len());
                    for a in &g.aggregates {
                        let mut values = Vec::with_capacity(a.args.len());
                        for e in &a.args {
                            values.push(e(&ctx)?);
                        }
                        args.push(values);
                    }
                    arena.add_row(key, &args).map_err(|e| Error::Aggregate {
                        message: format!("{:#}", e),
                    })?;
                }
                _ => {
                    collected.push(s, &ctx)?;
                    if limit.is_some_and(|l| collected.rows.len() >= l) {
                        break;
                    }
                }
            }
        }
        if let Some(arena) = &arena {
            debug!(groups = arena.len(), "grouped rows");
            for g in arena.output() {
                if let Some(h) = &s.having {
                    if !h(&g)?.is_true() {
                        continue;
                    }
                }
                collected.push(s, &g)?;
            }
        }
        let mut rows = collected.rows;
        if !s.order_by.is_empty() {
            rows.sort_by(|(_, a), (_, b)| {
                for ((x, y), o) in a.iter().zip(b.iter()).zip(s.order_by.iter()) {
                    let ord = x.sort_cmp(y);
                    let ord = if o.descending { ord.reverse() } else { ord };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
        let skip = s.skip.unwrap_or(0) as usize;
        let take = s.take.map(|t| t as usize).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(skip).take(take).map(|(r, _)| r).collect())
    }

    fn body(&self, body: &BodyPlan) -> Result<Vec<Row>> {
        match body {
            BodyPlan::Select(s) => self.select(s),
            BodyPlan::SetOperation {
                left,
                op,
                right,
                columns,
            } => {
                let left = conform(self.body(left)?, columns)?;
                let right = conform(self.body(right)?, columns)?;
                Ok(match op {
                    SetOperator::UnionAll => left.into_iter().chain(right).collect(),
                    SetOperator::Union => distinct(left.into_iter().chain(right)),
                    SetOperator::Except => {
                        let right: HashSet<Row> = right.into_iter().collect();
                        distinct(left.into_iter().filter(|r| !right.contains(r)))
                    }
                    SetOperator::Intersect => {
                        let right: HashSet<Row> = right.into_iter().collect();
                        distinct(left.into_iter().filter(|r| right.contains(r)))
                    }
                })
            }
        }
    }
}

/// Run `artifact` against `provider` and return the result table.
pub fn execute(
    artifact: &Artifact,
    provider: &dyn SchemaProvider,
    config: &EngineConfig,
    options: &ExecutionOptions,
) -> Result<Table> {
    let mut exec = Executor {
        artifact,
        provider,
        config,
        options,
        ctes: HashMap::new(),
    };
    for cte in &artifact.ctes {
        exec.check_cancelled()?;
        let rows = exec.body(&cte.body)?;
        debug!(cte = %cte.name, rows = rows.len(), "materialized common table expression");
        exec.ctes.insert(cte.name.clone(), rows);
    }
    let rows = exec.body(&artifact.body)?;
    exec.check_cancelled()?;
    let columns = artifact.columns().to_vec();
    let rows = conform(rows, &columns)?;
    let mut table = Table::new("result", columns);
    for row in rows {
        table.append_row(row)?;
    }
    let n = table.flush();
    info!(signature = %artifact.signature, rows = n, "query executed");
    Ok(table)
}

#[cfg(test)]
fn run_with(text: &str, config: &EngineConfig, options: &ExecutionOptions) -> Result<Table> {
    let provider = crate::memory::sample_provider();
    let core = crate::builtin::core_library();
    let memo = crate::ast_to_ir::TableMemo::new();
    let script = crate::parser::parse_query_text(text).unwrap();
    let bound = crate::rewrite::RewritePipeline::new(&provider, &core, &memo, config.pushdown)
        .run(script)
        .unwrap();
    let artifact = crate::codegen::generate(&bound, "test", config, &CancellationToken::new()).unwrap();
    execute(&artifact, &provider, config, options)
}

#[cfg(test)]
fn run(text: &str) -> Vec<Row> {
    run_with(text, &EngineConfig::default(), &ExecutionOptions::default())
        .unwrap()
        .rows()
        .to_vec()
}

#[test]
fn test_select_filter_order_limit() {
    use SqlValue::*;
    let cases = vec![
        (
            "SELECT Id FROM #a.entities() WHERE Id > 2",
            vec![vec![Int(3)], vec![Int(4)], vec![Int(5)]],
        ),
        (
            "SELECT Id FROM #a.entities() ORDER BY Id DESC TAKE 2",
            vec![vec![Int(5)], vec![Int(4)]],
        ),
        (
            "SELECT Id FROM #a.entities() SKIP 1 TAKE 2",
            vec![vec![Int(2)], vec![Int(3)]],
        ),
        (
            "SELECT City FROM #a.entities() ORDER BY City",
            vec![
                vec![Null],
                vec![Text("Berlin".into())],
                vec![Text("Oslo".into())],
                vec![Text("Paris".into())],
                vec![Text("Paris".into())],
            ],
        ),
        ("SELECT 1 + 2", vec![vec![Int(3)]]),
    ];
    for (text, expected) in cases {
        println!("Running case: {}", text);
        assert_eq!(run(text), expected);
    }
}

#[test]
fn test_grouping_and_having() {
    use SqlValue::*;
    let rows = run("SELECT City, Count() FROM #a.entities() GROUP BY City HAVING Count() > 1");
    assert_eq!(rows, vec![vec![Text("Paris".into()), Int(2)]]);
    let rows = run("SELECT Count() FROM #a.entities() WHERE Id > 100");
    assert_eq!(rows, vec![vec![Int(0)]]);
}

#[test]
fn test_set_operations() {
    use SqlValue::*;
    let cases = vec![
        (
            "SELECT Id FROM #a.entities() WHERE Id < 3 UNION ALL SELECT Id FROM #b.entities()",
            vec![Int(1), Int(2), Int(1), Int(3)],
        ),
        (
            "SELECT Id FROM #a.entities() WHERE Id < 3 UNION SELECT Id FROM #b.entities()",
            vec![Int(1), Int(2), Int(3)],
        ),
        (
            "SELECT Id FROM #a.entities() EXCEPT SELECT Id FROM #b.entities()",
            vec![Int(2), Int(4), Int(5)],
        ),
        (
            "SELECT Id FROM #a.entities() INTERSECT SELECT Id FROM #b.entities()",
            vec![Int(1), Int(3)],
        ),
    ];
    for (text, expected) in cases {
        println!("Running case: {}", text);
        let ids: Vec<SqlValue> = run(text).into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, expected);
    }
}

#[test]
fn test_broken_source_fails_the_query() {
    let err = run_with(
        "SELECT Id FROM #a.broken()",
        &EngineConfig::default(),
        &ExecutionOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Stream(_)), "{:?}", err);
    assert!(err.to_string().contains("could not be read"));
}

#[test]
fn test_cancelled_execution() {
    let options = ExecutionOptions::default();
    options.cancellation.cancel();
    let err = run_with("SELECT Id FROM #a.entities()", &EngineConfig::default(), &options).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[test]
fn test_streaming_take_with_filter() {
    let config = EngineConfig {
        chunk_size: 2,
        ..Default::default()
    };
    let table = run_with(
        "SELECT N FROM #a.numbers(1000) WHERE N > 10 TAKE 3",
        &config,
        &ExecutionOptions::default(),
    )
    .unwrap();
    let values: Vec<SqlValue> = table.rows().iter().map(|r| r[0].clone()).collect();
    assert_eq!(values, vec![SqlValue::Long(11), SqlValue::Long(12), SqlValue::Long(13)]);
}
