//! The rewrite pipeline: AST rewrites, binding, then IR rewrites.
//!
//! Every applied pass is logged at debug level and, if a diagnostics sink was given, reported to
//! it as one line of text.

use tracing::debug;

use crate::ast;
use crate::ast_to_ir::{self, TableMemo};
use crate::ir::BoundScript;
use crate::method::MethodLibrary;
use crate::optimize_ast;
use crate::optimize_ir;
use crate::schema::SchemaProvider;

pub struct RewritePipeline<'a> {
    provider: &'a dyn SchemaProvider,
    core: &'a MethodLibrary,
    memo: &'a TableMemo,
    pushdown: bool,
    diagnostics: Option<&'a mut dyn FnMut(&str)>,
}

impl<'a> RewritePipeline<'a> {
    pub fn new(
        provider: &'a dyn SchemaProvider,
        core: &'a MethodLibrary,
        memo: &'a TableMemo,
        pushdown: bool,
    ) -> Self {
        RewritePipeline {
            provider,
            core,
            memo,
            pushdown,
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, sink: &'a mut dyn FnMut(&str)) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    fn report(&mut self, pass: &str, changed: usize) {
        if changed == 0 {
            return;
        }
        debug!(pass, changed, "rewrite applied");
        if let Some(sink) = self.diagnostics.as_mut() {
            sink(&format!("{}: {} change(s)", pass, changed));
        }
    }

    /// Rewrite `script`, bind it and rewrite the result.
    pub fn run(mut self, mut script: ast::Script) -> ast_to_ir::Result<BoundScript> {
        let schemas: Vec<_> = optimize_ast::schema_names(&script)
            .iter()
            .filter_map(|n| self.provider.get_schema(n))
            .collect();
        let core = self.core;
        let is_aggregate = |qualifier: Option<&str>, name: &str| {
            // Qualifiers are aliases, unknown before binding, so any schema in the script counts.
            (qualifier.is_none() && core.is_aggregate(name))
                || schemas.iter().any(|s| s.methods().is_aggregate(name))
        };
        let n = optimize_ast::rewrite_distinct(&mut script, &is_aggregate);
        self.report("distinct_to_group_by", n);

        let mut bound = ast_to_ir::bind(&script, self.provider, self.core, self.memo, self.pushdown)?;
        debug!(sources = bound.sources.len(), "bound script");

        let n = optimize_ir::expand_stars(&mut bound);
        self.report("expand_stars", n);
        let n = optimize_ir::finalize_pushdown(&mut bound);
        self.report("finalize_pushdown", n);
        Ok(bound)
    }
}

#[test]
fn test_pipeline_reports_applied_passes() {
    let provider = crate::memory::sample_provider();
    let core = crate::builtin::core_library();
    let memo = TableMemo::new();
    let mut lines: Vec<String> = vec![];
    let mut sink = |l: &str| lines.push(l.to_string());
    let script = crate::parser::parse_query_text(
        "SELECT DISTINCT City FROM (SELECT * FROM #a.entities() WHERE Id > 1) e",
    )
    .unwrap();
    let bound = RewritePipeline::new(&provider, &core, &memo, true)
        .with_diagnostics(&mut sink)
        .run(script)
        .unwrap();
    assert!(bound.body.as_select().unwrap().grouping.is_some());
    assert_eq!(
        lines,
        vec![
            "distinct_to_group_by: 1 change(s)",
            "expand_stars: 1 change(s)",
            "finalize_pushdown: 1 change(s)",
        ]
    );
    assert_eq!(bound.sources["entities:0"].where_node.to_string(), "Id > 1");
}

#[test]
fn test_pipeline_without_pushdown() {
    let provider = crate::memory::sample_provider();
    let core = crate::builtin::core_library();
    let memo = TableMemo::new();
    let script = crate::parser::parse_query_text("SELECT Name FROM #a.entities() WHERE Id = 1").unwrap();
    let bound = RewritePipeline::new(&provider, &core, &memo, false)
        .run(script)
        .unwrap();
    assert_eq!(bound.sources["entities:0"].where_node.to_string(), "TRUE");
    assert_eq!(memo.len(), 1);
}
