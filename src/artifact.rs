//! The executable form of a query.
//!
//! An `Artifact` is what `codegen::generate` produces and what the artifact cache stores: a tree
//! of plan nodes whose expressions are already compiled into closures, the output columns, and
//! one `QuerySourceInfo` per schema invocation. Artifacts are immutable and shared between
//! executions through `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast;
use crate::codegen::CompiledExpr;
use crate::ir::OutputColumn;
use crate::method::AggregateMethod;
use crate::project::ProjectAction;
use crate::source_info::QuerySourceInfo;
use crate::sql_type::SqlType;
use crate::sql_value::SqlValue;

/// One column of a schema source's row as the runtime builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: String,
    /// Unused columns are filled with `NULL` without asking the resolver.
    pub used: bool,
    /// Declared type that values must be converted to, for coupled sources.
    pub cast: Option<SqlType>,
}

/// Keys of a join on a single comparison between the two sides.
pub struct MergeKeys {
    /// Evaluated against a left row.
    pub left: CompiledExpr,
    /// Evaluated against a right row on its own, with slots starting at 0.
    pub right: CompiledExpr,
    /// Holds when `left op right`.
    pub op: ast::BinaryOp,
}

pub struct JoinPlan {
    pub left: Plan,
    pub right: Plan,
    pub kind: ast::JoinKind,
    /// Evaluated against the concatenation of a left and a right row.
    pub on: CompiledExpr,
    /// Set when the join runs as a sort-merge join.
    pub merge: Option<MergeKeys>,
    pub left_width: usize,
    pub right_width: usize,
}

pub enum Plan {
    /// A single row with no columns, for blocks without FROM.
    Empty,
    Source {
        id: String,
        schema: String,
        method: String,
        args: Vec<SqlValue>,
        ordinal: usize,
        columns: Vec<SourceColumn>,
    },
    Cte {
        name: String,
    },
    SubQuery(Box<BodyPlan>),
    Join(Box<JoinPlan>),
}

pub struct AggregatePlan {
    pub method: Arc<AggregateMethod>,
    pub args: Vec<CompiledExpr>,
    pub level: usize,
}

pub struct GroupPlan {
    pub keys: Vec<CompiledExpr>,
    pub aggregates: Vec<AggregatePlan>,
}

pub struct OrderKey {
    pub expr: CompiledExpr,
    pub descending: bool,
}

pub struct SelectPlan {
    pub input: Plan,
    pub filter: Option<CompiledExpr>,
    pub grouping: Option<GroupPlan>,
    pub having: Option<CompiledExpr>,
    pub project: Vec<ProjectAction>,
    pub order_by: Vec<OrderKey>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub distinct: bool,
    pub columns: Vec<OutputColumn>,
}

impl SelectPlan {
    /// Whether rows can be produced one at a time, so that TAKE can stop the sources early.
    pub fn is_streaming(&self) -> bool {
        self.grouping.is_none() && self.order_by.is_empty()
    }
}

pub enum BodyPlan {
    Select(Box<SelectPlan>),
    SetOperation {
        left: Box<BodyPlan>,
        op: ast::SetOperator,
        right: Box<BodyPlan>,
        columns: Vec<OutputColumn>,
    },
}

impl BodyPlan {
    pub fn columns(&self) -> &[OutputColumn] {
        match self {
            BodyPlan::Select(s) => &s.columns,
            BodyPlan::SetOperation { columns, .. } => columns,
        }
    }
}

pub struct CtePlan {
    pub name: String,
    pub body: BodyPlan,
}

pub struct Artifact {
    /// Cache key: query text plus provider identity.
    pub signature: String,
    /// Canonical text of the compiled query.
    pub text: String,
    pub ctes: Vec<CtePlan>,
    pub body: BodyPlan,
    pub sources: IndexMap<String, QuerySourceInfo>,
    pub(crate) explain: String,
}

impl Artifact {
    pub fn columns(&self) -> &[OutputColumn] {
        self.body.columns()
    }

    /// Human readable rendering of the plan, one node per line.
    pub fn explain(&self) -> &str {
        &self.explain
    }

    /// Write `<signature>.plan` into `dir`, containing the canonical query and the plan.
    pub fn store_to_disk(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.plan", self.signature));
        let mut contents = String::new();
        contents.push_str(&self.text);
        contents.push_str("\n\n");
        contents.push_str(&self.explain);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("signature", &self.signature)
            .field("text", &self.text)
            .field("columns", &self.columns())
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}
