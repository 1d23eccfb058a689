//! Per-source execution contract: which invocation, which columns, which filter, which hints.

use crate::ast;
use crate::sql_type::ValueType;
use crate::sql_value::SqlValue;

/// One invocation of a schema method in a script.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaFromNode {
    pub schema: String,
    pub method: String,
    pub args: Vec<SqlValue>,
    pub alias: String,
    /// Position among all schema invocations of the script, in textual order.
    pub ordinal: usize,
}

impl SchemaFromNode {
    /// Positional id: unique within a script even when alias and method repeat.
    pub fn id(&self) -> String {
        format!("{}:{}", self.alias, self.ordinal)
    }
}

impl std::fmt::Display for SchemaFromNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        write!(
            f,
            "#{}.{}({}) {}",
            self.schema,
            self.method,
            args.join(", "),
            self.id()
        )
    }
}

/// Optional work a source may do on the engine's behalf.
///
/// A source may stop after `skip + take` rows and may drop duplicate rows when `distinct` is
/// set. It must not drop leading rows: the engine applies SKIP itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryHints {
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub distinct: bool,
}

impl QueryHints {
    /// The number of rows after which a source may stop, if any.
    pub fn row_limit(&self) -> Option<u64> {
        self.take.map(|t| t + self.skip.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedColumn {
    pub name: String,
    pub ty: ValueType,
}

/// Everything the runtime hands to one source. Filtering and hints are advisory; the engine
/// re-applies WHERE, SKIP, TAKE and DISTINCT on whatever the source returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySourceInfo {
    pub from: SchemaFromNode,
    pub used_columns: Vec<UsedColumn>,
    /// Alias-free predicate over the source's own columns. `TRUE` when nothing was pushable.
    pub where_node: ast::Expr,
    /// Column types come from a `TABLE` declaration rather than from the schema.
    pub has_external_types: bool,
    pub hints: QueryHints,
}

impl QuerySourceInfo {
    pub fn new(from: SchemaFromNode) -> Self {
        QuerySourceInfo {
            from,
            used_columns: vec![],
            where_node: ast::Expr::true_literal(),
            has_external_types: false,
            hints: QueryHints::default(),
        }
    }

    pub fn uses(&self, column: &str) -> bool {
        self.used_columns.iter().any(|c| c.name == column)
    }
}

#[test]
fn test_positional_id_distinguishes_repeats() {
    let node = |ordinal| SchemaFromNode {
        schema: "a".to_string(),
        method: "entities".to_string(),
        args: vec![],
        alias: "entities".to_string(),
        ordinal,
    };
    assert_ne!(node(0).id(), node(1).id());
    assert_eq!(node(2).id(), "entities:2");
}

#[test]
fn test_new_info_has_true_fallback() {
    let info = QuerySourceInfo::new(SchemaFromNode {
        schema: "a".to_string(),
        method: "b".to_string(),
        args: vec![SqlValue::Int(1)],
        alias: "x".to_string(),
        ordinal: 0,
    });
    assert_eq!(info.where_node.to_string(), "TRUE");
    assert_eq!(QueryHints { skip: Some(2), take: Some(3), distinct: false }.row_limit(), Some(5));
}
