//! provides helper functions for the projection block of a query.

use crate::codegen::{self, CompiledExpr, EvalContext, EvalError};
use crate::ir::{BoundItem, ExprKind, OutputColumn};
use crate::sql_value::SqlValue;

#[derive(Clone)]
/// holds the action that produces one output column.
pub enum ProjectAction {
    Take(usize), // let Take(x); copy slot x of the input row.
    Constant(SqlValue),
    Compute(CompiledExpr),
}

impl std::fmt::Debug for ProjectAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectAction::Take(i) => write!(f, "Take({})", i),
            ProjectAction::Constant(v) => write!(f, "Constant({:?})", v),
            ProjectAction::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

/// builds the information needed to do a project at runtime. Stars must have been expanded.
pub fn build_project(
    items: &[BoundItem],
) -> Result<(Vec<ProjectAction>, Vec<OutputColumn>), codegen::Error> {
    let mut actions = vec![];
    let mut columns = vec![];
    for item in items {
        let (expr, name) = match item {
            BoundItem::Expr { expr, name } => (expr, name),
            BoundItem::Star { .. } => return Err(codegen::Error::UnexpandedStar),
        };
        actions.push(match &expr.kind {
            ExprKind::Column { slot, .. } => ProjectAction::Take(*slot),
            ExprKind::Literal(v) => ProjectAction::Constant(v.clone()),
            _ => ProjectAction::Compute(codegen::compile_expr(expr)),
        });
        columns.push(OutputColumn {
            name: name.clone(),
            ty: expr.ty,
        });
    }
    Ok((actions, columns))
}

/// does the "Project" action of the relational algebra, using a pre-built set of actions.
pub fn project_row(actions: &[ProjectAction], input: &dyn EvalContext) -> Result<Vec<SqlValue>, EvalError> {
    let mut ret = Vec::with_capacity(actions.len());
    for action in actions {
        ret.push(match action {
            ProjectAction::Take(idx) => input.slot(*idx),
            ProjectAction::Constant(v) => v.clone(),
            ProjectAction::Compute(f) => f(input)?,
        })
    }
    Ok(ret)
}

#[cfg(test)]
fn bound_items(text: &str) -> Vec<BoundItem> {
    let provider = crate::memory::sample_provider();
    let core = crate::builtin::core_library();
    let memo = crate::ast_to_ir::TableMemo::new();
    let script = crate::parser::parse_query_text(text).unwrap();
    let mut b = crate::ast_to_ir::bind(&script, &provider, &core, &memo, true).unwrap();
    crate::optimize_ir::expand_stars(&mut b);
    b.body.as_select().unwrap().items.clone()
}

#[test]
fn test_build_project_colnames_only() {
    let items = bound_items("SELECT City, Id, Name AS n, Id FROM #a.entities()");
    let (actions, columns) = build_project(&items).unwrap();
    assert_eq!(format!("{:?}", actions), "[Take(2), Take(0), Take(1), Take(0)]");
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["City", "Id", "n", "Id"]);
}

#[test]
fn test_build_project_constant_and_computed() {
    let items = bound_items("SELECT 1, 'x' AS s, Id + 1 FROM #a.entities()");
    let (actions, columns) = build_project(&items).unwrap();
    assert_eq!(
        format!("{:?}", actions),
        "[Constant(Int(1)), Constant(Text(\"x\")), Compute(..)]"
    );
    assert_eq!(columns[1].name, "s");
    assert_eq!(columns[2].ty.to_string(), "int");
}

#[test]
fn test_build_project_multiple_star() {
    let items = bound_items("SELECT *, Id, * FROM #b.entities()");
    let (actions, _) = build_project(&items).unwrap();
    assert_eq!(
        format!("{:?}", actions),
        "[Take(0), Take(1), Take(0), Take(0), Take(1)]"
    );
}

#[test]
fn test_build_project_rejects_stars() {
    let items = vec![BoundItem::Star { qualifier: None }];
    assert!(matches!(build_project(&items), Err(codegen::Error::UnexpandedStar)));
}

#[test]
fn test_project_row() {
    use ProjectAction::*;
    use SqlValue::*;
    let input = vec![Int(0), Int(10), Int(20), Int(30)];
    let double: CompiledExpr = codegen::compiled(|ctx| Ok(ctx.slot(1).add(&ctx.slot(1))?));
    let actions = vec![
        Take(2),
        Constant(Text("eight".to_string())),
        Take(2),
        Compute(double),
    ];
    let output = project_row(&actions, &codegen::RowContext(&input)).unwrap();
    assert_eq!(output, vec![Int(20), Text("eight".to_string()), Int(20), Int(20)]);
}
