//! `ast_to_ir` binds a parsed script against a schema provider and produces the typed IR.
//!
//! Binding proceeds block by block. For each SELECT, the FROM clause is bound first, depth
//! first, so that by the time expressions are bound every alias of the block is known and placed
//! in the block's combined row. Then WHERE, GROUP BY, the select items, HAVING and ORDER BY are
//! bound in that order.
//!
//! Along the way the binder records, for every schema invocation, which of its columns are used
//! and which WHERE conjuncts only involve that invocation. Those fragments can be handed to the
//! source so that it can filter early; the engine still applies the whole WHERE clause.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use thiserror::Error;

use crate::ast;
use crate::cache::MemoCache;
use crate::coercion;
use crate::ir::{
    AggregateCall, BoundBody, BoundCte, BoundFrom, BoundItem, BoundOrder, BoundScript,
    BoundSelect, BoundSource, ExprKind, Grouping, OutputColumn, SourceKind, TypedExpr,
};
use crate::method::{MethodLibrary, Resolution, ResolvedMethod};
use crate::schema::{Schema, SchemaProvider, SchemaTable, TableContext};
use crate::source_info::{QuerySourceInfo, SchemaFromNode, UsedColumn};
use crate::sql_type::{SqlType, ValueType};
use crate::sql_value::SqlValue;
use crate::symbol::{self, ScopeArena, ScopeRef, SymbolColumn, TableSymbol};
use crate::token::{NumberKind, NumericSuffix};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown schema {0}.")]
    UnknownSchema(String),
    #[error("Unknown table {0}.")]
    UnknownTable(String),
    #[error("Unknown alias {0}.")]
    UnknownAlias(String),
    #[error("Unknown column {0}.")]
    UnknownColumn(String),
    #[error("Column {column} is ambiguous: it exists in both {first} and {second}.")]
    AmbiguousColumn {
        column: String,
        first: String,
        second: String,
    },
    #[error("Alias {0} is already used.")]
    AliasAlreadyUsed(String),
    #[error("Method {method} exists in schemas {}; qualify it with an alias.", .schemas.join(", "))]
    AliasRequired {
        method: String,
        schemas: Vec<String>,
    },
    #[error("No method {name}({args}).")]
    UnresolvedMethod { name: String, args: String },
    #[error("Method {name} cannot be called with a NULL argument here.")]
    UnresolvedMethodNullArgument { name: String },
    #[error("Type mismatch in {expr}: {detail}.")]
    TypeMismatch { expr: String, detail: String },
    #[error("Column {0} must appear in GROUP BY or be used in an aggregate.")]
    ColumnNotGrouped(String),
    #[error("Aggregate {0} is not allowed here.")]
    AggregateNotAllowed(String),
    #[error("Aggregate {call} refers to group level {level}, but there are only {keys} grouping keys.")]
    InvalidAggregateLevel {
        call: String,
        level: usize,
        keys: usize,
    },
    #[error("Set operator operands have {left} and {right} columns.")]
    SetOperatorColumnCount { left: usize, right: usize },
    #[error("Set operator column {column} has type {left} on the left and {right} on the right.")]
    SetOperatorColumnType {
        column: String,
        left: ValueType,
        right: ValueType,
    },
    #[error("Unknown table declaration {0}.")]
    UnknownTableDeclaration(String),
    #[error("{0} is declared more than once.")]
    DuplicateDeclaration(String),
    #[error("Column {column} has unknown type {type_name}.")]
    InvalidType { column: String, type_name: String },
    #[error("Invalid literal {0}.")]
    InvalidLiteral(String),
    #[error("Argument {arg} of {source_name} is not a constant.")]
    NonConstantArgument { source_name: String, arg: String },
    #[error("Schema failed to describe {source_name}: {message}")]
    SchemaFailure {
        source_name: String,
        message: String,
    },
}

impl From<symbol::Error> for Error {
    fn from(e: symbol::Error) -> Self {
        match e {
            symbol::Error::AmbiguousColumn {
                column,
                first,
                second,
            } => Error::AmbiguousColumn {
                column,
                first,
                second,
            },
            symbol::Error::AliasAlreadyUsed(a) => Error::AliasAlreadyUsed(a),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Table metadata fetched from schemas, keyed by schema, method and arguments.
pub type TableMemo = MemoCache<String, Option<SchemaTable>>;

/// Bind `script` against `provider`.
pub fn bind(
    script: &ast::Script,
    provider: &dyn SchemaProvider,
    core: &MethodLibrary,
    memo: &TableMemo,
    pushdown: bool,
) -> Result<BoundScript> {
    Binder::new(provider, core, memo, pushdown).bind(script)
}

/// A schema invocation bound in a block, by alias.
struct SourceBinding {
    id: String,
    columns: Vec<SymbolColumn>,
}

/// What expression binding needs to know about the block being bound.
struct SelectContext {
    scope: ScopeRef,
    symbol: TableSymbol,
    sources: HashMap<String, SourceBinding>,
    schemas: IndexMap<String, Arc<dyn Schema>>,
    /// Aliases on the optional side of an outer join.
    nullable: HashSet<String>,
    /// Set when the block is grouped; aggregates found in items are collected here.
    grouping: Option<Grouping>,
}

impl SelectContext {
    fn new(scope: ScopeRef) -> Self {
        SelectContext {
            scope,
            symbol: TableSymbol::default(),
            sources: HashMap::new(),
            schemas: IndexMap::new(),
            nullable: HashSet::new(),
            grouping: None,
        }
    }
}

pub struct Binder<'a> {
    provider: &'a dyn SchemaProvider,
    core: &'a MethodLibrary,
    memo: &'a TableMemo,
    pushdown: bool,
    scopes: ScopeArena,
    sources: IndexMap<String, QuerySourceInfo>,
    declared: HashMap<String, Vec<SymbolColumn>>,
    couples: HashMap<String, ast::CoupleDeclaration>,
    ctes: HashMap<String, Vec<OutputColumn>>,
}

impl<'a> Binder<'a> {
    pub fn new(
        provider: &'a dyn SchemaProvider,
        core: &'a MethodLibrary,
        memo: &'a TableMemo,
        pushdown: bool,
    ) -> Self {
        Binder {
            provider,
            core,
            memo,
            pushdown,
            scopes: ScopeArena::new(),
            sources: IndexMap::new(),
            declared: HashMap::new(),
            couples: HashMap::new(),
            ctes: HashMap::new(),
        }
    }

    pub fn bind(mut self, script: &ast::Script) -> Result<BoundScript> {
        for d in &script.declarations {
            self.declare(d)?;
        }
        let root = self.scopes.push(None, "script");
        let mut ctes = vec![];
        for cte in &script.query.ctes {
            if self.ctes.contains_key(&cte.name) {
                return Err(Error::DuplicateDeclaration(cte.name.clone()));
            }
            let scope = self.scopes.push(Some(root), &format!("cte {}", cte.name));
            let body = self.bind_body(&cte.body, scope)?;
            self.ctes.insert(cte.name.clone(), body.columns());
            ctes.push(BoundCte {
                name: cte.name.clone(),
                body,
            });
        }
        let body = self.bind_body(&script.query.body, root)?;
        Ok(BoundScript {
            text: script.to_string(),
            ctes,
            body,
            sources: self.sources,
            scopes: self.scopes,
        })
    }

    fn declare(&mut self, d: &ast::Declaration) -> Result<()> {
        match d {
            ast::Declaration::Table(t) => {
                if self.declared.contains_key(&t.name) {
                    return Err(Error::DuplicateDeclaration(t.name.clone()));
                }
                let mut columns = vec![];
                for c in &t.columns {
                    let ty = ValueType::from_str(&c.type_name).map_err(|_| Error::InvalidType {
                        column: c.name.clone(),
                        type_name: c.type_name.clone(),
                    })?;
                    columns.push(SymbolColumn {
                        name: c.name.clone(),
                        ty,
                    });
                }
                self.declared.insert(t.name.clone(), columns);
            }
            ast::Declaration::Couple(c) => {
                if !self.declared.contains_key(&c.table) {
                    return Err(Error::UnknownTableDeclaration(c.table.clone()));
                }
                if self.provider.get_schema(&c.schema).is_none() {
                    return Err(Error::UnknownSchema(c.schema.clone()));
                }
                let key = c.alias.to_lowercase();
                if self.couples.contains_key(&key) {
                    return Err(Error::DuplicateDeclaration(c.alias.clone()));
                }
                self.couples.insert(key, c.clone());
            }
        }
        Ok(())
    }

    fn bind_body(&mut self, body: &ast::QueryBody, parent: ScopeRef) -> Result<BoundBody> {
        match body {
            ast::QueryBody::Select(s) => Ok(BoundBody::Select(Box::new(
                self.bind_select(s, parent)?,
            ))),
            ast::QueryBody::SetOperation { left, op, right } => {
                let left = self.bind_body(left, parent)?;
                let right = self.bind_body(right, parent)?;
                let columns = set_operation_columns(&left.columns(), &right.columns())?;
                Ok(BoundBody::SetOperation {
                    left: Box::new(left),
                    op: *op,
                    right: Box::new(right),
                    columns,
                })
            }
        }
    }

    fn bind_select(&mut self, select: &ast::Select, parent: ScopeRef) -> Result<BoundSelect> {
        let scope = self.scopes.push(Some(parent), "select");
        let mut ctx = SelectContext::new(scope);
        let from = match &select.from {
            Some(f) => Some(self.bind_from(f, &mut ctx)?),
            None => None,
        };

        let filter = match &select.where_clause {
            Some(w) => Some(self.bind_predicate(w, &mut ctx, "WHERE")?),
            None => None,
        };
        let pushdown = match (&filter, self.pushdown) {
            (Some(f), true) => source_local_conjuncts(&ctx, f),
            _ => IndexMap::new(),
        };

        let grouped = !select.group_by.is_empty()
            || select.having.is_some()
            || select.items.iter().any(|i| match i {
                ast::SelectItem::Expr { expr, .. } => self.has_aggregate(&ctx, expr),
                _ => false,
            })
            || select
                .order_by
                .iter()
                .any(|o| self.has_aggregate(&ctx, &o.expr));
        if grouped {
            let mut keys = vec![];
            for g in &select.group_by {
                keys.push(self.bind_expr(g, &mut ctx, false)?);
            }
            ctx.grouping = Some(Grouping {
                keys,
                aggregates: vec![],
            });
        }

        let mut items = vec![];
        for item in &select.items {
            match item {
                ast::SelectItem::Star => {
                    if grouped {
                        return Err(Error::ColumnNotGrouped("*".to_string()));
                    }
                    let aliases: Vec<String> =
                        ctx.symbol.tables().iter().map(|t| t.alias.clone()).collect();
                    for alias in aliases {
                        self.mark_all_used(&ctx, &alias);
                    }
                    items.push(BoundItem::Star { qualifier: None });
                }
                ast::SelectItem::QualifiedStar(q) => {
                    if ctx.symbol.table(q).is_none() {
                        return Err(Error::UnknownAlias(q.clone()));
                    }
                    if grouped {
                        return Err(Error::ColumnNotGrouped(format!("{}.*", q)));
                    }
                    self.mark_all_used(&ctx, q);
                    items.push(BoundItem::Star {
                        qualifier: Some(q.clone()),
                    });
                }
                ast::SelectItem::Expr { expr, alias } => {
                    let bound = self.bind_grouped(expr, &mut ctx)?;
                    let name = alias.clone().unwrap_or_else(|| default_name(expr));
                    items.push(BoundItem::Expr { expr: bound, name });
                }
            }
        }

        let having = match &select.having {
            Some(h) => {
                let e = self.bind_grouped(h, &mut ctx)?;
                check_predicate(h, &e, "HAVING")?;
                Some(e)
            }
            None => None,
        };

        let mut order_by = vec![];
        for o in &select.order_by {
            let expr = match self.bind_grouped(&o.expr, &mut ctx) {
                Ok(e) => e,
                // An unknown bare name may refer to a select item by its alias.
                Err(err @ Error::UnknownColumn(_)) => match item_by_name(&items, &o.expr) {
                    Some(e) => e,
                    None => return Err(err),
                },
                Err(err) => return Err(err),
            };
            order_by.push(BoundOrder {
                expr,
                descending: o.descending,
            });
        }

        Ok(BoundSelect {
            scope,
            from,
            symbol: ctx.symbol,
            filter,
            pushdown,
            grouping: ctx.grouping,
            having,
            items,
            order_by,
            skip: select.skip,
            take: select.take,
            distinct: select.distinct,
        })
    }

    fn bind_from(&mut self, from: &ast::FromClause, ctx: &mut SelectContext) -> Result<BoundFrom> {
        let first = self.bind_factor(&from.first, ctx)?;
        ctx.symbol = TableSymbol::new(&first.alias, first.columns.clone());
        let mut node = BoundFrom::Source(first);
        for join in &from.joins {
            let right = self.bind_factor(&join.factor, ctx)?;
            let mut left_symbol = ctx.symbol.clone();
            let mut right_symbol = TableSymbol::new(&right.alias, right.columns.clone());
            match join.kind {
                ast::JoinKind::Inner => {}
                ast::JoinKind::LeftOuter => {
                    right_symbol = right_symbol.make_nullable_if_possible();
                    ctx.nullable.insert(right.alias.clone());
                }
                ast::JoinKind::RightOuter => {
                    left_symbol = left_symbol.make_nullable_if_possible();
                    ctx.nullable
                        .extend(left_symbol.tables().iter().map(|t| t.alias.clone()));
                }
            }
            ctx.symbol = left_symbol.merge(&right_symbol);
            for t in ctx.symbol.tables() {
                self.scopes
                    .replace_symbol(ctx.scope, &t.alias, ctx.symbol.clone());
            }
            let on = self.bind_predicate(&join.on, ctx, "ON")?;
            node = BoundFrom::Join {
                left: Box::new(node),
                right: Box::new(BoundFrom::Source(right)),
                kind: join.kind,
                on,
            };
        }
        Ok(node)
    }

    fn bind_factor(&mut self, factor: &ast::FromFactor, ctx: &mut SelectContext) -> Result<BoundSource> {
        let alias = factor.alias().to_string();
        let (kind, columns) = match factor {
            ast::FromFactor::Schema {
                schema,
                method,
                args,
                ordinal,
                ..
            } => {
                let source_name = format!("#{}.{}", schema, method);
                let s = self
                    .provider
                    .get_schema(schema)
                    .ok_or_else(|| Error::UnknownSchema(schema.clone()))?;
                let args = self.constant_args(args, ctx.scope, &source_name)?;
                let table = self
                    .table_of(&s, method, &alias, *ordinal, &args)?
                    .ok_or_else(|| Error::UnknownTable(source_name))?;
                let columns: Vec<SymbolColumn> = table
                    .columns
                    .iter()
                    .map(|c| SymbolColumn {
                        name: c.name.clone(),
                        ty: c.ty,
                    })
                    .collect();
                let node = SchemaFromNode {
                    schema: schema.clone(),
                    method: method.clone(),
                    args,
                    alias: alias.clone(),
                    ordinal: *ordinal,
                };
                let id = self.register_source(ctx, s, node, &columns, false);
                (SourceKind::Schema { id }, columns)
            }
            ast::FromFactor::Coupled {
                name,
                args,
                ordinal,
                ..
            } => {
                let decl = self
                    .couples
                    .get(&name.to_lowercase())
                    .cloned()
                    .ok_or_else(|| Error::UnknownTable(name.clone()))?;
                let source_name = format!("#{}.{}", decl.schema, decl.method);
                let s = self
                    .provider
                    .get_schema(&decl.schema)
                    .ok_or_else(|| Error::UnknownSchema(decl.schema.clone()))?;
                let declared = self
                    .declared
                    .get(&decl.table)
                    .cloned()
                    .ok_or_else(|| Error::UnknownTableDeclaration(decl.table.clone()))?;
                let args = self.constant_args(args, ctx.scope, &source_name)?;
                let mut symbol = TableSymbol::new(&alias, declared);
                // Declared columns the schema does not know about cannot be read.
                if let Some(table) = self.table_of(&s, &decl.method, &alias, *ordinal, &args)? {
                    let known: Vec<String> = symbol.tables()[0]
                        .columns
                        .iter()
                        .filter(|c| table.column(&c.name).is_some())
                        .map(|c| c.name.clone())
                        .collect();
                    let known: Vec<&str> = known.iter().map(|s| s.as_str()).collect();
                    symbol = symbol.limit_columns(&known);
                }
                let columns = symbol.tables()[0].columns.clone();
                let node = SchemaFromNode {
                    schema: decl.schema.clone(),
                    method: decl.method.clone(),
                    args,
                    alias: alias.clone(),
                    ordinal: *ordinal,
                };
                let id = self.register_source(ctx, s, node, &columns, true);
                (SourceKind::Schema { id }, columns)
            }
            ast::FromFactor::Cte { name, .. } => {
                let columns = self
                    .ctes
                    .get(name)
                    .ok_or_else(|| Error::UnknownTable(name.clone()))?
                    .iter()
                    .map(|c| SymbolColumn {
                        name: c.name.clone(),
                        ty: c.ty,
                    })
                    .collect();
                (SourceKind::Cte { name: name.clone() }, columns)
            }
            ast::FromFactor::SubQuery { body, .. } => {
                let body = self.bind_body(body, ctx.scope)?;
                let columns = body
                    .columns()
                    .into_iter()
                    .map(|c| SymbolColumn {
                        name: c.name,
                        ty: c.ty,
                    })
                    .collect();
                (SourceKind::SubQuery(Box::new(body)), columns)
            }
        };
        self.scopes
            .add_symbol(ctx.scope, &alias, TableSymbol::new(&alias, columns.clone()))?;
        Ok(BoundSource {
            alias,
            kind,
            columns,
        })
    }

    fn register_source(
        &mut self,
        ctx: &mut SelectContext,
        schema: Arc<dyn Schema>,
        node: SchemaFromNode,
        columns: &[SymbolColumn],
        external_types: bool,
    ) -> String {
        let id = node.id();
        let alias = node.alias.clone();
        let mut info = QuerySourceInfo::new(node);
        info.has_external_types = external_types;
        self.sources.insert(id.clone(), info);
        ctx.schemas.insert(alias.clone(), schema);
        ctx.sources.insert(
            alias,
            SourceBinding {
                id: id.clone(),
                columns: columns.to_vec(),
            },
        );
        id
    }

    fn table_of(
        &self,
        schema: &Arc<dyn Schema>,
        method: &str,
        alias: &str,
        ordinal: usize,
        args: &[SqlValue],
    ) -> Result<Option<SchemaTable>> {
        let key = format!("{}\u{0}{}\u{0}{:?}", schema.name(), method.to_lowercase(), args);
        let ctx = TableContext {
            alias: alias.to_string(),
            ordinal,
        };
        self.memo
            .get_or_insert(key, || schema.get_table_by_name(method, &ctx, args))
            .map_err(|e| Error::SchemaFailure {
                source_name: format!("#{}.{}", schema.name(), method),
                message: format!("{:#}", e),
            })
    }

    /// Evaluate source arguments. They may not refer to columns.
    fn constant_args(
        &mut self,
        args: &[ast::Expr],
        scope: ScopeRef,
        source_name: &str,
    ) -> Result<Vec<SqlValue>> {
        let mut ctx = SelectContext::new(scope);
        let mut values = vec![];
        for a in args {
            let e = self.bind_expr(a, &mut ctx, false)?;
            let v = constant_value(&e).ok_or_else(|| Error::NonConstantArgument {
                source_name: source_name.to_string(),
                arg: a.to_string(),
            })?;
            values.push(v);
        }
        Ok(values)
    }

    fn mark_used(&mut self, ctx: &SelectContext, alias: &str, name: &str) {
        let binding = match ctx.sources.get(alias) {
            Some(b) => b,
            None => return,
        };
        let info = match self.sources.get_mut(&binding.id) {
            Some(i) => i,
            None => return,
        };
        if info.uses(name) {
            return;
        }
        if let Some(c) = binding.columns.iter().find(|c| c.name == name) {
            info.used_columns.push(UsedColumn {
                name: c.name.clone(),
                ty: c.ty,
            });
        }
    }

    fn mark_all_used(&mut self, ctx: &SelectContext, alias: &str) {
        let names: Vec<String> = match ctx.sources.get(alias) {
            Some(b) => b.columns.iter().map(|c| c.name.clone()).collect(),
            None => return,
        };
        for n in names {
            self.mark_used(ctx, alias, &n);
        }
    }

    fn has_aggregate(&self, ctx: &SelectContext, e: &ast::Expr) -> bool {
        e.any(&|x| match x {
            ast::Expr::Call {
                qualifier, name, ..
            } => self.is_aggregate_name(ctx, qualifier.as_deref(), name),
            _ => false,
        })
    }

    fn is_aggregate_name(&self, ctx: &SelectContext, qualifier: Option<&str>, name: &str) -> bool {
        match qualifier {
            Some(q) => ctx
                .schemas
                .get(q)
                .map(|s| s.methods().is_aggregate(name))
                .unwrap_or(false),
            None => {
                self.core.is_aggregate(name)
                    || ctx.schemas.values().any(|s| s.methods().is_aggregate(name))
            }
        }
    }

    fn bind_predicate(&mut self, e: &ast::Expr, ctx: &mut SelectContext, clause: &str) -> Result<TypedExpr> {
        let bound = self.bind_expr(e, ctx, false)?;
        check_predicate(e, &bound, clause)?;
        Ok(bound)
    }

    /// Bind an expression of a grouped block's output: grouping keys become key references and
    /// any other column is an error.
    fn bind_grouped(&mut self, e: &ast::Expr, ctx: &mut SelectContext) -> Result<TypedExpr> {
        let aggregates = ctx.grouping.is_some();
        let mut bound = self.bind_expr(e, ctx, aggregates)?;
        if let Some(g) = &ctx.grouping {
            let ids: Vec<u64> = g.keys.iter().map(|k| k.id()).collect();
            replace_group_keys(&mut bound, &ids)?;
        }
        Ok(bound)
    }

    fn bind_column(&mut self, ctx: &SelectContext, qualifier: Option<&str>, name: &str) -> Result<TypedExpr> {
        let scope = self.scopes.get(ctx.scope);
        let alias = match qualifier {
            Some(q) if scope.symbol(q).is_some() => q.to_string(),
            Some(q) => return Err(Error::UnknownAlias(q.to_string())),
            None => match scope.table_by_column_name(name)? {
                Some((a, _)) => a.to_string(),
                None => return Err(Error::UnknownColumn(name.to_string())),
            },
        };
        let (slot, ty) = ctx
            .symbol
            .column(&alias, name)
            .ok_or_else(|| Error::UnknownColumn(format!("{}.{}", alias, name)))?;
        self.mark_used(ctx, &alias, name);
        Ok(TypedExpr::new(
            ExprKind::Column {
                alias,
                name: name.to_string(),
                slot,
            },
            ty,
        ))
    }

    fn bind_expr(&mut self, e: &ast::Expr, ctx: &mut SelectContext, aggregates: bool) -> Result<TypedExpr> {
        match e {
            ast::Expr::Literal(l) => Ok(TypedExpr::literal(literal_value(l)?)),
            ast::Expr::Column { qualifier, name } => {
                self.bind_column(ctx, qualifier.as_deref(), name)
            }
            ast::Expr::Call {
                qualifier,
                name,
                args,
            } => self.bind_call(e, qualifier.as_deref(), name, args, ctx, aggregates),
            ast::Expr::Unary { op, expr } => {
                let inner = self.bind_expr(expr, ctx, aggregates)?;
                unary(e, *op, inner)
            }
            ast::Expr::Binary { lhs, op, rhs } => {
                let l = self.bind_expr(lhs, ctx, aggregates)?;
                let r = self.bind_expr(rhs, ctx, aggregates)?;
                binary(e, *op, l, r)
            }
            ast::Expr::Index { expr, index } => {
                let x = self.bind_expr(expr, ctx, aggregates)?;
                let i = self.bind_expr(index, ctx, aggregates)?;
                indexer(e, x, i)
            }
            ast::Expr::IsNull { expr, negated } => {
                let x = self.bind_expr(expr, ctx, aggregates)?;
                Ok(TypedExpr::new(
                    ExprKind::IsNull {
                        expr: Box::new(x),
                        negated: *negated,
                    },
                    ValueType::BOOL,
                ))
            }
            ast::Expr::InList {
                expr,
                list,
                negated,
            } => {
                let x = self.bind_expr(expr, ctx, aggregates)?;
                let mut items = vec![];
                for i in list {
                    items.push(self.bind_expr(i, ctx, aggregates)?);
                }
                in_list(e, x, items, *negated)
            }
            ast::Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let x = self.bind_expr(expr, ctx, aggregates)?;
                let p = self.bind_expr(pattern, ctx, aggregates)?;
                like(e, x, p, *negated)
            }
            ast::Expr::Case { whens, otherwise } => {
                let mut bound = vec![];
                for (w, t) in whens {
                    let w = self.bind_expr(w, ctx, aggregates)?;
                    let t = self.bind_expr(t, ctx, aggregates)?;
                    bound.push((w, t));
                }
                let otherwise = match otherwise {
                    Some(o) => Some(self.bind_expr(o, ctx, aggregates)?),
                    None => None,
                };
                case(e, bound, otherwise)
            }
        }
    }

    fn bind_call(
        &mut self,
        e: &ast::Expr,
        qualifier: Option<&str>,
        name: &str,
        args: &[ast::Expr],
        ctx: &mut SelectContext,
        aggregates: bool,
    ) -> Result<TypedExpr> {
        if self.is_aggregate_name(ctx, qualifier, name) {
            if !aggregates {
                return Err(Error::AggregateNotAllowed(e.to_string()));
            }
            let (args, level) = split_group_level(args);
            let mut bound = vec![];
            for a in args {
                bound.push(self.bind_expr(a, ctx, false)?);
            }
            let types: Vec<ValueType> = bound.iter().map(|a| a.ty).collect();
            let method = self.resolve_method(ctx, qualifier, name, &types)?;
            let ty = method.return_type(&types);
            let bound = cast_args(bound, &method.signature().params);
            return match method {
                ResolvedMethod::Aggregate(m) => {
                    let grouping = ctx
                        .grouping
                        .as_mut()
                        .ok_or_else(|| Error::AggregateNotAllowed(e.to_string()))?;
                    if level > grouping.keys.len() {
                        return Err(Error::InvalidAggregateLevel {
                            call: e.to_string(),
                            level,
                            keys: grouping.keys.len(),
                        });
                    }
                    grouping.aggregates.push(AggregateCall {
                        method: m,
                        args: bound,
                        level,
                        ty,
                    });
                    Ok(TypedExpr::new(
                        ExprKind::Aggregate {
                            index: grouping.aggregates.len() - 1,
                        },
                        ty,
                    ))
                }
                ResolvedMethod::Scalar(m) => Ok(TypedExpr::new(
                    ExprKind::Call {
                        method: m,
                        args: bound,
                    },
                    ty,
                )),
            };
        }
        let mut bound = vec![];
        for a in args {
            bound.push(self.bind_expr(a, ctx, aggregates)?);
        }
        let types: Vec<ValueType> = bound.iter().map(|a| a.ty).collect();
        let method = self.resolve_method(ctx, qualifier, name, &types)?;
        let ty = method.return_type(&types);
        match method {
            ResolvedMethod::Scalar(m) => {
                let args = cast_args(bound, &m.signature.params);
                Ok(TypedExpr::new(ExprKind::Call { method: m, args }, ty))
            }
            ResolvedMethod::Aggregate(_) => Err(Error::AggregateNotAllowed(e.to_string())),
        }
    }

    /// Resolve a call. A qualifier picks that alias' schema library. Otherwise the libraries of
    /// every schema in the block are searched, then the core library.
    fn resolve_method(
        &self,
        ctx: &SelectContext,
        qualifier: Option<&str>,
        name: &str,
        types: &[ValueType],
    ) -> Result<ResolvedMethod> {
        let unresolved = || Error::UnresolvedMethod {
            name: name.to_string(),
            args: types.iter().join(", "),
        };
        let null_argument = || Error::UnresolvedMethodNullArgument {
            name: name.to_string(),
        };
        if let Some(q) = qualifier {
            let schema = match ctx.schemas.get(q) {
                Some(s) => s,
                None if ctx.symbol.table(q).is_some() => return Err(unresolved()),
                None => return Err(Error::UnknownAlias(q.to_string())),
            };
            return match schema.methods().resolve(name, types) {
                Resolution::Found(m) => Ok(m),
                Resolution::NullArgument => Err(null_argument()),
                Resolution::NotFound => Err(unresolved()),
            };
        }
        let mut found: Vec<(String, ResolvedMethod)> = vec![];
        let mut null_blocked = false;
        for schema in ctx.schemas.values() {
            if found.iter().any(|(n, _)| n == schema.name()) {
                continue;
            }
            match schema.methods().resolve(name, types) {
                Resolution::Found(m) => found.push((schema.name().to_string(), m)),
                Resolution::NullArgument => null_blocked = true,
                Resolution::NotFound => {}
            }
        }
        if found.len() > 1 {
            return Err(Error::AliasRequired {
                method: name.to_string(),
                schemas: found.into_iter().map(|(n, _)| n).collect(),
            });
        }
        if let Some((_, m)) = found.pop() {
            return Ok(m);
        }
        match self.core.resolve(name, types) {
            Resolution::Found(m) => Ok(m),
            Resolution::NullArgument => Err(null_argument()),
            Resolution::NotFound if null_blocked => Err(null_argument()),
            Resolution::NotFound => Err(unresolved()),
        }
    }
}

fn set_operation_columns(left: &[OutputColumn], right: &[OutputColumn]) -> Result<Vec<OutputColumn>> {
    if left.len() != right.len() {
        return Err(Error::SetOperatorColumnCount {
            left: left.len(),
            right: right.len(),
        });
    }
    left.iter()
        .zip(right.iter())
        .map(|(l, r)| {
            let t = match (l.ty.sql_type, r.ty.sql_type) {
                (a, b) if a == b => a,
                (SqlType::Null, b) => b,
                (a, SqlType::Null) => a,
                _ => {
                    return Err(Error::SetOperatorColumnType {
                        column: l.name.clone(),
                        left: l.ty,
                        right: r.ty,
                    })
                }
            };
            Ok(OutputColumn {
                name: l.name.clone(),
                ty: ValueType::new(t).with_nullable(l.ty.nullable || r.ty.nullable),
            })
        })
        .collect()
}

/// Top-level `AND` conjuncts of `filter` that only read one schema source, which is not on the
/// optional side of an outer join, and call no methods. Keyed by the source's positional id.
fn source_local_conjuncts(ctx: &SelectContext, filter: &TypedExpr) -> IndexMap<String, Vec<TypedExpr>> {
    let mut conjuncts = vec![];
    split_conjunction(filter, &mut conjuncts);
    let mut out: IndexMap<String, Vec<TypedExpr>> = IndexMap::new();
    for c in conjuncts {
        if c.has_call() {
            continue;
        }
        let aliases: HashSet<&str> = c.columns().into_iter().map(|(a, _)| a).collect();
        if aliases.len() != 1 {
            continue;
        }
        let alias = match aliases.into_iter().next() {
            Some(a) => a,
            None => continue,
        };
        if ctx.nullable.contains(alias) {
            continue;
        }
        if let Some(b) = ctx.sources.get(alias) {
            out.entry(b.id.clone()).or_default().push(c.clone());
        }
    }
    out
}

fn split_conjunction<'e>(e: &'e TypedExpr, out: &mut Vec<&'e TypedExpr>) {
    match &e.kind {
        ExprKind::Binary {
            op: ast::BinaryOp::And,
            lhs,
            rhs,
        } => {
            split_conjunction(lhs, out);
            split_conjunction(rhs, out);
        }
        _ => out.push(e),
    }
}

fn replace_group_keys(e: &mut TypedExpr, key_ids: &[u64]) -> Result<()> {
    if !key_ids.is_empty() {
        let id = e.id();
        if let Some(index) = key_ids.iter().position(|k| *k == id) {
            e.kind = ExprKind::GroupKey { index };
            return Ok(());
        }
    }
    match &e.kind {
        ExprKind::Column { alias, name, .. } => {
            return Err(Error::ColumnNotGrouped(format!("{}.{}", alias, name)))
        }
        ExprKind::Aggregate { .. } => return Ok(()),
        _ => {}
    }
    for c in e.children_mut() {
        replace_group_keys(c, key_ids)?;
    }
    Ok(())
}

fn item_by_name(items: &[BoundItem], e: &ast::Expr) -> Option<TypedExpr> {
    let wanted = match e {
        ast::Expr::Column {
            qualifier: None,
            name,
        } => name,
        _ => return None,
    };
    items.iter().find_map(|i| match i {
        BoundItem::Expr { expr, name } if name == wanted => Some(expr.clone()),
        _ => None,
    })
}

fn default_name(e: &ast::Expr) -> String {
    match e {
        ast::Expr::Column { name, .. } => name.clone(),
        e => e.to_string(),
    }
}

/// A trailing unsuffixed integer literal after at least one argument names the group level an
/// aggregate accumulates in: `Count(Id, 1)` counts over the parent group.
fn split_group_level(args: &[ast::Expr]) -> (&[ast::Expr], usize) {
    if args.len() < 2 {
        return (args, 0);
    }
    match &args[args.len() - 1] {
        ast::Expr::Literal(ast::Literal::Number {
            text,
            kind: NumberKind::Integer,
            suffix: None,
        }) => match text.parse::<usize>() {
            Ok(level) => (&args[..args.len() - 1], level),
            Err(_) => (args, 0),
        },
        _ => (args, 0),
    }
}

fn cast_args(args: Vec<TypedExpr>, params: &[SqlType]) -> Vec<TypedExpr> {
    args.into_iter()
        .zip(params.iter())
        .map(|(a, p)| a.cast_to(*p))
        .collect()
}

fn literal_value(l: &ast::Literal) -> Result<SqlValue> {
    let invalid = || Error::InvalidLiteral(l.to_string());
    Ok(match l {
        ast::Literal::Null => SqlValue::Null,
        ast::Literal::Bool(b) => SqlValue::Bool(*b),
        ast::Literal::String(s) => SqlValue::Text(s.clone()),
        ast::Literal::Number { text, kind, suffix } => {
            let integer = match kind {
                NumberKind::Integer => text.parse::<i64>().ok(),
                NumberKind::Hex => {
                    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
                    i64::from_str_radix(digits, 16).ok()
                }
                NumberKind::Real => None,
            };
            match (integer, suffix) {
                (Some(i), None) => match i32::try_from(i) {
                    Ok(v) => SqlValue::Int(v),
                    Err(_) => SqlValue::Long(i),
                },
                (Some(i), Some(NumericSuffix::Long)) => SqlValue::Long(i),
                (Some(i), Some(NumericSuffix::Double)) => SqlValue::Double(i as f64),
                (Some(i), Some(NumericSuffix::Decimal)) => {
                    SqlValue::Decimal(rust_decimal::Decimal::from(i))
                }
                (None, None) | (None, Some(NumericSuffix::Double)) if *kind == NumberKind::Real => {
                    SqlValue::Double(text.parse().map_err(|_| invalid())?)
                }
                (None, Some(NumericSuffix::Decimal)) if *kind == NumberKind::Real => {
                    SqlValue::Decimal(text.parse().map_err(|_| invalid())?)
                }
                _ => return Err(invalid()),
            }
        }
    })
}

/// Value of an expression that reads no columns, if it can be computed at bind time.
fn constant_value(e: &TypedExpr) -> Option<SqlValue> {
    match &e.kind {
        ExprKind::Literal(v) => Some(v.clone()),
        ExprKind::Cast(inner) => constant_value(inner)?.cast(e.ty.sql_type).ok(),
        ExprKind::Unary { op, expr } => constant_value(expr)?.apply_unary(*op).ok(),
        ExprKind::Binary { op, lhs, rhs } => {
            let (l, r) = (constant_value(lhs)?, constant_value(rhs)?);
            l.apply(*op, &r).ok()
        }
        ExprKind::Call { method, args } => {
            let values: Option<Vec<SqlValue>> = args.iter().map(constant_value).collect();
            method.call(&values?).ok()
        }
        _ => None,
    }
}

fn mismatch(e: &ast::Expr, detail: String) -> Error {
    Error::TypeMismatch {
        expr: e.to_string(),
        detail,
    }
}

fn check_predicate(e: &ast::Expr, bound: &TypedExpr, clause: &str) -> Result<()> {
    match bound.ty.sql_type {
        SqlType::Bool | SqlType::Null | SqlType::Void => Ok(()),
        t => Err(mismatch(e, format!("{} must be a boolean, not {}", clause, t))),
    }
}

fn unary(e: &ast::Expr, op: ast::UnaryOp, x: TypedExpr) -> Result<TypedExpr> {
    let t = x.ty.sql_type;
    let ty = match op {
        _ if x.ty.is_void() => ValueType::VOID,
        ast::UnaryOp::Negate if t.is_numeric() || t == SqlType::Null => x.ty,
        ast::UnaryOp::BitNot if t.is_integer() || t == SqlType::Null => x.ty,
        ast::UnaryOp::Not if matches!(t, SqlType::Bool | SqlType::Null) => {
            ValueType::BOOL.with_nullable(x.ty.nullable)
        }
        _ => return Err(mismatch(e, format!("operand has type {}", t))),
    };
    Ok(TypedExpr::new(
        ExprKind::Unary {
            op,
            expr: Box::new(x),
        },
        ty,
    ))
}

fn binary(e: &ast::Expr, op: ast::BinaryOp, l: TypedExpr, r: TypedExpr) -> Result<TypedExpr> {
    let (lt, rt) = (l.ty.sql_type, r.ty.sql_type);
    if l.ty.is_void() || r.ty.is_void() {
        let kind = ExprKind::Binary {
            op,
            lhs: Box::new(l),
            rhs: Box::new(r),
        };
        return Ok(TypedExpr::new(kind, ValueType::VOID));
    }
    let no_rule = || mismatch(e, format!("{} cannot be applied to {} and {}", op, lt, rt));
    let (operand, result) = if op.is_arithmetic() {
        let t = coercion::arithmetic(op == ast::BinaryOp::Add, lt, rt).ok_or_else(no_rule)?;
        (t, t)
    } else if op.is_bitwise() {
        let t = coercion::bitwise(lt, rt).ok_or_else(no_rule)?;
        (t, t)
    } else if op.is_comparison() {
        let t = match op {
            ast::BinaryOp::Eq | ast::BinaryOp::NotEq => coercion::equality(lt, rt),
            _ => coercion::comparison(lt, rt),
        }
        .ok_or_else(no_rule)?;
        (t, SqlType::Bool)
    } else {
        if ![lt, rt]
            .iter()
            .all(|t| matches!(t, SqlType::Bool | SqlType::Null))
        {
            return Err(no_rule());
        }
        (SqlType::Bool, SqlType::Bool)
    };
    let ty = ValueType::new(result).with_nullable(l.ty.nullable || r.ty.nullable);
    Ok(TypedExpr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(l.cast_to(operand)),
            rhs: Box::new(r.cast_to(operand)),
        },
        ty,
    ))
}

fn indexer(e: &ast::Expr, x: TypedExpr, i: TypedExpr) -> Result<TypedExpr> {
    let ok_target = matches!(x.ty.sql_type, SqlType::Text | SqlType::Null | SqlType::Void);
    let ok_index = i.ty.sql_type.is_integer() || matches!(i.ty.sql_type, SqlType::Null | SqlType::Void);
    if !ok_target || !ok_index {
        return Err(mismatch(
            e,
            format!("cannot index {} with {}", x.ty.sql_type, i.ty.sql_type),
        ));
    }
    Ok(TypedExpr::new(
        ExprKind::Index {
            expr: Box::new(x),
            index: Box::new(i),
        },
        ValueType::nullable(SqlType::Char),
    ))
}

fn in_list(e: &ast::Expr, x: TypedExpr, list: Vec<TypedExpr>, negated: bool) -> Result<TypedExpr> {
    let mut t = x.ty.sql_type;
    let mut nullable = x.ty.nullable;
    for item in &list {
        if item.ty.is_void() || t == SqlType::Void {
            t = SqlType::Void;
            continue;
        }
        let cur = t;
        t = coercion::common_type(cur, item.ty.sql_type)
            .or_else(|| coercion::equality(cur, item.ty.sql_type))
            .ok_or_else(|| {
                mismatch(e, format!("{} cannot be compared with {}", cur, item.ty.sql_type))
            })?;
        nullable |= item.ty.nullable;
    }
    Ok(TypedExpr::new(
        ExprKind::InList {
            expr: Box::new(x.cast_to(t)),
            list: list.into_iter().map(|i| i.cast_to(t)).collect(),
            negated,
        },
        ValueType::BOOL.with_nullable(nullable),
    ))
}

fn like(e: &ast::Expr, x: TypedExpr, p: TypedExpr, negated: bool) -> Result<TypedExpr> {
    for t in [x.ty.sql_type, p.ty.sql_type] {
        if !matches!(t, SqlType::Text | SqlType::Char | SqlType::Null | SqlType::Void) {
            return Err(mismatch(e, format!("LIKE needs strings, not {}", t)));
        }
    }
    let nullable = x.ty.nullable || p.ty.nullable;
    Ok(TypedExpr::new(
        ExprKind::Like {
            expr: Box::new(x.cast_to(SqlType::Text)),
            pattern: Box::new(p.cast_to(SqlType::Text)),
            negated,
        },
        ValueType::BOOL.with_nullable(nullable),
    ))
}

fn case(e: &ast::Expr, whens: Vec<(TypedExpr, TypedExpr)>, otherwise: Option<TypedExpr>) -> Result<TypedExpr> {
    let mut t = SqlType::Null;
    let mut nullable = otherwise.is_none();
    for (w, _) in &whens {
        if !matches!(w.ty.sql_type, SqlType::Bool | SqlType::Null | SqlType::Void) {
            return Err(mismatch(e, format!("WHEN condition has type {}", w.ty.sql_type)));
        }
    }
    for branch in whens.iter().map(|(_, b)| b).chain(otherwise.iter()) {
        if branch.ty.is_void() {
            continue;
        }
        let cur = t;
        t = coercion::common_type(cur, branch.ty.sql_type).ok_or_else(|| {
            mismatch(e, format!("branches have types {} and {}", cur, branch.ty.sql_type))
        })?;
        nullable |= branch.ty.nullable;
    }
    let kind = ExprKind::Case {
        whens: whens
            .into_iter()
            .map(|(w, b)| (w, b.cast_to(t)))
            .collect(),
        otherwise: otherwise.map(|o| Box::new(o.cast_to(t))),
    };
    Ok(TypedExpr::new(kind, ValueType::new(t).with_nullable(nullable)))
}

#[cfg(test)]
fn bind_text(text: &str) -> Result<BoundScript> {
    let provider = crate::memory::sample_provider();
    let core = crate::builtin::core_library();
    let memo = TableMemo::new();
    let script = crate::parser::parse_query_text(text).unwrap();
    bind(&script, &provider, &core, &memo, true)
}

#[cfg(test)]
fn output_types(b: &BoundScript) -> Vec<String> {
    b.body.columns().iter().map(|c| c.ty.to_string()).collect()
}

#[test]
fn test_type_promotion() {
    struct Case {
        desc: &'static str,
        input: &'static str,
        expected: Vec<&'static str>,
    }
    let cases = vec![
        Case {
            desc: "int plus double",
            input: "SELECT 1 + 2.5",
            expected: vec!["double"],
        },
        Case {
            desc: "decimal plus int",
            input: "SELECT 1m + 2",
            expected: vec!["decimal"],
        },
        Case {
            desc: "long shift",
            input: "SELECT 1l << 2",
            expected: vec!["long"],
        },
        Case {
            desc: "string concatenation",
            input: "SELECT 'a' + 'b'",
            expected: vec!["string"],
        },
        Case {
            desc: "comparison is boolean",
            input: "SELECT Id > 2.5 FROM #a.entities()",
            expected: vec!["bool"],
        },
        Case {
            desc: "indexer is a nullable char",
            input: "SELECT Name[0] FROM #a.entities()",
            expected: vec!["char?"],
        },
        Case {
            desc: "outer join side becomes nullable",
            input: "SELECT o.Id FROM #a.entities() e LEFT JOIN #a.orders() o ON e.Id = o.EntityId",
            expected: vec!["int?"],
        },
        Case {
            desc: "aggregates",
            input: "SELECT Count(), Sum(Id), Max(City) FROM #a.entities()",
            expected: vec!["int", "long?", "string"],
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        let bound = bind_text(case.input).unwrap();
        assert_eq!(output_types(&bound), case.expected);
    }
}

#[test]
fn test_bind_errors() {
    struct Case {
        desc: &'static str,
        input: &'static str,
        expected: Error,
    }
    let cases = vec![
        Case {
            desc: "unknown schema",
            input: "SELECT 1 FROM #zz.entities()",
            expected: Error::UnknownSchema("zz".to_string()),
        },
        Case {
            desc: "unknown table",
            input: "SELECT 1 FROM #a.people()",
            expected: Error::UnknownTable("#a.people".to_string()),
        },
        Case {
            desc: "unknown alias",
            input: "SELECT q.Id FROM #a.entities() e",
            expected: Error::UnknownAlias("q".to_string()),
        },
        Case {
            desc: "unknown column",
            input: "SELECT Age FROM #a.entities()",
            expected: Error::UnknownColumn("Age".to_string()),
        },
        Case {
            desc: "ambiguous column",
            input: "SELECT Name FROM #a.entities() x JOIN #b.entities() y ON x.Id = y.Id",
            expected: Error::AmbiguousColumn {
                column: "Name".to_string(),
                first: "x".to_string(),
                second: "y".to_string(),
            },
        },
        Case {
            desc: "alias reused",
            input: "SELECT 1 FROM #a.entities() x JOIN #a.orders() x ON 1 = 1",
            expected: Error::AliasAlreadyUsed("x".to_string()),
        },
        Case {
            desc: "method in two schemas",
            input: "SELECT Domain(x.Name) FROM #a.entities() x JOIN #b.entities() y ON x.Id = y.Id",
            expected: Error::AliasRequired {
                method: "Domain".to_string(),
                schemas: vec!["a".to_string(), "b".to_string()],
            },
        },
        Case {
            desc: "no such method",
            input: "SELECT Reverse(Name) FROM #a.entities()",
            expected: Error::UnresolvedMethod {
                name: "Reverse".to_string(),
                args: "string".to_string(),
            },
        },
        Case {
            desc: "null blocks every overload",
            input: "SELECT Substring(Name, NULL, 1) FROM #a.entities()",
            expected: Error::UnresolvedMethodNullArgument {
                name: "Substring".to_string(),
            },
        },
        Case {
            desc: "column not grouped",
            input: "SELECT Name, Count() FROM #a.entities() GROUP BY City",
            expected: Error::ColumnNotGrouped("entities.Name".to_string()),
        },
        Case {
            desc: "aggregate in where",
            input: "SELECT Id FROM #a.entities() WHERE Count() > 1",
            expected: Error::AggregateNotAllowed("Count()".to_string()),
        },
        Case {
            desc: "set operator arity",
            input: "SELECT Id FROM #a.entities() UNION SELECT Id, Name FROM #a.entities()",
            expected: Error::SetOperatorColumnCount { left: 1, right: 2 },
        },
        Case {
            desc: "set operator types",
            input: "SELECT Id FROM #a.entities() UNION SELECT Name FROM #a.entities()",
            expected: Error::SetOperatorColumnType {
                column: "Id".to_string(),
                left: ValueType::new(SqlType::Int),
                right: ValueType::new(SqlType::Text),
            },
        },
        Case {
            desc: "non-boolean where",
            input: "SELECT Id FROM #a.entities() WHERE Id",
            expected: Error::TypeMismatch {
                expr: "Id".to_string(),
                detail: "WHERE must be a boolean, not int".to_string(),
            },
        },
        Case {
            desc: "source arguments are constants",
            input: "SELECT N FROM #a.numbers(Id)",
            expected: Error::UnknownColumn("Id".to_string()),
        },
        Case {
            desc: "undeclared table in couple",
            input: "COUPLE #a.entities WITH TABLE people AS people;\nSELECT 1",
            expected: Error::UnknownTableDeclaration("people".to_string()),
        },
        Case {
            desc: "bad declared type",
            input: "TABLE people { Id 'integer32' };\nSELECT 1",
            expected: Error::InvalidType {
                column: "Id".to_string(),
                type_name: "integer32".to_string(),
            },
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        assert_eq!(bind_text(case.input).unwrap_err(), case.expected);
    }
}

#[test]
fn test_pushdown_fragments_per_source() {
    let bound = bind_text(
        "SELECT a.Name FROM #a.entities() a JOIN #b.entities() b ON a.Id = b.Id \
         WHERE a.Id = 1 AND b.Id = 2 AND a.Id < b.Id AND a.Domain(a.Name) = 'x.com'",
    )
    .unwrap();
    let select = bound.body.as_select().unwrap();
    let texts: Vec<(String, Vec<String>)> = select
        .pushdown
        .iter()
        .map(|(id, es)| (id.clone(), es.iter().map(|e| e.to_string()).collect()))
        .collect();
    assert_eq!(
        texts,
        vec![
            ("a:0".to_string(), vec!["(a.Id = 1)".to_string()]),
            ("b:1".to_string(), vec!["(b.Id = 2)".to_string()]),
        ]
    );
}

#[test]
fn test_no_pushdown_into_optional_side() {
    let bound = bind_text(
        "SELECT e.Name FROM #a.entities() e LEFT JOIN #a.orders() o ON e.Id = o.EntityId \
         WHERE o.Amount > 1 AND e.Id = 1",
    )
    .unwrap();
    let select = bound.body.as_select().unwrap();
    assert_eq!(select.pushdown.keys().collect::<Vec<_>>(), vec!["e:0"]);
}

#[test]
fn test_used_columns_and_coupled_sources() {
    let bound = bind_text(
        "TABLE people { Id 'int', Name 'string', Shoe 'int' };\n\
         COUPLE #a.entities WITH TABLE people AS people;\n\
         SELECT p.Name FROM people() p WHERE p.Id > 1",
    )
    .unwrap();
    let info = &bound.sources["p:0"];
    assert!(info.has_external_types);
    assert_eq!(info.from.method, "entities");
    let used: Vec<&str> = info.used_columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(used, vec!["Id", "Name"]);
    // Shoe is declared but the schema does not have it.
    assert_eq!(
        bind_text(
            "TABLE people { Id 'int', Shoe 'int' };\n\
             COUPLE #a.entities WITH TABLE people AS people;\n\
             SELECT Shoe FROM people()"
        )
        .unwrap_err(),
        Error::UnknownColumn("Shoe".to_string())
    );
}

#[test]
fn test_grouping_keys_and_levels() {
    let bound = bind_text(
        "SELECT City, Count(), Count(Id, 1) FROM #a.entities() GROUP BY City ORDER BY Count() DESC",
    )
    .unwrap();
    let select = bound.body.as_select().unwrap();
    let grouping = select.grouping.as_ref().unwrap();
    assert_eq!(grouping.keys.len(), 1);
    assert_eq!(grouping.aggregates.len(), 3);
    assert_eq!(grouping.aggregates[1].level, 1);
    match &select.items[0] {
        BoundItem::Expr { expr, name } => {
            assert_eq!(name, "City");
            assert!(matches!(expr.kind, ExprKind::GroupKey { index: 0 }));
        }
        i => panic!("unexpected {:?}", i),
    }
    assert!(bind_text("SELECT Count(Id, 2) FROM #a.entities() GROUP BY City").is_err());
}

#[test]
fn test_order_by_item_alias_and_ctes() {
    let bound = bind_text(
        "WITH paris AS (SELECT Id, Name FROM #a.entities() WHERE City = 'Paris') \
         SELECT Name AS who FROM paris ORDER BY who",
    )
    .unwrap();
    assert_eq!(bound.ctes.len(), 1);
    let select = bound.body.as_select().unwrap();
    assert_eq!(select.order_by[0].expr.to_string(), "paris.Name");
    assert_eq!(bound.sources.len(), 1);
}
