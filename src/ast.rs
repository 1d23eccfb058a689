//! This module defines abstract syntax tree (AST) types for the query language.
//!
//! Every node implements `Display`, printing canonical text that parses back to an equal tree:
//! keywords in upper case, one line per statement, and only the parentheses that precedence
//! requires.

use enum_as_inner::EnumAsInner;
use itertools::Itertools;

use crate::token::{self, NumberKind, NumericSuffix};

/// Print an identifier, quoting it when it is not a plain word or collides with a keyword.
pub struct Ident<'a>(pub &'a str);

impl std::fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.0;
        let plain = s
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && token::keyword_from_str(s).is_none();
        if plain {
            s.fmt(f)
        } else {
            write!(f, "\"{}\"", s.replace('"', "\"\""))
        }
    }
}

/// A whole script: declarations followed by exactly one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub declarations: Vec<Declaration>,
    pub query: Query,
}

impl std::fmt::Display for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for d in &self.declarations {
            write!(f, "{};\n", d)?;
        }
        self.query.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum Declaration {
    Table(TableDeclaration),
    Couple(CoupleDeclaration),
}

impl std::fmt::Display for Declaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Declaration::Table(t) => t.fmt(f),
            Declaration::Couple(c) => c.fmt(f),
        }
    }
}

/// `TABLE name { col 'type', ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDeclaration {
    pub name: String,
    pub columns: Vec<ColumnDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDeclaration {
    pub name: String,
    pub type_name: String,
}

impl std::fmt::Display for TableDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TABLE {} {{ {} }}",
            Ident(&self.name),
            self.columns
                .iter()
                .map(|c| format!("{} {}", Ident(&c.name), Literal::String(c.type_name.clone())))
                .join(", ")
        )
    }
}

/// `COUPLE #schema.method WITH TABLE table AS alias` binds a schema method to a declared table,
/// so that `alias(args)` can be used as a source with the declared column types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoupleDeclaration {
    pub schema: String,
    pub method: String,
    pub table: String,
    pub alias: String,
}

impl std::fmt::Display for CoupleDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "COUPLE #{}.{} WITH TABLE {} AS {}",
            Ident(&self.schema),
            Ident(&self.method),
            Ident(&self.table),
            Ident(&self.alias)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub ctes: Vec<Cte>,
    pub body: QueryBody,
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.ctes.is_empty() {
            write!(f, "WITH {} ", self.ctes.iter().join(", "))?;
        }
        self.body.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cte {
    pub name: String,
    pub body: QueryBody,
}

impl std::fmt::Display for Cte {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} AS ({})", Ident(&self.name), self.body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    Union,
    UnionAll,
    Except,
    Intersect,
}

impl std::fmt::Display for SetOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetOperator::Union => f.write_str("UNION"),
            SetOperator::UnionAll => f.write_str("UNION ALL"),
            SetOperator::Except => f.write_str("EXCEPT"),
            SetOperator::Intersect => f.write_str("INTERSECT"),
        }
    }
}

/// A select block or a left-associative chain of set operations.
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum QueryBody {
    Select(Box<Select>),
    SetOperation {
        left: Box<QueryBody>,
        op: SetOperator,
        right: Box<QueryBody>,
    },
}

impl std::fmt::Display for QueryBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryBody::Select(s) => s.fmt(f),
            QueryBody::SetOperation { left, op, right } => {
                write!(f, "{} {} ", left, op)?;
                match right.as_ref() {
                    QueryBody::SetOperation { .. } => write!(f, "({})", right),
                    QueryBody::Select(s) => s.fmt(f),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl std::fmt::Display for Select {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        self.items.iter().join(", ").fmt(f)?;
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(w) = &self.where_clause {
            write!(f, " WHERE {}", w)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", self.group_by.iter().join(", "))?;
        }
        if let Some(h) = &self.having {
            write!(f, " HAVING {}", h)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", self.order_by.iter().join(", "))?;
        }
        if let Some(n) = self.skip {
            write!(f, " SKIP {}", n)?;
        }
        if let Some(n) = self.take {
            write!(f, " TAKE {}", n)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum SelectItem {
    /// `*`
    Star,
    /// `alias.*`
    QualifiedStar(String),
    Expr { expr: Expr, alias: Option<String> },
}

impl std::fmt::Display for SelectItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectItem::Star => f.write_str("*"),
            SelectItem::QualifiedStar(q) => write!(f, "{}.*", Ident(q)),
            SelectItem::Expr { expr, alias: None } => expr.fmt(f),
            SelectItem::Expr {
                expr,
                alias: Some(a),
            } => write!(f, "{} AS {}", expr, Ident(a)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

impl std::fmt::Display for OrderItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.descending {
            true => write!(f, "{} DESC", self.expr),
            false => self.expr.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromClause {
    pub first: FromFactor,
    pub joins: Vec<Join>,
}

impl std::fmt::Display for FromClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.first.fmt(f)?;
        for j in &self.joins {
            write!(f, " {}", j)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinKind::Inner => f.write_str("INNER JOIN"),
            JoinKind::LeftOuter => f.write_str("LEFT OUTER JOIN"),
            JoinKind::RightOuter => f.write_str("RIGHT OUTER JOIN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub factor: FromFactor,
    pub on: Expr,
}

impl std::fmt::Display for Join {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ON {}", self.kind, self.factor, self.on)
    }
}

/// One source in a FROM clause.
///
/// Sources that invoke a schema method carry an `ordinal`: their position among all such
/// sources in the script, in textual order. Together with the alias it identifies one physical
/// invocation even when the same method is called several times.
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum FromFactor {
    /// `#schema.method(args) [alias]`
    Schema {
        schema: String,
        method: String,
        args: Vec<Expr>,
        alias: Option<String>,
        ordinal: usize,
    },
    /// `coupled(args) [alias]`, a method bound by a `COUPLE` declaration.
    Coupled {
        name: String,
        args: Vec<Expr>,
        alias: Option<String>,
        ordinal: usize,
    },
    /// `cte [alias]`
    Cte { name: String, alias: Option<String> },
    /// `(body) alias`
    SubQuery { body: Box<QueryBody>, alias: String },
}

impl FromFactor {
    /// The alias the source is visible under: the explicit alias, otherwise the method or CTE name.
    pub fn alias(&self) -> &str {
        match self {
            FromFactor::Schema { alias, method, .. } => alias.as_deref().unwrap_or(method),
            FromFactor::Coupled { alias, name, .. } => alias.as_deref().unwrap_or(name),
            FromFactor::Cte { alias, name } => alias.as_deref().unwrap_or(name),
            FromFactor::SubQuery { alias, .. } => alias,
        }
    }
}

fn fmt_alias(f: &mut std::fmt::Formatter<'_>, alias: &Option<String>) -> std::fmt::Result {
    match alias {
        Some(a) => write!(f, " {}", Ident(a)),
        None => Ok(()),
    }
}

impl std::fmt::Display for FromFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FromFactor::Schema {
                schema,
                method,
                args,
                alias,
                ..
            } => {
                write!(
                    f,
                    "#{}.{}({})",
                    Ident(schema),
                    Ident(method),
                    args.iter().join(", ")
                )?;
                fmt_alias(f, alias)
            }
            FromFactor::Coupled {
                name, args, alias, ..
            } => {
                write!(f, "{}({})", Ident(name), args.iter().join(", "))?;
                fmt_alias(f, alias)
            }
            FromFactor::Cte { name, alias } => {
                Ident(name).fmt(f)?;
                fmt_alias(f, alias)
            }
            FromFactor::SubQuery { body, alias } => write!(f, "({}) {}", body, Ident(alias)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Null,
    Bool(bool),
    /// Numbers keep their source text so that printing reproduces them exactly.
    Number {
        text: String,
        kind: NumberKind,
        suffix: Option<NumericSuffix>,
    },
    String(String),
}

impl Literal {
    pub fn int(i: i64) -> Literal {
        Literal::Number {
            text: i.to_string(),
            kind: NumberKind::Integer,
            suffix: None,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Null => f.write_str("NULL"),
            Literal::Bool(true) => f.write_str("TRUE"),
            Literal::Bool(false) => f.write_str("FALSE"),
            Literal::Number { text, suffix, .. } => match suffix {
                Some(s) => write!(f, "{}{}", text, s.as_char()),
                None => text.fmt(f),
            },
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    BitNot,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitXor,
    BitOr,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// Binding powers, lowest first.
pub mod precedence {
    pub const OR: u8 = 1;
    pub const AND: u8 = 2;
    pub const NOT: u8 = 3;
    pub const COMPARISON: u8 = 4;
    pub const BIT_OR: u8 = 5;
    pub const BIT_XOR: u8 = 6;
    pub const BIT_AND: u8 = 7;
    pub const SHIFT: u8 = 8;
    pub const ADDITIVE: u8 = 9;
    pub const MULTIPLICATIVE: u8 = 10;
    pub const UNARY: u8 = 11;
    pub const POSTFIX: u8 = 12;
    pub const ATOM: u8 = 13;
}

impl BinaryOp {
    pub fn precedence(&self) -> u8 {
        use BinaryOp::*;
        match self {
            Multiply | Divide | Modulo => precedence::MULTIPLICATIVE,
            Add | Subtract => precedence::ADDITIVE,
            ShiftLeft | ShiftRight => precedence::SHIFT,
            BitAnd => precedence::BIT_AND,
            BitXor => precedence::BIT_XOR,
            BitOr => precedence::BIT_OR,
            Eq | NotEq | Lt | LtEq | Gt | GtEq => precedence::COMPARISON,
            And => precedence::AND,
            Or => precedence::OR,
        }
    }

    pub fn is_comparison(&self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | NotEq | Lt | LtEq | Gt | GtEq)
    }

    pub fn is_arithmetic(&self) -> bool {
        use BinaryOp::*;
        matches!(self, Multiply | Divide | Modulo | Add | Subtract)
    }

    pub fn is_bitwise(&self) -> bool {
        use BinaryOp::*;
        matches!(self, ShiftLeft | ShiftRight | BitAnd | BitXor | BitOr)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use BinaryOp::*;
        match self {
            Multiply => f.write_str("*"),
            Divide => f.write_str("/"),
            Modulo => f.write_str("%"),
            Add => f.write_str("+"),
            Subtract => f.write_str("-"),
            ShiftLeft => f.write_str("<<"),
            ShiftRight => f.write_str(">>"),
            BitAnd => f.write_str("&"),
            BitXor => f.write_str("^"),
            BitOr => f.write_str("|"),
            Eq => f.write_str("="),
            NotEq => f.write_str("<>"),
            Lt => f.write_str("<"),
            LtEq => f.write_str("<="),
            Gt => f.write_str(">"),
            GtEq => f.write_str(">="),
            And => f.write_str("AND"),
            Or => f.write_str("OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumAsInner)]
pub enum Expr {
    Literal(Literal),
    /// `name` or `qualifier.name`
    Column {
        qualifier: Option<String>,
        name: String,
    },
    /// `name(args)` or `qualifier.name(args)`
    Call {
        qualifier: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        lhs: Box<Expr>,
        op: BinaryOp,
        rhs: Box<Expr>,
    },
    /// `expr[index]`
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    Case {
        whens: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn column(qualifier: Option<&str>, name: &str) -> Expr {
        Expr::Column {
            qualifier: qualifier.map(String::from),
            name: name.to_string(),
        }
    }

    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    /// The canonical always-true predicate.
    pub fn true_literal() -> Expr {
        Expr::Literal(Literal::Bool(true))
    }

    /// How tightly this node binds when printed as an operand.
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => precedence::NOT,
            Expr::Unary { .. } => precedence::UNARY,
            Expr::IsNull { .. } | Expr::InList { .. } | Expr::Like { .. } => {
                precedence::COMPARISON
            }
            Expr::Index { .. } => precedence::POSTFIX,
            Expr::Literal(_) | Expr::Column { .. } | Expr::Call { .. } | Expr::Case { .. } => {
                precedence::ATOM
            }
        }
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::Column { .. } => vec![],
            Expr::Call { args, .. } => args.iter().collect(),
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => vec![expr.as_ref()],
            Expr::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Expr::Index { expr, index } => vec![expr.as_ref(), index.as_ref()],
            Expr::InList { expr, list, .. } => {
                std::iter::once(expr.as_ref()).chain(list.iter()).collect()
            }
            Expr::Like { expr, pattern, .. } => vec![expr.as_ref(), pattern.as_ref()],
            Expr::Case { whens, otherwise } => whens
                .iter()
                .flat_map(|(w, t)| [w, t])
                .chain(otherwise.iter().map(|o| o.as_ref()))
                .collect(),
        }
    }

    /// True if `pred` holds for this node or any descendant.
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }
}

struct Operand<'a>(&'a Expr, bool);

impl std::fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.1 {
            true => write!(f, "({})", self.0),
            false => self.0.fmt(f),
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use precedence::*;
        match self {
            Expr::Literal(l) => l.fmt(f),
            Expr::Column { qualifier, name } => match qualifier {
                Some(q) => write!(f, "{}.{}", Ident(q), Ident(name)),
                None => Ident(name).fmt(f),
            },
            Expr::Call {
                qualifier,
                name,
                args,
            } => {
                if let Some(q) = qualifier {
                    write!(f, "{}.", Ident(q))?;
                }
                write!(f, "{}({})", Ident(name), args.iter().join(", "))
            }
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => write!(f, "NOT {}", Operand(expr, expr.precedence() < NOT)),
            Expr::Unary { op, expr } => {
                // `--` would start a comment, so a nested negation is always parenthesized.
                let nested = matches!(
                    expr.as_ref(),
                    Expr::Unary {
                        op: UnaryOp::Negate,
                        ..
                    }
                );
                let sym = if *op == UnaryOp::Negate { "-" } else { "~" };
                write!(
                    f,
                    "{}{}",
                    sym,
                    Operand(expr, nested || expr.precedence() < UNARY)
                )
            }
            Expr::Binary { lhs, op, rhs } => {
                let p = op.precedence();
                write!(
                    f,
                    "{} {} {}",
                    Operand(lhs, lhs.precedence() < p),
                    op,
                    Operand(rhs, rhs.precedence() <= p)
                )
            }
            Expr::Index { expr, index } => {
                write!(f, "{}[{}]", Operand(expr, expr.precedence() < POSTFIX), index)
            }
            Expr::IsNull { expr, negated } => write!(
                f,
                "{} IS {}NULL",
                Operand(expr, expr.precedence() < COMPARISON),
                if *negated { "NOT " } else { "" }
            ),
            Expr::InList {
                expr,
                list,
                negated,
            } => write!(
                f,
                "{} {}IN ({})",
                Operand(expr, expr.precedence() < COMPARISON),
                if *negated { "NOT " } else { "" },
                list.iter().join(", ")
            ),
            Expr::Like {
                expr,
                pattern,
                negated,
            } => write!(
                f,
                "{} {}LIKE {}",
                Operand(expr, expr.precedence() < COMPARISON),
                if *negated { "NOT " } else { "" },
                Operand(pattern, pattern.precedence() <= COMPARISON)
            ),
            Expr::Case { whens, otherwise } => {
                f.write_str("CASE")?;
                for (w, t) in whens {
                    write!(f, " WHEN {} THEN {}", w, t)?;
                }
                if let Some(o) = otherwise {
                    write!(f, " ELSE {}", o)?;
                }
                f.write_str(" END")
            }
        }
    }
}

#[test]
fn test_display_minimal_parentheses() {
    let a = || Expr::column(None, "a");
    let b = || Expr::column(None, "b");
    let c = || Expr::column(None, "c");
    let cases = vec![
        (
            Expr::binary(Expr::binary(a(), BinaryOp::Add, b()), BinaryOp::Multiply, c()),
            "(a + b) * c",
        ),
        (
            Expr::binary(a(), BinaryOp::Add, Expr::binary(b(), BinaryOp::Multiply, c())),
            "a + b * c",
        ),
        (
            Expr::binary(a(), BinaryOp::Subtract, Expr::binary(b(), BinaryOp::Subtract, c())),
            "a - (b - c)",
        ),
        (
            Expr::binary(Expr::binary(a(), BinaryOp::Subtract, b()), BinaryOp::Subtract, c()),
            "a - b - c",
        ),
        (
            Expr::Unary {
                op: UnaryOp::Negate,
                expr: Box::new(Expr::Unary {
                    op: UnaryOp::Negate,
                    expr: Box::new(a()),
                }),
            },
            "-(-a)",
        ),
        (
            Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(Expr::binary(a(), BinaryOp::Eq, b())),
            },
            "NOT a = b",
        ),
    ];
    for (e, expected) in cases {
        println!("Running case: {}", expected);
        assert_eq!(e.to_string(), expected);
    }
}

#[test]
fn test_display_quotes_identifiers() {
    assert_eq!(Expr::column(Some("f"), "Name").to_string(), "f.Name");
    assert_eq!(Expr::column(None, "select").to_string(), "\"select\"");
    assert_eq!(Expr::column(None, "two words").to_string(), "\"two words\"");
}

#[test]
fn test_display_select() {
    let s = Select {
        distinct: true,
        items: vec![SelectItem::Expr {
            expr: Expr::column(None, "City"),
            alias: Some("c".to_string()),
        }],
        from: Some(FromClause {
            first: FromFactor::Schema {
                schema: "a".to_string(),
                method: "entities".to_string(),
                args: vec![],
                alias: None,
                ordinal: 0,
            },
            joins: vec![],
        }),
        take: Some(3),
        ..Default::default()
    };
    assert_eq!(s.to_string(), "SELECT DISTINCT City AS c FROM #a.entities() TAKE 3");
}
