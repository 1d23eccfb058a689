//! `parser` builds an `ast::Script` from tokens.
//!
//! Statements and clauses are parsed by recursive descent. Expressions use binding powers
//! (see `ast::precedence`) so that the same table drives both parsing and printing.

use std::collections::HashMap;

use thiserror::Error;

use crate::ast::{self, precedence, BinaryOp, Expr, UnaryOp};
use crate::lexer;
use crate::token::{Keyword, NumberKind, Operator, Span, Token, TokenKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unexpected token `{found}` at {span}, expected {expected}.")]
    UnexpectedToken {
        found: String,
        expected: String,
        span: Span,
    },
    #[error("Unexpected end of query, expected {expected}.")]
    UnexpectedEnd { expected: String },
    #[error("Bracket `{open}` opened at {span} is never closed.")]
    UnclosedBracket { open: char, span: Span },
    #[error("Invalid expression at {span}.")]
    InvalidExpression { span: Span },
    #[error(transparent)]
    Lexical(#[from] lexer::Error),
}

impl Error {
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::UnexpectedToken { span, .. }
            | Error::UnclosedBracket { span, .. }
            | Error::InvalidExpression { span } => Some(*span),
            Error::UnexpectedEnd { .. } => None,
            Error::Lexical(e) => Some(e.span()),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

lazy_static::lazy_static! {
    static ref INFIX_OPERATORS: HashMap<Operator, BinaryOp> = {
        use Operator::*;
        HashMap::from([
            (Star, BinaryOp::Multiply),
            (Slash, BinaryOp::Divide),
            (Percent, BinaryOp::Modulo),
            (Plus, BinaryOp::Add),
            (Minus, BinaryOp::Subtract),
            (ShiftLeft, BinaryOp::ShiftLeft),
            (ShiftRight, BinaryOp::ShiftRight),
            (Ampersand, BinaryOp::BitAnd),
            (Caret, BinaryOp::BitXor),
            (Pipe, BinaryOp::BitOr),
            (Eq, BinaryOp::Eq),
            (NotEq, BinaryOp::NotEq),
            (Lt, BinaryOp::Lt),
            (LtEq, BinaryOp::LtEq),
            (Gt, BinaryOp::Gt),
            (GtEq, BinaryOp::GtEq),
        ])
    };
}

/// Parse a whole script from tokens.
pub fn parse(tokens: Vec<Token>) -> Result<ast::Script> {
    Parser::with_tokens(tokens).parse_script()
}

/// Tokenize and parse a whole script.
pub fn parse_query_text(text: &str) -> Result<ast::Script> {
    parse(lexer::tokenize(text)?)
}

/// Tokenize and parse a single expression.
pub fn parse_expression(text: &str) -> Result<Expr> {
    let mut p = Parser::with_tokens(lexer::tokenize(text)?);
    let e = p.parse_expr()?;
    p.expect_end()?;
    Ok(e)
}

/// Infix forms that bind at the comparison level but are spelled with keywords.
enum Infix {
    Binary(BinaryOp),
    Is,
    In { negated: bool },
    Like { negated: bool },
}

#[derive(Debug)]
pub struct Parser {
    toks: Vec<Token>,
    /// Index of the token to process next.
    idx: usize,
    /// Number of schema-invoking sources seen so far.
    next_ordinal: usize,
}

impl Parser {
    pub fn with_tokens(toks: Vec<Token>) -> Self {
        Parser {
            toks,
            idx: 0,
            next_ordinal: 0,
        }
    }

    pub fn parse_script(&mut self) -> Result<ast::Script> {
        let mut declarations = vec![];
        loop {
            if self.parse_keyword(Keyword::TABLE) {
                declarations.push(ast::Declaration::Table(self.parse_table_declaration()?));
            } else if self.parse_keyword(Keyword::COUPLE) {
                declarations.push(ast::Declaration::Couple(self.parse_couple_declaration()?));
            } else {
                break;
            }
            self.expect_kind(&TokenKind::Semicolon, "`;`")?;
        }
        let query = self.parse_query()?;
        self.expect_end()?;
        Ok(ast::Script {
            declarations,
            query,
        })
    }

    fn parse_table_declaration(&mut self) -> Result<ast::TableDeclaration> {
        let name = self.parse_ident()?;
        let open = self.expect_kind(&TokenKind::LBrace, "`{`")?;
        let mut columns = vec![];
        loop {
            let col = self.parse_ident()?;
            let type_name = self.parse_string()?;
            columns.push(ast::ColumnDeclaration {
                name: col,
                type_name,
            });
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_close(&TokenKind::RBrace, '{', open)?;
        Ok(ast::TableDeclaration { name, columns })
    }

    fn parse_couple_declaration(&mut self) -> Result<ast::CoupleDeclaration> {
        self.expect_kind(&TokenKind::Hash, "`#`")?;
        let schema = self.parse_ident()?;
        self.expect_kind(&TokenKind::Dot, "`.`")?;
        let method = self.parse_ident()?;
        self.expect_keyword(Keyword::WITH)?;
        self.expect_keyword(Keyword::TABLE)?;
        let table = self.parse_ident()?;
        self.expect_keyword(Keyword::AS)?;
        let alias = self.parse_ident()?;
        Ok(ast::CoupleDeclaration {
            schema,
            method,
            table,
            alias,
        })
    }

    pub fn parse_query(&mut self) -> Result<ast::Query> {
        let mut ctes = vec![];
        if self.parse_keyword(Keyword::WITH) {
            loop {
                let name = self.parse_ident()?;
                self.expect_keyword(Keyword::AS)?;
                let open = self.expect_kind(&TokenKind::LParen, "`(`")?;
                let body = self.parse_body()?;
                self.expect_close(&TokenKind::RParen, '(', open)?;
                ctes.push(ast::Cte { name, body });
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let body = self.parse_body()?;
        Ok(ast::Query { ctes, body })
    }

    fn parse_body(&mut self) -> Result<ast::QueryBody> {
        let mut left = self.parse_operand()?;
        loop {
            let op = if self.parse_keyword(Keyword::UNION) {
                match self.parse_keyword(Keyword::ALL) {
                    true => ast::SetOperator::UnionAll,
                    false => ast::SetOperator::Union,
                }
            } else if self.parse_keyword(Keyword::EXCEPT) {
                ast::SetOperator::Except
            } else if self.parse_keyword(Keyword::INTERSECT) {
                ast::SetOperator::Intersect
            } else {
                return Ok(left);
            };
            let right = self.parse_operand()?;
            left = ast::QueryBody::SetOperation {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_operand(&mut self) -> Result<ast::QueryBody> {
        if let Some(open) = self.consume_span(&TokenKind::LParen) {
            let body = self.parse_body()?;
            self.expect_close(&TokenKind::RParen, '(', open)?;
            return Ok(body);
        }
        self.expect_keyword(Keyword::SELECT)?;
        Ok(ast::QueryBody::Select(Box::new(self.parse_select()?)))
    }

    /// Parse a select block. The `SELECT` keyword has already been consumed.
    fn parse_select(&mut self) -> Result<ast::Select> {
        let distinct = self.parse_keyword(Keyword::DISTINCT);
        let mut items = vec![self.parse_select_item()?];
        while self.consume(&TokenKind::Comma) {
            items.push(self.parse_select_item()?);
        }
        let from = match self.parse_keyword(Keyword::FROM) {
            true => Some(self.parse_from()?),
            false => None,
        };
        let where_clause = match self.parse_keyword(Keyword::WHERE) {
            true => Some(self.parse_expr()?),
            false => None,
        };
        let mut group_by = vec![];
        if self.parse_keyword_sequence(&[Keyword::GROUP, Keyword::BY]) {
            group_by = self.parse_expr_list()?;
        }
        let having = match self.parse_keyword(Keyword::HAVING) {
            true => Some(self.parse_expr()?),
            false => None,
        };
        let mut order_by = vec![];
        if self.parse_keyword_sequence(&[Keyword::ORDER, Keyword::BY]) {
            loop {
                let expr = self.parse_expr()?;
                let descending = if self.parse_keyword(Keyword::DESC) {
                    true
                } else {
                    self.parse_keyword(Keyword::ASC);
                    false
                };
                order_by.push(ast::OrderItem { expr, descending });
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let skip = match self.parse_keyword(Keyword::SKIP) {
            true => Some(self.parse_count()?),
            false => None,
        };
        let take = match self.parse_keyword(Keyword::TAKE) {
            true => Some(self.parse_count()?),
            false => None,
        };
        Ok(ast::Select {
            distinct,
            items,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            skip,
            take,
        })
    }

    fn parse_select_item(&mut self) -> Result<ast::SelectItem> {
        if self.consume(&TokenKind::Operator(Operator::Star)) {
            return Ok(ast::SelectItem::Star);
        }
        let qualified_star = matches!(
            self.peek_n(0).map(|t| &t.kind),
            Some(TokenKind::Identifier(_)) | Some(TokenKind::QuotedIdentifier(_))
        ) && self.peek_n(1).map(|t| &t.kind) == Some(&TokenKind::Dot)
            && self.peek_n(2).map(|t| &t.kind) == Some(&TokenKind::Operator(Operator::Star));
        if qualified_star {
            let q = self.parse_ident()?;
            self.idx += 2;
            return Ok(ast::SelectItem::QualifiedStar(q));
        }
        let expr = self.parse_expr()?;
        let alias = match self.parse_keyword(Keyword::AS) {
            true => Some(self.parse_ident()?),
            false => None,
        };
        Ok(ast::SelectItem::Expr { expr, alias })
    }

    fn parse_from(&mut self) -> Result<ast::FromClause> {
        let first = self.parse_from_factor()?;
        let mut joins = vec![];
        loop {
            let kind = if self.parse_keyword(Keyword::JOIN)
                || self.parse_keyword_sequence(&[Keyword::INNER, Keyword::JOIN])
            {
                ast::JoinKind::Inner
            } else if self.parse_keyword(Keyword::LEFT) {
                self.parse_keyword(Keyword::OUTER);
                self.expect_keyword(Keyword::JOIN)?;
                ast::JoinKind::LeftOuter
            } else if self.parse_keyword(Keyword::RIGHT) {
                self.parse_keyword(Keyword::OUTER);
                self.expect_keyword(Keyword::JOIN)?;
                ast::JoinKind::RightOuter
            } else {
                break;
            };
            let factor = self.parse_from_factor()?;
            self.expect_keyword(Keyword::ON)?;
            let on = self.parse_expr()?;
            joins.push(ast::Join { kind, factor, on });
        }
        Ok(ast::FromClause { first, joins })
    }

    fn parse_from_factor(&mut self) -> Result<ast::FromFactor> {
        if self.consume(&TokenKind::Hash) {
            let schema = self.parse_ident()?;
            self.expect_kind(&TokenKind::Dot, "`.`")?;
            let method = self.parse_ident()?;
            let args = self.parse_call_args()?;
            let alias = self.parse_optional_alias()?;
            let ordinal = self.take_ordinal();
            return Ok(ast::FromFactor::Schema {
                schema,
                method,
                args,
                alias,
                ordinal,
            });
        }
        if let Some(open) = self.consume_span(&TokenKind::LParen) {
            let body = self.parse_body()?;
            self.expect_close(&TokenKind::RParen, '(', open)?;
            self.parse_keyword(Keyword::AS);
            let alias = self.parse_ident()?;
            return Ok(ast::FromFactor::SubQuery {
                body: Box::new(body),
                alias,
            });
        }
        let name = self.parse_ident()?;
        if self.peek_kind() == Some(&TokenKind::LParen) {
            let args = self.parse_call_args()?;
            let alias = self.parse_optional_alias()?;
            let ordinal = self.take_ordinal();
            return Ok(ast::FromFactor::Coupled {
                name,
                args,
                alias,
                ordinal,
            });
        }
        let alias = self.parse_optional_alias()?;
        Ok(ast::FromFactor::Cte { name, alias })
    }

    fn take_ordinal(&mut self) -> usize {
        let o = self.next_ordinal;
        self.next_ordinal += 1;
        o
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.parse_keyword(Keyword::AS) {
            return Ok(Some(self.parse_ident()?));
        }
        match self.peek_kind() {
            Some(TokenKind::Identifier(_)) | Some(TokenKind::QuotedIdentifier(_)) => {
                Ok(Some(self.parse_ident()?))
            }
            _ => Ok(None),
        }
    }

    /// Parse `( [expr (, expr)*] )`. A lone `*` is accepted and means no arguments.
    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        let open = self.expect_kind(&TokenKind::LParen, "`(`")?;
        if self.consume_span(&TokenKind::RParen).is_some() {
            return Ok(vec![]);
        }
        if self.peek_kind() == Some(&TokenKind::Operator(Operator::Star))
            && self.peek_n(1).map(|t| &t.kind) == Some(&TokenKind::RParen)
        {
            self.idx += 2;
            return Ok(vec![]);
        }
        let args = self.parse_expr_list()?;
        self.expect_close(&TokenKind::RParen, '(', open)?;
        Ok(args)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut list = vec![self.parse_expr()?];
        while self.consume(&TokenKind::Comma) {
            list.push(self.parse_expr()?);
        }
        Ok(list)
    }

    fn parse_count(&mut self) -> Result<u64> {
        let tok = self.next_or_end("a row count")?;
        match &tok.kind {
            TokenKind::Number {
                text,
                kind: NumberKind::Integer,
                suffix: None,
            } => text
                .parse::<u64>()
                .map_err(|_| Error::InvalidExpression { span: tok.span }),
            _ => Err(Error::InvalidExpression { span: tok.span }),
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_bp(0)
    }

    /// Parse an expression whose operators all bind tighter than `min_bp`.
    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let (infix, bp, width) = match self.peek_infix() {
                Some(x) => x,
                None => break,
            };
            if bp <= min_bp {
                break;
            }
            self.idx += width;
            lhs = match infix {
                Infix::Binary(op) => Expr::binary(lhs, op, self.parse_expr_bp(bp)?),
                Infix::Is => {
                    let negated = self.parse_keyword(Keyword::NOT);
                    self.expect_keyword(Keyword::NULL)?;
                    Expr::IsNull {
                        expr: Box::new(lhs),
                        negated,
                    }
                }
                Infix::In { negated } => {
                    let open = self.expect_kind(&TokenKind::LParen, "`(`")?;
                    let list = self.parse_expr_list()?;
                    self.expect_close(&TokenKind::RParen, '(', open)?;
                    Expr::InList {
                        expr: Box::new(lhs),
                        list,
                        negated,
                    }
                }
                Infix::Like { negated } => Expr::Like {
                    expr: Box::new(lhs),
                    pattern: Box::new(self.parse_expr_bp(bp)?),
                    negated,
                },
            };
        }
        Ok(lhs)
    }

    /// Look at the next token(s) as an infix operator: returns the operator, its binding power
    /// and the number of tokens it spans.
    fn peek_infix(&self) -> Option<(Infix, u8, usize)> {
        let tok = self.peek_n(0)?;
        let cmp = precedence::COMPARISON;
        match &tok.kind {
            TokenKind::Operator(o) => INFIX_OPERATORS
                .get(o)
                .map(|op| (Infix::Binary(*op), op.precedence(), 1)),
            TokenKind::Keyword(Keyword::AND) => {
                Some((Infix::Binary(BinaryOp::And), precedence::AND, 1))
            }
            TokenKind::Keyword(Keyword::OR) => Some((Infix::Binary(BinaryOp::Or), precedence::OR, 1)),
            TokenKind::Keyword(Keyword::IS) => Some((Infix::Is, cmp, 1)),
            TokenKind::Keyword(Keyword::IN) => Some((Infix::In { negated: false }, cmp, 1)),
            TokenKind::Keyword(Keyword::LIKE) => Some((Infix::Like { negated: false }, cmp, 1)),
            TokenKind::Keyword(Keyword::NOT) => match self.peek_n(1).map(|t| &t.kind) {
                Some(TokenKind::Keyword(Keyword::IN)) => Some((Infix::In { negated: true }, cmp, 2)),
                Some(TokenKind::Keyword(Keyword::LIKE)) => {
                    Some((Infix::Like { negated: true }, cmp, 2))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Operator(Operator::Minus)) => Some((UnaryOp::Negate, precedence::UNARY)),
            Some(TokenKind::Operator(Operator::Tilde)) => Some((UnaryOp::BitNot, precedence::UNARY)),
            Some(TokenKind::Keyword(Keyword::NOT)) => Some((UnaryOp::Not, precedence::NOT)),
            _ => None,
        };
        match op {
            Some((op, bp)) => {
                self.idx += 1;
                let expr = self.parse_expr_bp(bp)?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                })
            }
            None => {
                let mut e = self.parse_primary()?;
                while let Some(open) = self.consume_span(&TokenKind::LBracket) {
                    let index = self.parse_expr()?;
                    self.expect_close(&TokenKind::RBracket, '[', open)?;
                    e = Expr::Index {
                        expr: Box::new(e),
                        index: Box::new(index),
                    };
                }
                Ok(e)
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.next_or_end("an expression")?;
        match tok.kind {
            TokenKind::Number { text, kind, suffix } => {
                Ok(Expr::Literal(ast::Literal::Number { text, kind, suffix }))
            }
            TokenKind::String(s) => Ok(Expr::Literal(ast::Literal::String(s))),
            TokenKind::Keyword(Keyword::NULL) => Ok(Expr::Literal(ast::Literal::Null)),
            TokenKind::Keyword(Keyword::TRUE) => Ok(Expr::Literal(ast::Literal::Bool(true))),
            TokenKind::Keyword(Keyword::FALSE) => Ok(Expr::Literal(ast::Literal::Bool(false))),
            TokenKind::Keyword(Keyword::CASE) => self.parse_case(),
            TokenKind::LParen => {
                let e = self.parse_expr()?;
                self.expect_close(&TokenKind::RParen, '(', tok.span)?;
                Ok(e)
            }
            TokenKind::Identifier(name) | TokenKind::QuotedIdentifier(name) => {
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    return Ok(Expr::Call {
                        qualifier: None,
                        name,
                        args,
                    });
                }
                if !self.consume(&TokenKind::Dot) {
                    return Ok(Expr::Column {
                        qualifier: None,
                        name,
                    });
                }
                let member = self.parse_ident()?;
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    return Ok(Expr::Call {
                        qualifier: Some(name),
                        name: member,
                        args,
                    });
                }
                Ok(Expr::Column {
                    qualifier: Some(name),
                    name: member,
                })
            }
            _ => Err(Error::InvalidExpression { span: tok.span }),
        }
    }

    /// Parse the rest of `CASE WHEN .. THEN .. [ELSE ..] END`.
    fn parse_case(&mut self) -> Result<Expr> {
        let mut whens = vec![];
        while self.parse_keyword(Keyword::WHEN) {
            let cond = self.parse_expr()?;
            self.expect_keyword(Keyword::THEN)?;
            let then = self.parse_expr()?;
            whens.push((cond, then));
        }
        if whens.is_empty() {
            return Err(self.unexpected("WHEN"));
        }
        let otherwise = match self.parse_keyword(Keyword::ELSE) {
            true => Some(Box::new(self.parse_expr()?)),
            false => None,
        };
        self.expect_keyword(Keyword::END)?;
        Ok(Expr::Case { whens, otherwise })
    }

    fn parse_ident(&mut self) -> Result<String> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(s)) | Some(TokenKind::QuotedIdentifier(s)) => {
                let s = s.clone();
                self.idx += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        match self.peek_kind() {
            Some(TokenKind::String(s)) => {
                let s = s.clone();
                self.idx += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("a string literal")),
        }
    }

    /// Parse a single keyword.
    fn parse_keyword(&mut self, keyword: Keyword) -> bool {
        match self.peek_n(0) {
            Some(t) if t.is_keyword(keyword) => {
                self.idx += 1;
                true
            }
            _ => false,
        }
    }

    /// Parse a sequence of keywords. The position is unchanged unless all of them match.
    fn parse_keyword_sequence(&mut self, keywords: &[Keyword]) -> bool {
        let all = keywords
            .iter()
            .enumerate()
            .all(|(i, k)| self.peek_n(i).map(|t| t.is_keyword(*k)).unwrap_or(false));
        if all {
            self.idx += keywords.len();
        }
        all
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        match self.parse_keyword(keyword) {
            true => Ok(()),
            false => Err(self.unexpected(keyword.as_str())),
        }
    }

    fn expect_kind(&mut self, kind: &TokenKind, expected: &str) -> Result<Span> {
        self.consume_span(kind).ok_or_else(|| self.unexpected(expected))
    }

    /// Expect the bracket closing the one opened at `open`.
    fn expect_close(&mut self, kind: &TokenKind, open_ch: char, open: Span) -> Result<Span> {
        match self.peek_n(0) {
            None => Err(Error::UnclosedBracket {
                open: open_ch,
                span: open,
            }),
            Some(_) => self.expect_kind(kind, &format!("`{}`", kind)),
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek_n(0) {
            None => Ok(()),
            Some(_) => Err(self.unexpected("end of query")),
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        self.consume_span(kind).is_some()
    }

    fn consume_span(&mut self, kind: &TokenKind) -> Option<Span> {
        match self.peek_n(0) {
            Some(t) if &t.kind == kind => {
                let span = t.span;
                self.idx += 1;
                Some(span)
            }
            _ => None,
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        match self.peek_n(0) {
            Some(t) => Error::UnexpectedToken {
                found: t.kind.to_string(),
                expected: expected.to_string(),
                span: t.span,
            },
            None => Error::UnexpectedEnd {
                expected: expected.to_string(),
            },
        }
    }

    fn next_or_end(&mut self, expected: &str) -> Result<Token> {
        match self.toks.get(self.idx) {
            Some(t) => {
                self.idx += 1;
                Ok(t.clone())
            }
            None => Err(Error::UnexpectedEnd {
                expected: expected.to_string(),
            }),
        }
    }

    fn peek_n(&self, n: usize) -> Option<&Token> {
        self.toks.get(self.idx + n)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek_n(0).map(|t| &t.kind)
    }
}

#[test]
fn test_round_trip_canonical_queries() {
    let cases = vec![
        "SELECT Name FROM #a.entities() f WHERE f.Name[0] = 'd'",
        "SELECT DISTINCT City FROM #a.entities()",
        "SELECT City, Count(City) FROM #a.entities() GROUP BY City HAVING Count(City) > 1",
        "SELECT a.Name, b.Name FROM #a.entities() a INNER JOIN #b.entities() b ON a.Id = b.Id",
        "SELECT a.* FROM #a.entities() a LEFT OUTER JOIN #b.entities() b ON a.Id = b.Id",
        "SELECT * FROM #a.entities('x', 1) e ORDER BY e.Name DESC, e.Id SKIP 2 TAKE 3",
        "SELECT 1 + 2 * 3, (1 + 2) * 3, -x, ~y, 1 << 2 | 3 & 4 ^ 5 FROM #a.b()",
        "SELECT x FROM #a.b() WHERE NOT x IS NULL AND y IS NOT NULL OR z IN (1, 2, 3)",
        "SELECT x FROM #a.b() WHERE x NOT LIKE 'a%' AND y NOT IN ('q')",
        "SELECT CASE WHEN x > 1 THEN 'big' ELSE 'small' END AS size FROM #a.b()",
        "SELECT x FROM #a.b() UNION ALL SELECT x FROM #a.c() EXCEPT SELECT x FROM #a.d()",
        "SELECT x FROM #a.b() UNION (SELECT x FROM #a.c() INTERSECT SELECT x FROM #a.d())",
        "WITH p AS (SELECT x FROM #a.b()), q AS (SELECT x FROM p) SELECT x FROM q",
        "SELECT s.x FROM (SELECT x FROM #a.b()) s",
        "SELECT 1.5d, 2l, 3m, 0xFF, 2.5, 'it''s', NULL, TRUE, FALSE FROM #a.b()",
        "TABLE Item { Id 'int', Name 'string' };\nCOUPLE #a.items WITH TABLE Item AS Items;\nSELECT Id FROM Items() i",
        "SELECT \"select\", \"two words\" FROM #a.b()",
        "SELECT Length(Name), f.ToUpper(Name) FROM #a.entities() f",
    ];
    for case in cases {
        println!("Running case: {}", case);
        let script = parse_query_text(case).unwrap_or_else(|e| panic!("{}: {}", case, e));
        assert_eq!(script.to_string(), case);
    }
}

#[test]
fn test_reparse_is_structurally_equal() {
    let cases = vec![
        "select   x from #a.b() where (((x)))=1",
        "SELECT x FROM #a.b() b JOIN #a.c() c ON b.x = c.x",
        "SELECT x FROM #a.b() b RIGHT JOIN #a.c() c ON b.x = c.x ORDER BY x ASC",
        "SELECT -(-1), - 2, a - -b, not not x FROM #a.b()",
        "select count(*) from #a.b() as q",
        "(SELECT 1 FROM #a.b()) UNION ((SELECT 2 FROM #a.c()) UNION SELECT 3 FROM #a.d())",
    ];
    for case in cases {
        println!("Running case: {}", case);
        let first = parse_query_text(case).unwrap();
        let printed = first.to_string();
        let second = parse_query_text(&printed).unwrap();
        assert_eq!(first, second, "printed as {}", printed);
        assert!(!printed.contains('\r'));
    }
}

#[test]
fn test_operator_precedence() {
    let cases = vec![
        ("1 + 2 * 3", "1 + 2 * 3"),
        ("a OR b AND c", "a OR b AND c"),
        ("(a OR b) AND c", "(a OR b) AND c"),
        ("NOT a = b", "NOT a = b"),
        ("a + b << 1", "a + b << 1"),
        ("a & (b | c)", "a & (b | c)"),
        ("-a[0]", "-a[0]"),
        ("(-a)[0]", "(-a)[0]"),
    ];
    for (input, expected) in cases {
        println!("Running case: {}", input);
        assert_eq!(parse_expression(input).unwrap().to_string(), expected);
    }
    match parse_expression("1 + 2 * 3").unwrap() {
        Expr::Binary {
            op: BinaryOp::Add,
            rhs,
            ..
        } => assert!(matches!(
            *rhs,
            Expr::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        )),
        e => panic!("unexpected tree {:?}", e),
    }
}

#[test]
fn test_source_ordinals_follow_text_order() {
    let script = parse_query_text(
        "SELECT 1 FROM #a.b() x JOIN (SELECT 1 FROM #a.b() y) z ON 1 = 1 JOIN #a.b() w ON 1 = 1",
    )
    .unwrap();
    let sel = script.query.body.as_select().unwrap();
    let from = sel.from.as_ref().unwrap();
    assert!(matches!(from.first, ast::FromFactor::Schema { ordinal: 0, .. }));
    match &from.joins[0].factor {
        ast::FromFactor::SubQuery { body, .. } => {
            let inner = body.as_select().unwrap().from.as_ref().unwrap();
            assert!(matches!(inner.first, ast::FromFactor::Schema { ordinal: 1, .. }));
        }
        f => panic!("unexpected factor {:?}", f),
    }
    assert!(matches!(
        from.joins[1].factor,
        ast::FromFactor::Schema { ordinal: 2, .. }
    ));
}

#[test]
fn test_syntax_errors() {
    let cases: Vec<(&str, Box<dyn Fn(&Error) -> bool>)> = vec![
        (
            "SELECT FROM #a.b()",
            Box::new(|e| matches!(e, Error::InvalidExpression { span } if span.start == 7)),
        ),
        (
            "SELECT x FROM",
            Box::new(|e| matches!(e, Error::UnexpectedEnd { .. })),
        ),
        (
            "SELECT (1 + 2",
            Box::new(|e| matches!(e, Error::UnclosedBracket { open: '(', span } if span.start == 7)),
        ),
        (
            "SELECT x FROM #a.b() c WHERE",
            Box::new(|e| matches!(e, Error::UnexpectedEnd { .. })),
        ),
        (
            "SELECT x FROM #a.b() LEFT c",
            Box::new(|e| matches!(e, Error::UnexpectedToken { expected, .. } if expected == "JOIN")),
        ),
        (
            "SELECT x FROM #a.b() TAKE 'x'",
            Box::new(|e| matches!(e, Error::InvalidExpression { .. })),
        ),
        (
            "SELECT x ?",
            Box::new(|e| matches!(e, Error::Lexical(lexer::Error::UnrecognizedCharacter { ch: '?', .. }))),
        ),
        (
            "SELECT x FROM #a.b();",
            Box::new(|e| matches!(e, Error::UnexpectedToken { found, .. } if found == ";")),
        ),
    ];
    for (input, check) in cases {
        println!("Running case: {}", input);
        match parse_query_text(input) {
            Ok(s) => panic!("{} parsed as {}", input, s),
            Err(e) => assert!(check(&e), "{} gave {:?}", input, e),
        }
    }
}
