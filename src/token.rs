//! `token` defines the lexical units produced by the lexer and consumed by the parser.

use std::collections::HashMap;

/// Byte range of a token or syntax element within the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// 1-based line and column of the start of the span.
    pub fn line_col(&self, text: &str) -> (usize, usize) {
        let before = &text[..self.start.min(text.len())];
        let line = before.matches('\n').count() + 1;
        let col = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0) + 1;
        (line, col)
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Generate an enum of keywords and the table used to look them up.
macro_rules! define_keywords {
    ($($ident:ident),*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($ident),*
        }

        impl Keyword {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Keyword::$ident => stringify!($ident)),*
                }
            }
        }

        lazy_static::lazy_static! {
            static ref KEYWORDS: HashMap<&'static str, Keyword> = {
                let mut m = HashMap::new();
                $(m.insert(stringify!($ident), Keyword::$ident);)*
                m
            };
        }
    };
}

#[rustfmt::skip]
define_keywords!(
    ALL, AND, AS, ASC, BY, CASE, COUPLE, DESC, DISTINCT, ELSE, END, EXCEPT, FALSE, FROM, GROUP,
    HAVING, IN, INNER, INTERSECT, IS, JOIN, LEFT, LIKE, NOT, NULL, ON, OR, ORDER, OUTER, RIGHT,
    SELECT, SKIP, TABLE, TAKE, THEN, TRUE, UNION, WHEN, WHERE, WITH
);

/// Try to get a keyword from a word, ignoring case.
pub fn keyword_from_str(s: &str) -> Option<Keyword> {
    KEYWORDS.get(s.to_ascii_uppercase().as_str()).copied()
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    ShiftLeft,
    ShiftRight,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
}

impl Operator {
    pub fn from_text(s: &str) -> Option<Operator> {
        use Operator::*;
        Some(match s {
            "=" => Eq,
            "<>" | "!=" => NotEq,
            "<" => Lt,
            "<=" => LtEq,
            ">" => Gt,
            ">=" => GtEq,
            "<<" => ShiftLeft,
            ">>" => ShiftRight,
            "=>" => Arrow,
            "+" => Plus,
            "-" => Minus,
            "*" => Star,
            "/" => Slash,
            "%" => Percent,
            "&" => Ampersand,
            "|" => Pipe,
            "^" => Caret,
            "~" => Tilde,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        use Operator::*;
        match self {
            Eq => "=",
            NotEq => "<>",
            Lt => "<",
            LtEq => "<=",
            Gt => ">",
            GtEq => ">=",
            ShiftLeft => "<<",
            ShiftRight => ">>",
            Arrow => "=>",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Ampersand => "&",
            Pipe => "|",
            Caret => "^",
            Tilde => "~",
        }
    }
}

/// How a numeric literal was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberKind {
    Integer,
    Hex,
    Real,
}

/// Type suffix of a numeric literal: `l` long, `d` double, `m` decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericSuffix {
    Long,
    Double,
    Decimal,
}

impl NumericSuffix {
    pub fn from_char(c: char) -> Option<NumericSuffix> {
        match c.to_ascii_lowercase() {
            'l' => Some(NumericSuffix::Long),
            'd' => Some(NumericSuffix::Double),
            'm' => Some(NumericSuffix::Decimal),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            NumericSuffix::Long => 'l',
            NumericSuffix::Double => 'd',
            NumericSuffix::Decimal => 'm',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier(String),
    /// A double-quoted identifier, with quotes removed and escapes resolved.
    QuotedIdentifier(String),
    Number {
        text: String,
        kind: NumberKind,
        suffix: Option<NumericSuffix>,
    },
    /// A single-quoted string, with quotes removed and escapes resolved.
    String(String),
    Operator(Operator),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semicolon,
    Hash,
    /// Emitted only in recovery mode, for a character that starts no valid token.
    Error(char),
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Keyword(k) => k.fmt(f),
            TokenKind::Identifier(s) => s.fmt(f),
            TokenKind::QuotedIdentifier(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            TokenKind::Number { text, suffix, .. } => match suffix {
                Some(s) => write!(f, "{}{}", text, s.as_char()),
                None => text.fmt(f),
            },
            TokenKind::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            TokenKind::Operator(o) => o.as_str().fmt(f),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::LBracket => f.write_str("["),
            TokenKind::RBracket => f.write_str("]"),
            TokenKind::LBrace => f.write_str("{"),
            TokenKind::RBrace => f.write_str("}"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Semicolon => f.write_str(";"),
            TokenKind::Hash => f.write_str("#"),
            TokenKind::Error(c) => write!(f, "<error {c:?}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }
}

#[test]
fn test_keyword_lookup_ignores_case() {
    assert_eq!(keyword_from_str("select"), Some(Keyword::SELECT));
    assert_eq!(keyword_from_str("CoUpLe"), Some(Keyword::COUPLE));
    assert_eq!(keyword_from_str("entities"), None);
}

#[test]
fn test_span_line_col() {
    let text = "select a\nfrom b";
    assert_eq!(Span::new(0, 6).line_col(text), (1, 1));
    assert_eq!(Span::new(9, 13).line_col(text), (2, 1));
    assert_eq!(Span::new(11, 13).line_col(text), (2, 3));
}
