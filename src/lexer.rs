//! `lexer` turns query text into a stream of `Token`s.
//!
//! Tokens are recognized by the pest grammar in `sql.pest`, applied at each
//! position of the input. The lexer is lazy: nothing is scanned until the
//! iterator is advanced, and each call to `tokenize` starts over.

use pest::Parser;
use thiserror::Error;

use crate::token::{self, NumberKind, NumericSuffix, Operator, Span, Token, TokenKind};

#[derive(Parser)]
#[grammar = "sql.pest"]
struct TokenGrammar;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unrecognized character {ch:?} at {span}.")]
    UnrecognizedCharacter { ch: char, span: Span },
    #[error("Unterminated literal starting at {span}.")]
    UnterminatedLiteral { span: Span },
    #[error("Unterminated comment starting at {span}.")]
    UnterminatedComment { span: Span },
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Error::UnrecognizedCharacter { span, .. }
            | Error::UnterminatedLiteral { span }
            | Error::UnterminatedComment { span } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Stop at the first invalid input.
    Strict,
    /// Emit `TokenKind::Error` for invalid input and keep going.
    Recovery,
}

pub struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    mode: Mode,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str, mode: Mode) -> Self {
        Lexer {
            text,
            pos: 0,
            mode,
            failed: false,
        }
    }

    /// Turn an error at the current position into either an error token (recovery
    /// mode) or a terminal error.
    fn fail(&mut self, err: Error) -> Option<Result<Token, Error>> {
        match self.mode {
            Mode::Strict => {
                self.failed = true;
                Some(Err(err))
            }
            Mode::Recovery => {
                let start = self.pos;
                let ch = self.text[start..].chars().next()?;
                self.pos += ch.len_utf8();
                Some(Ok(Token {
                    kind: TokenKind::Error(ch),
                    span: Span::new(start, self.pos),
                }))
            }
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed || self.pos >= self.text.len() {
                return None;
            }
            let rest = &self.text[self.pos..];
            let start = self.pos;
            let pair = match TokenGrammar::parse(Rule::token, rest)
                .ok()
                .and_then(|mut pairs| pairs.next())
                .and_then(|tok| tok.into_inner().next())
            {
                Some(p) => p,
                None => {
                    // Nothing matched, so the input starts with a character no rule accepts.
                    let ch = rest.chars().next()?;
                    let span = Span::new(start, start + ch.len_utf8());
                    return self.fail(Error::UnrecognizedCharacter { ch, span });
                }
            };
            let matched = pair.as_str();
            let end = start + matched.len();
            let span = Span::new(start, end);
            let kind = match pair.as_rule() {
                Rule::whitespace | Rule::line_comment | Rule::block_comment => {
                    self.pos = end;
                    continue;
                }
                Rule::unterminated_comment => {
                    return self.fail(Error::UnterminatedComment { span });
                }
                Rule::unterminated_string | Rule::unterminated_identifier => {
                    return self.fail(Error::UnterminatedLiteral { span });
                }
                Rule::hex_literal => TokenKind::Number {
                    text: matched.to_string(),
                    kind: NumberKind::Hex,
                    suffix: None,
                },
                Rule::real_literal => number_token(matched, NumberKind::Real),
                Rule::integer_literal => number_token(matched, NumberKind::Integer),
                Rule::string_literal => TokenKind::String(unquote(matched, '\'')),
                Rule::quoted_identifier => TokenKind::QuotedIdentifier(unquote(matched, '"')),
                Rule::word => match token::keyword_from_str(matched) {
                    Some(k) => TokenKind::Keyword(k),
                    None => TokenKind::Identifier(matched.to_string()),
                },
                Rule::operator => match Operator::from_text(matched) {
                    Some(op) => TokenKind::Operator(op),
                    None => unreachable!("grammar accepted unknown operator {}", matched),
                },
                Rule::punctuation => match matched {
                    "(" => TokenKind::LParen,
                    ")" => TokenKind::RParen,
                    "[" => TokenKind::LBracket,
                    "]" => TokenKind::RBracket,
                    "{" => TokenKind::LBrace,
                    "}" => TokenKind::RBrace,
                    "," => TokenKind::Comma,
                    "." => TokenKind::Dot,
                    ";" => TokenKind::Semicolon,
                    "#" => TokenKind::Hash,
                    p => unreachable!("grammar accepted unknown punctuation {}", p),
                },
                r => unreachable!("unexpected token rule {:?}", r),
            };
            self.pos = end;
            return Some(Ok(Token { kind, span }));
        }
    }
}

fn number_token(matched: &str, kind: NumberKind) -> TokenKind {
    let suffix = matched.chars().last().and_then(NumericSuffix::from_char);
    let text = match suffix {
        Some(_) => &matched[..matched.len() - 1],
        None => matched,
    };
    TokenKind::Number {
        text: text.to_string(),
        kind,
        suffix,
    }
}

/// Strip the surrounding quotes and collapse doubled quote characters.
fn unquote(matched: &str, quote: char) -> String {
    let inner = &matched[1..matched.len() - 1];
    let doubled: String = [quote, quote].iter().collect();
    inner.replace(&doubled, &quote.to_string())
}

/// Tokenize `text`, failing on the first invalid character.
pub fn tokenize(text: &str) -> Result<Vec<Token>, Error> {
    Lexer::new(text, Mode::Strict).collect()
}

/// Tokenize `text`, turning invalid input into `TokenKind::Error` tokens.
pub fn tokenize_with_recovery(text: &str) -> Vec<Token> {
    Lexer::new(text, Mode::Recovery)
        .filter_map(|r| r.ok())
        .collect()
}

#[cfg(test)]
fn kinds(text: &str) -> Vec<TokenKind> {
    tokenize(text)
        .unwrap_or_else(|e| panic!("tokenize {:?} failed: {}", text, e))
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn test_tokenize_simple_select() {
    use token::Keyword;
    let got = kinds("SELECT Name FROM #a.entities() f");
    let expected = vec![
        TokenKind::Keyword(Keyword::SELECT),
        TokenKind::Identifier("Name".to_string()),
        TokenKind::Keyword(Keyword::FROM),
        TokenKind::Hash,
        TokenKind::Identifier("a".to_string()),
        TokenKind::Dot,
        TokenKind::Identifier("entities".to_string()),
        TokenKind::LParen,
        TokenKind::RParen,
        TokenKind::Identifier("f".to_string()),
    ];
    assert_eq!(got, expected);
}

#[test]
fn test_tokenize_literals() {
    let cases = vec![
        (
            "42",
            TokenKind::Number {
                text: "42".to_string(),
                kind: NumberKind::Integer,
                suffix: None,
            },
        ),
        (
            "42l",
            TokenKind::Number {
                text: "42".to_string(),
                kind: NumberKind::Integer,
                suffix: Some(NumericSuffix::Long),
            },
        ),
        (
            "0x1F",
            TokenKind::Number {
                text: "0x1F".to_string(),
                kind: NumberKind::Hex,
                suffix: None,
            },
        ),
        (
            "2.5",
            TokenKind::Number {
                text: "2.5".to_string(),
                kind: NumberKind::Real,
                suffix: None,
            },
        ),
        (
            "1m",
            TokenKind::Number {
                text: "1".to_string(),
                kind: NumberKind::Integer,
                suffix: Some(NumericSuffix::Decimal),
            },
        ),
        ("'it''s'", TokenKind::String("it's".to_string())),
        ("\"odd \"\"name\"\"\"", TokenKind::QuotedIdentifier("odd \"name\"".to_string())),
    ];
    for (input, expected) in cases {
        println!("Running case: {}", input);
        assert_eq!(kinds(input), vec![expected]);
    }
}

#[test]
fn test_tokenize_multichar_operators() {
    let got = kinds("a <= b <> c << 2 => d != e >> 1");
    let ops: Vec<Operator> = got
        .into_iter()
        .filter_map(|k| match k {
            TokenKind::Operator(o) => Some(o),
            _ => None,
        })
        .collect();
    assert_eq!(
        ops,
        vec![
            Operator::LtEq,
            Operator::NotEq,
            Operator::ShiftLeft,
            Operator::Arrow,
            Operator::NotEq,
            Operator::ShiftRight
        ]
    );
}

#[test]
fn test_comments_and_whitespace_produce_no_tokens() {
    let got = kinds("select -- trailing\n 1 /* block\n comment */ + 2");
    assert_eq!(got.len(), 4);
}

#[test]
fn test_spans_do_not_overlap() {
    let toks = tokenize("select a.b, 'x' from t where c >= 10").unwrap();
    for w in toks.windows(2) {
        assert!(w[0].span.end <= w[1].span.start);
    }
    assert_eq!(toks[0].span, Span::new(0, 6));
}

#[test]
fn test_strict_mode_fails_on_bad_character() {
    let cases = vec![
        ("select ?", Error::UnrecognizedCharacter { ch: '?', span: Span::new(7, 8) }),
        ("select 'abc", Error::UnterminatedLiteral { span: Span::new(7, 11) }),
        ("select /* x", Error::UnterminatedComment { span: Span::new(7, 11) }),
    ];
    for (input, expected) in cases {
        println!("Running case: {}", input);
        assert_eq!(tokenize(input), Err(expected));
    }
}

#[test]
fn test_recovery_mode_emits_error_tokens() {
    let toks = tokenize_with_recovery("select ? a");
    let got: Vec<TokenKind> = toks.into_iter().map(|t| t.kind).collect();
    assert_eq!(
        got,
        vec![
            TokenKind::Keyword(token::Keyword::SELECT),
            TokenKind::Error('?'),
            TokenKind::Identifier("a".to_string()),
        ]
    );
    let toks = tokenize_with_recovery("'abc");
    assert_eq!(toks[0].kind, TokenKind::Error('\''));
    assert_eq!(toks[1].kind, TokenKind::Identifier("abc".to_string()));
}

#[test]
fn test_tokenize_restarts_per_call() {
    let text = "select 1";
    assert_eq!(tokenize(text), tokenize(text));
}
