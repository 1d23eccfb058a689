//! The error returned by the engine's entry points.

use thiserror::Error;

use crate::token::Span;
use crate::{ast_to_ir, codegen, lexer, parser, runtime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Semantic,
    Generation,
    Execution,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Lexical(#[from] lexer::Error),
    #[error(transparent)]
    Syntax(parser::Error),
    #[error(transparent)]
    Semantic(#[from] ast_to_ir::Error),
    #[error(transparent)]
    Generation(codegen::Error),
    #[error(transparent)]
    Execution(runtime::Error),
    #[error("The query was cancelled.")]
    Cancelled,
}

impl From<parser::Error> for Error {
    fn from(e: parser::Error) -> Self {
        match e {
            parser::Error::Lexical(e) => Error::Lexical(e),
            e => Error::Syntax(e),
        }
    }
}

impl From<codegen::Error> for Error {
    fn from(e: codegen::Error) -> Self {
        match e {
            codegen::Error::Cancelled => Error::Cancelled,
            e => Error::Generation(e),
        }
    }
}

impl From<runtime::Error> for Error {
    fn from(e: runtime::Error) -> Self {
        match e {
            runtime::Error::Cancelled => Error::Cancelled,
            e => Error::Execution(e),
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Lexical(_) => ErrorKind::Lexical,
            Error::Syntax(_) => ErrorKind::Syntax,
            Error::Semantic(_) => ErrorKind::Semantic,
            Error::Generation(_) => ErrorKind::Generation,
            Error::Execution(_) => ErrorKind::Execution,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Where in the query text the error was found, for lexical and syntax errors.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Lexical(e) => Some(e.span()),
            Error::Syntax(e) => e.span(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[test]
fn test_error_kinds() {
    let cases = vec![
        ("SELECT 'abc", ErrorKind::Lexical),
        ("SELECT FROM", ErrorKind::Syntax),
        ("SELECT (1", ErrorKind::Syntax),
    ];
    for (text, kind) in cases {
        println!("Running case: {}", text);
        let e = Error::from(parser::parse_query_text(text).unwrap_err());
        assert_eq!(e.kind(), kind);
    }
    assert_eq!(Error::from(codegen::Error::Cancelled).kind(), ErrorKind::Cancelled);
    assert_eq!(Error::from(runtime::Error::Cancelled).kind(), ErrorKind::Cancelled);
    assert_eq!(
        Error::from(ast_to_ir::Error::UnknownSchema("z".to_string())).kind(),
        ErrorKind::Semantic
    );
}

#[test]
fn test_lexical_errors_carry_a_span() {
    let e = Error::from(parser::parse_query_text("SELECT 1 ? 2").unwrap_err());
    assert_eq!(e.kind(), ErrorKind::Lexical);
    assert!(e.span().is_some());
}
