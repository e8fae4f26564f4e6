//! Reading starts where the lexer dropped off, and handles nested lists, forming
//! the [`Ast`] the compiler consumes.
use crate::{
    ast::Ast,
    lexer::{LexerError, Span, Token},
};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReadErrorKind {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("unexpected `)`")]
    UnexpectedClose,
    #[error("list is never closed")]
    UnclosedList,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{kind} at {span:?}")]
pub struct ReadError {
    pub kind: ReadErrorKind,
    /// where in the source the problem is
    pub span: Span,
}

impl ReadError {
    fn new(kind: impl Into<ReadErrorKind>, span: Span) -> Self {
        Self {
            kind: kind.into(),
            span,
        }
    }
}

/// Reads every top-level datum of `source`
pub fn read(source: &str) -> Result<Vec<Ast>, ReadError> {
    // lists that are still open, with the span of their opening paren
    let mut open: Vec<(Span, Vec<Ast>)> = vec![];
    let mut top_level = vec![];

    for (token, span) in Token::lexer(source).spanned() {
        let node = match token {
            Err(err) => return Err(ReadError::new(err, span)),
            Ok(Token::LParen) => {
                open.push((span, vec![]));
                continue;
            }
            Ok(Token::RParen) => {
                let Some((_, items)) = open.pop() else {
                    return Err(ReadError::new(ReadErrorKind::UnexpectedClose, span));
                };
                Ast::List(items)
            }
            Ok(Token::Number(n)) => Ast::Number(n),
            Ok(Token::String(s)) => Ast::String(s),
            Ok(Token::Identifier(name)) => Ast::Symbol(name),
        };

        match open.last_mut() {
            Some((_, items)) => items.push(node),
            None => top_level.push(node),
        }
    }

    if let Some((span, _)) = open.pop() {
        return Err(ReadError::new(ReadErrorKind::UnclosedList, span));
    }

    Ok(top_level)
}

/// Reads `source` as a whole program, wrapped in the implicit top-level block
pub fn read_program(source: &str) -> Result<Ast, ReadError> {
    read(source).map(Ast::program)
}
