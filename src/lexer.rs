pub use logos::Span;
use logos::{Lexer, Logos};

fn process_string(lexer: &mut Lexer<Token>) -> Result<Box<str>, LexerError> {
    // Our string syntax is described by /"([^\\"]|\\[abtnr"\\])*"/
    // We use a more permissive version of this on the Logos side, so that errors are neater.

    let mut string = String::new();

    // Skip the opening quote
    let mut chars = lexer.slice().chars().skip(1).peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('a') => string.push('\x07'),
                Some('b') => string.push('\x08'),
                Some('t') => string.push('\t'),
                Some('n') => string.push('\n'),
                Some('r') => string.push('\r'),
                Some('\\') => string.push('\\'),
                Some('"') => string.push('"'),
                Some(_) | None => Err(LexerError::MalformedString)?,
            },
            c => string.push(c),
        }
    }

    debug_assert!(chars.next().is_none());
    Ok(Box::from(string.as_str()))
}

fn read_number(lexer: &mut Lexer<Token>) -> Result<f64, LexerError> {
    lexer
        .slice()
        .parse()
        .map_err(|_| LexerError::MalformedNumber)
}

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexerError {
    #[default]
    #[error("invalid token encountered")]
    Invalid,
    #[error("malformed string")]
    MalformedString,
    #[error("malformed number")]
    MalformedNumber,
}

/// Tokens are lexed from some source.
///
/// Whitespace and `;` comments never reach the reader.
#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(error = LexerError)]
#[logos(skip r"([ \t\r\n\f]+|;[^\n]*)")]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[regex(r#"[a-zA-Z!$%&*/:<=>?^_~][0-9a-zA-Z!$%&*/:<=>?^_~+\-.@]*"#, |l| Box::from(l.slice()))]
    #[token("+", |l| Box::from(l.slice()))]
    #[token("-", |l| Box::from(l.slice()))]
    #[regex(r"[-+][a-zA-Z!$%&*/:<=>?^_~+\-@][0-9a-zA-Z!$%&*/:<=>?^_~+\-.@]*", |l| Box::from(l.slice()))]
    Identifier(Box<str>),
    #[regex(r#""([^\\"]|\\.)*""#, process_string)]
    String(Box<str>),
    #[regex(r"[+-]?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", read_number)]
    Number(f64),
}

impl Token {
    pub fn lexer(source: &str) -> Lexer<Self> {
        <Self as Logos>::lexer(source)
    }
}
