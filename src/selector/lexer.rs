use std::{fmt, iter::Peekable, str::CharIndices};

use super::SelectorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum TokenKind {
    Ident(String),
    Literal(String),
    Eq,
    NotEq,
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
    Is,
    Null,
    In,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "{name}"),
            TokenKind::Literal(value) => write!(f, "'{value}'"),
            TokenKind::Eq => write!(f, "="),
            TokenKind::NotEq => write!(f, "<>"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::And => write!(f, "and"),
            TokenKind::Or => write!(f, "or"),
            TokenKind::Not => write!(f, "not"),
            TokenKind::Is => write!(f, "is"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::In => write!(f, "in"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character of the token.
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, position: usize) -> Self {
        Self { kind, position }
    }
}

pub(super) fn tokenize(input: &str) -> Result<Vec<Token>, SelectorError> {
    let mut lexer = Lexer {
        chars: input.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    tokens.push(Token::new(TokenKind::Eof, input.len()));
    Ok(tokens)
}

struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl Lexer<'_> {
    fn next_token(&mut self) -> Result<Option<Token>, SelectorError> {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}

        let Some((position, c)) = self.chars.next() else {
            return Ok(None);
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '=' => TokenKind::Eq,
            '<' => match self.chars.next_if(|(_, c)| *c == '>') {
                Some(_) => TokenKind::NotEq,
                None => return Err(SelectorError::new(position, "<", "expected '<>'")),
            },
            '\'' => TokenKind::Literal(self.literal(position)?),
            c if is_ident_start(c) => keyword_or_ident(self.ident(c)),
            other => {
                return Err(SelectorError::new(
                    position,
                    other.to_string(),
                    "unexpected character",
                ));
            }
        };
        Ok(Some(Token::new(kind, position)))
    }

    /// Reads a single-quoted literal; `''` inside the literal is an escaped quote.
    fn literal(&mut self, start: usize) -> Result<String, SelectorError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\'')) => {
                    if self.chars.next_if(|(_, c)| *c == '\'').is_some() {
                        value.push('\'');
                    } else {
                        return Ok(value);
                    }
                }
                Some((_, c)) => value.push(c),
                None => {
                    return Err(SelectorError::new(
                        start,
                        format!("'{value}"),
                        "unterminated string literal",
                    ));
                }
            }
        }
    }

    fn ident(&mut self, first: char) -> String {
        let mut ident = String::from(first);
        while let Some((_, c)) = self.chars.next_if(|(_, c)| is_ident_part(*c)) {
            ident.push(c);
        }
        ident
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'
}

fn keyword_or_ident(ident: String) -> TokenKind {
    match ident.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "is" => TokenKind::Is,
        "null" => TokenKind::Null,
        "in" => TokenKind::In,
        _ => TokenKind::Ident(ident),
    }
}
