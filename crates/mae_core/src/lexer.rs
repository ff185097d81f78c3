//! Tokenizer for MAE text.
//!
//! The lexer is a lazy iterator over borrowed input. It is `Clone`, so a
//! caller can snapshot a stream and resume from the same point later.

use std::borrow::Cow;

use crate::error::{MaeError, Position, Result};

pub const SEPARATOR: &str = ":::";
pub const UNDEFINED: &str = "<>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    OpenBrace,
    CloseBrace,
    /// The `:::` marker between a header list and its values.
    Separator,
    /// The unquoted `<>` marker.
    Undefined,
    Word,
    Number,
    Quoted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Token text; for quoted strings this is the unescaped contents.
    pub text: Cow<'a, str>,
    pub position: Position,
}

impl Token<'_> {
    /// True for tokens that can stand as a cell value.
    pub fn is_value(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Word | TokenKind::Number | TokenKind::Quoted | TokenKind::Undefined
        )
    }

    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::OpenBrace => "'{'".to_string(),
            TokenKind::CloseBrace => "'}'".to_string(),
            TokenKind::Separator => "':::'".to_string(),
            TokenKind::Quoted => format!("\"{}\"", self.text),
            _ => format!("'{}'", self.text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    index: usize,
    line: usize,
    line_start: usize,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            index: 0,
            line: 1,
            line_start: 0,
            failed: false,
        }
    }

    /// Position of the next unread byte.
    pub fn location(&self) -> Position {
        Position {
            line: self.line,
            column: self.index - self.line_start + 1,
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn newline_at(&mut self, index: usize) {
        self.line += 1;
        self.line_start = index + 1;
    }

    fn skip_trivia(&mut self) -> Result<()> {
        let bytes = self.bytes();
        while self.index < bytes.len() {
            match bytes[self.index] {
                b'\n' => {
                    self.newline_at(self.index);
                    self.index += 1;
                }
                b' ' | b'\t' | b'\r' => self.index += 1,
                b'#' => {
                    let start = self.location();
                    self.index += 1;
                    loop {
                        match bytes.get(self.index) {
                            None => return Err(MaeError::lex("unterminated comment", start)),
                            Some(b'#') => {
                                self.index += 1;
                                break;
                            }
                            Some(b'\n') => {
                                self.newline_at(self.index);
                                self.index += 1;
                            }
                            Some(_) => self.index += 1,
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn quoted(&mut self) -> Result<Token<'a>> {
        let input = self.input;
        let bytes = self.bytes();
        let position = self.location();
        self.index += 1;
        let content_start = self.index;
        let mut segment_start = content_start;
        let mut owned: Option<String> = None;

        loop {
            match bytes.get(self.index) {
                None => return Err(MaeError::lex("unterminated quoted string", position)),
                Some(b'"') => break,
                Some(b'\\') if matches!(bytes.get(self.index + 1), Some(b'"' | b'\\')) => {
                    let buf = owned.get_or_insert_with(String::new);
                    buf.push_str(&input[segment_start..self.index]);
                    buf.push(bytes[self.index + 1] as char);
                    self.index += 2;
                    segment_start = self.index;
                }
                Some(b'\n') => {
                    self.newline_at(self.index);
                    self.index += 1;
                }
                Some(_) => self.index += 1,
            }
        }

        let end = self.index;
        self.index += 1; // closing quote
        let text = match owned {
            Some(mut buf) => {
                buf.push_str(&input[segment_start..end]);
                Cow::Owned(buf)
            }
            None => Cow::Borrowed(&input[content_start..end]),
        };
        Ok(Token {
            kind: TokenKind::Quoted,
            text,
            position,
        })
    }

    fn bare(&mut self) -> Token<'a> {
        let bytes = self.bytes();
        let position = self.location();
        let start = self.index;
        while self.index < bytes.len() && !is_delimiter(bytes[self.index]) {
            self.index += 1;
        }
        let text = &self.input[start..self.index];
        let kind = match text {
            SEPARATOR => TokenKind::Separator,
            UNDEFINED => TokenKind::Undefined,
            _ if looks_numeric(text) => TokenKind::Number,
            _ => TokenKind::Word,
        };
        Token {
            kind,
            text: Cow::Borrowed(text),
            position,
        }
    }

    fn single(&mut self, kind: TokenKind, text: &'static str) -> Token<'a> {
        let position = self.location();
        self.index += 1;
        Token {
            kind,
            text: Cow::Borrowed(text),
            position,
        }
    }

    fn advance(&mut self) -> Option<Result<Token<'a>>> {
        if let Err(err) = self.skip_trivia() {
            return Some(Err(err));
        }
        let byte = *self.bytes().get(self.index)?;
        let token = match byte {
            b'{' => self.single(TokenKind::OpenBrace, "{"),
            b'}' => self.single(TokenKind::CloseBrace, "}"),
            b'"' => return Some(self.quoted()),
            _ => self.bare(),
        };
        Some(Ok(token))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.advance();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b' ' | b'\t' | b'\r' | b'\n' | b'{' | b'}' | b'"' | b'#'
    )
}

fn looks_numeric(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    let leading = digits.strip_prefix('.').unwrap_or(digits);
    leading.starts_with(|c: char| c.is_ascii_digit()) && text.parse::<f64>().is_ok()
}

/// Whether `text` can be written without quotes and read back unchanged.
pub fn is_bare_safe(text: &str) -> bool {
    !text.is_empty()
        && text != SEPARATOR
        && text != UNDEFINED
        && !text.bytes().any(is_delimiter)
        && !text.contains('\\')
}
