use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::{io, result};

use thiserror::Error;

pub type Result<T, E = MaeError> = result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("I/O error")]
    Io,
    #[error("lex error")]
    Lex,
    #[error("schema error")]
    Schema,
    #[error("type error")]
    Type,
    #[error("validation error")]
    Validation,
}

/// Source position of a token, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug)]
pub struct MaeError {
    kind: ErrorKind,
    message: Cow<'static, str>,
    position: Option<Position>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl MaeError {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
            path: None,
            source: None,
        }
    }

    pub fn io(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn lex(message: impl Into<Cow<'static, str>>, position: Position) -> Self {
        Self::new(ErrorKind::Lex, message).at(position)
    }

    pub fn schema(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    pub fn type_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn line(&self) -> Option<usize> {
        self.position.map(|pos| pos.line)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Attach a source position unless one is already recorded.
    pub fn at(mut self, position: Position) -> Self {
        self.position.get_or_insert(position);
        self
    }

    /// Prefix the message with where the failure happened.
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message).into();
        self
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for MaeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(position) = &self.position {
            write!(f, " at {position}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for MaeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<io::Error> for MaeError {
    fn from(err: io::Error) -> Self {
        MaeError::io(err.to_string()).with_source(err)
    }
}

impl From<std::string::FromUtf8Error> for MaeError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        MaeError::io(format!("input is not valid UTF-8: {err}")).with_source(err)
    }
}

impl From<tempfile::PersistError> for MaeError {
    fn from(err: tempfile::PersistError) -> Self {
        MaeError::io(format!("failed to move output into place: {}", err.error)).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_includes_position_and_path() {
        let err = MaeError::lex("unterminated quoted string", Position { line: 4, column: 7 })
            .with_path("demo.mae");
        assert_eq!(
            err.to_string(),
            "lex error: unterminated quoted string at line 4, column 7 (demo.mae)"
        );
        assert_eq!(err.line(), Some(4));
    }

    #[test]
    fn first_position_wins() {
        let err = MaeError::schema("bad row")
            .at(Position { line: 2, column: 1 })
            .at(Position { line: 9, column: 1 });
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = MaeError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.source().is_some());
    }
}
