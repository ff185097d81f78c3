//! Typed cell values and the prefix convention that types them.
//!
//! Every MAE property name starts with a one-letter type tag (`b_`, `i_`,
//! `r_`, `s_`). The tag is parsed once into [`ValueKind`] when a
//! [`PropertyName`] is built and travels with the name from then on.

use std::borrow::{Borrow, Cow};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{MaeError, Result};
use crate::lexer::{self, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    Integer,
    Real,
    String,
}

impl ValueKind {
    pub fn from_prefix(tag: char) -> Option<Self> {
        match tag {
            'b' => Some(ValueKind::Boolean),
            'i' => Some(ValueKind::Integer),
            'r' => Some(ValueKind::Real),
            's' => Some(ValueKind::String),
            _ => None,
        }
    }

    pub fn prefix(self) -> char {
        match self {
            ValueKind::Boolean => 'b',
            ValueKind::Integer => 'i',
            ValueKind::Real => 'r',
            ValueKind::String => 's',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Real => "real",
            ValueKind::String => "string",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property or column name together with the type its prefix declares.
///
/// Equality and hashing only look at the full name, so maps keyed by
/// `PropertyName` can be queried with a plain `&str`.
#[derive(Debug, Clone)]
pub struct PropertyName {
    full: String,
    kind: ValueKind,
}

impl PropertyName {
    /// Parse a prefixed name such as `r_m_x_coord`.
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let kind = ValueKind::from_prefix(chars.next()?)?;
        let rest = chars.as_str().strip_prefix('_')?;
        if rest.is_empty() || !lexer::is_bare_safe(rest) {
            return None;
        }
        Some(Self {
            full: name.to_string(),
            kind,
        })
    }

    /// Build a name from a kind and the unprefixed stem, e.g.
    /// `(Real, "m_x_coord")` gives `r_m_x_coord`.
    pub fn new(kind: ValueKind, stem: &str) -> Result<Self> {
        let full = format!("{}_{}", kind.prefix(), stem);
        Self::parse(&full)
            .ok_or_else(|| MaeError::validation(format!("invalid property name '{full}'")))
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The name without its type tag.
    pub fn stem(&self) -> &str {
        &self.full[2..]
    }

    /// Same stem, different declared kind.
    pub fn with_kind(&self, kind: ValueKind) -> Self {
        if kind == self.kind {
            return self.clone();
        }
        Self {
            full: format!("{}_{}", kind.prefix(), self.stem()),
            kind,
        }
    }
}

impl FromStr for PropertyName {
    type Err = MaeError;

    fn from_str(name: &str) -> Result<Self> {
        Self::parse(name).ok_or_else(|| {
            MaeError::validation(format!(
                "property name '{name}' lacks a b_/i_/r_/s_ type prefix"
            ))
        })
    }
}

impl PartialEq for PropertyName {
    fn eq(&self, other: &Self) -> bool {
        self.full == other.full
    }
}

impl Eq for PropertyName {}

impl Hash for PropertyName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full.hash(state);
    }
}

impl Borrow<str> for PropertyName {
    fn borrow(&self) -> &str {
        &self.full
    }
}

impl AsRef<str> for PropertyName {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

/// One cell of an MAE block.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    /// The format's `<>` marker: no value, whatever the column type.
    Undefined,
}

impl Value {
    /// Kind of a defined value; `None` for [`Value::Undefined`].
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Boolean(_) => Some(ValueKind::Boolean),
            Value::Integer(_) => Some(ValueKind::Integer),
            Value::Real(_) => Some(ValueKind::Real),
            Value::String(_) => Some(ValueKind::String),
            Value::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Interpret a value token under the declared `kind`.
    pub fn coerce(token: &Token<'_>, kind: ValueKind) -> Result<Self> {
        if token.kind == TokenKind::Undefined {
            return Ok(Value::Undefined);
        }
        let text = token.text.as_ref();
        let value = match kind {
            ValueKind::Boolean => match text {
                "1" => Value::Boolean(true),
                "0" => Value::Boolean(false),
                _ => return Err(mismatch(text, kind).at(token.position)),
            },
            ValueKind::Integer if token.kind == TokenKind::Number => text
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| mismatch(text, kind).at(token.position))?,
            ValueKind::Real if token.kind == TokenKind::Number => text
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| mismatch(text, kind).at(token.position))?,
            ValueKind::Integer | ValueKind::Real => {
                return Err(mismatch(text, kind).at(token.position))
            }
            ValueKind::String => Value::String(text.to_string()),
        };
        Ok(value)
    }

    /// Literal token text that [`Value::coerce`] maps back to `self` under
    /// `kind`. Booleans may be given as 0/1 integers.
    pub fn to_token(&self, kind: ValueKind) -> Result<Cow<'_, str>> {
        let text = match (self, kind) {
            (Value::Undefined, _) => Cow::Borrowed(lexer::UNDEFINED),
            (Value::Boolean(value), ValueKind::Boolean) => bool_token(*value),
            (Value::Integer(0), ValueKind::Boolean) => bool_token(false),
            (Value::Integer(1), ValueKind::Boolean) => bool_token(true),
            (Value::Integer(value), ValueKind::Integer) => Cow::Owned(value.to_string()),
            (Value::Real(value), ValueKind::Real) => {
                if !value.is_finite() {
                    return Err(MaeError::type_error(format!(
                        "real value {value} has no MAE representation"
                    )));
                }
                Cow::Owned(format_real(*value))
            }
            (Value::String(value), ValueKind::String) => quote_if_needed(value),
            (other, kind) => {
                return Err(MaeError::type_error(format!(
                    "cannot write {other:?} as a {kind} value"
                )))
            }
        };
        Ok(text)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}

fn mismatch(text: &str, kind: ValueKind) -> MaeError {
    MaeError::type_error(format!("'{text}' is not a valid {kind} value"))
}

fn bool_token(value: bool) -> Cow<'static, str> {
    Cow::Borrowed(if value { "1" } else { "0" })
}

fn format_real(value: f64) -> String {
    let text = value.to_string();
    // `Display` never uses exponents; keep very large or tiny magnitudes short.
    if text.len() > 24 {
        format!("{value:e}")
    } else {
        text
    }
}

fn quote_if_needed(text: &str) -> Cow<'_, str> {
    if lexer::is_bare_safe(text) {
        return Cow::Borrowed(text);
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn token(text: &str) -> Token<'_> {
        Lexer::new(text).next().expect("one token").expect("lexes")
    }

    fn reparse(value: &Value, kind: ValueKind) -> Value {
        let text = value.to_token(kind).expect("formats").into_owned();
        let token = token(&text);
        Value::coerce(&token, kind).expect("coerces")
    }

    #[test]
    fn parses_prefixed_names() {
        let name = PropertyName::parse("b_m_prop_a").unwrap();
        assert_eq!(name.kind(), ValueKind::Boolean);
        assert_eq!(name.stem(), "m_prop_a");
        assert!(PropertyName::parse("x_m_prop").is_none());
        assert!(PropertyName::parse("r_").is_none());
        assert!(PropertyName::parse("m_atom").is_none());
        assert_eq!(
            PropertyName::new(ValueKind::Real, "m_x_coord").unwrap().as_str(),
            "r_m_x_coord"
        );
        assert_eq!(name.with_kind(ValueKind::Integer).as_str(), "i_m_prop_a");
    }

    #[test]
    fn coerces_booleans_from_reserved_literals() {
        assert_eq!(Value::coerce(&token("1"), ValueKind::Boolean).unwrap(), Value::Boolean(true));
        assert_eq!(Value::coerce(&token("0"), ValueKind::Boolean).unwrap(), Value::Boolean(false));
        let err = Value::coerce(&token("yes"), ValueKind::Boolean).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Type);
    }

    #[test]
    fn undefined_wins_over_every_kind() {
        for kind in [ValueKind::Boolean, ValueKind::Integer, ValueKind::Real, ValueKind::String] {
            assert_eq!(Value::coerce(&token("<>"), kind).unwrap(), Value::Undefined);
            assert_eq!(Value::Undefined.to_token(kind).unwrap(), "<>");
        }
        assert_eq!(
            Value::coerce(&token("\"<>\""), ValueKind::String).unwrap(),
            Value::String("<>".to_string())
        );
    }

    #[test]
    fn rejects_non_numeric_text() {
        let err = Value::coerce(&token("abc"), ValueKind::Integer).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Type);
        assert_eq!(err.line(), Some(1));
        assert!(Value::coerce(&token("inf"), ValueKind::Real).is_err());
        assert!(Value::coerce(&token("1.5"), ValueKind::Integer).is_err());
    }

    #[test]
    fn string_tokens_keep_their_text() {
        assert_eq!(
            Value::coerce(&token("42"), ValueKind::String).unwrap(),
            Value::String("42".to_string())
        );
    }

    #[test]
    fn reals_survive_formatting() {
        for real in [0.1, -2.5, 1.0 / 3.0, 6.02214076e23, 1e-300, -0.0] {
            assert_eq!(reparse(&Value::Real(real), ValueKind::Real), Value::Real(real));
        }
        assert!(Value::Real(f64::NAN).to_token(ValueKind::Real).is_err());
    }

    #[test]
    fn strings_are_quoted_when_needed() {
        for text in ["plain", "", "two words", "a \"quote\"", "back\\slash", "<>", ":::", "{x}"] {
            let value = Value::String(text.to_string());
            assert_eq!(reparse(&value, ValueKind::String), value);
        }
        assert_eq!(Value::from("plain").to_token(ValueKind::String).unwrap(), "plain");
        assert_eq!(Value::from("").to_token(ValueKind::String).unwrap(), "\"\"");
    }

    #[test]
    fn integer_flags_write_as_booleans() {
        assert_eq!(Value::Integer(1).to_token(ValueKind::Boolean).unwrap(), "1");
        assert!(Value::Integer(2).to_token(ValueKind::Boolean).is_err());
        assert!(Value::from("x").to_token(ValueKind::Integer).is_err());
    }

    #[test]
    fn names_borrow_as_str() {
        let mut map = indexmap::IndexMap::new();
        map.insert(PropertyName::parse("i_m_count").unwrap(), Value::Integer(3));
        assert_eq!(map.get("i_m_count"), Some(&Value::Integer(3)));
    }
}
