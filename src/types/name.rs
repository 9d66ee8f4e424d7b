//! Type name syntax.
//!
//! A type name is either a simple identifier (`integer`) or a composite
//! form `base(arg, ...)` whose arguments are themselves type names, e.g.
//! `list(integer)` or `map(list(string))`. Whitespace is insignificant.

use crate::error::{DispatchError, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("literal pattern"))
}

/// Returns true if `name` is a valid simple type name.
pub fn is_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

/// A parsed type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    /// Base name (`list` in `list(integer)`).
    pub base: String,
    /// Type arguments, empty for simple names.
    pub args: Vec<TypeName>,
}

impl TypeName {
    /// Parses a type name.
    ///
    /// A syntax error is an `Argument` error carrying the offending name,
    /// since names can come from user input. Declarations turn it into
    /// `Internal`.
    pub fn parse(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut parser = Parser {
            input: &compact,
            pos: 0,
        };
        let invalid = |reason: String| {
            DispatchError::argument_with_value(format!("invalid type name: {reason}"), text.trim())
        };
        let name = parser.parse_name().map_err(invalid)?;
        if parser.pos != compact.len() {
            return Err(invalid(format!("unexpected '{}'", &compact[parser.pos..])));
        }
        Ok(name)
    }

    /// Returns true for `base(args...)` forms.
    pub fn is_composite(&self) -> bool {
        !self.args.is_empty()
    }

    /// Returns the canonical spelling used as the registry key.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if self.is_composite() {
            let args: Vec<String> = self.args.iter().map(TypeName::to_string).collect();
            write!(f, "({})", args.join(","))?;
        }
        Ok(())
    }
}

/// Returns the canonical form of `text` (whitespace removed).
pub fn canonicalize(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn parse_name(&mut self) -> std::result::Result<TypeName, String> {
        let rest = &self.input[self.pos..];
        let end = rest.find(['(', ')', ',']).unwrap_or(rest.len());
        let base = &rest[..end];
        if !is_identifier(base) {
            return Err(if base.is_empty() {
                "expected a type name".to_string()
            } else {
                format!("'{base}' is not a valid identifier")
            });
        }
        self.pos += end;

        let mut args = Vec::new();
        if self.peek() == Some('(') {
            self.pos += 1;
            loop {
                args.push(self.parse_name()?);
                match self.peek() {
                    Some(',') => self.pos += 1,
                    Some(')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err("no matching ')' found".to_string()),
                }
            }
        }

        Ok(TypeName {
            base: base.to_string(),
            args,
        })
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }
}
