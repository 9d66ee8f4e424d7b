//! Tokenizer for command lines.
//!
//! Provides parsing of command lines with support for:
//! - Quoted strings (single and double quotes)
//! - Escape sequences within quotes
//! - Key=value pairs
//! - Flags (`--flag`, `--flag=value` or `-f`)
//! - A bare `--` separating two commands on one line

use crate::error::DispatchError;
use regex::Regex;
use std::sync::OnceLock;

/// A token parsed from command input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A plain word (unquoted argument).
    Word(String),
    /// A key=value pair.
    KeyValue { key: String, value: String },
    /// A long flag (--flag).
    LongFlag(String),
    /// A short flag (-f).
    ShortFlag(char),
    /// A bare `--`, ending the current command.
    Separator,
}

impl Token {
    /// Returns the token as a word if it is one.
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Token::Word(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the key-value pair if this is a KeyValue token.
    pub fn as_key_value(&self) -> Option<(&str, &str)> {
        match self {
            Token::KeyValue { key, value } => Some((key, value)),
            _ => None,
        }
    }

    /// Returns the token spelled the way it would be typed.
    pub fn to_text(&self) -> String {
        match self {
            Token::Word(s) => s.clone(),
            Token::KeyValue { key, value } => format!("{key}={value}"),
            Token::LongFlag(name) => format!("--{name}"),
            Token::ShortFlag(c) => format!("-{c}"),
            Token::Separator => "--".to_string(),
        }
    }
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("literal pattern"))
}

/// A whitespace-delimited chunk of input with quoting removed.
struct RawToken {
    text: String,
    /// True if the token began inside a quote.
    leading_quote: bool,
    /// Byte offset of the first unquoted `=`.
    split: Option<usize>,
}

/// Tokenizes a command line.
///
/// Handles:
/// - Whitespace-separated tokens
/// - Double-quoted strings: `"hello world"` → `hello world`
/// - Single-quoted strings: `'hello world'` → `hello world`
/// - Escape sequences in quotes: `"say \"hi\""` → `say "hi"`
/// - Key=value pairs: `host=localhost` → KeyValue { key: "host", value: "localhost" }
/// - Quoted values: `name="my file"` → KeyValue { key: "name", value: "my file" }
/// - Long flags: `--test` → LongFlag("test"), `--n=5` → KeyValue
/// - Short flags: `-t` → ShortFlag('t'); `-5` stays a word
/// - Separator: `--` → Separator
///
/// Quoting disables the special meaning of `=` and leading dashes.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        // Skip whitespace
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let raw = collect_token(&mut chars).map_err(|message| {
            ParseError::new(input, message).with_hint("close the quote or escape it with \\")
        })?;
        tokens.push(classify(raw));
    }

    Ok(tokens)
}

/// Classifies a single argument that was already split by a shell,
/// e.g. one element of the program's argv.
pub fn classify_word(word: &str) -> Token {
    classify(RawToken {
        text: word.to_string(),
        leading_quote: false,
        split: word.find('='),
    })
}

fn classify(raw: RawToken) -> Token {
    let RawToken {
        text,
        leading_quote,
        split,
    } = raw;

    if !leading_quote {
        if text == "--" {
            return Token::Separator;
        }

        if let Some(rest) = text.strip_prefix("--") {
            return match split {
                Some(pos) if key_pattern().is_match(&text[2..pos]) => Token::KeyValue {
                    key: text[2..pos].to_string(),
                    value: text[pos + 1..].to_string(),
                },
                None if key_pattern().is_match(rest) => Token::LongFlag(rest.to_string()),
                _ => Token::Word(text),
            };
        }

        let mut chars = text.chars();
        if let (Some('-'), Some(c), None) = (chars.next(), chars.next(), chars.next()) {
            if c.is_alphabetic() {
                return Token::ShortFlag(c);
            }
        }
    }

    match split {
        Some(pos) if key_pattern().is_match(&text[..pos]) => Token::KeyValue {
            key: text[..pos].to_string(),
            value: text[pos + 1..].to_string(),
        },
        _ => Token::Word(text),
    }
}

/// Collects one token, handling quoted sections anywhere inside it.
fn collect_token(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<RawToken, String> {
    let mut text = String::new();
    let mut leading_quote = false;
    let mut split = None;

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            break;
        }
        chars.next();

        if c == '"' || c == '\'' {
            if text.is_empty() && split.is_none() {
                leading_quote = true;
            }
            text.push_str(&collect_quoted(chars, c)?);
            continue;
        }

        if c == '=' && split.is_none() {
            split = Some(text.len());
        }
        text.push(c);
    }

    Ok(RawToken {
        text,
        leading_quote,
        split,
    })
}

/// Collects characters inside quotes, handling escape sequences.
fn collect_quoted(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
) -> Result<String, String> {
    let mut result = String::new();
    let mut escaped = false;

    for c in chars.by_ref() {
        if escaped {
            match c {
                'n' => result.push('\n'),
                't' => result.push('\t'),
                'r' => result.push('\r'),
                '\\' => result.push('\\'),
                '"' => result.push('"'),
                '\'' => result.push('\''),
                _ => {
                    // Unknown escape, keep as-is
                    result.push('\\');
                    result.push(c);
                }
            }
            escaped = false;
            continue;
        }

        if c == '\\' {
            escaped = true;
            continue;
        }

        if c == quote {
            return Ok(result);
        }

        result.push(c);
    }

    Err(format!("unterminated {quote} quote"))
}

/// Parse error with context for helpful error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The line that failed to parse.
    pub input: String,
    /// Error message describing what went wrong.
    pub message: String,
    /// Optional hint for how to fix the error.
    pub hint: Option<String>,
}

impl ParseError {
    pub fn new(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            message: message.into(),
            hint: None,
        }
    }

    /// Adds a hint to the error.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        Self {
            hint: Some(hint.into()),
            ..self
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.input, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\nHint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for DispatchError {
    fn from(err: ParseError) -> Self {
        DispatchError::argument_with_value(err.message, err.input)
    }
}
