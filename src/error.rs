//! Error types for cmdtree.
//!
//! Defines the error enum shared by the type registry, command metadata and
//! the dispatcher.

use thiserror::Error;

/// Main error type for cmdtree operations.
///
/// The first six kinds are caller-input errors: a session reports them and
/// keeps going. `Internal` marks a malformed declaration and is fatal.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A type name is not registered (and no external source provides it).
    #[error("Unknown type: {name}")]
    UnknownType { name: String },

    /// Text or bytes could not be parsed into the declared type.
    #[error("Cannot convert '{value}' to {type_name}: {reason}")]
    Conversion {
        type_name: String,
        value: String,
        reason: String,
    },

    /// A parsed value failed a declared constraint.
    #[error("Validation '{rule}' failed for '{value}': {reason}")]
    Validation {
        rule: String,
        value: String,
        reason: String,
    },

    /// Binding failure: missing required argument, unknown keyword, arity mismatch.
    #[error("Argument error: {message}")]
    Argument {
        message: String,
        value: Option<String>,
    },

    /// A path segment names neither a command nor a context.
    #[error("Not found: '{segment}'{}", available_suffix(.candidates))]
    NotFound {
        segment: String,
        candidates: Vec<String>,
    },

    /// A command abbreviation matches more than one command.
    #[error("Ambiguous command '{prefix}', could be: {}", .matches.join(", "))]
    AmbiguousCommand { prefix: String, matches: Vec<String> },

    /// An external type source could not be loaded.
    #[error("Type source '{source_name}' failed to load: {reason}")]
    TypeSource { source_name: String, reason: String },

    /// An error raised by a command's own callable.
    #[error(transparent)]
    Command(anyhow::Error),

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The session was exited; no further commands are accepted.
    #[error("Session has finished")]
    SessionFinished,

    /// Malformed declaration (a bug in the command author's code).
    #[error("Internal error: {0}")]
    Internal(String),
}

fn available_suffix(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(" (available: {})", candidates.join(", "))
    }
}

impl DispatchError {
    /// Creates an unknown type error.
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates a conversion error for `value` of type `type_name`.
    pub fn conversion(
        type_name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conversion {
            type_name: type_name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates a validation error naming the failing rule.
    pub fn validation(
        rule: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            rule: rule.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates an argument error with no offending value.
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument {
            message: msg.into(),
            value: None,
        }
    }

    /// Creates an argument error carrying the offending value.
    pub fn argument_with_value(msg: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Argument {
            message: msg.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a not found error listing the valid sibling names.
    pub fn not_found(segment: impl Into<String>, candidates: Vec<String>) -> Self {
        Self::NotFound {
            segment: segment.into(),
            candidates,
        }
    }

    /// Creates an ambiguous command error listing every match.
    pub fn ambiguous(prefix: impl Into<String>, matches: Vec<String>) -> Self {
        Self::AmbiguousCommand {
            prefix: prefix.into(),
            matches,
        }
    }

    /// Creates a type source error.
    pub fn type_source(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TypeSource {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wraps an error returned by a command callable.
    ///
    /// A `DispatchError` raised inside the callable is unwrapped so that it
    /// keeps its original kind.
    pub fn from_command(err: anyhow::Error) -> Self {
        match err.downcast::<DispatchError>() {
            Ok(inner) => inner,
            Err(other) => Self::Command(other),
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownType { .. } => "Unknown Type",
            Self::Conversion { .. } => "Conversion Error",
            Self::Validation { .. } => "Validation Error",
            Self::Argument { .. } => "Argument Error",
            Self::NotFound { .. } => "Not Found",
            Self::AmbiguousCommand { .. } => "Ambiguous Command",
            Self::TypeSource { .. } => "Type Source Error",
            Self::Command(_) => "Command Error",
            Self::Config(_) => "Configuration Error",
            Self::SessionFinished => "Session Finished",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the offending input, when the error has one.
    pub fn offending_value(&self) -> Option<&str> {
        match self {
            Self::UnknownType { name } => Some(name),
            Self::Conversion { value, .. } | Self::Validation { value, .. } => Some(value),
            Self::Argument { value, .. } => value.as_deref(),
            Self::NotFound { segment, .. } => Some(segment),
            Self::AmbiguousCommand { prefix, .. } => Some(prefix),
            Self::TypeSource { source_name, .. } => Some(source_name),
            Self::Command(_) | Self::Config(_) | Self::SessionFinished | Self::Internal(_) => None,
        }
    }

    /// Returns true for errors that must abort the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// Result type alias using DispatchError.
pub type Result<T> = std::result::Result<T, DispatchError>;
