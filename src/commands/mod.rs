//! Command declaration, argument binding and help rendering.
//!
//! This module is independent of the dispatcher: a command can be declared,
//! bound and invoked without a shell, which keeps binding testable on its own.

pub mod arguments;
pub mod help;
pub mod metadata;
pub mod tokenizer;

pub use arguments::Arguments;
pub use help::DirListing;
pub use metadata::{
    CommandBuilder, CommandDocs, CommandMetadata, FormatterRef, Handler, ParamKind, ParamSpec,
    Rendered, Reply, ReturnKind, ReturnSpec, ValidatorRef, CMDLINE_ARG,
};
pub use tokenizer::{classify_word, tokenize, ParseError, Token};
