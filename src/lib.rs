//! cmdtree - a hierarchical command shell with typed arguments.
//!
//! Commands are declared with typed parameters against a [`types::TypeRegistry`],
//! grouped into a tree of [`context::Context`]s and dispatched by a
//! [`shell::Shell`] from dotted paths such as `math.sum 1 2 3`.

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod demo;
pub mod error;
pub mod logging;
pub mod shell;
pub mod types;
