//! Help text rendering for commands and contexts.

use super::metadata::{CommandMetadata, ParamKind, ParamSpec};
use crate::context::Context;
use std::fmt;
use std::fmt::Write as _;

/// Built-in commands available in every context, with their help lines.
pub const BUILTINS: &[(&str, &str)] = &[
    ("help [name]", "Show help for this context or for one command"),
    ("back", "Leave the current context"),
    ("quit, exit", "End the session"),
];

fn param_signature(param: &ParamSpec) -> String {
    let prefix = match param.kind() {
        ParamKind::Positional => "",
        ParamKind::Variadic => "*",
        ParamKind::Keywords => "**",
    };
    let mut text = format!("{} {prefix}{}", param.type_name(), param.name());
    if let Some(default) = param.default() {
        let _ = write!(text, "={default}");
    }
    text
}

/// Renders `name(integer a, integer b=1, string *rest)`.
pub fn signature(command: &CommandMetadata) -> String {
    if command.takes_cmdline() {
        return format!("{}(...)", command.name());
    }
    let params: Vec<String> = command.params().iter().map(param_signature).collect();
    format!("{}({})", command.name(), params.join(", "))
}

/// Renders the full help of one command.
pub fn command_help(command: &CommandMetadata) -> String {
    let mut text = signature(command);
    if command.is_finalizer() {
        text.push_str("  [closes context]");
    }
    if let Some(summary) = command.summary() {
        let _ = write!(text, "\n\n{summary}");
    }
    if let Some(description) = command.description() {
        let _ = write!(text, "\n\n{description}");
    }

    if !command.params().is_empty() {
        text.push_str("\n\nParameters:");
        for param in command.params() {
            let _ = write!(text, "\n  {} ({}", param.name(), param.type_name());
            if let Some(default) = param.default() {
                let _ = write!(text, ", default {default}");
            }
            text.push(')');
            if let Some(description) = param.description() {
                let _ = write!(text, ": {description}");
            }
        }
    }

    let returns = command.returns();
    if let Some(type_name) = returns.type_name() {
        let _ = write!(text, "\n\nReturns ({type_name})");
        if let Some(description) = returns.description() {
            let _ = write!(text, ": {description}");
        }
    } else if let Some(description) = returns.description() {
        let _ = write!(text, "\n\nReturns: {description}");
    }

    text
}

/// What a context offers, for `help` and directory listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    /// Dotted path of the listed context.
    pub path: String,
    pub description: Option<String>,
    /// Command names with their summaries, sorted by name.
    pub commands: Vec<(String, Option<String>)>,
    /// Child context names, sorted.
    pub children: Vec<String>,
}

impl DirListing {
    pub fn of(path: impl Into<String>, context: &dyn Context) -> Self {
        let mut commands: Vec<(String, Option<String>)> = context
            .commands()
            .iter()
            .map(|c| (c.name().to_string(), c.summary().map(str::to_string)))
            .collect();
        commands.sort();
        let mut children = context.children();
        children.sort();

        Self {
            path: path.into(),
            description: context.description().map(str::to_string),
            commands,
            children,
        }
    }

    /// Command and child names together, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .iter()
            .map(|(name, _)| name.clone())
            .chain(self.children.iter().cloned())
            .collect();
        names.sort();
        names
    }
}

impl fmt::Display for DirListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(description) = &self.description {
            write!(f, ": {description}")?;
        }

        let width = self
            .commands
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0);

        if !self.commands.is_empty() {
            write!(f, "\n\nCommands:")?;
            for (name, summary) in &self.commands {
                match summary {
                    Some(summary) => write!(f, "\n  {name:<width$}  {summary}")?,
                    None => write!(f, "\n  {name}")?,
                }
            }
        }

        if !self.children.is_empty() {
            write!(f, "\n\nContexts:")?;
            for name in &self.children {
                write!(f, "\n  {name}/")?;
            }
        }

        Ok(())
    }
}

/// Renders the help shown by a bare `help`.
pub fn context_help(listing: &DirListing) -> String {
    let mut text = listing.to_string();
    text.push_str("\n\nBuilt-in commands:");
    for (usage, summary) in BUILTINS {
        let _ = write!(text, "\n  {usage:<12}  {summary}");
    }
    text
}
