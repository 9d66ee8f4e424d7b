//! Context model.
//!
//! A context is a node of the command tree: it exposes commands and named
//! children. Children are opened on demand through factories and are never
//! cached by their parent; the dispatcher keeps opened contexts on its
//! [`ContextStack`].

pub mod stack;

pub use stack::{ContextStack, Frame};

use crate::commands::CommandMetadata;
use crate::error::{DispatchError, Result};
use std::fmt;
use std::sync::Arc;

/// A node of the command tree.
pub trait Context: Send + Sync {
    /// Name used as a path segment.
    fn name(&self) -> &str;

    /// Description shown in help output.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Commands in declaration order.
    fn commands(&self) -> Vec<Arc<CommandMetadata>>;

    /// Child names in declaration order.
    fn children(&self) -> Vec<String>;

    /// Looks up a command by exact name.
    fn command(&self, name: &str) -> Option<Arc<CommandMetadata>> {
        self.commands().into_iter().find(|c| c.name() == name)
    }

    /// Opens the named child. Returns `None` when there is no such child.
    fn open_child(&self, name: &str) -> Option<anyhow::Result<Arc<dyn Context>>>;

    /// Runs when the context is popped off the stack.
    fn finalize(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Produces a child context each time it is navigated to.
pub type ChildFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Context>> + Send + Sync>;

/// Cleanup run when a context is popped.
pub type FinalizeFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A context assembled from declared commands and child factories.
pub struct BasicContext {
    name: String,
    description: Option<String>,
    commands: Vec<Arc<CommandMetadata>>,
    children: Vec<(String, ChildFactory)>,
    finalizer: Option<FinalizeFn>,
}

impl BasicContext {
    /// Starts building a context.
    pub fn builder(name: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            name: name.into(),
            description: None,
            commands: Vec::new(),
            children: Vec::new(),
            finalizer: None,
        }
    }
}

impl Context for BasicContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn commands(&self) -> Vec<Arc<CommandMetadata>> {
        self.commands.clone()
    }

    fn children(&self) -> Vec<String> {
        self.children.iter().map(|(name, _)| name.clone()).collect()
    }

    fn command(&self, name: &str) -> Option<Arc<CommandMetadata>> {
        self.commands.iter().find(|c| c.name() == name).cloned()
    }

    fn open_child(&self, name: &str) -> Option<anyhow::Result<Arc<dyn Context>>> {
        self.children
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, factory)| factory())
    }

    fn finalize(&self) -> anyhow::Result<()> {
        match &self.finalizer {
            Some(finalizer) => finalizer(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for BasicContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicContext")
            .field("name", &self.name)
            .field(
                "commands",
                &self.commands.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("children", &self.children())
            .finish()
    }
}

/// Builder for [`BasicContext`].
pub struct ContextBuilder {
    name: String,
    description: Option<String>,
    commands: Vec<Arc<CommandMetadata>>,
    children: Vec<(String, ChildFactory)>,
    finalizer: Option<FinalizeFn>,
}

impl ContextBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn command(mut self, command: Arc<CommandMetadata>) -> Self {
        self.commands.push(command);
        self
    }

    /// Adds a child opened through `factory` on every navigation.
    pub fn child(
        mut self,
        name: impl Into<String>,
        factory: impl Fn() -> anyhow::Result<Arc<dyn Context>> + Send + Sync + 'static,
    ) -> Self {
        self.children.push((name.into(), Arc::new(factory)));
        self
    }

    /// Adds an already built child, shared between navigations.
    pub fn child_context(self, context: Arc<dyn Context>) -> Self {
        let name = context.name().to_string();
        self.child(name, move || Ok(context.clone()))
    }

    /// Sets the cleanup run when the context is popped.
    pub fn finalizer(mut self, finalizer: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        self.finalizer = Some(Arc::new(finalizer));
        self
    }

    /// Builds the context, rejecting duplicate or colliding names.
    pub fn build(self) -> Result<Arc<dyn Context>> {
        if !valid_segment(&self.name) {
            return Err(DispatchError::internal(format!(
                "invalid context name '{}'",
                self.name
            )));
        }

        let mut names: Vec<&str> = Vec::new();
        let all = self
            .commands
            .iter()
            .map(|c| c.name())
            .chain(self.children.iter().map(|(name, _)| name.as_str()));
        for name in all {
            if !valid_segment(name) {
                return Err(DispatchError::internal(format!(
                    "context '{}': invalid name '{name}'",
                    self.name
                )));
            }
            if names.contains(&name) {
                return Err(DispatchError::internal(format!(
                    "context '{}': name '{name}' is declared twice",
                    self.name
                )));
            }
            names.push(name);
        }

        Ok(Arc::new(BasicContext {
            name: self.name,
            description: self.description,
            commands: self.commands,
            children: self.children,
            finalizer: self.finalizer,
        }))
    }
}

fn valid_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains(|c: char| c == '.' || c.is_whitespace())
}
