//! Hierarchical dispatcher.
//!
//! A [`Shell`] owns a stack of open contexts and resolves dotted command
//! paths against it. Path segments are matched in this order: exact command,
//! exact child context, exact builtin (`help`, `back`, `quit`/`exit`), then
//! an unambiguous command prefix. Context names never match by prefix.
//!
//! A path ending at a context navigates there. A path ending at a command
//! runs it; contexts opened on the way are closed again afterwards unless
//! the command returns a new context to enter.

pub mod output;
pub mod repl;

use crate::commands::help::{self, DirListing};
use crate::commands::{classify_word, tokenize, CommandMetadata, Rendered, Reply, Token};
use crate::context::{Context, ContextStack, Frame};
use crate::error::{DispatchError, Result};
use crate::types::{TypeRegistry, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Observable dispatcher state.
///
/// Resolution and invocation happen within a single call and are never
/// observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    /// Only the root context is open.
    AtRoot,
    /// A child context is open; `depth` counts the root.
    InContext { depth: usize },
    /// The root was popped; no further commands are accepted.
    Finished,
}

/// Commands available in every context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Back,
    Quit,
}

impl Builtin {
    /// Matches a builtin by its exact name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "help" => Some(Self::Help),
            "back" => Some(Self::Back),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }

    const NAMES: [&'static str; 4] = ["back", "exit", "help", "quit"];
}

/// What a path resolved to.
#[derive(Debug)]
pub enum Target {
    /// The path named a context.
    Navigate,
    /// The path named a command; `extra` holds the path segments after it.
    Invoke {
        command: Arc<CommandMetadata>,
        extra: Vec<String>,
    },
    /// The path named a builtin.
    Builtin { builtin: Builtin, extra: Vec<String> },
}

/// The result of resolving a path: the contexts opened on the way (not yet
/// committed to the shell) and the target.
///
/// Dropping a resolution closes its opened contexts.
#[derive(Debug)]
pub struct Resolution {
    pub opened: ContextStack,
    pub target: Target,
}

/// Output of one dispatched command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    /// Name of the command or builtin that ran; empty for navigation.
    pub command: String,
    /// Display text, if any.
    pub text: Option<String>,
    /// Raw result for commands returning data.
    pub value: Option<Value>,
}

impl Invocation {
    fn rendered(command: &str, rendered: Rendered) -> Self {
        Self {
            command: command.to_string(),
            text: rendered.text,
            value: rendered.data,
        }
    }

    fn text(command: &str, text: String) -> Self {
        Self {
            command: command.to_string(),
            text: Some(text),
            value: None,
        }
    }

    fn silent(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Self::default()
        }
    }
}

enum Outcome {
    Rendered(Rendered),
    Context(Arc<dyn Context>),
}

/// Returns true if the dotted `path` ends with the dotted `suffix` on a
/// segment boundary.
fn path_matches(path: &str, suffix: &str) -> bool {
    path == suffix
        || path
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('.'))
}

/// A command shell over a tree of contexts.
pub struct Shell {
    name: String,
    registry: Arc<TypeRegistry>,
    stack: ContextStack,
    init_commands: Vec<(String, String)>,
    initializing: bool,
}

impl Shell {
    /// Creates a shell with `root` as the only open context.
    pub fn new(name: impl Into<String>, registry: Arc<TypeRegistry>, root: Arc<dyn Context>) -> Self {
        Self {
            name: name.into(),
            registry,
            stack: ContextStack::new(root),
            init_commands: Vec::new(),
            initializing: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn state(&self) -> ShellState {
        match self.stack.depth() {
            0 => ShellState::Finished,
            1 => ShellState::AtRoot,
            depth => ShellState::InContext { depth },
        }
    }

    /// True once the root context has been popped.
    pub fn finished(&self) -> bool {
        self.stack.is_empty()
    }

    /// Dotted path of the current context, e.g. `root.kv`.
    pub fn path(&self) -> String {
        self.stack.path()
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    fn current(&self) -> Result<Arc<dyn Context>> {
        self.stack.top().cloned().ok_or(DispatchError::SessionFinished)
    }

    /// Registers a command line run (with output discarded) whenever a
    /// context whose path ends with `path_suffix` is entered.
    pub fn add_init_command(&mut self, path_suffix: impl Into<String>, line: impl Into<String>) {
        let suffix = path_suffix.into();
        let line = line.into();
        let run_now = !self.finished() && path_matches(&self.path(), &suffix);
        self.init_commands.push((suffix, line.clone()));
        if run_now {
            self.run_init_lines(vec![line]);
        }
    }

    fn run_init(&mut self) {
        if self.initializing {
            return;
        }
        let path = self.path();
        let lines: Vec<String> = self
            .init_commands
            .iter()
            .filter(|(suffix, _)| path_matches(&path, suffix))
            .map(|(_, line)| line.clone())
            .collect();
        self.run_init_lines(lines);
    }

    fn run_init_lines(&mut self, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        self.initializing = true;
        let depth = self.depth();
        for line in lines {
            debug!(path = %self.path(), line = %line, "Running init command");
            if let Err(e) = self.invoke_string(&line) {
                warn!(line = %line, error = %e, "Init command failed");
            }
            // Init lines configure the context they run in; they do not navigate.
            if self.depth() > depth {
                let _ = self.stack.truncate(depth);
            }
            if self.depth() < depth {
                break;
            }
        }
        self.initializing = false;
    }

    /// Pushes a frame onto the shell's stack and runs matching init commands.
    fn enter(&mut self, frame: Frame) {
        self.stack.push(frame);
        debug!(path = %self.path(), "Entered context");
        self.run_init();
    }

    /// Enters each opened frame in turn. Returns false if an init command
    /// left the context it configures (e.g. `quit`); the frames not yet
    /// entered are then closed, newest first.
    fn commit(&mut self, opened: ContextStack) -> bool {
        let mut frames = opened.into_frames().into_iter();
        while let Some(frame) = frames.next() {
            let depth = self.depth() + 1;
            self.enter(frame);
            if self.depth() < depth {
                debug!(path = %self.path(), "Init command left the context; navigation stopped");
                frames.rev().for_each(drop);
                return false;
            }
        }
        true
    }

    /// Resolves a dotted path against the current context.
    ///
    /// Contexts opened along the way are returned in the resolution and are
    /// closed again if it is dropped. On failure they are closed before the
    /// error is returned.
    pub fn resolve(&self, path: &str) -> Result<Resolution> {
        let mut opened = ContextStack::default();
        let target = self.resolve_into(&mut opened, path)?;
        Ok(Resolution { opened, target })
    }

    fn resolve_into(&self, opened: &mut ContextStack, path: &str) -> Result<Target> {
        let segments: Vec<&str> = path.split('.').collect();

        for (index, segment) in segments.iter().enumerate() {
            let context = match opened.top() {
                Some(context) => context.clone(),
                None => self.current()?,
            };
            let extra = || segments[index + 1..].iter().map(|s| s.to_string()).collect();

            if segment.is_empty() {
                return Err(DispatchError::not_found(
                    *segment,
                    DirListing::of("", context.as_ref()).names(),
                ));
            }

            if let Some(command) = context.command(segment) {
                return Ok(Target::Invoke {
                    command,
                    extra: extra(),
                });
            }

            if let Some(child) = context.open_child(segment) {
                let child = child.map_err(DispatchError::from_command)?;
                opened.push(Frame::open(child));
                continue;
            }

            if let Some(builtin) = Builtin::parse(segment) {
                return Ok(Target::Builtin {
                    builtin,
                    extra: extra(),
                });
            }

            let matches: Vec<Arc<CommandMetadata>> = context
                .commands()
                .into_iter()
                .filter(|c| c.name().starts_with(segment))
                .collect();
            return match matches.as_slice() {
                [command] => {
                    debug!(prefix = %segment, command = command.name(), "Expanded abbreviation");
                    Ok(Target::Invoke {
                        command: command.clone(),
                        extra: extra(),
                    })
                }
                [] => Err(DispatchError::not_found(
                    *segment,
                    DirListing::of("", context.as_ref()).names(),
                )),
                _ => {
                    let mut names: Vec<String> =
                        matches.iter().map(|c| c.name().to_string()).collect();
                    names.sort();
                    Err(DispatchError::ambiguous(*segment, names))
                }
            };
        }

        Ok(Target::Navigate)
    }

    fn call(&self, command: &CommandMetadata, argv: &[Token]) -> Result<Outcome> {
        let arguments = if command.takes_cmdline() {
            command.bind_cmdline(argv)
        } else {
            let (positional, keywords) = command.split_args(&self.registry, argv)?;
            command.bind(&self.registry, &positional, &keywords)?
        };
        debug!(command = command.name(), "Invoking command");
        match command.invoke(&arguments)? {
            Reply::Value(value) => Ok(Outcome::Rendered(command.render(&self.registry, &value)?)),
            Reply::Context(context) => Ok(Outcome::Context(context)),
        }
    }

    /// Binds, invokes and formats a command of the current context.
    pub fn invoke_one(&mut self, command: &Arc<CommandMetadata>, argv: &[Token]) -> Result<Invocation> {
        self.current()?;
        self.run_command(ContextStack::default(), command, argv)
    }

    /// Runs a command found in the top of `opened` (or the current context
    /// when nothing was opened).
    fn run_command(
        &mut self,
        mut opened: ContextStack,
        command: &Arc<CommandMetadata>,
        argv: &[Token],
    ) -> Result<Invocation> {
        let outcome = self.call(command, argv);

        if command.is_finalizer() {
            let closed = if opened.is_empty() {
                self.stack.pop()
            } else {
                opened.pop()
            };
            drop(opened);
            let outcome = outcome?;
            closed
                .unwrap_or(Ok(()))
                .map_err(DispatchError::from_command)?;
            return Ok(match outcome {
                Outcome::Rendered(rendered) => Invocation::rendered(command.name(), rendered),
                Outcome::Context(context) => {
                    debug!(context = context.name(), "Finalizer command returned a context; ignored");
                    Invocation::silent(command.name())
                }
            });
        }

        match outcome? {
            Outcome::Rendered(rendered) => Ok(Invocation::rendered(command.name(), rendered)),
            Outcome::Context(context) => {
                let frame = Frame::open(context);
                if self.commit(opened) {
                    self.enter(frame);
                }
                Ok(Invocation::silent(command.name()))
            }
        }
    }

    fn run_builtin(
        &mut self,
        opened: ContextStack,
        builtin: Builtin,
        args: &[Token],
    ) -> Result<Invocation> {
        match builtin {
            Builtin::Help => {
                let text = self.help_text(&opened, args)?;
                Ok(Invocation::text("help", text))
            }
            Builtin::Back => {
                drop(opened);
                if !args.is_empty() {
                    return Err(DispatchError::argument("back takes no arguments"));
                }
                if self.depth() <= 1 {
                    return Err(DispatchError::argument("already at the root context"));
                }
                if let Some(result) = self.stack.pop() {
                    result.map_err(DispatchError::from_command)?;
                }
                Ok(Invocation::silent("back"))
            }
            Builtin::Quit => {
                drop(opened);
                debug!(shell = %self.name, "Session finished");
                self.stack.clear().map_err(DispatchError::from_command)?;
                Ok(Invocation::silent("quit"))
            }
        }
    }

    fn help_text(&self, opened: &ContextStack, args: &[Token]) -> Result<String> {
        let mut context = match opened.top() {
            Some(context) => context.clone(),
            None => self.current()?,
        };
        let mut path = self.path();
        for name in opened.names() {
            path.push('.');
            path.push_str(name);
        }

        let name = match args {
            [] => return Ok(help::context_help(&DirListing::of(path, context.as_ref()))),
            [Token::Word(name)] => name.as_str(),
            _ => return Err(DispatchError::argument("help takes at most one name")),
        };

        // Leading segments of a dotted name are contexts, opened for the
        // duration of the lookup.
        let mut frames = ContextStack::default();
        let mut segments: Vec<&str> = name.split('.').collect();
        let name = segments.pop().unwrap_or_default();
        for segment in segments {
            let child = context.open_child(segment).ok_or_else(|| {
                DispatchError::not_found(segment, DirListing::of("", context.as_ref()).names())
            })?;
            frames.push(Frame::open(child.map_err(DispatchError::from_command)?));
            if let Some(top) = frames.top() {
                context = top.clone();
            }
            path.push('.');
            path.push_str(segment);
        }

        if let Some(command) = context.command(name) {
            return Ok(command.help());
        }
        if let Some(child) = context.open_child(name) {
            let frame = Frame::open(child.map_err(DispatchError::from_command)?);
            let listing = DirListing::of(format!("{path}.{name}"), frame.context().as_ref());
            return Ok(help::context_help(&listing));
        }
        if Builtin::parse(name).is_some() {
            let lines: Vec<String> = help::BUILTINS
                .iter()
                .map(|(usage, summary)| format!("{usage}  {summary}"))
                .collect();
            return Ok(lines.join("\n"));
        }

        let matches: Vec<Arc<CommandMetadata>> = context
            .commands()
            .into_iter()
            .filter(|c| c.name().starts_with(name))
            .collect();
        match matches.as_slice() {
            [command] => Ok(command.help()),
            [] => Err(DispatchError::not_found(
                name,
                DirListing::of(path, context.as_ref()).names(),
            )),
            _ => Err(DispatchError::ambiguous(
                name,
                matches.iter().map(|c| c.name().to_string()).collect(),
            )),
        }
    }

    /// Dispatches one tokenized command (no separators).
    ///
    /// A path that ends at a context may be followed by further words, which
    /// continue the path: `kv set a 1` is `kv.set a 1`.
    pub fn invoke(&mut self, tokens: &[Token]) -> Result<Option<Invocation>> {
        self.current()?;

        let mut opened = ContextStack::default();
        let mut rest = tokens;
        loop {
            let (path, tail) = match rest.split_first() {
                Some((Token::Word(path), tail)) => (path, tail),
                Some((other, _)) => {
                    return Err(DispatchError::argument_with_value(
                        "expected a command or context name",
                        other.to_text(),
                    ))
                }
                None if opened.is_empty() => return Ok(None),
                None => {
                    self.commit(opened);
                    return Ok(Some(Invocation::silent("")));
                }
            };

            match self.resolve_into(&mut opened, path)? {
                Target::Navigate => rest = tail,
                Target::Invoke { command, extra } => {
                    let argv: Vec<Token> = extra
                        .into_iter()
                        .map(Token::Word)
                        .chain(tail.iter().cloned())
                        .collect();
                    return self.run_command(opened, &command, &argv).map(Some);
                }
                Target::Builtin { builtin, extra } => {
                    let argv: Vec<Token> = extra
                        .into_iter()
                        .map(Token::Word)
                        .chain(tail.iter().cloned())
                        .collect();
                    return self.run_builtin(opened, builtin, &argv).map(Some);
                }
            }
        }
    }

    /// Tokenizes and dispatches a line. `--` separates commands on one line;
    /// each runs against the stack left by the previous one. Blank lines and
    /// lines starting with `#` do nothing.
    pub fn invoke_string(&mut self, line: &str) -> Result<Vec<Invocation>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Vec::new());
        }
        let tokens = tokenize(line)?;
        self.invoke_tokens(&tokens)
    }

    /// Dispatches arguments that were already split, e.g. a program's argv.
    pub fn invoke_argv(&mut self, argv: &[String]) -> Result<Vec<Invocation>> {
        let tokens: Vec<Token> = argv.iter().map(|arg| classify_word(arg)).collect();
        self.invoke_tokens(&tokens)
    }

    fn invoke_tokens(&mut self, tokens: &[Token]) -> Result<Vec<Invocation>> {
        let mut results = Vec::new();
        for group in tokens.split(|t| *t == Token::Separator) {
            if let Some(invocation) = self.invoke(group)? {
                results.push(invocation);
            }
        }
        Ok(results)
    }

    /// Lists the commands and children of the current context.
    pub fn list_dir(&self) -> Result<DirListing> {
        let context = self.current()?;
        Ok(DirListing::of(self.path(), context.as_ref()))
    }

    /// Names in the current context (builtins included) starting with `prefix`.
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        let Ok(listing) = self.list_dir() else {
            return Vec::new();
        };
        let mut names: Vec<String> = listing
            .names()
            .into_iter()
            .chain(Builtin::NAMES.iter().map(|s| s.to_string()))
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("name", &self.name)
            .field("path", &self.path())
            .field("init_commands", &self.init_commands)
            .finish()
    }
}
