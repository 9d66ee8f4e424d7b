//! Command metadata: parameter and return declarations, argument binding,
//! invocation and result formatting.
//!
//! Commands are declared with [`CommandMetadata::builder`]. Declaration
//! checks everything that can be checked up front; type names that are not
//! yet resolvable (e.g. provided by a lazily loaded source) are checked on
//! first use instead.

use super::arguments::Arguments;
use super::help;
use super::tokenizer::Token;
use crate::context::Context;
use crate::error::{DispatchError, Result};
use crate::types::{name, FormatFn, TypeDescriptor, TypeRegistry, Validator, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// How a parameter receives its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// One positional or keyword argument.
    Positional,
    /// Collects surplus positional arguments into a list.
    Variadic,
    /// Collects unknown keyword arguments into a map.
    Keywords,
}

/// A validator attached to a parameter.
#[derive(Debug, Clone)]
pub enum ValidatorRef {
    /// A validator factory of the parameter's type, e.g. `range(0, 10)`.
    Named { name: String, args: Vec<Value> },
    /// A validator supplied directly.
    Inline(Validator),
}

/// Declaration of one command parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: String,
    type_name: String,
    description: Option<String>,
    kind: ParamKind,
    default: Option<Value>,
    validators: Vec<ValidatorRef>,
}

impl ParamSpec {
    /// Creates a required positional parameter.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            description: None,
            kind: ParamKind::Positional,
            default: None,
            validators: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Makes the parameter optional with the given default.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Makes the parameter optional, defaulting to `Value::Null`.
    pub fn optional(self) -> Self {
        self.default_value(Value::Null)
    }

    /// Adds a named validator of the parameter's type.
    pub fn validate(mut self, name: impl Into<String>, args: Vec<Value>) -> Self {
        self.validators.push(ValidatorRef::Named {
            name: name.into(),
            args,
        });
        self
    }

    /// Adds a validator supplied directly.
    pub fn validate_with(mut self, validator: Validator) -> Self {
        self.validators.push(ValidatorRef::Inline(validator));
        self
    }

    /// Turns the parameter into a collector of surplus positional arguments.
    pub fn variadic(mut self) -> Self {
        self.kind = ParamKind::Variadic;
        self
    }

    /// Turns the parameter into a collector of unknown keyword arguments.
    pub fn keywords(mut self) -> Self {
        self.kind = ParamKind::Keywords;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// True for a positional parameter without a default.
    pub fn is_required(&self) -> bool {
        self.kind == ParamKind::Positional && self.default.is_none()
    }

    fn resolve_validators(&self, descriptor: &TypeDescriptor) -> Result<Vec<Validator>> {
        self.validators
            .iter()
            .map(|validator| match validator {
                ValidatorRef::Named { name, args } => {
                    descriptor.validator(name, args).map_err(|e| {
                        DispatchError::internal(format!("parameter '{}': {e}", self.name))
                    })
                }
                ValidatorRef::Inline(validator) => Ok(validator.clone()),
            })
            .collect()
    }

    /// Checks that the default is a value the parameter could have been
    /// given: it must survive the type's text form (when it has a lossless
    /// one) and pass the type's validators, then the parameter's own.
    fn check_default(&self, descriptor: &TypeDescriptor) -> Result<()> {
        let validators = self.resolve_validators(descriptor)?;
        let Some(default) = self.default.as_ref().filter(|d| !d.is_null()) else {
            return Ok(());
        };
        let invalid = |e: DispatchError| {
            DispatchError::internal(format!(
                "default of parameter '{}' is invalid: {e}",
                self.name
            ))
        };

        if descriptor.has_text_form() && !descriptor.is_lossy() {
            descriptor
                .convert(&descriptor.format_default(default))
                .map_err(invalid)?;
        }
        let value = descriptor.validate(default.clone()).map_err(invalid)?;
        apply_validators(&validators, value).map_err(invalid)?;
        Ok(())
    }
}

/// Runs validators in order. Absent values are not validated.
fn apply_validators(validators: &[Validator], value: Value) -> Result<Value> {
    if value.is_null() {
        return Ok(value);
    }
    validators
        .iter()
        .try_fold(value, |value, validator| validator.apply(value))
}

/// What a command's result means to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// No displayable result.
    None,
    /// A value the caller may use directly; formatted for display.
    Data,
    /// Display text only.
    Text,
}

/// How the result is turned into text.
#[derive(Clone)]
pub enum FormatterRef {
    /// A named formatter of the return type.
    Named(String),
    /// A formatter supplied directly.
    Custom(FormatFn),
}

impl fmt::Debug for FormatterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Declaration of a command's result.
#[derive(Debug, Clone)]
pub struct ReturnSpec {
    type_name: Option<String>,
    description: Option<String>,
    kind: ReturnKind,
    formatter: Option<FormatterRef>,
}

impl ReturnSpec {
    /// The command produces no displayable result.
    pub fn none() -> Self {
        Self {
            type_name: None,
            description: None,
            kind: ReturnKind::None,
            formatter: None,
        }
    }

    /// The command returns data of the given type.
    pub fn data(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            kind: ReturnKind::Data,
            ..Self::none()
        }
    }

    /// The command returns a value of the given type, shown as text only.
    pub fn text(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            kind: ReturnKind::Text,
            ..Self::none()
        }
    }

    /// The command returns an untyped value shown through its `Display`.
    pub fn display() -> Self {
        Self {
            kind: ReturnKind::Text,
            ..Self::none()
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Formats the result with a named formatter of the return type.
    pub fn formatted_as(mut self, formatter: impl Into<String>) -> Self {
        self.formatter = Some(FormatterRef::Named(formatter.into()));
        self
    }

    /// Formats the result with a custom function.
    pub fn formatted_with(mut self, formatter: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.formatter = Some(FormatterRef::Custom(Arc::new(formatter)));
        self
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }
}

/// What a command callable returns.
#[derive(Clone)]
pub enum Reply {
    /// A plain result value.
    Value(Value),
    /// A new context to enter.
    Context(Arc<dyn Context>),
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

impl From<Arc<dyn Context>> for Reply {
    fn from(context: Arc<dyn Context>) -> Self {
        Reply::Context(context)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Reply::Context(context) => f.debug_tuple("Context").field(&context.name()).finish(),
        }
    }
}

/// Argument name under which a command declared with
/// [`CommandBuilder::takes_cmdline`] receives its raw words.
pub const CMDLINE_ARG: &str = "argv";

/// A command callable.
pub type Handler = Arc<dyn Fn(&Arguments) -> anyhow::Result<Reply> + Send + Sync>;

/// Documentation extracted from elsewhere (e.g. a docstring parser),
/// merged into a declaration to enrich help text.
#[derive(Debug, Clone, Default)]
pub struct CommandDocs {
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Parameter descriptions by parameter name.
    pub params: BTreeMap<String, String>,
    pub returns: Option<String>,
}

/// A command's result prepared for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    /// Display text; `None` when there is nothing to show.
    pub text: Option<String>,
    /// The raw value, for `Data` returns.
    pub data: Option<Value>,
}

/// Everything known about one command. Immutable once declared.
pub struct CommandMetadata {
    name: String,
    summary: Option<String>,
    description: Option<String>,
    params: Vec<ParamSpec>,
    returns: ReturnSpec,
    handler: Handler,
    finalizer: bool,
    takes_cmdline: bool,
    defaults_checked: AtomicBool,
}

impl CommandMetadata {
    /// Starts declaring a command.
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            summary: None,
            description: None,
            params: Vec::new(),
            returns: ReturnSpec::none(),
            handler: None,
            finalizer: false,
            takes_cmdline: false,
            docs: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn returns(&self) -> &ReturnSpec {
        &self.returns
    }

    /// True if invoking this command closes the context that owns it.
    pub fn is_finalizer(&self) -> bool {
        self.finalizer
    }

    /// True if the command receives its arguments unparsed.
    pub fn takes_cmdline(&self) -> bool {
        self.takes_cmdline
    }

    /// True if surplus positional arguments are accepted.
    pub fn accepts_extra_positional(&self) -> bool {
        self.params.iter().any(|p| p.kind == ParamKind::Variadic)
    }

    /// True if unknown keyword arguments are accepted.
    pub fn accepts_extra_keywords(&self) -> bool {
        self.params.iter().any(|p| p.kind == ParamKind::Keywords)
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// One-line signature, e.g. `add(integer a, integer b=1)`.
    pub fn signature(&self) -> String {
        help::signature(self)
    }

    /// Multi-line help text.
    pub fn help(&self) -> String {
        help::command_help(self)
    }

    /// Finds the positional parameter a keyword names, accepting an
    /// unambiguous prefix of the parameter name.
    fn keyword_target(&self, key: &str) -> Result<Option<&ParamSpec>> {
        let named = || self.params.iter().filter(|p| p.kind == ParamKind::Positional);

        if let Some(param) = named().find(|p| p.name == key) {
            return Ok(Some(param));
        }

        let matches: Vec<&ParamSpec> = named().filter(|p| p.name.starts_with(key)).collect();
        match matches.as_slice() {
            [] => Ok(None),
            [param] => Ok(Some(param)),
            _ => Err(DispatchError::argument_with_value(
                format!(
                    "ambiguous keyword argument, could be: {}",
                    matches
                        .iter()
                        .map(|p| p.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                key,
            )),
        }
    }

    fn check_defaults(&self, descriptors: &[Arc<TypeDescriptor>]) -> Result<()> {
        if self.defaults_checked.load(Ordering::Acquire) {
            return Ok(());
        }
        for (param, descriptor) in self.params.iter().zip(descriptors) {
            param.check_default(descriptor)?;
        }
        self.defaults_checked.store(true, Ordering::Release);
        Ok(())
    }

    /// Splits tokens into positional words and keyword pairs.
    ///
    /// `--name value`, `--name=value` and `-n value` become keywords. A flag
    /// naming a `bool` parameter needs no value: a bare flag means `true`,
    /// though a following `true` or `false` is taken as its value. An
    /// unrecognized long flag is passed on as a keyword with value `true`.
    pub fn split_args(
        &self,
        registry: &TypeRegistry,
        tokens: &[Token],
    ) -> Result<(Vec<String>, Vec<(String, String)>)> {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        let mut iter = tokens.iter().peekable();

        while let Some(token) = iter.next() {
            let flag = match token {
                Token::Word(word) => {
                    positional.push(word.clone());
                    continue;
                }
                Token::Separator => {
                    positional.push("--".to_string());
                    continue;
                }
                Token::KeyValue { key, value } => {
                    keywords.push((key.replace('-', "_"), value.clone()));
                    continue;
                }
                Token::LongFlag(name) => name.replace('-', "_"),
                Token::ShortFlag(c) => {
                    let matches: Vec<&ParamSpec> = self
                        .params
                        .iter()
                        .filter(|p| p.kind == ParamKind::Positional && p.name.starts_with(*c))
                        .collect();
                    match matches.as_slice() {
                        [param] => param.name.clone(),
                        [] => {
                            return Err(DispatchError::argument_with_value(
                                "unknown option",
                                format!("-{c}"),
                            ))
                        }
                        _ => {
                            return Err(DispatchError::argument_with_value(
                                format!(
                                    "ambiguous option, could be: {}",
                                    matches
                                        .iter()
                                        .map(|p| p.name.as_str())
                                        .collect::<Vec<_>>()
                                        .join(", ")
                                ),
                                format!("-{c}"),
                            ))
                        }
                    }
                }
            };

            let Some(param) = self.keyword_target(&flag)? else {
                keywords.push((flag, "true".to_string()));
                continue;
            };

            let is_bool = registry
                .resolve(&param.type_name)
                .map(|d| d.name() == "bool")
                .unwrap_or(false);

            let value = if is_bool {
                match iter.peek() {
                    Some(Token::Word(w)) if matches!(w.to_lowercase().as_str(), "true" | "false") => {
                        let value = w.clone();
                        iter.next();
                        value
                    }
                    _ => "true".to_string(),
                }
            } else {
                match iter.next() {
                    Some(Token::Word(w)) => w.clone(),
                    _ => {
                        return Err(DispatchError::argument_with_value(
                            "option requires a value",
                            token.to_text(),
                        ))
                    }
                }
            };
            keywords.push((param.name.clone(), value));
        }

        Ok((positional, keywords))
    }

    /// Hands the tokens over as a list of strings under [`CMDLINE_ARG`].
    /// Nothing is converted or validated; quoting is already removed and
    /// `--key=value` arrives as `key=value`.
    pub fn bind_cmdline(&self, tokens: &[Token]) -> Arguments {
        let words = tokens.iter().map(|t| Value::String(t.to_text())).collect();
        debug!(command = %self.name, words = tokens.len(), "Passing raw command line");
        Arguments::new(BTreeMap::from([(CMDLINE_ARG.to_string(), Value::List(words))]))
    }

    /// Binds positional and keyword text to the parameters, converting and
    /// validating every value.
    ///
    /// Positional arguments fill positional parameters in order. Keywords
    /// then overlay them, replacing any positional value for the same
    /// parameter. Remaining parameters take their defaults. All parameter
    /// types are resolved before any text is converted.
    pub fn bind(
        &self,
        registry: &TypeRegistry,
        positional: &[String],
        keywords: &[(String, String)],
    ) -> Result<Arguments> {
        let descriptors = self
            .params
            .iter()
            .map(|p| registry.resolve(&p.type_name))
            .collect::<Result<Vec<_>>>()?;
        self.check_defaults(&descriptors)?;

        let mut slots: Vec<Option<&str>> = vec![None; self.params.len()];
        let mut extra_positional: Vec<&str> = Vec::new();
        let mut extra_keywords: BTreeMap<String, &str> = BTreeMap::new();

        let mut positions = self
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind == ParamKind::Positional)
            .map(|(i, _)| i);
        for text in positional {
            match positions.next() {
                Some(index) => slots[index] = Some(text.as_str()),
                None => extra_positional.push(text.as_str()),
            }
        }
        if !extra_positional.is_empty() && !self.accepts_extra_positional() {
            return Err(DispatchError::argument_with_value(
                format!(
                    "too many positional arguments (expected at most {})",
                    self.params.iter().filter(|p| p.kind == ParamKind::Positional).count()
                ),
                extra_positional[0],
            ));
        }

        for (key, text) in keywords {
            match self.keyword_target(key)? {
                Some(param) => {
                    let index = self
                        .params
                        .iter()
                        .position(|p| p.name == param.name)
                        .ok_or_else(|| DispatchError::internal("parameter vanished"))?;
                    slots[index] = Some(text.as_str());
                }
                None if self.accepts_extra_keywords() => {
                    extra_keywords.insert(key.clone(), text.as_str());
                }
                None => {
                    return Err(DispatchError::argument_with_value(
                        "unknown keyword argument",
                        key.clone(),
                    ))
                }
            }
        }

        let missing: Vec<&str> = self
            .params
            .iter()
            .zip(&slots)
            .filter(|(p, slot)| p.is_required() && slot.is_none())
            .map(|(p, _)| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(DispatchError::argument(format!(
                "missing required argument(s): {}",
                missing.join(", ")
            )));
        }

        let mut values = BTreeMap::new();
        for ((param, descriptor), slot) in self.params.iter().zip(&descriptors).zip(&slots) {
            let validators = param.resolve_validators(descriptor)?;
            let convert = |text: &str| {
                descriptor
                    .convert(text)
                    .and_then(|value| apply_validators(&validators, value))
            };

            let value = match param.kind {
                ParamKind::Positional => match *slot {
                    Some(text) => convert(text)?,
                    None => param.default.clone().unwrap_or_default(),
                },
                ParamKind::Variadic => Value::List(
                    extra_positional
                        .iter()
                        .map(|text| convert(*text))
                        .collect::<Result<Vec<_>>>()?,
                ),
                ParamKind::Keywords => Value::Map(
                    extra_keywords
                        .iter()
                        .map(|(key, text)| convert(*text).map(|value| (key.clone(), value)))
                        .collect::<Result<BTreeMap<_, _>>>()?,
                ),
            };
            values.insert(param.name.clone(), value);
        }

        debug!(command = %self.name, args = values.len(), "Bound arguments");
        Ok(Arguments::new(values))
    }

    /// Calls the command. A `DispatchError` raised by the callable keeps its
    /// kind; any other error becomes `DispatchError::Command`.
    pub fn invoke(&self, arguments: &Arguments) -> Result<Reply> {
        (self.handler)(arguments).map_err(DispatchError::from_command)
    }

    /// Prepares a result value for display.
    ///
    /// The custom formatter wins, then the return type's formatter (named
    /// or default), then the value's own `Display` when the return type is
    /// not known.
    pub fn render(&self, registry: &TypeRegistry, value: &Value) -> Result<Rendered> {
        if self.returns.kind == ReturnKind::None || value.is_null() {
            return Ok(Rendered::default());
        }

        let text = match (&self.returns.formatter, &self.returns.type_name) {
            (Some(FormatterRef::Custom(format)), _) => format(value),
            (Some(FormatterRef::Named(formatter)), Some(type_name)) => {
                registry.format(type_name, value, Some(formatter))?
            }
            (None, Some(type_name)) => match registry.resolve(type_name) {
                Ok(descriptor) => descriptor.format_default(value),
                Err(DispatchError::UnknownType { .. }) => value.to_display_string(),
                Err(e) => return Err(e),
            },
            _ => value.to_display_string(),
        };

        Ok(Rendered {
            text: Some(text),
            data: (self.returns.kind == ReturnKind::Data).then(|| value.clone()),
        })
    }

    /// Formats a result value as display text (empty when there is nothing
    /// to show).
    pub fn format_result(&self, registry: &TypeRegistry, value: &Value) -> Result<String> {
        Ok(self.render(registry, value)?.text.unwrap_or_default())
    }
}

impl fmt::Debug for CommandMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandMetadata")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("finalizer", &self.finalizer)
            .field("takes_cmdline", &self.takes_cmdline)
            .finish()
    }
}

/// Builder for [`CommandMetadata`].
pub struct CommandBuilder {
    name: String,
    summary: Option<String>,
    description: Option<String>,
    params: Vec<ParamSpec>,
    returns: ReturnSpec,
    handler: Option<Handler>,
    finalizer: bool,
    takes_cmdline: bool,
    docs: Option<CommandDocs>,
}

impl CommandBuilder {
    /// One-line summary shown in listings.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Longer description shown by `help <command>`.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: ReturnSpec) -> Self {
        self.returns = returns;
        self
    }

    /// Marks the command as closing its owning context after it runs.
    pub fn finalizer(mut self) -> Self {
        self.finalizer = true;
        self
    }

    /// Passes the remaining words of the command line to the handler
    /// unparsed, under [`CMDLINE_ARG`]. Such a command declares no
    /// parameters.
    pub fn takes_cmdline(mut self) -> Self {
        self.takes_cmdline = true;
        self
    }

    /// Merges external documentation. Explicit descriptions take precedence.
    pub fn docs(mut self, docs: CommandDocs) -> Self {
        self.docs = Some(docs);
        self
    }

    /// Sets a callable returning a value.
    pub fn handler(
        mut self,
        handler: impl Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Arc::new(move |args| handler(args).map(Reply::Value)));
        self
    }

    /// Sets a callable returning a new context to enter.
    pub fn opens(
        mut self,
        handler: impl Fn(&Arguments) -> anyhow::Result<Arc<dyn Context>> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Arc::new(move |args| handler(args).map(Reply::Context)));
        self
    }

    fn merge_docs(&mut self) {
        let Some(docs) = self.docs.take() else {
            return;
        };
        if self.summary.is_none() {
            self.summary = docs.summary;
        }
        if self.description.is_none() {
            self.description = docs.description;
        }
        if self.returns.description.is_none() {
            self.returns.description = docs.returns;
        }
        for (name, text) in docs.params {
            match self.params.iter_mut().find(|p| p.name == name) {
                Some(param) if param.description.is_none() => param.description = Some(text),
                Some(_) => {}
                None => debug!(command = %self.name, param = %name, "Documentation names unknown parameter"),
            }
        }
    }

    /// Validates the declaration and produces the immutable metadata.
    ///
    /// Every failure is `Internal`: a malformed declaration is a bug in the
    /// declaring code, not a user error.
    pub fn declare(mut self, registry: &TypeRegistry) -> Result<Arc<CommandMetadata>> {
        let fail = |message: String| DispatchError::internal(format!("command '{}': {message}", self.name));

        if self.name.is_empty() || self.name.contains(|c: char| c == '.' || c.is_whitespace()) {
            return Err(fail("invalid command name".to_string()));
        }

        let handler = self
            .handler
            .take()
            .ok_or_else(|| fail("no handler".to_string()))?;

        if self.takes_cmdline && !self.params.is_empty() {
            return Err(fail("a command taking the raw command line cannot declare parameters".to_string()));
        }

        let mut seen = Vec::new();
        for param in &self.params {
            if !name::is_identifier(&param.name) {
                return Err(fail(format!("invalid parameter name '{}'", param.name)));
            }
            if seen.contains(&param.name.as_str()) {
                return Err(fail(format!("duplicate parameter '{}'", param.name)));
            }
            seen.push(param.name.as_str());
        }
        for kind in [ParamKind::Variadic, ParamKind::Keywords] {
            if self.params.iter().filter(|p| p.kind == kind).count() > 1 {
                return Err(fail(format!("more than one {kind:?} parameter")));
            }
        }

        // Parameters whose type is not resolvable yet are checked on first bind.
        let mut all_resolved = true;
        for param in &self.params {
            match registry.resolve(&param.type_name) {
                Ok(descriptor) => param
                    .check_default(&descriptor)
                    .map_err(|e| fail(e.to_string()))?,
                Err(DispatchError::UnknownType { .. }) => all_resolved = false,
                Err(e) => return Err(fail(e.to_string())),
            }
        }

        match (&self.returns.formatter, &self.returns.type_name) {
            (Some(FormatterRef::Named(formatter)), None) => {
                return Err(fail(format!("formatter '{formatter}' needs a return type")));
            }
            (Some(FormatterRef::Named(formatter)), Some(type_name)) => match registry.resolve(type_name) {
                Ok(descriptor) => {
                    if !descriptor.has_formatter(formatter) {
                        return Err(fail(format!(
                            "type '{type_name}' has no formatter named '{formatter}'"
                        )));
                    }
                }
                Err(DispatchError::UnknownType { .. }) => {}
                Err(e) => return Err(fail(e.to_string())),
            },
            (None, Some(type_name)) => match registry.resolve(type_name) {
                Ok(_) | Err(DispatchError::UnknownType { .. }) => {}
                Err(e) => return Err(fail(e.to_string())),
            },
            _ => {}
        }

        self.merge_docs();
        debug!(command = %self.name, params = self.params.len(), "Declared command");

        Ok(Arc::new(CommandMetadata {
            name: self.name,
            summary: self.summary,
            description: self.description,
            params: self.params,
            returns: self.returns,
            handler,
            finalizer: self.finalizer,
            takes_cmdline: self.takes_cmdline,
            defaults_checked: AtomicBool::new(all_resolved),
        }))
    }
}
