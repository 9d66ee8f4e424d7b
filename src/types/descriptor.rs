//! Type descriptors: the converter, validators and formatters of one type.

use super::value::Value;
use crate::error::{DispatchError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Parses text into a value. `Err` carries a human-readable reason.
pub type ConvertFn = Arc<dyn Fn(&str) -> std::result::Result<Value, String> + Send + Sync>;

/// Parses a fixed-layout binary encoding into a value.
pub type BinaryFn = Arc<dyn Fn(&[u8]) -> std::result::Result<Value, String> + Send + Sync>;

/// Checks (and possibly normalizes) a converted value.
pub type ValidateFn = Arc<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Renders a value as display text. Never fails.
pub type FormatFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Builds a parameterized validator, e.g. `range(0, 10)`.
pub type ValidatorFactory =
    Arc<dyn Fn(&[Value]) -> std::result::Result<Validator, String> + Send + Sync>;

/// A named validation rule.
#[derive(Clone)]
pub struct Validator {
    name: String,
    func: ValidateFn,
}

impl Validator {
    /// Creates a validator that may transform the value.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Creates a validator that only inspects the value.
    pub fn check(
        name: impl Into<String>,
        check: impl Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, move |value| check(&value).map(|()| value))
    }

    /// Returns the rule name reported in validation errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the rule, producing a `Validation` error on failure.
    pub fn apply(&self, value: Value) -> Result<Value> {
        let shown = value.to_display_string();
        (self.func)(value).map_err(|reason| DispatchError::validation(&self.name, shown, reason))
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("name", &self.name).finish()
    }
}

/// Formatter names that select a type's default formatter.
fn is_default_formatter(name: &str) -> bool {
    matches!(name, "default" | "str" | "string")
}

/// Everything the registry knows about one type.
#[derive(Clone)]
pub struct TypeDescriptor {
    name: String,
    description: Option<String>,
    converter: Option<ConvertFn>,
    binary: Option<BinaryFn>,
    binary_size: Option<usize>,
    validators: Vec<Validator>,
    formatter: FormatFn,
    formatters: BTreeMap<String, FormatFn>,
    validator_factories: BTreeMap<String, ValidatorFactory>,
    aliases: Vec<String>,
    lossy: bool,
}

impl TypeDescriptor {
    /// Creates a descriptor with a text converter and a default formatter.
    pub fn new(
        name: impl Into<String>,
        converter: impl Fn(&str) -> std::result::Result<Value, String> + Send + Sync + 'static,
        formatter: impl Fn(&Value) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            converter: Some(Arc::new(converter)),
            binary: None,
            binary_size: None,
            validators: Vec::new(),
            formatter: Arc::new(formatter),
            formatters: BTreeMap::new(),
            validator_factories: BTreeMap::new(),
            aliases: Vec::new(),
            lossy: false,
        }
    }

    /// Creates a descriptor that only has a binary form.
    pub fn binary_only(
        name: impl Into<String>,
        size: Option<usize>,
        binary: impl Fn(&[u8]) -> std::result::Result<Value, String> + Send + Sync + 'static,
        formatter: impl Fn(&Value) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            converter: None,
            binary: Some(Arc::new(binary)),
            binary_size: size,
            ..Self::new(name, |_| Err(String::new()), formatter)
        }
    }

    /// Returns a copy registered under a new name, without aliases.
    ///
    /// Used for types derived from a base type with extra validators.
    pub fn derive(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            ..self.clone()
        }
    }

    /// Sets the description shown in type listings.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a binary converter with an optional fixed size.
    pub fn with_binary(
        mut self,
        size: Option<usize>,
        binary: impl Fn(&[u8]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.binary = Some(Arc::new(binary));
        self.binary_size = size;
        self
    }

    /// Appends a validator that runs on every conversion.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Adds a named formatter selectable as an override.
    pub fn with_formatter(
        mut self,
        name: impl Into<String>,
        formatter: impl Fn(&Value) -> String + Send + Sync + 'static,
    ) -> Self {
        self.formatters.insert(name.into(), Arc::new(formatter));
        self
    }

    /// Adds a validator factory that parameters can reference by name.
    pub fn with_validator_factory(
        mut self,
        name: impl Into<String>,
        factory: impl Fn(&[Value]) -> std::result::Result<Validator, String> + Send + Sync + 'static,
    ) -> Self {
        self.validator_factories
            .insert(name.into(), Arc::new(factory));
        self
    }

    /// Adds an alternative name under which the type is registered.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Marks the default formatter as not round-trip safe.
    pub fn lossy(mut self) -> Self {
        self.lossy = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn binary_size(&self) -> Option<usize> {
        self.binary_size
    }

    pub fn is_lossy(&self) -> bool {
        self.lossy
    }

    /// Returns true if the type can be built from text.
    pub fn has_text_form(&self) -> bool {
        self.converter.is_some()
    }

    /// Returns true if the type can be built from bytes.
    pub fn has_binary_form(&self) -> bool {
        self.binary.is_some()
    }

    /// Names of the formatters selectable as overrides.
    pub fn formatter_names(&self) -> impl Iterator<Item = &str> {
        self.formatters.keys().map(String::as_str)
    }

    /// Names of the validators parameters can reference.
    pub fn validator_names(&self) -> impl Iterator<Item = &str> {
        self.validator_factories.keys().map(String::as_str)
    }

    /// Converts text, then applies the type's validators in order.
    pub fn convert(&self, text: &str) -> Result<Value> {
        let converter = self.converter.as_ref().ok_or_else(|| {
            DispatchError::conversion(&self.name, text, "type has no text representation")
        })?;
        let value = converter(text)
            .map_err(|reason| DispatchError::conversion(&self.name, text, reason))?;
        self.validate(value)
    }

    /// Converts a binary encoding, checking the fixed size when declared.
    pub fn convert_binary(&self, data: &[u8]) -> Result<Value> {
        let shown = format!("0x{}", hex::encode(data));
        let binary = self.binary.as_ref().ok_or_else(|| {
            DispatchError::conversion(&self.name, &shown, "type has no binary representation")
        })?;
        if let Some(size) = self.binary_size {
            if data.len() != size {
                return Err(DispatchError::conversion(
                    &self.name,
                    shown,
                    format!("expected {size} bytes, got {}", data.len()),
                ));
            }
        }
        let value = binary(data).map_err(|reason| DispatchError::conversion(&self.name, &shown, reason))?;
        self.validate(value)
    }

    /// Applies the type's validators, stopping at the first failure.
    pub fn validate(&self, value: Value) -> Result<Value> {
        self.validators
            .iter()
            .try_fold(value, |value, validator| validator.apply(value))
    }

    /// Formats with the default formatter.
    pub fn format_default(&self, value: &Value) -> String {
        (self.formatter)(value)
    }

    /// True if `formatter` selects a formatter of this type. `default`,
    /// `str` and `string` name the default formatter.
    pub fn has_formatter(&self, formatter: &str) -> bool {
        is_default_formatter(formatter) || self.formatters.contains_key(formatter)
    }

    /// Formats with a named formatter, or the default one when `formatter`
    /// is `None` or one of its names.
    pub fn format(&self, value: &Value, formatter: Option<&str>) -> Result<String> {
        match formatter {
            None => Ok(self.format_default(value)),
            Some(name) if is_default_formatter(name) => Ok(self.format_default(value)),
            Some(name) => {
                let func = self.formatters.get(name).ok_or_else(|| {
                    DispatchError::argument_with_value(
                        format!("unknown format for type {}", self.name),
                        name,
                    )
                })?;
                Ok(func(value))
            }
        }
    }

    /// Builds the named validator with the given arguments.
    pub fn validator(&self, name: &str, args: &[Value]) -> Result<Validator> {
        let factory = self.validator_factories.get(name).ok_or_else(|| {
            DispatchError::internal(format!(
                "type '{}' has no validator named '{name}'",
                self.name
            ))
        })?;
        factory(args).map_err(|reason| {
            DispatchError::internal(format!(
                "invalid arguments for validator '{name}' of type '{}': {reason}",
                self.name
            ))
        })
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("binary_size", &self.binary_size)
            .field("validators", &self.validators)
            .field("formatters", &self.formatters.keys().collect::<Vec<_>>())
            .field("lossy", &self.lossy)
            .finish()
    }
}
