//! External type sources.
//!
//! A source provides extra type descriptors to a registry. Sources are
//! identified by name so that loading one twice is a no-op.

use super::descriptor::{TypeDescriptor, Validator};
use super::value::Value;
use super::TypeRegistry;
use anyhow::Context as _;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Provider of type descriptors, e.g. a plugin or a type definition file.
pub trait TypeSource: Send + Sync {
    /// Unique name of the source.
    fn name(&self) -> &str;

    /// Produces the descriptors to register. The registry is available to
    /// resolve base types.
    fn load(&self, registry: &TypeRegistry) -> anyhow::Result<Vec<TypeDescriptor>>;
}

type LoadFn = Box<dyn Fn(&TypeRegistry) -> anyhow::Result<Vec<TypeDescriptor>> + Send + Sync>;

/// A source backed by a closure.
pub struct FnSource {
    name: String,
    load: LoadFn,
}

impl FnSource {
    pub fn new(
        name: impl Into<String>,
        load: impl Fn(&TypeRegistry) -> anyhow::Result<Vec<TypeDescriptor>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            load: Box::new(load),
        }
    }
}

impl TypeSource for FnSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, registry: &TypeRegistry) -> anyhow::Result<Vec<TypeDescriptor>> {
        (self.load)(registry)
    }
}

impl fmt::Debug for FnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").field("name", &self.name).finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeFile {
    #[serde(default)]
    types: BTreeMap<String, TypeDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeDef {
    base: String,
    description: Option<String>,
    #[serde(default)]
    validators: Vec<ValidatorDef>,
    choices: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ValidatorDef {
    name: String,
    #[serde(default)]
    args: Vec<toml::Value>,
}

#[derive(Debug, Clone)]
enum Origin {
    File(PathBuf),
    Text(String),
}

/// Derived types defined in a TOML file.
///
/// ```toml
/// [types.port]
/// base = "integer"
/// description = "TCP port"
/// validators = [{ name = "range", args = [1, 65535] }]
///
/// [types.color]
/// base = "string"
/// choices = ["red", "green", "blue"]
/// ```
#[derive(Debug, Clone)]
pub struct TomlTypeSource {
    name: String,
    origin: Origin,
}

impl TomlTypeSource {
    /// Creates a source reading the given file when loaded.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            origin: Origin::File(path),
        }
    }

    /// Creates a source from in-memory TOML.
    pub fn from_toml(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: Origin::Text(text.into()),
        }
    }

    fn read(&self) -> anyhow::Result<String> {
        match &self.origin {
            Origin::File(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read type file: {}", path.display())),
            Origin::Text(text) => Ok(text.clone()),
        }
    }
}

impl TypeSource for TomlTypeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, registry: &TypeRegistry) -> anyhow::Result<Vec<TypeDescriptor>> {
        let text = self.read()?;
        let file: TypeFile = toml::from_str(&text).context("Failed to parse type file")?;

        file.types
            .into_iter()
            .map(|(name, def)| {
                derive_type(registry, &name, def).with_context(|| format!("in type '{name}'"))
            })
            .collect()
    }
}

fn derive_type(registry: &TypeRegistry, name: &str, def: TypeDef) -> anyhow::Result<TypeDescriptor> {
    let base = registry.resolve(&def.base)?;
    let description = def
        .description
        .unwrap_or_else(|| format!("derived from {}", base.name()));
    let mut descriptor = base.derive(name).with_description(description);

    for validator in &def.validators {
        let args: Vec<Value> = validator.args.iter().cloned().map(Value::from).collect();
        descriptor = descriptor.with_validator(base.validator(&validator.name, &args)?);
    }

    if let Some(choices) = def.choices {
        descriptor = descriptor.with_validator(Validator::check("choice", move |value| {
            let text = value.to_display_string();
            if choices.contains(&text) {
                Ok(())
            } else {
                Err(format!("expected one of: {}", choices.join(", ")))
            }
        }));
    }

    Ok(descriptor)
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Integer(i),
            toml::Value::Float(f) => Value::Float(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(d) => Value::String(d.to_string()),
            toml::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            toml::Value::Table(table) => {
                Value::Map(table.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
