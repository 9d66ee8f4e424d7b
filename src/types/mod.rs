//! Type registry.
//!
//! Maps type names to [`TypeDescriptor`]s. Composite names such as
//! `list(integer)` are instantiated on demand through type factories and
//! cached under their canonical spelling. External [`TypeSource`]s can be
//! loaded eagerly or queued and loaded lazily on the first lookup miss.

pub mod builtin;
pub mod descriptor;
pub mod name;
pub mod source;
pub mod value;

pub use descriptor::{FormatFn, TypeDescriptor, Validator};
pub use name::TypeName;
pub use source::{FnSource, TomlTypeSource, TypeSource};
pub use value::{FromValue, Value};

use crate::error::{DispatchError, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Builds a composite descriptor from its canonical name and resolved arguments.
pub type BuildFn =
    Arc<dyn Fn(&str, &[Arc<TypeDescriptor>]) -> std::result::Result<TypeDescriptor, String> + Send + Sync>;

/// A parameterized type such as `list(T)`.
#[derive(Clone)]
pub struct TypeFactory {
    name: String,
    arity: usize,
    build: BuildFn,
}

impl TypeFactory {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        build: impl Fn(&str, &[Arc<TypeDescriptor>]) -> std::result::Result<TypeDescriptor, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            build: Arc::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

/// Outcome of loading a batch of sources.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadReport {
    /// Sources that loaded, with the number of types each registered.
    pub loaded: Vec<(String, usize)>,
    /// Sources that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

#[derive(Default)]
struct SourceState {
    pending: VecDeque<Arc<dyn TypeSource>>,
    loaded: HashSet<String>,
    failed: Vec<(String, String)>,
}

/// Registry of named types shared by every command of a shell.
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
    factories: RwLock<HashMap<String, TypeFactory>>,
    sources: Mutex<SourceState>,
}

impl TypeRegistry {
    /// Creates a registry with the built-in types.
    pub fn new() -> Self {
        let registry = Self::empty();
        builtin::register_builtins(&registry);
        registry
    }

    /// Creates a registry with no types at all.
    pub fn empty() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
            factories: RwLock::new(HashMap::new()),
            sources: Mutex::new(SourceState::default()),
        }
    }

    /// Registers a descriptor under its name and aliases, replacing any
    /// previous registration.
    pub fn register(&self, descriptor: TypeDescriptor) -> Result<()> {
        Self::check_descriptor(&descriptor)?;
        self.install(descriptor);
        Ok(())
    }

    fn check_descriptor(descriptor: &TypeDescriptor) -> Result<()> {
        for name in std::iter::once(descriptor.name()).chain(descriptor.aliases().iter().map(String::as_str)) {
            if !name::is_identifier(name) {
                return Err(DispatchError::internal(format!(
                    "invalid type name '{name}'"
                )));
            }
        }
        if !descriptor.has_text_form() && !descriptor.has_binary_form() {
            return Err(DispatchError::internal(format!(
                "type '{}' has neither a text nor a binary converter",
                descriptor.name()
            )));
        }
        Ok(())
    }

    pub(crate) fn install(&self, descriptor: TypeDescriptor) {
        let descriptor = Arc::new(descriptor);
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);

        // Composite instances captured the replaced descriptor.
        types.retain(|key, _| !key.contains('('));

        for key in std::iter::once(descriptor.name()).chain(descriptor.aliases().iter().map(String::as_str)) {
            if types.insert(key.to_string(), descriptor.clone()).is_some() {
                debug!(type_name = key, "Replaced type registration");
            } else {
                debug!(type_name = key, "Registered type");
            }
        }
    }

    /// Registers a type factory, replacing any previous one of that name.
    pub fn register_factory(&self, factory: TypeFactory) -> Result<()> {
        if !name::is_identifier(factory.name()) {
            return Err(DispatchError::internal(format!(
                "invalid type factory name '{}'",
                factory.name()
            )));
        }
        self.install_factory(factory);
        Ok(())
    }

    pub(crate) fn install_factory(&self, factory: TypeFactory) {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        types.retain(|key, _| !key.contains('('));
        drop(types);

        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        debug!(factory = factory.name(), arity = factory.arity(), "Registered type factory");
        factories.insert(factory.name().to_string(), factory);
    }

    fn lookup(&self, key: &str) -> Option<Arc<TypeDescriptor>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn factory(&self, name: &str) -> Option<TypeFactory> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Resolves a type name to its descriptor.
    ///
    /// Queued sources are loaded one at a time until the name resolves.
    pub fn resolve(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        let key = name::canonicalize(name);
        if let Some(descriptor) = self.lookup(&key) {
            return Ok(descriptor);
        }

        if key.contains('(') {
            return self.instantiate(&TypeName::parse(&key)?);
        }

        while self.load_next_pending() {
            if let Some(descriptor) = self.lookup(&key) {
                return Ok(descriptor);
            }
        }

        Err(DispatchError::unknown_type(name.trim()))
    }

    fn instantiate(&self, parsed: &TypeName) -> Result<Arc<TypeDescriptor>> {
        let key = parsed.canonical();
        if !parsed.is_composite() {
            return self.resolve(&key);
        }
        if let Some(descriptor) = self.lookup(&key) {
            return Ok(descriptor);
        }

        let args = parsed
            .args
            .iter()
            .map(|arg| self.instantiate(arg))
            .collect::<Result<Vec<_>>>()?;

        let factory = self
            .factory(&parsed.base)
            .ok_or_else(|| DispatchError::unknown_type(&key))?;
        // Composite names may come from user input, so these are not
        // declaration errors here; `declare` reports them as `Internal`.
        if args.len() != factory.arity() {
            return Err(DispatchError::argument_with_value(
                format!(
                    "type '{}' takes {} argument(s), got {}",
                    factory.name(),
                    factory.arity(),
                    args.len()
                ),
                key,
            ));
        }

        let descriptor = (factory.build)(&key, &args).map_err(|reason| {
            DispatchError::argument_with_value(format!("cannot instantiate type: {reason}"), &key)
        })?;
        let descriptor = Arc::new(descriptor);

        debug!(type_name = %key, "Instantiated composite type");
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, descriptor.clone());
        Ok(descriptor)
    }

    /// Returns true if `name` resolves, loading queued sources if needed.
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Converts text through the named type's converter and validators.
    pub fn convert(&self, name: &str, text: &str) -> Result<Value> {
        self.resolve(name)?.convert(text)
    }

    /// Converts a binary encoding through the named type.
    pub fn convert_binary(&self, name: &str, data: &[u8]) -> Result<Value> {
        self.resolve(name)?.convert_binary(data)
    }

    /// Formats a value with the type's default or a named formatter.
    pub fn format(&self, name: &str, value: &Value, formatter: Option<&str>) -> Result<String> {
        self.resolve(name)?.format(value, formatter)
    }

    /// Builds a named validator of the given type.
    pub fn validator(&self, type_name: &str, validator: &str, args: &[Value]) -> Result<Validator> {
        self.resolve(type_name)?.validator(validator, args)
    }

    /// Returns the distinct registered descriptors sorted by name.
    ///
    /// Aliases and cached composite instances are not listed separately.
    pub fn descriptors(&self) -> Vec<Arc<TypeDescriptor>> {
        let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
        let mut descriptors: Vec<Arc<TypeDescriptor>> = types
            .iter()
            .filter(|(key, descriptor)| key.as_str() == descriptor.name() && !key.contains('('))
            .map(|(_, descriptor)| descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.name().cmp(b.name()));
        descriptors
    }

    /// Returns every registered type name, aliases included, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = types
            .keys()
            .filter(|key| !key.contains('('))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Returns the registered factory names with their arity, sorted.
    pub fn factory_names(&self) -> Vec<(String, usize)> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<(String, usize)> = factories
            .values()
            .map(|f| (f.name().to_string(), f.arity()))
            .collect();
        names.sort();
        names
    }

    /// Queues a source to be loaded on the first lookup miss.
    pub fn add_source(&self, source: Arc<dyn TypeSource>) {
        debug!(source = source.name(), "Queued type source");
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .push_back(source);
    }

    fn load_next_pending(&self) -> bool {
        // The lock is released before loading; sources resolve their base types.
        let next = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .pop_front();
        match next {
            Some(source) => {
                // Failures are recorded in failed_sources().
                let _ = self.load_external(source.as_ref());
                true
            }
            None => false,
        }
    }

    /// Loads every queued source now.
    pub fn load_pending(&self) -> LoadReport {
        let mut pending = Vec::new();
        {
            let mut state = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
            pending.extend(state.pending.drain(..));
        }
        self.load_sources(pending)
    }

    /// Registers every descriptor a source provides.
    ///
    /// Loading is idempotent per source name: a source already loaded (or
    /// already failed) returns `Ok(0)`. Either all of the source's types are
    /// registered or none are.
    pub fn load_external(&self, source: &dyn TypeSource) -> Result<usize> {
        let source_name = source.name().to_string();
        {
            let mut state = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.loaded.insert(source_name.clone()) {
                debug!(source = %source_name, "Type source already loaded");
                return Ok(0);
            }
        }

        let loaded = source
            .load(self)
            .map_err(|e| format!("{e:#}"))
            .and_then(|descriptors| {
                descriptors
                    .iter()
                    .try_for_each(Self::check_descriptor)
                    .map_err(|e| e.to_string())?;
                Ok(descriptors)
            });

        match loaded {
            Ok(descriptors) => {
                let count = descriptors.len();
                for descriptor in descriptors {
                    self.install(descriptor);
                }
                info!(source = %source_name, count, "Loaded type source");
                Ok(count)
            }
            Err(reason) => {
                warn!(source = %source_name, %reason, "Failed to load type source");
                self.sources
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .failed
                    .push((source_name.clone(), reason.clone()));
                Err(DispatchError::type_source(source_name, reason))
            }
        }
    }

    /// Loads a batch of sources; one failing source never stops the others.
    pub fn load_sources<I>(&self, sources: I) -> LoadReport
    where
        I: IntoIterator<Item = Arc<dyn TypeSource>>,
    {
        let mut report = LoadReport::default();
        for source in sources {
            match self.load_external(source.as_ref()) {
                Ok(count) => report.loaded.push((source.name().to_string(), count)),
                Err(e) => report.failed.push((source.name().to_string(), e.to_string())),
            }
        }
        report
    }

    /// Sources that failed to load, with the reason.
    pub fn failed_sources(&self) -> Vec<(String, String)> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failed
            .clone()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_names())
            .field("factories", &self.factory_names())
            .finish()
    }
}
