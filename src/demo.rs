//! Built-in command tree served by the `cmdtree` binary.
//!
//! ```text
//! root
//! ├── echo, words, add, hex, types, convert
//! ├── math/   sum, mean, clamp, div
//! ├── fs/     stat, read
//! └── kv/     set, get, keys, delete, dump, bucket, close
//!     └── <bucket>/  set, get, keys, delete
//! ```
//!
//! The `kv` store outlives its context: leaving and re-entering `kv` keeps
//! the data for the rest of the session.

use crate::commands::{CommandMetadata, ParamSpec, ReturnSpec, CMDLINE_ARG};
use crate::context::{BasicContext, Context};
use crate::error::{DispatchError, Result};
use crate::types::{TypeRegistry, Validator, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type Store = Arc<Mutex<BTreeMap<String, String>>>;

/// Builds the root context of the demo tree.
pub fn build_root(registry: &Arc<TypeRegistry>) -> Result<Arc<dyn Context>> {
    let store: Store = Arc::default();

    let math_registry = registry.clone();
    let fs_registry = registry.clone();
    let kv_registry = registry.clone();

    BasicContext::builder("root")
        .description("cmdtree demo commands")
        .command(echo(registry)?)
        .command(words(registry)?)
        .command(add(registry)?)
        .command(hex(registry)?)
        .command(types(registry)?)
        .command(convert(registry)?)
        .child("math", move || Ok(math(&math_registry)?))
        .child("fs", move || Ok(fs(&fs_registry)?))
        .child("kv", move || Ok(kv(&kv_registry, store.clone())?))
        .build()
}

fn echo(registry: &TypeRegistry) -> Result<Arc<CommandMetadata>> {
    CommandMetadata::builder("echo")
        .summary("Print the words")
        .param(ParamSpec::new("words", "string").variadic())
        .returns(ReturnSpec::text("string"))
        .handler(|args| {
            let words: Vec<String> = args.get("words")?;
            Ok(Value::String(words.join(" ")))
        })
        .declare(registry)
}

fn words(registry: &TypeRegistry) -> Result<Arc<CommandMetadata>> {
    CommandMetadata::builder("words")
        .summary("Show the command line as received, one word per line")
        .takes_cmdline()
        .returns(ReturnSpec::text("list(string)"))
        .handler(|args| Ok(args.value(CMDLINE_ARG).cloned().unwrap_or_default()))
        .declare(registry)
}

fn add(registry: &TypeRegistry) -> Result<Arc<CommandMetadata>> {
    CommandMetadata::builder("add")
        .summary("Add two integers")
        .param(ParamSpec::new("a", "integer"))
        .param(ParamSpec::new("b", "integer"))
        .returns(ReturnSpec::data("integer").describe("the sum"))
        .handler(|args| {
            let a: i64 = args.get("a")?;
            let b: i64 = args.get("b")?;
            a.checked_add(b)
                .map(Value::Integer)
                .ok_or_else(|| DispatchError::argument("integer overflow").into())
        })
        .declare(registry)
}

fn hex(registry: &TypeRegistry) -> Result<Arc<CommandMetadata>> {
    CommandMetadata::builder("hex")
        .summary("Show an integer in hexadecimal")
        .param(ParamSpec::new("value", "integer"))
        .returns(ReturnSpec::data("integer").formatted_as("hex"))
        .handler(|args| Ok(Value::Integer(args.get("value")?)))
        .declare(registry)
}

fn types(registry: &Arc<TypeRegistry>) -> Result<Arc<CommandMetadata>> {
    let types = registry.clone();
    CommandMetadata::builder("types")
        .summary("List registered types")
        .returns(ReturnSpec::text("list(string)"))
        .handler(move |_| {
            let mut names: Vec<Value> = types.type_names().into_iter().map(Value::String).collect();
            names.extend(
                types
                    .factory_names()
                    .into_iter()
                    .map(|(name, arity)| Value::String(format!("{name}/{arity}"))),
            );
            Ok(Value::List(names))
        })
        .declare(registry)
}

fn convert(registry: &Arc<TypeRegistry>) -> Result<Arc<CommandMetadata>> {
    let types = registry.clone();
    CommandMetadata::builder("convert")
        .summary("Convert text with a registered type and format it back")
        .param(ParamSpec::new("type", "string").describe("type name, e.g. list(integer)"))
        .param(ParamSpec::new("text", "string"))
        .param(ParamSpec::new("format", "string").default_value("default"))
        .returns(ReturnSpec::text("string"))
        .handler(move |args| {
            let type_name: String = args.get("type")?;
            let text: String = args.get("text")?;
            let format: String = args.get("format")?;
            let value = types.convert(&type_name, &text)?;
            Ok(Value::String(types.format(&type_name, &value, Some(format.as_str()))?))
        })
        .declare(registry)
}

fn math(registry: &TypeRegistry) -> Result<Arc<dyn Context>> {
    let sum = CommandMetadata::builder("sum")
        .summary("Sum of the values")
        .param(ParamSpec::new("values", "float").variadic())
        .returns(ReturnSpec::data("float"))
        .handler(|args| {
            let values: Vec<f64> = args.get("values")?;
            Ok(Value::Float(values.iter().sum()))
        })
        .declare(registry)?;

    let mean = CommandMetadata::builder("mean")
        .summary("Arithmetic mean of the values")
        .param(ParamSpec::new("values", "float").variadic())
        .returns(ReturnSpec::data("float"))
        .handler(|args| {
            let values: Vec<f64> = args.get("values")?;
            if values.is_empty() {
                return Err(DispatchError::argument("mean needs at least one value").into());
            }
            Ok(Value::Float(values.iter().sum::<f64>() / values.len() as f64))
        })
        .declare(registry)?;

    let clamp = CommandMetadata::builder("clamp")
        .summary("Clamp a value into [low, high]")
        .param(ParamSpec::new("value", "integer"))
        .param(ParamSpec::new("low", "integer").default_value(0))
        .param(ParamSpec::new("high", "integer").default_value(100))
        .returns(ReturnSpec::data("integer"))
        .handler(|args| {
            let value: i64 = args.get("value")?;
            let low: i64 = args.get("low")?;
            let high: i64 = args.get("high")?;
            if low > high {
                return Err(DispatchError::argument_with_value(
                    "low must not exceed high",
                    format!("{low} > {high}"),
                )
                .into());
            }
            Ok(Value::Integer(value.clamp(low, high)))
        })
        .declare(registry)?;

    let nonzero = Validator::check("nonzero", |value| match value.as_integer() {
        Some(0) => Err("divisor must not be zero".to_string()),
        _ => Ok(()),
    });
    let div = CommandMetadata::builder("div")
        .summary("Integer division")
        .param(ParamSpec::new("a", "integer"))
        .param(ParamSpec::new("b", "integer").validate_with(nonzero))
        .returns(ReturnSpec::data("integer"))
        .handler(|args| {
            let a: i64 = args.get("a")?;
            let b: i64 = args.get("b")?;
            a.checked_div(b)
                .map(Value::Integer)
                .ok_or_else(|| DispatchError::argument("integer overflow").into())
        })
        .declare(registry)?;

    BasicContext::builder("math")
        .description("Arithmetic")
        .command(sum)
        .command(mean)
        .command(clamp)
        .command(div)
        .build()
}

fn fs(registry: &TypeRegistry) -> Result<Arc<dyn Context>> {
    let stat = CommandMetadata::builder("stat")
        .summary("Show file metadata")
        .param(ParamSpec::new("file", "path").validate("exists", Vec::new()))
        .returns(ReturnSpec::data("map"))
        .handler(|args| {
            let path: std::path::PathBuf = args.get("file")?;
            let metadata = std::fs::metadata(&path)?;
            let mut info = BTreeMap::new();
            info.insert("size".to_string(), Value::Integer(metadata.len() as i64));
            info.insert("is_dir".to_string(), Value::Bool(metadata.is_dir()));
            info.insert(
                "readonly".to_string(),
                Value::Bool(metadata.permissions().readonly()),
            );
            Ok(Value::Map(info))
        })
        .declare(registry)?;

    let read = CommandMetadata::builder("read")
        .summary("Print a text file")
        .param(
            ParamSpec::new("file", "path")
                .validate("exists", Vec::new())
                .validate("readable", Vec::new()),
        )
        .param(
            ParamSpec::new("lines", "integer")
                .optional()
                .validate("positive", Vec::new())
                .describe("only the first N lines"),
        )
        .returns(ReturnSpec::text("string"))
        .handler(|args| {
            let path: std::path::PathBuf = args.get("file")?;
            let limit: Option<i64> = args.get("lines")?;
            let content = std::fs::read_to_string(&path)?;
            let text = match limit {
                Some(n) => content
                    .lines()
                    .take(usize::try_from(n).unwrap_or(usize::MAX))
                    .collect::<Vec<_>>()
                    .join("\n"),
                None => content.trim_end_matches('\n').to_string(),
            };
            Ok(Value::String(text))
        })
        .declare(registry)?;

    BasicContext::builder("fs")
        .description("Filesystem inspection")
        .command(stat)
        .command(read)
        .build()
}

fn lock(store: &Store) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Declares `set`, `get`, `keys` and `delete` over the keys starting with
/// `prefix`.
fn kv_commands(registry: &TypeRegistry, store: &Store, prefix: &str) -> Result<Vec<Arc<CommandMetadata>>> {
    let key_param = || {
        ParamSpec::new("key", "string")
            .validate("not_empty", Vec::new())
            .describe("key name")
    };

    let (set_store, set_prefix) = (store.clone(), prefix.to_string());
    let set = CommandMetadata::builder("set")
        .summary("Store a value")
        .param(key_param())
        .param(ParamSpec::new("value", "string"))
        .handler(move |args| {
            let key: String = args.get("key")?;
            let value: String = args.get("value")?;
            lock(&set_store).insert(format!("{set_prefix}{key}"), value);
            Ok(Value::Null)
        })
        .declare(registry)?;

    let (get_store, get_prefix) = (store.clone(), prefix.to_string());
    let get = CommandMetadata::builder("get")
        .summary("Show a stored value")
        .param(key_param())
        .returns(ReturnSpec::text("string"))
        .handler(move |args| {
            let key: String = args.get("key")?;
            match lock(&get_store).get(&format!("{get_prefix}{key}")) {
                Some(value) => Ok(Value::String(value.clone())),
                None => Err(DispatchError::argument_with_value("no such key", key).into()),
            }
        })
        .declare(registry)?;

    let (keys_store, keys_prefix) = (store.clone(), prefix.to_string());
    let keys = CommandMetadata::builder("keys")
        .summary("List stored keys")
        .returns(ReturnSpec::text("list(string)"))
        .handler(move |_| {
            let keys = lock(&keys_store)
                .keys()
                .filter_map(|key| key.strip_prefix(keys_prefix.as_str()))
                .filter(|key| !keys_prefix.is_empty() || !key.contains('/'))
                .map(|key| Value::String(key.to_string()))
                .collect();
            Ok(Value::List(keys))
        })
        .declare(registry)?;

    let (delete_store, delete_prefix) = (store.clone(), prefix.to_string());
    let delete = CommandMetadata::builder("delete")
        .summary("Remove a key")
        .param(key_param())
        .returns(ReturnSpec::data("bool").describe("whether the key existed"))
        .handler(move |args| {
            let key: String = args.get("key")?;
            let removed = lock(&delete_store).remove(&format!("{delete_prefix}{key}"));
            Ok(Value::Bool(removed.is_some()))
        })
        .declare(registry)?;

    Ok(vec![set, get, keys, delete])
}

fn bucket(registry: &TypeRegistry, store: &Store, name: &str) -> Result<Arc<dyn Context>> {
    let mut builder = BasicContext::builder(name).description(format!("keys under '{name}/'"));
    for command in kv_commands(registry, store, &format!("{name}/"))? {
        builder = builder.command(command);
    }
    let bucket_name = name.to_string();
    builder
        .finalizer(move || {
            debug!(bucket = %bucket_name, "Closed bucket");
            Ok(())
        })
        .build()
}

fn kv(registry: &Arc<TypeRegistry>, store: Store) -> Result<Arc<dyn Context>> {
    let dump_store = store.clone();
    let dump = CommandMetadata::builder("dump")
        .summary("Show every key and value")
        .returns(ReturnSpec::data("map"))
        .handler(move |_| {
            let entries = lock(&dump_store)
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect();
            Ok(Value::Map(entries))
        })
        .declare(registry)?;

    let (bucket_registry, bucket_store) = (registry.clone(), store.clone());
    let open_bucket = CommandMetadata::builder("bucket")
        .summary("Enter a bucket of keys")
        .param(
            ParamSpec::new("name", "string")
                .validate("matches", vec![Value::from("[A-Za-z0-9_-]+")]),
        )
        .opens(move |args| {
            let name: String = args.get("name")?;
            Ok(bucket(&bucket_registry, &bucket_store, &name)?)
        })
        .declare(registry)?;

    let close = CommandMetadata::builder("close")
        .summary("Leave the store")
        .finalizer()
        .handler(|_| Ok(Value::Null))
        .declare(registry)?;

    let mut builder = BasicContext::builder("kv").description("In-memory key/value store");
    for command in kv_commands(registry, &store, "")? {
        builder = builder.command(command);
    }
    let finalize_store = store.clone();
    builder
        .command(dump)
        .command(open_bucket)
        .command(close)
        .finalizer(move || {
            debug!(keys = lock(&finalize_store).len(), "Closed kv store");
            Ok(())
        })
        .build()
}
