//! Integration tests for the type registry.

use cmdtree::error::DispatchError;
use cmdtree::types::{FnSource, TomlTypeSource, TypeDescriptor, TypeRegistry, Validator, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn round_trip(registry: &TypeRegistry, type_name: &str, value: &Value) -> Value {
    let text = registry.format(type_name, value, None).unwrap();
    registry.convert(type_name, &text).unwrap()
}

proptest! {
    #[test]
    fn prop_integer_round_trip(i in any::<i64>()) {
        let registry = TypeRegistry::new();
        let value = Value::Integer(i);
        prop_assert_eq!(round_trip(&registry, "integer", &value), value);
    }

    #[test]
    fn prop_float_round_trip(f in -1.0e12f64..1.0e12) {
        let registry = TypeRegistry::new();
        let value = Value::Float(f);
        prop_assert_eq!(round_trip(&registry, "float", &value), value);
    }

    #[test]
    fn prop_string_round_trip(s in any::<String>()) {
        let registry = TypeRegistry::new();
        let value = Value::String(s);
        prop_assert_eq!(round_trip(&registry, "string", &value), value);
    }

    #[test]
    fn prop_bytes_round_trip(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let registry = TypeRegistry::new();
        let value = Value::Bytes(data);
        prop_assert_eq!(round_trip(&registry, "bytes", &value), value);
    }

    #[test]
    fn prop_bool_round_trip(b in any::<bool>()) {
        let registry = TypeRegistry::new();
        let value = Value::Bool(b);
        prop_assert_eq!(round_trip(&registry, "bool", &value), value);
    }

    #[test]
    fn prop_path_round_trip(parts in proptest::collection::vec("[^/\\x00]{1,12}", 1..4)) {
        let registry = TypeRegistry::new();
        let value = Value::Path(parts.join("/").into());
        prop_assert_eq!(round_trip(&registry, "path", &value), value);
    }

    #[test]
    fn prop_fixed_size_integers_round_trip(
        a in any::<u8>(),
        b in any::<u16>(),
        c in any::<u32>(),
        d in any::<i32>(),
    ) {
        let registry = TypeRegistry::new();
        for (type_name, n) in [
            ("uint8", i64::from(a)),
            ("uint16", i64::from(b)),
            ("uint32", i64::from(c)),
            ("int32", i64::from(d)),
        ] {
            let value = Value::Integer(n);
            prop_assert_eq!(round_trip(&registry, type_name, &value), value);
        }
    }

    #[test]
    fn prop_map_round_trip(
        numbers in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6),
        words in proptest::collection::btree_map("[A-Z]{1,8}", any::<String>(), 0..6),
        flag in any::<bool>(),
    ) {
        let registry = TypeRegistry::new();
        let mut map: BTreeMap<String, Value> =
            numbers.into_iter().map(|(k, v)| (k, Value::Integer(v))).collect();
        map.extend(words.into_iter().map(|(k, v)| (k, Value::String(v))));
        map.insert("_flag".to_string(), Value::Bool(flag));

        let value = Value::Map(map);
        prop_assert_eq!(round_trip(&registry, "map", &value), value);
    }

    #[test]
    fn prop_typed_map_round_trip(
        numbers in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6),
    ) {
        let registry = TypeRegistry::new();
        let value = Value::Map(numbers.into_iter().map(|(k, v)| (k, Value::Integer(v))).collect());
        prop_assert_eq!(round_trip(&registry, "map(integer)", &value), value);
    }

    #[test]
    fn prop_uint16_binary_matches_text(n in any::<u16>()) {
        let registry = TypeRegistry::new();
        let from_binary = registry.convert_binary("uint16", &n.to_le_bytes()).unwrap();
        let from_text = registry.convert("uint16", &n.to_string()).unwrap();
        prop_assert_eq!(from_binary, from_text);
    }

    #[test]
    fn prop_validators_run_in_declaration_order(i in -1000i64..1000) {
        let registry = TypeRegistry::new();
        let nonnegative = registry.validator("integer", "nonnegative", &[]).unwrap();
        let range = registry
            .validator("integer", "range", &[Value::Integer(0), Value::Integer(10)])
            .unwrap();
        let descriptor = registry
            .resolve("integer")
            .unwrap()
            .derive("small")
            .with_validator(nonnegative)
            .with_validator(range);

        match descriptor.convert(&i.to_string()) {
            Ok(value) => prop_assert!((0..=10).contains(&i) && value == Value::Integer(i)),
            Err(DispatchError::Validation { rule, .. }) if i < 0 => prop_assert_eq!(rule, "nonnegative"),
            Err(DispatchError::Validation { rule, .. }) => prop_assert_eq!(rule, "range"),
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}

#[test]
fn test_list_formatter_is_lossy() {
    let registry = TypeRegistry::new();
    let list = registry.resolve("list(string)").unwrap();
    assert!(list.is_lossy());
    assert!(!registry.resolve("integer").unwrap().is_lossy());

    // "a,b" as a single element does not survive the default formatter.
    let value = Value::List(vec![Value::from("a,b")]);
    let text = list.format_default(&value);
    assert_ne!(list.convert(&text).unwrap(), value);
}

#[test]
fn test_lossy_flags_of_builtins() {
    let registry = TypeRegistry::new();
    for name in [
        "bool", "integer", "float", "string", "path", "bytes", "uint8", "uint16", "uint32",
        "int32", "map", "map(integer)",
    ] {
        assert!(!registry.resolve(name).unwrap().is_lossy(), "{name}");
    }
    for name in ["list(integer)", "map(list(integer))"] {
        assert!(registry.resolve(name).unwrap().is_lossy(), "{name}");
    }
}

#[test]
fn test_malformed_type_names_are_user_errors() {
    let registry = TypeRegistry::new();
    for name in ["list(", "list(integer))", "list(integer,string)", "map()"] {
        let err = registry.convert(name, "1").unwrap_err();
        assert!(!err.is_fatal(), "{name}: {err}");
        assert!(matches!(err, DispatchError::Argument { .. }), "{name}: {err:?}");
    }
}

#[test]
fn test_register_replaces_and_rebuilds_composites() {
    let registry = TypeRegistry::new();
    assert_eq!(
        registry.convert("list(integer)", "1, 2").unwrap(),
        Value::List(vec![Value::Integer(1), Value::Integer(2)])
    );

    registry
        .register(TypeDescriptor::new(
            "integer",
            |text| {
                text.trim()
                    .parse::<i64>()
                    .map(|i| Value::Integer(i * 10))
                    .map_err(|e| e.to_string())
            },
            |value| value.to_display_string(),
        ))
        .unwrap();

    assert_eq!(registry.convert("integer", "4").unwrap(), Value::Integer(40));
    assert_eq!(
        registry.convert("list(integer)", "1, 2").unwrap(),
        Value::List(vec![Value::Integer(10), Value::Integer(20)])
    );
}

#[test]
fn test_unknown_type() {
    let registry = TypeRegistry::new();
    assert!(matches!(
        registry.resolve("color"),
        Err(DispatchError::UnknownType { ref name }) if name == "color"
    ));
    assert!(matches!(
        registry.resolve("list(color)"),
        Err(DispatchError::UnknownType { .. })
    ));
}

#[test]
fn test_toml_source_loaded_on_first_miss() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[types.port]
base = "integer"
description = "TCP port"
validators = [{{ name = "range", args = [1, 65535] }}]

[types.color]
base = "string"
choices = ["red", "green", "blue"]
"#
    )
    .unwrap();

    let registry = TypeRegistry::new();
    registry.add_source(Arc::new(TomlTypeSource::from_path(file.path())));
    assert!(!registry.contains("port"));

    assert_eq!(registry.convert("port", "8080").unwrap(), Value::Integer(8080));
    assert!(matches!(
        registry.convert("port", "0"),
        Err(DispatchError::Validation { ref rule, .. }) if rule == "range"
    ));
    assert!(matches!(
        registry.convert("color", "purple"),
        Err(DispatchError::Validation { ref rule, .. }) if rule == "choice"
    ));
    assert_eq!(
        registry.resolve("port").unwrap().description(),
        Some("TCP port")
    );
}

#[test]
fn test_failing_source_is_reported_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let registry = TypeRegistry::new();
    registry.add_source(Arc::new(FnSource::new("broken", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("plugin crashed")
    })));

    assert!(registry.resolve("anything").is_err());
    assert!(registry.resolve("anything").is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.failed_sources().len(), 1);
    assert_eq!(registry.failed_sources()[0].0, "broken");
}

#[test]
fn test_source_types_are_all_or_nothing() {
    let registry = TypeRegistry::new();
    let source = TomlTypeSource::from_toml(
        "partial",
        r#"
[types.good]
base = "integer"

[types.bad]
base = "no_such_type"
"#,
    );

    let err = registry.load_external(&source).unwrap_err();
    assert!(matches!(err, DispatchError::TypeSource { .. }));
    assert!(!registry.contains("good"));
    assert!(!registry.contains("bad"));
}

#[test]
fn test_inline_validator_reports_its_name() {
    let registry = TypeRegistry::new();
    let even = Validator::check("even", |value| match value.as_integer() {
        Some(i) if i % 2 != 0 => Err("value is odd".to_string()),
        _ => Ok(()),
    });
    let descriptor = registry.resolve("int").unwrap().derive("even_int").with_validator(even);
    registry.register(descriptor).unwrap();

    assert_eq!(registry.convert("even_int", "4").unwrap(), Value::Integer(4));
    let err = registry.convert("even_int", "3").unwrap_err();
    assert_eq!(err.to_string(), "Validation 'even' failed for '3': value is odd");
}
