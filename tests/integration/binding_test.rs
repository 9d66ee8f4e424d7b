//! Integration tests for command declaration and argument binding.

use cmdtree::commands::{tokenize, CommandDocs, CommandMetadata, ParamSpec, ReturnSpec};
use cmdtree::error::DispatchError;
use cmdtree::types::{TypeRegistry, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn connect(registry: &TypeRegistry) -> Arc<CommandMetadata> {
    CommandMetadata::builder("connect")
        .summary("Open a connection")
        .param(ParamSpec::new("host", "string").validate("not_empty", Vec::new()))
        .param(
            ParamSpec::new("port", "integer")
                .default_value(5432)
                .validate("range", vec![Value::Integer(1), Value::Integer(65535)]),
        )
        .param(ParamSpec::new("verbose", "bool").default_value(false))
        .param(ParamSpec::new("options", "string").keywords())
        .returns(ReturnSpec::data("string"))
        .handler(|args| {
            let host: String = args.get("host")?;
            let port: i64 = args.get("port")?;
            Ok(Value::String(format!("{host}:{port}")))
        })
        .declare(registry)
        .unwrap()
}

fn bind_line(registry: &TypeRegistry, command: &CommandMetadata, line: &str) -> cmdtree::error::Result<BTreeMap<String, Value>> {
    let tokens = tokenize(line)?;
    let (positional, keywords) = command.split_args(registry, &tokens)?;
    let arguments = command.bind(registry, &positional, &keywords)?;
    Ok(arguments.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
}

#[test]
fn test_defaults_fill_unset_parameters() {
    let registry = TypeRegistry::new();
    let command = connect(&registry);
    let bound = bind_line(&registry, &command, "db.local").unwrap();

    assert_eq!(
        bound,
        BTreeMap::from([
            ("host".to_string(), Value::from("db.local")),
            ("options".to_string(), Value::Map(BTreeMap::new())),
            ("port".to_string(), Value::Integer(5432)),
            ("verbose".to_string(), Value::Bool(false)),
        ])
    );
}

#[test]
fn test_flag_forms() {
    let registry = TypeRegistry::new();
    let command = connect(&registry);

    for line in [
        "db --port 6000 --verbose",
        "db --port=6000 -v",
        "db port=6000 verbose=true",
        "db -p 6000 --verbose true",
    ] {
        let bound = bind_line(&registry, &command, line).unwrap();
        assert_eq!(bound["port"], Value::Integer(6000), "{line}");
        assert_eq!(bound["verbose"], Value::Bool(true), "{line}");
    }
}

#[test]
fn test_keyword_overrides_positional() {
    let registry = TypeRegistry::new();
    let command = connect(&registry);
    let bound = bind_line(&registry, &command, "a 1 --host b").unwrap();
    assert_eq!(bound["host"], Value::from("b"));
    assert_eq!(bound["port"], Value::Integer(1));
}

#[test]
fn test_extra_keywords_collected() {
    let registry = TypeRegistry::new();
    let command = connect(&registry);
    let bound = bind_line(&registry, &command, "db sslmode=require --timeout 5").unwrap();
    assert_eq!(
        bound["options"],
        Value::Map(BTreeMap::from([
            ("sslmode".to_string(), Value::from("require")),
            // An unknown long flag takes no value; "5" became positional.
            ("timeout".to_string(), Value::from("true")),
        ]))
    );
    assert_eq!(bound["port"], Value::Integer(5));
}

#[test]
fn test_binding_errors() {
    let registry = TypeRegistry::new();
    let command = connect(&registry);

    assert!(matches!(
        bind_line(&registry, &command, ""),
        Err(DispatchError::Argument { .. })
    ));
    assert!(matches!(
        bind_line(&registry, &command, "db 1 true extra"),
        Err(DispatchError::Argument { ref value, .. }) if value.as_deref() == Some("extra")
    ));
    assert!(matches!(
        bind_line(&registry, &command, "db x"),
        Err(DispatchError::Conversion { ref type_name, .. }) if type_name == "integer"
    ));
    assert!(matches!(
        bind_line(&registry, &command, "db 70000"),
        Err(DispatchError::Validation { ref rule, .. }) if rule == "range"
    ));
    assert!(matches!(
        bind_line(&registry, &command, "''"),
        Err(DispatchError::Validation { ref rule, .. }) if rule == "not_empty"
    ));
    assert!(matches!(
        bind_line(&registry, &command, "db --port"),
        Err(DispatchError::Argument { .. })
    ));
}

#[test]
fn test_ambiguous_short_flag() {
    let registry = TypeRegistry::new();
    let command = CommandMetadata::builder("copy")
        .param(ParamSpec::new("source", "path"))
        .param(ParamSpec::new("size", "integer").default_value(0))
        .handler(|_| Ok(Value::Null))
        .declare(&registry)
        .unwrap();

    let tokens = tokenize("a -s 1").unwrap();
    let err = command.split_args(&registry, &tokens).unwrap_err();
    assert!(err.to_string().contains("source, size"), "{err}");
}

#[test]
fn test_declaration_errors_are_internal() {
    let registry = TypeRegistry::new();

    let duplicate = CommandMetadata::builder("dup")
        .param(ParamSpec::new("a", "integer"))
        .param(ParamSpec::new("a", "string"))
        .handler(|_| Ok(Value::Null))
        .declare(&registry);
    assert!(matches!(duplicate, Err(DispatchError::Internal(_))));

    let bad_default = CommandMetadata::builder("bad")
        .param(ParamSpec::new("n", "integer").default_value(-1).validate("positive", Vec::new()))
        .handler(|_| Ok(Value::Null))
        .declare(&registry);
    assert!(matches!(bad_default, Err(DispatchError::Internal(_))));

    let unknown_validator = CommandMetadata::builder("bad")
        .param(ParamSpec::new("n", "integer").validate("shiny", Vec::new()))
        .handler(|_| Ok(Value::Null))
        .declare(&registry);
    assert!(matches!(unknown_validator, Err(DispatchError::Internal(_))));

    let unknown_format = CommandMetadata::builder("bad")
        .returns(ReturnSpec::data("integer").formatted_as("roman"))
        .handler(|_| Ok(Value::Null))
        .declare(&registry);
    assert!(matches!(unknown_format, Err(DispatchError::Internal(_))));
}

#[test]
fn test_default_obeys_type_rules() {
    let registry = TypeRegistry::new();
    let percent = registry
        .resolve("integer")
        .unwrap()
        .derive("percent")
        .with_validator(
            registry
                .validator("integer", "range", &[Value::Integer(0), Value::Integer(100)])
                .unwrap(),
        );
    registry.register(percent).unwrap();

    let declared = |default: Value| {
        CommandMetadata::builder("fill")
            .param(ParamSpec::new("level", "percent").default_value(default))
            .handler(|args| Ok(Value::Integer(args.get("level")?)))
            .declare(&registry)
    };
    assert!(matches!(declared(Value::Integer(250)), Err(DispatchError::Internal(_))));
    assert!(matches!(declared(Value::from("full")), Err(DispatchError::Internal(_))));

    let command = declared(Value::Integer(50)).unwrap();
    assert_eq!(bind_line(&registry, &command, "").unwrap()["level"], Value::Integer(50));
    assert!(matches!(
        bind_line(&registry, &command, "250"),
        Err(DispatchError::Validation { ref rule, .. }) if rule == "range"
    ));
}

#[test]
fn test_unknown_parameter_type_fails_at_bind() {
    let registry = TypeRegistry::new();
    let command = CommandMetadata::builder("paint")
        .param(ParamSpec::new("color", "color"))
        .handler(|_| Ok(Value::Null))
        .declare(&registry)
        .unwrap();

    let err = command.bind(&registry, &["red".to_string()], &[]).unwrap_err();
    assert!(matches!(err, DispatchError::UnknownType { ref name } if name == "color"));
}

#[test]
fn test_docs_fill_missing_help() {
    let registry = TypeRegistry::new();
    let docs = CommandDocs {
        summary: Some("Greet someone".to_string()),
        params: BTreeMap::from([("name".to_string(), "who to greet".to_string())]),
        returns: Some("the greeting".to_string()),
        ..CommandDocs::default()
    };
    let command = CommandMetadata::builder("greet")
        .param(ParamSpec::new("name", "string"))
        .returns(ReturnSpec::text("string"))
        .docs(docs)
        .handler(|args| Ok(Value::String(format!("hello {}", args.get::<String>("name")?))))
        .declare(&registry)
        .unwrap();

    assert_eq!(command.summary(), Some("Greet someone"));
    let help = command.help();
    assert!(help.contains("name (string): who to greet"), "{help}");
    assert!(help.contains("Returns (string): the greeting"), "{help}");
}

#[test]
fn test_render_uses_return_type() {
    let registry = TypeRegistry::new();
    let command = CommandMetadata::builder("bits")
        .returns(ReturnSpec::data("list(integer)").formatted_as("compact"))
        .handler(|_| Ok(Value::Null))
        .declare(&registry)
        .unwrap();

    let value = Value::List(vec![Value::Integer(1), Value::Integer(2)]);
    let rendered = command.render(&registry, &value).unwrap();
    assert_eq!(rendered.text.as_deref(), Some("[1, 2]"));
    assert_eq!(rendered.data, Some(value));
    assert_eq!(command.render(&registry, &Value::Null).unwrap().text, None);
}

proptest! {
    #[test]
    fn prop_binding_is_deterministic(host in "[a-z]{1,12}", port in 1i64..65535) {
        let registry = TypeRegistry::new();
        let command = connect(&registry);
        let line = format!("{host} --port {port}");
        let first = bind_line(&registry, &command, &line).unwrap();
        let second = bind_line(&registry, &command, &line).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&first["port"], &Value::Integer(port));
    }
}
