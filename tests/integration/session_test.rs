//! Integration tests for scripted sessions over the demo command tree.

use cmdtree::config::Config;
use cmdtree::demo;
use cmdtree::shell::output::{BufferSink, OutputFormat, ShellOutput, StreamSink};
use cmdtree::shell::repl::{run_lines, SessionOptions, SessionSummary};
use cmdtree::shell::Shell;
use cmdtree::types::{TomlTypeSource, TypeRegistry};
use pretty_assertions::assert_eq;
use std::io::Cursor;
use std::sync::Arc;

fn demo_shell() -> Shell {
    let registry = Arc::new(TypeRegistry::new());
    let root = demo::build_root(&registry).unwrap();
    Shell::new("session", registry, root)
}

fn run_script(shell: &mut Shell, script: &str) -> (SessionSummary, BufferSink) {
    let mut sink = BufferSink::new();
    let summary = run_lines(
        shell,
        Cursor::new(script.to_string()),
        &mut sink,
        &SessionOptions::default(),
    )
    .unwrap();
    (summary, sink)
}

#[test]
fn test_script_session() {
    let mut shell = demo_shell();
    let script = r#"
# arithmetic
add 1 2
math
sum 1 2 3
mean
back
kv set name "Ada Lovelace"
kv.get name
hex 0b1010
"#;
    let (summary, sink) = run_script(&mut shell, script);

    assert_eq!(summary.errors, 1);
    assert_eq!(sink.text(), "3\n6\nAda Lovelace\n0xA");
    assert!(matches!(
        sink.errors()[0],
        ShellOutput::Error { message, .. } if message.contains("at least one value")
    ));
    assert_eq!(shell.path(), "root");
}

#[test]
fn test_errors_carry_offending_value() {
    let mut shell = demo_shell();
    let (_, sink) = run_script(&mut shell, "add 1 two\nmath.clamp 5 --low 9 --high 1\n");

    let errors: Vec<(String, Option<String>)> = sink
        .errors()
        .into_iter()
        .map(|e| match e {
            ShellOutput::Error {
                category, value, ..
            } => (category.clone(), value.clone()),
            other => panic!("not an error: {other:?}"),
        })
        .collect();
    assert_eq!(
        errors,
        vec![
            ("Conversion Error".to_string(), Some("two".to_string())),
            ("Argument Error".to_string(), Some("9 > 1".to_string())),
        ]
    );
}

#[test]
fn test_json_output() {
    let mut shell = demo_shell();
    let mut sink = StreamSink::new(Vec::new(), Vec::new(), OutputFormat::Json);
    run_lines(
        &mut shell,
        Cursor::new("add 2 2\nnope\n"),
        &mut sink,
        &SessionOptions::default(),
    )
    .unwrap();

    let (out, err) = sink.into_inner();
    assert!(err.is_empty());
    let lines: Vec<serde_json::Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines[0]["kind"], "result");
    assert_eq!(lines[0]["data"], 4);
    assert_eq!(lines[1]["kind"], "error");
    assert_eq!(lines[1]["category"], "Not Found");
    assert_eq!(lines[1]["value"], "nope");
}

#[test]
fn test_config_init_commands() {
    let config: Config = toml::from_str(
        r#"
[init]
"kv" = ["set greeting hello"]
"#,
    )
    .unwrap();

    let mut shell = demo_shell();
    for (suffix, line) in config.init_commands() {
        shell.add_init_command(suffix, line);
    }

    // Init lines run when kv is entered, not for dotted invocations.
    let (_, sink) = run_script(&mut shell, "kv.keys\nkv\nkeys\n");
    assert_eq!(sink.text(), "\ngreeting");
}

#[test]
fn test_external_types_in_commands() {
    let registry = Arc::new(TypeRegistry::new());
    registry.add_source(Arc::new(TomlTypeSource::from_toml(
        "inline",
        r#"
[types.percent]
base = "integer"
validators = [{ name = "range", args = [0, 100] }]
"#,
    )));
    let root = demo::build_root(&registry).unwrap();
    let mut shell = Shell::new("session", registry, root);

    let (summary, sink) = run_script(&mut shell, "convert percent 42\nconvert percent 420\n");
    assert_eq!(summary.errors, 1);
    assert_eq!(sink.text(), "42");
    assert!(matches!(
        sink.errors()[0],
        ShellOutput::Error { category, .. } if category == "Validation Error"
    ));
}

#[test]
fn test_help_output() {
    let mut shell = demo_shell();
    let (_, sink) = run_script(&mut shell, "help\nhelp math\nhelp math.sum\n");

    let texts: Vec<&str> = sink
        .items
        .iter()
        .map(|item| match item {
            ShellOutput::Info { text } => text.as_str(),
            other => panic!("expected help text, got {other:?}"),
        })
        .collect();
    assert!(texts[0].starts_with("root: cmdtree demo commands"), "{}", texts[0]);
    assert!(texts[0].contains("kv/"));
    assert!(texts[1].starts_with("root.math: Arithmetic"), "{}", texts[1]);
    assert!(texts[2].starts_with("sum(float *values)"), "{}", texts[2]);
}

#[test]
fn test_malformed_type_name_does_not_end_session() {
    let mut shell = demo_shell();
    let (summary, sink) = run_script(
        &mut shell,
        "convert \"list(\" x\nconvert list(integer,string) 1\nadd 1 2\nconvert integer 5 str\n",
    );

    assert_eq!(summary, SessionSummary { lines: 4, errors: 2 });
    assert_eq!(sink.text(), "3\n5");
    let values: Vec<Option<String>> = sink
        .errors()
        .into_iter()
        .map(|e| match e {
            ShellOutput::Error { category, value, .. } => {
                assert_eq!(category, "Argument Error");
                value.clone()
            }
            other => panic!("not an error: {other:?}"),
        })
        .collect();
    assert_eq!(
        values,
        vec![
            Some("list(".to_string()),
            Some("list(integer,string)".to_string())
        ]
    );
}
