//! Integration tests for path resolution and the context stack.

use cmdtree::commands::{tokenize, CommandMetadata, ParamSpec, ReturnSpec};
use cmdtree::context::{BasicContext, Context};
use cmdtree::error::DispatchError;
use cmdtree::shell::{Shell, ShellState, Target};
use cmdtree::types::{TypeRegistry, Value};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

type Events = Arc<Mutex<Vec<String>>>;

fn take(events: &Events) -> Vec<String> {
    std::mem::take(&mut *events.lock().unwrap())
}

/// root
/// ├── status, start
/// └── db/
///     ├── query, close (finalizer, fails when asked)
///     └── table/  describe
fn build(events: &Events) -> Shell {
    let registry = Arc::new(TypeRegistry::new());

    let noop = |name: &str| {
        let events = events.clone();
        let label = name.to_string();
        CommandMetadata::builder(name)
            .handler(move |_| {
                events.lock().unwrap().push(format!("run {label}"));
                Ok(Value::Null)
            })
            .declare(&registry)
            .unwrap()
    };

    let query = {
        let events = events.clone();
        CommandMetadata::builder("query")
            .param(ParamSpec::new("sql", "string"))
            .returns(ReturnSpec::data("string"))
            .handler(move |args| {
                let sql: String = args.get("sql")?;
                events.lock().unwrap().push(format!("query {sql}"));
                Ok(Value::String(sql.to_uppercase()))
            })
            .declare(&registry)
            .unwrap()
    };

    let close = {
        let events = events.clone();
        CommandMetadata::builder("close")
            .param(ParamSpec::new("fail", "bool").default_value(false))
            .finalizer()
            .handler(move |args| {
                events.lock().unwrap().push("run close".to_string());
                if args.get::<bool>("fail")? {
                    anyhow::bail!("close failed");
                }
                Ok(Value::Null)
            })
            .declare(&registry)
            .unwrap()
    };

    let describe = noop("describe");
    let table_events = events.clone();
    let table = move || -> anyhow::Result<Arc<dyn Context>> {
        table_events.lock().unwrap().push("open table".to_string());
        let finalize_events = table_events.clone();
        Ok(BasicContext::builder("table")
            .command(describe.clone())
            .finalizer(move || {
                finalize_events.lock().unwrap().push("finalize table".to_string());
                Ok(())
            })
            .build()?)
    };

    let db_events = events.clone();
    let db = move || -> anyhow::Result<Arc<dyn Context>> {
        db_events.lock().unwrap().push("open db".to_string());
        let finalize_events = db_events.clone();
        Ok(BasicContext::builder("db")
            .description("database")
            .command(query.clone())
            .command(close.clone())
            .child("table", table.clone())
            .finalizer(move || {
                finalize_events.lock().unwrap().push("finalize db".to_string());
                Ok(())
            })
            .build()?)
    };

    let root = BasicContext::builder("root")
        .command(noop("status"))
        .command(noop("start"))
        .child("db", db)
        .build()
        .unwrap();
    Shell::new("test", registry, root)
}

#[test]
fn test_resolve_targets() {
    let events = Events::default();
    let shell = build(&events);

    let resolution = shell.resolve("db.table.describe").unwrap();
    assert_eq!(resolution.opened.path(), "db.table");
    assert!(matches!(resolution.target, Target::Invoke { ref command, .. } if command.name() == "describe"));
    drop(resolution);
    assert_eq!(
        take(&events),
        vec!["open db", "open table", "finalize table", "finalize db"]
    );

    let resolution = shell.resolve("db").unwrap();
    assert!(matches!(resolution.target, Target::Navigate));
    drop(resolution);

    let resolution = shell.resolve("db.query.extra").unwrap();
    assert!(matches!(
        resolution.target,
        Target::Invoke { ref extra, .. } if extra == &["extra"]
    ));
}

#[test]
fn test_not_found_lists_siblings() {
    let events = Events::default();
    let mut shell = build(&events);

    let err = shell.invoke_string("db.tabel").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Not found: 'tabel' (available: close, query, table)"
    );
    assert_eq!(take(&events), vec!["open db", "finalize db"]);
    assert_eq!(shell.state(), ShellState::AtRoot);
}

#[test]
fn test_abbreviation_and_case() {
    let events = Events::default();
    let mut shell = build(&events);

    let err = shell.invoke_string("st").unwrap_err();
    assert!(matches!(err, DispatchError::AmbiguousCommand { ref matches, .. } if matches == &["start", "status"]));

    shell.invoke_string("sta").unwrap_err();
    shell.invoke_string("star").unwrap();
    assert_eq!(take(&events), vec!["run start"]);

    assert!(matches!(
        shell.invoke_string("Status"),
        Err(DispatchError::NotFound { .. })
    ));
    // Contexts never match by prefix.
    assert!(matches!(
        shell.invoke_string("d"),
        Err(DispatchError::NotFound { .. })
    ));
}

#[test]
fn test_dotted_path_returns_result_and_pops() {
    let events = Events::default();
    let mut shell = build(&events);

    let results = shell.invoke_string("db.query 'select 1'").unwrap();
    assert_eq!(results[0].text.as_deref(), Some("SELECT 1"));
    assert_eq!(results[0].value, Some(Value::from("SELECT 1")));
    assert_eq!(
        take(&events),
        vec!["open db", "query select 1", "finalize db"]
    );
    assert_eq!(shell.depth(), 1);
}

#[test]
fn test_nested_navigation_and_back() {
    let events = Events::default();
    let mut shell = build(&events);

    shell.invoke_string("db.table").unwrap();
    assert_eq!(shell.path(), "root.db.table");
    assert_eq!(shell.state(), ShellState::InContext { depth: 3 });

    shell.invoke_string("describe").unwrap();
    shell.invoke_string("back").unwrap();
    shell.invoke_string("back").unwrap();
    assert_eq!(shell.state(), ShellState::AtRoot);
    assert_eq!(
        take(&events),
        vec!["open db", "open table", "run describe", "finalize table", "finalize db"]
    );
}

#[test]
fn test_finalizer_command_pops_even_when_it_fails() {
    let events = Events::default();
    let mut shell = build(&events);

    shell.invoke_string("db").unwrap();
    let err = shell.invoke_string("close --fail").unwrap_err();
    assert_eq!(err.to_string(), "close failed");
    assert_eq!(shell.state(), ShellState::AtRoot);
    assert_eq!(take(&events), vec!["open db", "run close", "finalize db"]);

    // Invoked through a path, the finalizer pops the temporary frame once.
    shell.invoke_string("db.close").unwrap();
    assert_eq!(take(&events), vec!["open db", "run close", "finalize db"]);
    assert_eq!(shell.depth(), 1);
}

#[test]
fn test_abrupt_termination_finalizes_once() {
    let events = Events::default();
    let mut shell = build(&events);
    shell.invoke_string("db.table").unwrap();
    drop(shell);
    assert_eq!(
        take(&events),
        vec!["open db", "open table", "finalize table", "finalize db"]
    );
}

#[test]
fn test_quit_then_nothing_runs() {
    let events = Events::default();
    let mut shell = build(&events);
    shell.invoke_string("db -- exit").unwrap();
    assert!(shell.finished());
    assert!(matches!(shell.invoke_string("status"), Err(DispatchError::SessionFinished)));
    assert!(shell.list_dir().is_err());
    drop(shell);
    assert_eq!(take(&events), vec!["open db", "finalize db"]);
}

#[test]
fn test_list_dir_and_complete() {
    let events = Events::default();
    let mut shell = build(&events);
    shell.invoke_string("db").unwrap();

    let listing = shell.list_dir().unwrap();
    assert_eq!(listing.path, "root.db");
    assert_eq!(listing.description.as_deref(), Some("database"));
    assert_eq!(listing.children, vec!["table"]);
    assert_eq!(shell.complete("c"), vec!["close"]);
    assert_eq!(shell.complete(""), vec!["back", "close", "exit", "help", "query", "quit", "table"]);
}

#[test]
fn test_invoke_one_uses_current_context() {
    let events = Events::default();
    let mut shell = build(&events);
    shell.invoke_string("db").unwrap();

    let resolution = shell.resolve("query").unwrap();
    let Target::Invoke { command, .. } = &resolution.target else {
        panic!("query should resolve to a command");
    };
    let command = command.clone();
    drop(resolution);

    let invocation = shell.invoke_one(&command, &tokenize("--sql x").unwrap()).unwrap();
    assert_eq!(invocation.value, Some(Value::from("X")));
}

#[test]
fn test_init_commands_run_on_entry() {
    let events = Events::default();
    let mut shell = build(&events);
    shell.add_init_command("db", "query init");
    shell.add_init_command("root", "status");
    assert_eq!(take(&events), vec!["run status"]);

    shell.invoke_string("db").unwrap();
    assert_eq!(take(&events), vec!["open db", "query init"]);

    // Init lines cannot navigate away from the context they configure.
    shell.add_init_command("db", "table");
    assert_eq!(shell.path(), "root.db");
    assert_eq!(take(&events), vec!["open table", "finalize table"]);
}

#[test]
fn test_init_quit_stops_navigation() {
    let events = Events::default();
    let mut shell = build(&events);
    shell.add_init_command("db", "quit");

    shell.invoke_string("db.table").unwrap();
    assert!(shell.finished());
    assert_eq!(shell.state(), ShellState::Finished);
    assert_eq!(
        take(&events),
        vec!["open db", "open table", "finalize db", "finalize table"]
    );
    assert!(matches!(shell.invoke_string("status"), Err(DispatchError::SessionFinished)));
}
