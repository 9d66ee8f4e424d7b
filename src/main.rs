//! cmdtree - a hierarchical command shell with typed arguments.

use cmdtree::cli::{Cli, RunMode};
use cmdtree::config::Config;
use cmdtree::error::{DispatchError, Result};
use cmdtree::shell::output::{OutputSink, ShellOutput, StreamSink};
use cmdtree::shell::repl::{self, SessionOptions};
use cmdtree::shell::Shell;
use cmdtree::types::{TomlTypeSource, TypeRegistry};
use cmdtree::{demo, logging};
use std::io::{self, BufReader};
use std::sync::Arc;
use tracing::{debug, info};

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            // Logging may not be initialized yet (or may go to a file).
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

/// Runs the session. Returns `Ok(false)` when a command failed.
fn run() -> Result<bool> {
    let cli = Cli::parse_args();
    let mode = cli.run_mode()?;
    let format = cli.parse_output_format().map_err(DispatchError::config)?;

    let config_path = cli.config_path();
    let config = Config::load_from_file(&config_path)?;

    let level = if cli.quiet { "warn" } else { config.shell.log_level.as_str() };
    match mode {
        RunMode::Interactive => logging::init_file_logging(level),
        _ => logging::init_stderr_logging(level),
    }
    debug!("Loaded config from: {}", config_path.display());

    let registry = Arc::new(TypeRegistry::new());
    for path in config.types.source_paths().into_iter().chain(cli.types.iter().cloned()) {
        debug!(source = %path.display(), "Adding type source");
        registry.add_source(Arc::new(TomlTypeSource::from_path(path)));
    }

    let root = demo::build_root(&registry)?;
    let mut shell = Shell::new(config.shell.name.clone(), registry, root);
    for (suffix, line) in config.init_commands() {
        shell.add_init_command(suffix, line);
    }

    let mut sink = StreamSink::console(format);
    let options = SessionOptions {
        prompt: None,
        fail_fast: cli.fail_fast,
    };

    let succeeded = match mode {
        RunMode::OneShot(argv) => match shell.invoke_argv(&argv) {
            Ok(invocations) => {
                for invocation in invocations {
                    repl::emit_invocation(&mut sink, invocation).map_err(output_error)?;
                }
                true
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                sink.emit(&ShellOutput::error(&e)).map_err(output_error)?;
                false
            }
        },
        RunMode::Script(path) => {
            let file = std::fs::File::open(&path).map_err(|e| {
                DispatchError::config(format!("Failed to open script {}: {e}", path.display()))
            })?;
            let summary = repl::run_lines(&mut shell, BufReader::new(file), &mut sink, &options)?;
            info!(lines = summary.lines, errors = summary.errors, "Script finished");
            summary.errors == 0
        }
        RunMode::Stdin => {
            let summary = repl::run_lines(&mut shell, io::stdin().lock(), &mut sink, &options)?;
            summary.errors == 0
        }
        RunMode::Interactive => {
            let options = SessionOptions {
                prompt: Some(config.shell.prompt.clone()),
                ..options
            };
            repl::run_lines(&mut shell, io::stdin().lock(), &mut sink, &options)?;
            true
        }
    };

    Ok(succeeded)
}

fn output_error(e: io::Error) -> DispatchError {
    DispatchError::internal(format!("failed to write output: {e}"))
}
