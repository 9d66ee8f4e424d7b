//! Line-oriented session runner.
//!
//! Feeds lines from a reader to a [`Shell`] and reports each outcome to an
//! [`OutputSink`]. Recoverable errors are reported and the session goes on;
//! `Internal` errors end it.

use super::output::{OutputSink, ShellOutput};
use super::{Invocation, Shell};
use crate::error::{DispatchError, Result};
use std::io::{self, BufRead, Write};
use tracing::{debug, error};

/// Options for [`run_lines`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Prompt suffix printed to stdout before each line, after the current
    /// path. `None` for scripts.
    pub prompt: Option<String>,
    /// Stop at the first line that fails.
    pub fail_fast: bool,
}

/// Counts for a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Lines read, blank lines and comments included.
    pub lines: usize,
    /// Lines that reported an error.
    pub errors: usize,
}

fn output_error(e: io::Error) -> DispatchError {
    DispatchError::internal(format!("failed to write output: {e}"))
}

/// Reports one invocation. Help text is emitted as `Info`; invocations with
/// nothing to show are skipped.
pub fn emit_invocation(sink: &mut dyn OutputSink, invocation: Invocation) -> io::Result<()> {
    if invocation.text.is_none() && invocation.value.is_none() {
        return Ok(());
    }
    let output = match (invocation.command.as_str(), invocation.text) {
        ("help", Some(text)) => ShellOutput::Info { text },
        (_, text) => ShellOutput::Result {
            command: invocation.command,
            text,
            data: invocation.value,
        },
    };
    sink.emit(&output)
}

/// Runs one line and reports its results.
///
/// Returns `Ok(false)` when the line failed with a recoverable error (which
/// was reported to the sink), and `Err` for fatal errors.
pub fn run_line(shell: &mut Shell, line: &str, sink: &mut dyn OutputSink) -> Result<bool> {
    match shell.invoke_string(line) {
        Ok(invocations) => {
            for invocation in invocations {
                emit_invocation(sink, invocation).map_err(output_error)?;
            }
            Ok(true)
        }
        Err(e) if e.is_fatal() => {
            error!("{}: {}", e.category(), e);
            Err(e)
        }
        Err(e) => {
            debug!(line = %line, error = %e, "Command failed");
            sink.emit(&ShellOutput::error(&e)).map_err(output_error)?;
            Ok(false)
        }
    }
}

/// Runs every line from `reader` until input ends or the shell finishes.
pub fn run_lines<R: BufRead>(
    shell: &mut Shell,
    reader: R,
    sink: &mut dyn OutputSink,
    options: &SessionOptions,
) -> Result<SessionSummary> {
    let mut summary = SessionSummary::default();
    let mut lines = reader.lines();

    while !shell.finished() {
        if let Some(prompt) = &options.prompt {
            let mut stdout = io::stdout();
            write!(stdout, "{}{prompt}", shell.path()).map_err(output_error)?;
            stdout.flush().map_err(output_error)?;
        }

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.map_err(|e| DispatchError::internal(format!("failed to read input: {e}")))?;
        summary.lines += 1;

        if !run_line(shell, &line, sink)? {
            summary.errors += 1;
            if options.fail_fast {
                debug!(line = summary.lines, "Stopping at first failure");
                break;
            }
        }
    }

    Ok(summary)
}
