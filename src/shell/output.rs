//! Output channel for shell sessions.
//!
//! Results, informational text and recoverable errors are emitted as
//! [`ShellOutput`] items to an [`OutputSink`]. The console sink writes plain
//! text or one JSON object per line.

use crate::error::DispatchError;
use crate::types::Value;
use serde::Serialize;
use std::io::{self, Write};

/// Output format for console sinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Display text only.
    #[default]
    Text,
    /// One JSON object per output item.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// One item of session output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShellOutput {
    /// A command's result.
    Result {
        command: String,
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// Informational text, e.g. help.
    Info { text: String },
    /// A recoverable error.
    Error {
        category: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl ShellOutput {
    pub fn error(err: &DispatchError) -> Self {
        Self::Error {
            category: err.category().to_string(),
            message: err.to_string(),
            value: err.offending_value().map(str::to_string),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Display text for the text format; `None` when there is nothing to show.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Result { text, .. } => text.clone(),
            Self::Info { text } => Some(text.clone()),
            Self::Error { message, .. } => Some(message.clone()),
        }
    }
}

/// Receives session output.
pub trait OutputSink {
    fn emit(&mut self, output: &ShellOutput) -> io::Result<()>;
}

/// Writes output to a pair of streams. In the text format errors go to the
/// error stream; the JSON format writes everything to the output stream.
pub struct StreamSink<W: Write, E: Write> {
    out: W,
    err: E,
    format: OutputFormat,
}

impl<W: Write, E: Write> StreamSink<W, E> {
    pub fn new(out: W, err: E, format: OutputFormat) -> Self {
        Self { out, err, format }
    }

    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }
}

impl StreamSink<io::Stdout, io::Stderr> {
    /// Sink over stdout and stderr.
    pub fn console(format: OutputFormat) -> Self {
        Self::new(io::stdout(), io::stderr(), format)
    }
}

impl<W: Write, E: Write> OutputSink for StreamSink<W, E> {
    fn emit(&mut self, output: &ShellOutput) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let line = serde_json::to_string(output).map_err(io::Error::other)?;
                writeln!(self.out, "{line}")?;
                self.out.flush()
            }
            OutputFormat::Text => {
                let Some(text) = output.text() else {
                    return Ok(());
                };
                if output.is_error() {
                    writeln!(self.err, "{text}")?;
                    self.err.flush()
                } else {
                    writeln!(self.out, "{text}")?;
                    self.out.flush()
                }
            }
        }
    }
}

/// Collects output in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub items: Vec<ShellOutput>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display text of every non-error item, one per line.
    pub fn text(&self) -> String {
        self.items
            .iter()
            .filter(|item| !item.is_error())
            .filter_map(ShellOutput::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn errors(&self) -> Vec<&ShellOutput> {
        self.items.iter().filter(|item| item.is_error()).collect()
    }
}

impl OutputSink for BufferSink {
    fn emit(&mut self, output: &ShellOutput) -> io::Result<()> {
        self.items.push(output.clone());
        Ok(())
    }
}
