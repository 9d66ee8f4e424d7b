//! Command-line argument parsing for cmdtree.

use crate::error::{DispatchError, Result};
use crate::shell::output::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

/// How the binary feeds commands to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Run the command given on the command line, then exit.
    OneShot(Vec<String>),
    /// Run every line of a script file.
    Script(PathBuf),
    /// Run every line read from stdin without a prompt.
    Stdin,
    /// Interactive prompt.
    Interactive,
}

/// A hierarchical command shell with typed arguments.
#[derive(Parser, Debug)]
#[command(name = "cmdtree")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to run, e.g. `math.sum 1 2 3` (runs interactively when omitted)
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,

    /// Config file path
    #[arg(long, value_name = "PATH", env = "CMDTREE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to a script with one command per line (use "-" for stdin)
    #[arg(long, value_name = "PATH")]
    pub script: Option<String>,

    /// Output format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub output: String,

    /// Extra TOML type source (may be repeated)
    #[arg(long = "types", value_name = "PATH")]
    pub types: Vec<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Stop a script at its first failing line
    #[arg(long)]
    pub fail_fast: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }

    /// Parses the output format from the --output argument.
    pub fn parse_output_format(&self) -> std::result::Result<OutputFormat, String> {
        self.output.parse()
    }

    /// Decides how commands are read. A command on the command line and
    /// `--script` are mutually exclusive.
    pub fn run_mode(&self) -> Result<RunMode> {
        match (&self.script, self.command.is_empty()) {
            (Some(_), false) => Err(DispatchError::config(
                "--script cannot be combined with a command",
            )),
            (Some(path), true) if path == "-" => Ok(RunMode::Stdin),
            (Some(path), true) => Ok(RunMode::Script(PathBuf::from(path))),
            (None, false) => Ok(RunMode::OneShot(self.command.clone())),
            (None, true) => Ok(RunMode::Interactive),
        }
    }
}
