// src/cli.rs

//! CLI argument parsing using `clap`.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::request::FdRemap;
use crate::types::Stdio;

/// Command-line arguments for `childspawn`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "childspawn",
    version,
    about = "Spawn a program with explicit fd wiring and report how it ended.",
    long_about = None
)]
pub struct CliArgs {
    /// Spawn profile (TOML). Command-line options override it.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Working directory for the child.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Set an environment variable in the child. Repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Remove an environment variable from the child. Repeatable.
    #[arg(long, value_name = "KEY")]
    pub unset_env: Vec<String>,

    /// Start from an empty environment.
    #[arg(long)]
    pub clear_env: bool,

    /// Look the program up in PATH.
    #[arg(long)]
    pub search_path: bool,

    /// Use posix_spawn. Implies --leave-fds-open.
    #[arg(long)]
    pub fast_path: bool,

    /// Do not close unrequested descriptors in the child.
    #[arg(long)]
    pub leave_fds_open: bool,

    /// Start the child detached, print its pid and exit immediately.
    #[arg(long)]
    pub detach: bool,

    /// stdin mode: inherit, close, null, pipe or fd:N.
    #[arg(long, value_name = "MODE")]
    pub stdin: Option<Stdio>,

    /// stdout mode: inherit, close, null, pipe or fd:N.
    #[arg(long, value_name = "MODE")]
    pub stdout: Option<Stdio>,

    /// stderr mode: inherit, close, null, pipe or fd:N.
    #[arg(long, value_name = "MODE")]
    pub stderr: Option<Stdio>,

    /// Make our fd SRC appear as DST in the child. Repeatable.
    #[arg(long = "remap", value_name = "SRC:DST", value_parser = parse_remap)]
    pub remap: Vec<FdRemap>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CHILDSPAWN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate and print the request without spawning anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Program and arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGV")]
    pub argv: Vec<OsString>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("missing variable name in '{s}'")),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn parse_remap(s: &str) -> Result<FdRemap, String> {
    let (source, target) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SRC:DST, got '{s}'"))?;
    let source = source
        .trim()
        .parse()
        .map_err(|_| format!("invalid source fd in '{s}'"))?;
    let target = target
        .trim()
        .parse()
        .map_err(|_| format!("invalid target fd in '{s}'"))?;
    Ok(FdRemap { source, target })
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
