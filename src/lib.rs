// src/lib.rs

//! Unix child-process spawning.
//!
//! Build a [`SpawnRequest`], call [`spawn`], and get back a [`ChildHandle`]
//! or a [`SpawnError`] that says exactly which pre-exec step failed. Child
//! exit and pipe EOF can be observed inside a tokio runtime through the
//! [`CompletionNotifier`].

pub mod cli;
pub mod config;
pub mod errors;
pub mod fdmap;
pub mod handle;
pub mod logging;
pub mod notify;
pub mod report;
pub mod request;
pub mod spawn;
pub mod types;

mod sys;

use std::fs::File;
use std::io::Write;
use std::os::fd::OwnedFd;

use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

pub use crate::errors::{ConfigError, ExitStatusError, SpawnError, SpawnErrorKind};
pub use crate::fdmap::{FdAction, RemapEntry, RemapPlan, RemapTable, reserved_fd_floor};
pub use crate::handle::{ChildHandle, ExitReport, TryReap};
pub use crate::notify::sync::{SpawnOutput, run_to_completion, spawn_sync};
pub use crate::notify::{Completion, CompletionEvent, CompletionNotifier};
pub use crate::request::{Environment, FdRemap, SpawnFlags, SpawnRequest};
pub use crate::spawn::{FastPathBlocker, FastPathSupport, SpawnPath, choose_path, spawn};
pub use crate::types::{Stdio, StreamKind};

use crate::cli::CliArgs;
use crate::config::load_and_validate;

/// High-level entry point used by `main.rs`.
///
/// Spawns the requested child, forwards its piped streams to our own stdout
/// and stderr, and returns the exit code the CLI should exit with.
pub async fn run(args: CliArgs) -> Result<i32> {
    let request = build_request(&args)?;
    request.validate().context("invalid spawn request")?;

    if args.dry_run {
        print_dry_run(&request);
        return Ok(0);
    }

    let mut child = spawn(&request).with_context(|| {
        format!(
            "failed to spawn {}",
            request.program_path().display()
        )
    })?;
    info!(pid = %child.pid(), path = %child.spawn_path(), "child spawned");

    if child.is_detached() {
        println!("{}", child.pid());
        return Ok(0);
    }

    if let Some(stdin) = child.take_stdin() {
        forward_stdin(stdin);
    }

    let pid = child.pid();
    if let Err(err) = forward_until_exit(&mut child).await {
        warn!(pid = %pid, error = %err, "forwarding failed; killing child");
        if let Err(reap_err) = child.kill_and_reap() {
            warn!(pid = %pid, error = %reap_err, "failed to clean up child");
        }
        return Err(err);
    }

    let report = child.reap()?;
    debug!(pid = %pid, ?report, "child finished");
    Ok(report.as_shell_code())
}

/// Forward the child's piped output until it has exited and every stream
/// is closed. Ctrl+C is passed on as `SIGTERM`.
async fn forward_until_exit(child: &mut ChildHandle) -> Result<()> {
    let pid = child.pid();
    let mut notifier = CompletionNotifier::new();
    let mut completion = Completion::new(pid);
    for stream in [StreamKind::Stdout, StreamKind::Stderr] {
        if let Some(fd) = child.take_stream(stream) {
            completion.expect_stream(stream);
            notifier.watch_stream(pid, stream, fd)?;
        }
    }
    notifier.watch_child(child)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = notifier.next_event() => {
                let Some(event) = event else { break };
                if let CompletionEvent::StreamData { stream, data, .. } = &event {
                    forward_output(*stream, data)?;
                    continue;
                }
                if completion.apply(event)? {
                    break;
                }
            }
            res = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    continue;
                }
                info!(pid = %pid, "interrupted; sending SIGTERM to child");
                child.kill(Signal::SIGTERM)?;
            }
        }
    }
    Ok(())
}

/// Combine the optional profile with the command-line overrides.
pub fn build_request(args: &CliArgs) -> Result<SpawnRequest> {
    let mut request = match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("failed to load profile {}", path.display()))?
            .to_request(),
        None => SpawnRequest::new(Vec::<std::ffi::OsString>::new())
            .flags(SpawnFlags::DO_NOT_REAP_CHILD),
    };

    if !args.argv.is_empty() {
        request = request.with_argv(args.argv.iter().cloned());
    }
    if let Some(dir) = &args.cwd {
        request = request.working_directory(dir);
    }

    if args.clear_env {
        request = request.env_clear();
    }
    for (key, value) in &args.env {
        request = request.env(key, value);
    }
    for key in &args.unset_env {
        request = request.env_remove(key);
    }

    let mut flags = request.spawn_flags();
    if args.search_path {
        flags.insert(SpawnFlags::SEARCH_PATH);
    }
    if args.fast_path {
        flags.insert(SpawnFlags::PREFER_FAST_PATH | SpawnFlags::LEAVE_DESCRIPTORS_OPEN);
    }
    if args.leave_fds_open {
        flags.insert(SpawnFlags::LEAVE_DESCRIPTORS_OPEN);
    }
    flags.set(SpawnFlags::DO_NOT_REAP_CHILD, !args.detach);
    request = request.flags(flags);

    if let Some(stdin) = args.stdin {
        request = request.stdin(stdin);
    }
    if let Some(stdout) = args.stdout {
        request = request.stdout(stdout);
    }
    if let Some(stderr) = args.stderr {
        request = request.stderr(stderr);
    }
    for remap in &args.remap {
        request = request.remap_fd(remap.source, remap.target);
    }

    Ok(request)
}

fn print_dry_run(request: &SpawnRequest) {
    println!("Program: {}", request.program_path().display());
    println!("Argv:");
    for arg in request.argv() {
        println!("  {}", arg.to_string_lossy());
    }
    if let Some(dir) = request.working_dir() {
        println!("Working directory: {}", dir.display());
    }
    println!("Flags: {:?}", request.spawn_flags());
    println!("Path: {}", choose_path(request));

    println!("Stdio:");
    let mut targets = Vec::new();
    for stream in StreamKind::ALL {
        let mode = request.stdio(stream);
        println!("  {stream}: {mode}");
        if mode != Stdio::Inherit {
            targets.push(stream.fd());
        }
    }

    if !request.remaps().is_empty() {
        println!("Remaps:");
        for remap in request.remaps() {
            println!("  {} -> {}", remap.source, remap.target);
            targets.push(remap.target);
        }
    }
    println!("Reserved fd floor: {}", reserved_fd_floor(targets));
}

fn forward_output(stream: StreamKind, data: &[u8]) -> Result<()> {
    match stream {
        StreamKind::Stderr => {
            let mut err = std::io::stderr().lock();
            err.write_all(data)?;
            err.flush()?;
        }
        _ => {
            let mut out = std::io::stdout().lock();
            out.write_all(data)?;
            out.flush()?;
        }
    }
    Ok(())
}

/// Copy our stdin into the child's stdin pipe until either side closes.
fn forward_stdin(fd: OwnedFd) {
    tokio::task::spawn_blocking(move || {
        let mut pipe = File::from(fd);
        let mut stdin = std::io::stdin().lock();
        if let Err(e) = std::io::copy(&mut stdin, &mut pipe) {
            debug!(error = %e, "stopped forwarding stdin");
        }
    });
}
