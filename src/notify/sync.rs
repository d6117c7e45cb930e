// src/notify/sync.rs

//! Spawn a child, capture its piped output, reap it.

use tracing::debug;

use crate::errors::Result;
use crate::handle::{ChildHandle, ExitReport};
use crate::request::{SpawnFlags, SpawnRequest};
use crate::spawn::spawn;
use crate::types::StreamKind;

use super::{Completion, CompletionNotifier};

/// Everything a finished child left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOutput {
    /// `None` unless stdout was `Stdio::Pipe`.
    pub stdout: Option<Vec<u8>>,
    /// `None` unless stderr was `Stdio::Pipe`.
    pub stderr: Option<Vec<u8>>,
    pub report: ExitReport,
}

/// Run `request` to completion on the current tokio runtime.
///
/// The child is always reaped here, so `DO_NOT_REAP_CHILD` is forced on. A
/// piped stdin is closed immediately. A spawn failure returns the error with
/// no output.
pub async fn run_to_completion(request: &SpawnRequest) -> Result<SpawnOutput> {
    let request = request
        .clone()
        .insert_flags(SpawnFlags::DO_NOT_REAP_CHILD);

    let mut child = spawn(&request)?;
    let pid = child.pid();
    drop(child.take_stdin());

    let mut completion = match collect(&mut child).await {
        Ok(completion) => completion,
        Err(err) => {
            debug!(pid = %pid, error = %err, "collecting output failed; killing child");
            if let Err(reap_err) = child.kill_and_reap() {
                debug!(pid = %pid, error = %reap_err, "failed to clean up child");
            }
            return Err(err);
        }
    };

    let report = child.reap()?;
    debug!(pid = %pid, ?report, "child ran to completion");

    Ok(SpawnOutput {
        stdout: completion.take_output(StreamKind::Stdout),
        stderr: completion.take_output(StreamKind::Stderr),
        report,
    })
}

async fn collect(child: &mut ChildHandle) -> Result<Completion> {
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

    while let Some(event) = notifier.next_event().await {
        if completion.apply(event)? {
            break;
        }
    }
    Ok(completion)
}

/// [`run_to_completion`] for callers without a runtime.
///
/// Builds a fresh `current_thread` runtime for the duration of the call, so
/// it must not be called from inside one.
pub fn spawn_sync(request: &SpawnRequest) -> Result<SpawnOutput> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_to_completion(request))
}
