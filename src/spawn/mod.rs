// src/spawn/mod.rs

//! Process creation.
//!
//! [`spawn`] validates a [`SpawnRequest`], turns its stdio requests and fd
//! remaps into a staged [`RemapPlan`], prepares every allocation the child
//! needs, then creates the process through one of two paths:
//!
//! - [`generic`]: `fork`, run the setup steps in the child, `execve`. Failures
//!   before `exec` come back over the error-report channel.
//! - [`fast`]: `posix_spawn` with the same plan as file actions. Only used when
//!   the request needs nothing `posix_spawn` cannot express.
//!
//! Both paths produce the same observable result for the same request.

mod child;
mod generic;
mod prepared;
mod stdio;

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
mod fast;

use std::fmt;

use nix::unistd::Pid;
use tracing::debug;

use crate::errors::Result;
use crate::fdmap::{RemapPlan, RemapTable};
use crate::handle::ChildHandle;
use crate::request::{SpawnFlags, SpawnRequest};

use prepared::PreparedExec;
use stdio::StdioSetup;

pub use prepared::candidate_paths;

/// Which creation strategy produced a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpawnPath {
    Generic,
    Fast,
}

impl fmt::Display for SpawnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnPath::Generic => f.write_str("fork/exec"),
            SpawnPath::Fast => f.write_str("posix_spawn"),
        }
    }
}

/// Why a request that prefers the fast path runs on the generic one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPathBlocker {
    NotPreferred,
    /// Without `DO_NOT_REAP_CHILD` an intermediate child is needed.
    ReapsAutomatically,
    /// `posix_spawn` cannot sweep unrequested descriptors.
    ClosesDescriptors,
    WorkingDirectory,
    /// No usable `posix_spawn` on this target.
    Unsupported,
}

impl fmt::Display for FastPathBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FastPathBlocker::NotPreferred => "fast path not requested",
            FastPathBlocker::ReapsAutomatically => "DO_NOT_REAP_CHILD is not set",
            FastPathBlocker::ClosesDescriptors => "LEAVE_DESCRIPTORS_OPEN is not set",
            FastPathBlocker::WorkingDirectory => "a working directory is requested",
            FastPathBlocker::Unsupported => "posix_spawn is not supported on this platform",
        };
        f.write_str(reason)
    }
}

pub struct FastPathSupport;

impl FastPathSupport {
    pub fn check(request: &SpawnRequest) -> std::result::Result<(), FastPathBlocker> {
        let flags = request.spawn_flags();
        if !flags.contains(SpawnFlags::PREFER_FAST_PATH) {
            return Err(FastPathBlocker::NotPreferred);
        }
        if !flags.contains(SpawnFlags::DO_NOT_REAP_CHILD) {
            return Err(FastPathBlocker::ReapsAutomatically);
        }
        if !flags.contains(SpawnFlags::LEAVE_DESCRIPTORS_OPEN) {
            return Err(FastPathBlocker::ClosesDescriptors);
        }
        if request.working_dir().is_some() {
            return Err(FastPathBlocker::WorkingDirectory);
        }
        if !cfg!(any(
            target_os = "linux",
            target_os = "android",
            target_os = "freebsd"
        )) {
            return Err(FastPathBlocker::Unsupported);
        }
        Ok(())
    }
}

/// The path [`spawn`] will take for `request`.
pub fn choose_path(request: &SpawnRequest) -> SpawnPath {
    match FastPathSupport::check(request) {
        Ok(()) => SpawnPath::Fast,
        Err(FastPathBlocker::NotPreferred) => SpawnPath::Generic,
        Err(blocker) => {
            debug!(reason = %blocker, "falling back to fork/exec");
            SpawnPath::Generic
        }
    }
}

/// Create a child process.
///
/// Returns once the child has either started running the program or failed
/// to. A failure before `exec` (program not found, bad working directory,
/// failed redirection) is returned here as a [`SpawnError`](crate::SpawnError),
/// never as an exit status.
pub fn spawn(request: &SpawnRequest) -> Result<ChildHandle> {
    request.validate()?;

    let stdio = StdioSetup::prepare(request)?;
    let table = RemapTable::build(&stdio.entries, request.remaps())?;
    let plan = RemapPlan::stage(&table)?;
    let exec = PreparedExec::new(request)?;
    let path = choose_path(request);

    debug!(
        program = %exec.program,
        path = %path,
        remaps = plan.actions().len(),
        staged = plan.staged_count(),
        candidates = ?exec.candidate_names().collect::<Vec<_>>(),
        "spawning child"
    );

    let (pid, detached) = match path {
        SpawnPath::Generic => {
            let spawned = generic::spawn(request, &exec, &plan)?;
            (spawned.pid, spawned.detached)
        }
        SpawnPath::Fast => (spawn_fast(&exec, &plan)?, false),
    };

    // The child holds its own copies now.
    let StdioSetup {
        child_ends,
        parent_ends,
        ..
    } = stdio;
    drop(child_ends);
    drop(plan);

    Ok(ChildHandle::new(pid, detached, path, parent_ends))
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn spawn_fast(exec: &PreparedExec, plan: &RemapPlan) -> Result<Pid> {
    fast::spawn(exec, plan)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn spawn_fast(_exec: &PreparedExec, _plan: &RemapPlan) -> Result<Pid> {
    Err(crate::errors::SpawnError::invalid(
        FastPathBlocker::Unsupported.to_string(),
    ))
}
