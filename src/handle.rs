// src/handle.rs

//! The caller's view of a spawned child.
//!
//! A [`ChildHandle`] owns the pid, the parent ends of any stdio pipes and the
//! right to reap the child. Reaping consumes the handle, so a child's status
//! can only ever be collected once. [`ChildHandle::exited`] waits for the
//! child to terminate without reaping it.

use std::future::Future;
use std::os::fd::OwnedFd;
use std::sync::{Arc, OnceLock};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, trace};

use crate::errors::{ExitStatusError, Result, SpawnError};
use crate::spawn::SpawnPath;
use crate::types::StreamKind;

/// How a child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// `true` if the child called `exit`, `false` if a signal killed it.
    pub exited_normally: bool,
    /// Exit code when `exited_normally`, otherwise the signal number.
    pub code_or_signal: i32,
}

impl ExitReport {
    pub fn exited(code: i32) -> Self {
        Self {
            exited_normally: true,
            code_or_signal: code,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            exited_normally: false,
            code_or_signal: signal,
        }
    }

    /// `None` for statuses that do not mean termination (stopped, continued,
    /// still alive).
    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Self::exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Self::signaled(signal as i32)),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        self.exited_normally && self.code_or_signal == 0
    }

    pub fn code(&self) -> Option<i32> {
        self.exited_normally.then_some(self.code_or_signal)
    }

    pub fn signal(&self) -> Option<i32> {
        (!self.exited_normally).then_some(self.code_or_signal)
    }

    /// Turn a non-zero exit or a signal death into an error.
    pub fn check(&self) -> std::result::Result<(), ExitStatusError> {
        match (self.exited_normally, self.code_or_signal) {
            (true, 0) => Ok(()),
            (true, code) => Err(ExitStatusError::Exited(code)),
            (false, signal) => Err(ExitStatusError::Signaled(signal)),
        }
    }

    /// Shell-style exit code: the code itself, or `128 + signal`.
    pub fn as_shell_code(&self) -> i32 {
        if self.exited_normally {
            self.code_or_signal
        } else {
            128 + self.code_or_signal
        }
    }
}

/// Outcome of [`ChildHandle::try_reap`].
#[derive(Debug)]
pub enum TryReap {
    Exited(ExitReport),
    Running(ChildHandle),
}

/// A spawned child process.
#[derive(Debug)]
pub struct ChildHandle {
    pid: Pid,
    detached: bool,
    path: SpawnPath,
    stdio: [Option<OwnedFd>; 3],
    /// Filled by `exited()` on targets where observing the exit reaps.
    exit_slot: Arc<OnceLock<ExitReport>>,
    reaped: bool,
}

impl ChildHandle {
    pub(crate) fn new(pid: Pid, detached: bool, path: SpawnPath, stdio: [Option<OwnedFd>; 3]) -> Self {
        Self {
            pid,
            detached,
            path,
            stdio,
            exit_slot: Arc::new(OnceLock::new()),
            reaped: false,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The child was started through an intermediate process. Its pid is
    /// known but it can neither be waited on nor reaped.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn spawn_path(&self) -> SpawnPath {
        self.path
    }

    /// Parent end of the stdin pipe, if one was requested.
    pub fn take_stdin(&mut self) -> Option<OwnedFd> {
        self.take_stream(StreamKind::Stdin)
    }

    pub fn take_stdout(&mut self) -> Option<OwnedFd> {
        self.take_stream(StreamKind::Stdout)
    }

    pub fn take_stderr(&mut self) -> Option<OwnedFd> {
        self.take_stream(StreamKind::Stderr)
    }

    pub fn take_stream(&mut self, stream: StreamKind) -> Option<OwnedFd> {
        self.stdio[stream.fd() as usize].take()
    }

    /// Wait until the child terminates, without reaping it.
    ///
    /// Listens for `SIGCHLD` and re-checks the child on every delivery. The
    /// returned future does not borrow the handle, so it can be moved into a
    /// task. Must be polled inside a tokio runtime.
    pub fn exited(&self) -> impl Future<Output = Result<ExitReport>> + Send + 'static {
        let pid = self.pid;
        let detached = self.detached;
        let slot = Arc::clone(&self.exit_slot);

        async move {
            if detached {
                return Err(SpawnError::Detached(pid));
            }
            if let Some(report) = slot.get() {
                return Ok(*report);
            }

            // Subscribe before the first check so an exit in between still
            // wakes us.
            let mut sigchld = signal(SignalKind::child())?;
            loop {
                if let Some(report) = peek_exit(pid, &slot)? {
                    trace!(pid = %pid, ?report, "child exited");
                    return Ok(report);
                }
                if sigchld.recv().await.is_none() {
                    return Err(SpawnError::Io(std::io::Error::other(
                        "SIGCHLD listener closed",
                    )));
                }
            }
        }
    }

    /// Block until the child exits and collect its status.
    pub fn reap(mut self) -> Result<ExitReport> {
        self.ensure_attached()?;
        if let Some(report) = self.exit_slot.get() {
            self.reaped = true;
            return Ok(*report);
        }

        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(report) = ExitReport::from_wait_status(status) {
                        self.reaped = true;
                        debug!(pid = %self.pid, ?report, "reaped child");
                        return Ok(report);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    self.reaped = true;
                    return Err(SpawnError::Wait {
                        pid: self.pid,
                        errno,
                    });
                }
            }
        }
    }

    /// Reap the child if it has already exited, otherwise hand the handle back.
    pub fn try_reap(mut self) -> Result<TryReap> {
        self.ensure_attached()?;
        if let Some(report) = self.exit_slot.get() {
            self.reaped = true;
            return Ok(TryReap::Exited(*report));
        }

        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => {
                    return Ok(match ExitReport::from_wait_status(status) {
                        Some(report) => {
                            self.reaped = true;
                            debug!(pid = %self.pid, ?report, "reaped child");
                            TryReap::Exited(report)
                        }
                        None => TryReap::Running(self),
                    });
                }
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    self.reaped = true;
                    return Err(SpawnError::Wait {
                        pid: self.pid,
                        errno,
                    });
                }
            }
        }
    }

    /// Wait asynchronously for the child to exit, then reap it.
    pub async fn wait(self) -> Result<ExitReport> {
        self.exited().await?;
        self.reap()
    }

    /// Send `signal` to the child. A child that is already gone is not an
    /// error.
    pub fn kill(&self, signal: Signal) -> Result<()> {
        match kill(self.pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(SpawnError::Io(std::io::Error::from_raw_os_error(errno as i32))),
        }
    }

    /// `SIGKILL` the child and reap it.
    ///
    /// For callers that own the handle and are bailing out on an error, so
    /// no zombie is left behind. Detached children are only signalled.
    pub fn kill_and_reap(self) -> Result<ExitReport> {
        self.kill(Signal::SIGKILL)?;
        if self.detached {
            return Err(SpawnError::Detached(self.pid));
        }
        self.reap()
    }

    fn ensure_attached(&mut self) -> Result<()> {
        if self.detached {
            return Err(SpawnError::Detached(self.pid));
        }
        Ok(())
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        if !self.reaped && !self.detached {
            debug!(pid = %self.pid, "child handle dropped without reaping");
        }
    }
}

/// Check whether `pid` has terminated, leaving it waitable.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn peek_exit(pid: Pid, _slot: &OnceLock<ExitReport>) -> Result<Option<ExitReport>> {
    use nix::sys::wait::{Id, waitid};

    let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT;
    loop {
        match waitid(Id::Pid(pid), flags) {
            Ok(status) => return Ok(ExitReport::from_wait_status(status)),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(SpawnError::Wait { pid, errno }),
        }
    }
}

/// Without `WNOWAIT` the only way to observe an exit is to reap. The status
/// is kept in the handle's slot for `reap()` to return.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn peek_exit(pid: Pid, slot: &OnceLock<ExitReport>) -> Result<Option<ExitReport>> {
    if let Some(report) = slot.get() {
        return Ok(Some(*report));
    }
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => {
                return Ok(ExitReport::from_wait_status(status).map(|report| {
                    let _ = slot.set(report);
                    report
                }));
            }
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(SpawnError::Wait { pid, errno }),
        }
    }
}
