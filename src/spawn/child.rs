// src/spawn/child.rs

//! Code that runs in the forked child before `exec`.
//!
//! Only async-signal-safe libc calls are made here: no allocation, no locks,
//! no `tracing`. Every failure is sent over the error-report channel.

use std::convert::Infallible;
use std::os::fd::RawFd;
use std::ptr;

use nix::errno::Errno;

use crate::fdmap::{FdAction, RemapPlan, SweepPlan};
use crate::report::ChildStage;
use crate::report::channel::report_and_exit;
use crate::sys::{cvt, cvt_r};

use super::prepared::PreparedExec;

/// Borrowed view of everything the child needs.
pub(crate) struct ChildContext<'a> {
    pub exec: &'a PreparedExec,
    pub plan: &'a RemapPlan,
    /// `None` when descriptors are left open.
    pub sweep: Option<&'a SweepPlan>,
    pub report_fd: RawFd,
}

/// Set the child up and replace its image. Never returns.
///
/// # Safety
///
/// Must only be called in a freshly forked child.
pub(crate) unsafe fn run_child(ctx: &ChildContext<'_>) -> ! {
    let fd = ctx.report_fd;

    if let Some(dir) = &ctx.exec.working_directory {
        if let Err(e) = cvt(unsafe { libc::chdir(dir.as_ptr()) }) {
            report_and_exit(fd, e, ChildStage::Chdir);
        }
    }

    for action in ctx.plan.actions() {
        match *action {
            FdAction::Dup { from, to } => {
                if let Err(e) = cvt_r(|| unsafe { libc::dup2(from, to) }) {
                    report_and_exit(fd, e, ChildStage::DupFd);
                }
            }
            FdAction::Close { fd: target } => match cvt(unsafe { libc::close(target) }) {
                Ok(_) | Err(Errno::EBADF) => {}
                Err(e) => report_and_exit(fd, e, ChildStage::Close),
            },
        }
    }

    if let Some(sweep) = ctx.sweep {
        unsafe { sweep.apply() };
    }

    if let Err(e) = unsafe { reset_signals() } {
        report_and_exit(fd, e, ChildStage::SignalReset);
    }

    let envp = ctx.exec.envp.as_ptr();
    let result = ctx
        .exec
        .try_candidates(|path, argv| -> Result<Infallible, Errno> {
            unsafe { libc::execve(path, argv, envp) };
            Err(Errno::last())
        });

    match result {
        Ok(never) => match never {},
        Err(e) => report_and_exit(fd, e, ChildStage::Exec),
    }
}

/// Empty signal mask, `SIGPIPE` back to its default action.
unsafe fn reset_signals() -> Result<(), Errno> {
    let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
    unsafe { libc::sigemptyset(&mut set) };
    let ret = unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, &set, ptr::null_mut()) };
    if ret != 0 {
        return Err(Errno::from_raw(ret));
    }

    if unsafe { libc::signal(libc::SIGPIPE, libc::SIG_DFL) } == libc::SIG_ERR {
        return Err(Errno::last());
    }
    Ok(())
}
