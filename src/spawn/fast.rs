// src/spawn/fast.rs

//! `posix_spawn` with a file-action list equivalent to the remap plan.
//!
//! Only chosen when nothing in the request needs code to run in the child:
//! no working directory, no descriptor sweep and no intermediate child. On
//! the supported targets `posix_spawn` reports dup2 and exec failures
//! synchronously, so no error-report channel is needed.

use std::mem::MaybeUninit;

use nix::errno::Errno;
use nix::unistd::Pid;
use tracing::debug;

use crate::errors::{Result, SpawnError};
use crate::fdmap::{FdAction, RemapPlan};
use crate::report::ChildStage;

use super::prepared::PreparedExec;

/// Owned `posix_spawn_file_actions_t`.
struct FileActions(libc::posix_spawn_file_actions_t);

impl FileActions {
    fn new() -> std::result::Result<Self, Errno> {
        let mut actions = MaybeUninit::uninit();
        check(unsafe { libc::posix_spawn_file_actions_init(actions.as_mut_ptr()) })?;
        Ok(Self(unsafe { actions.assume_init() }))
    }

    fn from_plan(plan: &RemapPlan) -> std::result::Result<Self, Errno> {
        let mut actions = Self::new()?;
        for action in plan.actions() {
            match *action {
                FdAction::Dup { from, to } => check(unsafe {
                    libc::posix_spawn_file_actions_adddup2(&mut actions.0, from, to)
                })?,
                FdAction::Close { fd } => check(unsafe {
                    libc::posix_spawn_file_actions_addclose(&mut actions.0, fd)
                })?,
            }
        }
        Ok(actions)
    }
}

impl Drop for FileActions {
    fn drop(&mut self) {
        unsafe { libc::posix_spawn_file_actions_destroy(&mut self.0) };
    }
}

/// Owned `posix_spawnattr_t` with an empty signal mask and `SIGPIPE` reset.
struct SpawnAttr(libc::posix_spawnattr_t);

impl SpawnAttr {
    fn new() -> std::result::Result<Self, Errno> {
        let mut attr = MaybeUninit::uninit();
        check(unsafe { libc::posix_spawnattr_init(attr.as_mut_ptr()) })?;
        let mut attr = Self(unsafe { attr.assume_init() });

        unsafe {
            let mut empty: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut empty);
            check(libc::posix_spawnattr_setsigmask(&mut attr.0, &empty))?;

            let mut defaults: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut defaults);
            libc::sigaddset(&mut defaults, libc::SIGPIPE);
            check(libc::posix_spawnattr_setsigdefault(&mut attr.0, &defaults))?;

            let flags = libc::POSIX_SPAWN_SETSIGMASK | libc::POSIX_SPAWN_SETSIGDEF;
            check(libc::posix_spawnattr_setflags(&mut attr.0, flags as libc::c_short))?;
        }

        Ok(attr)
    }
}

impl Drop for SpawnAttr {
    fn drop(&mut self) {
        unsafe { libc::posix_spawnattr_destroy(&mut self.0) };
    }
}

/// `posix_*` functions return the error number instead of setting `errno`.
fn check(ret: libc::c_int) -> std::result::Result<(), Errno> {
    if ret == 0 { Ok(()) } else { Err(Errno::from_raw(ret)) }
}

pub(crate) fn spawn(exec: &PreparedExec, plan: &RemapPlan) -> Result<Pid> {
    let actions = FileActions::from_plan(plan).map_err(|errno| match errno {
        // Same failure the generic child reports from dup2.
        Errno::EBADF => SpawnError::Child {
            stage: ChildStage::DupFd,
            errno,
            context: exec.program.clone(),
        },
        other => SpawnError::Fork(other),
    })?;
    let attr = SpawnAttr::new().map_err(SpawnError::Fork)?;
    let envp = exec.envp.as_ptr();

    let result = exec.try_candidates(|path, argv| {
        let mut pid: libc::pid_t = 0;
        let ret = unsafe {
            libc::posix_spawn(
                &mut pid,
                path,
                &actions.0,
                &attr.0,
                argv.cast::<*mut libc::c_char>(),
                envp.cast::<*mut libc::c_char>(),
            )
        };
        check(ret).map(|()| pid)
    });

    match result {
        Ok(pid) => {
            let pid = Pid::from_raw(pid);
            debug!(pid = %pid, program = %exec.program, "child started via posix_spawn");
            Ok(pid)
        }
        Err(errno) => {
            debug!(program = %exec.program, errno = %errno, "posix_spawn failed");
            // Sources were checked when staging, so this is an exec error.
            Err(SpawnError::Child {
                stage: ChildStage::Exec,
                errno,
                context: exec.program.clone(),
            })
        }
    }
}
