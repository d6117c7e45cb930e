// src/spawn/generic.rs

//! fork → setup → exec, optionally through an intermediate child.

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::errors::{Result, SpawnError};
use crate::fdmap::{RemapPlan, SweepPlan};
use crate::report::channel::{report_and_exit, write_pid};
use crate::report::{ChildStage, ErrorReportMessage, ReportChannel, ReportReader};
use crate::request::{SpawnFlags, SpawnRequest};

use super::child::{ChildContext, run_child};
use super::prepared::PreparedExec;

/// Result of a successful generic spawn.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Spawned {
    pub pid: Pid,
    /// The child was started through an intermediate process and has been
    /// re-parented; it can no longer be waited on.
    pub detached: bool,
}

pub(crate) fn spawn(
    request: &SpawnRequest,
    exec: &PreparedExec,
    plan: &RemapPlan,
) -> Result<Spawned> {
    let flags = request.spawn_flags();
    let intermediate = !flags.contains(SpawnFlags::DO_NOT_REAP_CHILD);

    let sweep = if flags.contains(SpawnFlags::LEAVE_DESCRIPTORS_OPEN) {
        None
    } else {
        Some(SweepPlan::new(plan.targets()))
    };

    let report = ReportChannel::open(plan.floor())?;
    let pid_channel = if intermediate {
        Some(ReportChannel::open(plan.floor())?)
    } else {
        None
    };

    let ctx = ChildContext {
        exec,
        plan,
        sweep: sweep.as_ref(),
        report_fd: report.write_fd(),
    };

    let pid = unsafe { libc::fork() };
    if pid == -1 {
        return Err(SpawnError::Fork(Errno::last()));
    }

    if pid == 0 {
        // SAFETY: we are the freshly forked child.
        unsafe {
            match &pid_channel {
                Some(pid_channel) => run_intermediate(&ctx, pid_channel.write_fd()),
                None => run_child(&ctx),
            }
        }
    }

    let pid = Pid::from_raw(pid);
    let reader = report.into_reader();
    let context = ReportContext::new(request, exec);

    match pid_channel {
        Some(pid_channel) => {
            let pid_reader = pid_channel.into_reader();
            finish_intermediate(pid, &reader, &pid_reader, &context)
        }
        None => finish_direct(pid, &reader, &context),
    }
}

/// First child of a double fork: start the real child, report its pid, exit.
unsafe fn run_intermediate(ctx: &ChildContext<'_>, pid_fd: libc::c_int) -> ! {
    let grandchild = unsafe { libc::fork() };
    if grandchild == -1 {
        report_and_exit(ctx.report_fd, Errno::last(), ChildStage::Fork);
    }
    if grandchild == 0 {
        unsafe { run_child(ctx) }
    }
    let code = match write_pid(pid_fd, grandchild) {
        Ok(()) => 0,
        Err(_) => 1,
    };
    unsafe { libc::_exit(code) }
}

struct ReportContext<'a> {
    program: &'a str,
    working_directory: Option<String>,
}

impl<'a> ReportContext<'a> {
    fn new(request: &SpawnRequest, exec: &'a PreparedExec) -> Self {
        Self {
            program: &exec.program,
            working_directory: request
                .working_dir()
                .map(|d| d.to_string_lossy().into_owned()),
        }
    }

    fn error(&self, msg: ErrorReportMessage) -> SpawnError {
        msg.into_error(self.program, self.working_directory.as_deref())
    }
}

fn finish_direct(pid: Pid, reader: &ReportReader, context: &ReportContext<'_>) -> Result<Spawned> {
    match reader.read_report() {
        Ok(None) => {
            debug!(pid = %pid, program = context.program, "child started");
            Ok(Spawned {
                pid,
                detached: false,
            })
        }
        Ok(Some(msg)) => {
            debug!(
                pid = %pid,
                stage = %msg.stage,
                errno = %msg.errno(),
                "child reported a pre-exec failure"
            );
            reap_quietly(pid);
            Err(context.error(msg))
        }
        Err(err) => {
            warn!(pid = %pid, error = %err, "could not read child's error report; killing it");
            let _ = kill(pid, Signal::SIGKILL);
            reap_quietly(pid);
            Err(err)
        }
    }
}

fn finish_intermediate(
    intermediate: Pid,
    reader: &ReportReader,
    pid_reader: &ReportReader,
    context: &ReportContext<'_>,
) -> Result<Spawned> {
    // The intermediate child exits right after its fork, so this is brief.
    wait_blocking(intermediate)?;

    if let Some(msg) = reader.read_report()? {
        debug!(
            intermediate = %intermediate,
            stage = %msg.stage,
            errno = %msg.errno(),
            "detached child reported a pre-exec failure"
        );
        return Err(context.error(msg));
    }

    let pid = Pid::from_raw(pid_reader.read_pid()?);
    debug!(
        pid = %pid,
        intermediate = %intermediate,
        program = context.program,
        "detached child started"
    );
    Ok(Spawned {
        pid,
        detached: true,
    })
}

fn wait_blocking(pid: Pid) -> Result<()> {
    loop {
        match waitpid(pid, None) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(SpawnError::Wait { pid, errno }),
        }
    }
}

fn reap_quietly(pid: Pid) {
    if let Err(err) = wait_blocking(pid) {
        warn!(pid = %pid, error = %err, "failed to reap child after spawn failure");
    }
}
