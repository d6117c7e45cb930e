// src/report/channel.rs

//! The pipe itself, plus both of its endpoints.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use tracing::trace;

use crate::errors::{Result, SpawnError};
use crate::sys;

use super::{ChildStage, ErrorReportMessage, MESSAGE_LEN, REPORT_EXIT_CODE};

/// A close-on-exec pipe whose ends are numbered at or above a floor.
///
/// The floor comes from the remap plan and is strictly greater than every
/// target fd, so applying the plan in the child can never overwrite either
/// end of this pipe.
#[derive(Debug)]
pub struct ReportChannel {
    read: OwnedFd,
    write: OwnedFd,
}

impl ReportChannel {
    pub fn open(floor: RawFd) -> Result<Self> {
        let (read, write) = sys::cloexec_pipe().map_err(SpawnError::Pipe)?;

        // pipe() hands out the lowest free numbers, which may well be remap
        // targets. Move both ends above the floor.
        let read = relocate(read, floor)?;
        let write = relocate(write, floor)?;

        trace!(
            read_fd = read.as_raw_fd(),
            write_fd = write.as_raw_fd(),
            floor,
            "opened error-report channel"
        );

        Ok(Self { read, write })
    }

    /// Raw write end, for use by the child after `fork`.
    pub fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }

    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    /// Parent side: drop our copy of the write end and keep the reader.
    ///
    /// Must be called after the child exists, otherwise the read would never
    /// see EOF.
    pub fn into_reader(self) -> ReportReader {
        let ReportChannel { read, write } = self;
        drop(write);
        ReportReader { read }
    }
}

fn relocate(fd: OwnedFd, floor: RawFd) -> Result<OwnedFd> {
    if fd.as_raw_fd() >= floor {
        return Ok(fd);
    }
    sys::dup_cloexec_above(fd.as_raw_fd(), floor).map_err(SpawnError::Pipe)
}

/// Parent-side end of a [`ReportChannel`].
#[derive(Debug)]
pub struct ReportReader {
    read: OwnedFd,
}

impl ReportReader {
    /// Block until the child either reports a failure or closes the channel.
    ///
    /// - `Ok(None)`: EOF with no bytes; `execve` succeeded.
    /// - `Ok(Some(msg))`: the child failed before running the program.
    ///
    /// This read is bounded: the write end closes either when the child
    /// exits after reporting, or through close-on-exec.
    pub fn read_report(&self) -> Result<Option<ErrorReportMessage>> {
        let mut buf = [0u8; MESSAGE_LEN];
        let n = sys::read_full(self.read.as_raw_fd(), &mut buf)
            .map_err(|e| SpawnError::ReportRead(e.desc().to_string()))?;

        match n {
            0 => Ok(None),
            MESSAGE_LEN => ErrorReportMessage::decode(&buf).map(Some),
            short => Err(SpawnError::ReportRead(format!(
                "short read on error-report pipe ({short} of {MESSAGE_LEN} bytes)"
            ))),
        }
    }

    /// Read the grandchild pid written by an intermediate child.
    pub fn read_pid(&self) -> Result<libc::pid_t> {
        let mut buf = [0u8; 4];
        let n = sys::read_full(self.read.as_raw_fd(), &mut buf)
            .map_err(|e| SpawnError::ReportRead(e.desc().to_string()))?;
        if n != buf.len() {
            return Err(SpawnError::ReportRead(
                "intermediate child exited without reporting a pid".to_string(),
            ));
        }
        Ok(libc::pid_t::from_ne_bytes(buf))
    }
}

/// Child side: write the failure record and terminate.
///
/// Only async-signal-safe calls are made here. Write errors are ignored; the
/// parent then sees EOF without a report, but the child's non-zero exit still
/// means the program never ran.
pub fn report_and_exit(fd: RawFd, errno: Errno, stage: ChildStage) -> ! {
    let msg = ErrorReportMessage::new(errno, stage).encode();
    let _ = sys::write_all(fd, &msg);
    unsafe { libc::_exit(REPORT_EXIT_CODE) }
}

/// Intermediate-child side: send the grandchild pid to the parent.
pub fn write_pid(fd: RawFd, pid: libc::pid_t) -> std::result::Result<(), Errno> {
    sys::write_all(fd, &pid.to_ne_bytes())
}
