// src/report/mod.rs

//! Error-report channel between a not-yet-exec'd child and its parent.
//!
//! Before forking, the parent opens a close-on-exec pipe whose ends sit above
//! every fd the child will remap. The child writes a single
//! [`ErrorReportMessage`] if any setup step or `execve` fails, then exits with
//! [`REPORT_EXIT_CODE`]. A successful `execve` closes the write end
//! implicitly, so the parent reading EOF with no bytes means "it ran".
//!
//! - [`channel`] owns the pipe, the child-side writer and the parent-side
//!   reader.

pub mod channel;

use std::fmt;

use nix::errno::Errno;

use crate::errors::SpawnError;

pub use channel::{ReportChannel, ReportReader};

/// Exit code used by a child that reported a failure over the channel.
///
/// The parent always consumes the message instead of the status, so this
/// value never reaches callers.
pub const REPORT_EXIT_CODE: i32 = 127;

/// Size of an encoded [`ErrorReportMessage`].
pub const MESSAGE_LEN: usize = 8;

/// Which pre-exec step failed in the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ChildStage {
    Chdir = 1,
    DupFd = 2,
    Close = 3,
    SignalReset = 4,
    Exec = 5,
    /// The intermediate child could not fork the real child.
    Fork = 6,
}

impl TryFrom<i32> for ChildStage {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ChildStage::Chdir),
            2 => Ok(ChildStage::DupFd),
            3 => Ok(ChildStage::Close),
            4 => Ok(ChildStage::SignalReset),
            5 => Ok(ChildStage::Exec),
            6 => Ok(ChildStage::Fork),
            other => Err(other),
        }
    }
}

impl fmt::Display for ChildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChildStage::Chdir => "chdir",
            ChildStage::DupFd => "dup2",
            ChildStage::Close => "close",
            ChildStage::SignalReset => "signal reset",
            ChildStage::Exec => "exec",
            ChildStage::Fork => "fork",
        };
        f.write_str(name)
    }
}

/// The fixed record a failing child writes: `{errno_value, stage}` as two
/// native-endian `i32`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReportMessage {
    pub errno_value: i32,
    pub stage: ChildStage,
}

impl ErrorReportMessage {
    pub fn new(errno: Errno, stage: ChildStage) -> Self {
        Self {
            errno_value: errno as i32,
            stage,
        }
    }

    /// Encode without allocating; safe to call between `fork` and `exec`.
    pub fn encode(&self) -> [u8; MESSAGE_LEN] {
        let mut buf = [0u8; MESSAGE_LEN];
        buf[..4].copy_from_slice(&self.errno_value.to_ne_bytes());
        buf[4..].copy_from_slice(&(self.stage as i32).to_ne_bytes());
        buf
    }

    pub fn decode(buf: &[u8; MESSAGE_LEN]) -> Result<Self, SpawnError> {
        let errno_value = i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let raw_stage = i32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let stage = ChildStage::try_from(raw_stage).map_err(|raw| {
            SpawnError::ReportRead(format!("child reported unknown stage {raw}"))
        })?;
        Ok(Self { errno_value, stage })
    }

    pub fn errno(&self) -> Errno {
        Errno::from_raw(self.errno_value)
    }

    /// Turn the report into the error surfaced to the caller.
    ///
    /// `program` and `working_directory` give the error message its context.
    pub fn into_error(self, program: &str, working_directory: Option<&str>) -> SpawnError {
        let context = match self.stage {
            ChildStage::Chdir => working_directory.unwrap_or_default().to_string(),
            _ => program.to_string(),
        };
        SpawnError::Child {
            stage: self.stage,
            errno: self.errno(),
            context,
        }
    }
}
