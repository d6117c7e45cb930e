// src/errors.rs

//! Crate-wide error types and helpers.
//!
//! Spawn failures fall into three classes:
//! - configuration errors, detected in the parent before any OS call
//!   ([`SpawnError::InvalidRequest`]);
//! - pre-exec failures inside the child, transported back over the
//!   error-report pipe ([`SpawnError::Child`]);
//! - post-exec failures, which are *not* spawn errors at all and only show up
//!   as an [`ExitReport`](crate::handle::ExitReport). Use
//!   [`ExitReport::check`](crate::handle::ExitReport::check) to turn those into
//!   an [`ExitStatusError`].

use std::os::fd::RawFd;

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

use crate::report::ChildStage;

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("invalid spawn request: {0}")]
    InvalidRequest(String),

    #[error("fd {target} is out of range: the descriptor limit is {limit}")]
    TargetOutOfRange { target: RawFd, limit: RawFd },

    #[error("failed to create pipe: {0}")]
    Pipe(Errno),

    #[error("failed to fork: {0}")]
    Fork(Errno),

    #[error("{}", describe_child_failure(*stage, *errno, context))]
    Child {
        stage: ChildStage,
        errno: Errno,
        /// Program path for exec failures, directory for chdir failures.
        context: String,
    },

    #[error("failed to read from child pipe: {0}")]
    ReportRead(String),

    #[error("failed to wait for child {pid}: {errno}")]
    Wait { pid: Pid, errno: Errno },

    #[error("child {0} was spawned without DO_NOT_REAP_CHILD and cannot be waited on")]
    Detached(Pid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of a [`SpawnError`], mostly by the errno the child reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpawnErrorKind {
    /// The program does not exist.
    NoEnt,
    /// Permission denied on the program or an interpreter.
    Acces,
    /// The program is not an executable format.
    NoExec,
    /// Operation not permitted.
    Perm,
    /// Argument list too long.
    TooBig,
    /// Generic I/O failure, including a broken error-report pipe.
    Io,
    NotDir,
    IsDir,
    Loop,
    NameTooLong,
    TxtBusy,
    NoMem,
    NFile,
    MFile,
    Inval,
    LibBad,
    /// Changing to the working directory failed.
    Chdir,
    /// Creating the child (or the intermediate child's second fork) failed.
    Fork,
    /// Applying the fd remap table in the child failed.
    Redirect,
    /// The request was rejected before any OS call was made.
    InvalidRequest,
    /// Any other errno.
    Other(i32),
}

impl SpawnErrorKind {
    /// Map an `execve` errno to a kind.
    pub fn from_exec_errno(errno: Errno) -> Self {
        match errno {
            Errno::ENOENT => SpawnErrorKind::NoEnt,
            Errno::EACCES => SpawnErrorKind::Acces,
            Errno::ENOEXEC => SpawnErrorKind::NoExec,
            Errno::EPERM => SpawnErrorKind::Perm,
            Errno::E2BIG => SpawnErrorKind::TooBig,
            Errno::EIO => SpawnErrorKind::Io,
            Errno::ENOTDIR => SpawnErrorKind::NotDir,
            Errno::EISDIR => SpawnErrorKind::IsDir,
            Errno::ELOOP => SpawnErrorKind::Loop,
            Errno::ENAMETOOLONG => SpawnErrorKind::NameTooLong,
            Errno::ETXTBSY => SpawnErrorKind::TxtBusy,
            Errno::ENOMEM => SpawnErrorKind::NoMem,
            Errno::ENFILE => SpawnErrorKind::NFile,
            Errno::EMFILE => SpawnErrorKind::MFile,
            Errno::EINVAL => SpawnErrorKind::Inval,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Errno::ELIBBAD => SpawnErrorKind::LibBad,
            other => SpawnErrorKind::Other(other as i32),
        }
    }
}

impl SpawnError {
    pub fn kind(&self) -> SpawnErrorKind {
        match self {
            SpawnError::InvalidRequest(_) | SpawnError::Detached(_) => {
                SpawnErrorKind::InvalidRequest
            }
            SpawnError::TargetOutOfRange { .. } => SpawnErrorKind::Redirect,
            SpawnError::Pipe(_) => SpawnErrorKind::Io,
            SpawnError::Fork(_) => SpawnErrorKind::Fork,
            SpawnError::Child { stage, errno, .. } => match stage {
                ChildStage::Exec => SpawnErrorKind::from_exec_errno(*errno),
                ChildStage::Chdir => SpawnErrorKind::Chdir,
                ChildStage::DupFd | ChildStage::Close => SpawnErrorKind::Redirect,
                ChildStage::Fork => SpawnErrorKind::Fork,
                ChildStage::SignalReset => SpawnErrorKind::Other(*errno as i32),
            },
            SpawnError::ReportRead(_) | SpawnError::Wait { .. } | SpawnError::Io(_) => {
                SpawnErrorKind::Io
            }
        }
    }

    /// The OS error behind this failure, if there is one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            SpawnError::Pipe(e) | SpawnError::Fork(e) => Some(*e),
            SpawnError::Child { errno, .. } | SpawnError::Wait { errno, .. } => Some(*errno),
            SpawnError::TargetOutOfRange { .. } => Some(Errno::EBADF),
            SpawnError::Io(e) => e.raw_os_error().map(Errno::from_raw),
            _ => None,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SpawnError::InvalidRequest(msg.into())
    }
}

fn describe_child_failure(stage: ChildStage, errno: Errno, context: &str) -> String {
    let reason = errno.desc();
    match stage {
        ChildStage::Exec => format!("failed to execute child process \"{context}\" ({reason})"),
        ChildStage::Chdir => format!("failed to change to directory '{context}' ({reason})"),
        ChildStage::DupFd => {
            format!("failed to redirect output or input of child process ({reason})")
        }
        ChildStage::Close => format!("failed to close file descriptor for child process ({reason})"),
        ChildStage::Fork => format!("failed to fork child process ({reason})"),
        ChildStage::SignalReset => {
            format!("failed to reset signal state of child process ({reason})")
        }
    }
}

/// A child that ran but did not exit successfully.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatusError {
    #[error("child process exited with code {0}")]
    Exited(i32),

    #[error("child process killed by signal {0}")]
    Signaled(i32),
}

/// Errors raised while loading a spawn profile from disk.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Request(#[from] SpawnError),
}

pub type Result<T> = std::result::Result<T, SpawnError>;
