// src/request/mod.rs

//! Spawn requests.
//!
//! A [`SpawnRequest`] describes everything about a child before it exists:
//! program and arguments, working directory, environment, [`SpawnFlags`],
//! standard-stream wiring and extra fd remaps. It performs no I/O; all checks
//! that need the OS happen in [`crate::spawn`].

mod environment;

use std::ffi::{OsStr, OsString};
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use bitflags::bitflags;

use crate::errors::{Result, SpawnError};
use crate::types::{Stdio, StreamKind};

pub use environment::Environment;

bitflags! {
    /// Options that change how a child is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SpawnFlags: u32 {
        /// Skip marking every unrequested fd close-on-exec in the child.
        const LEAVE_DESCRIPTORS_OPEN = 1 << 0;
        /// The caller will reap the child. Without this flag the child is
        /// started through a short-lived intermediate process so it never
        /// becomes a zombie, and the returned handle is detached.
        const DO_NOT_REAP_CHILD = 1 << 1;
        /// Look the program up in `PATH` if it contains no `/`.
        const SEARCH_PATH = 1 << 2;
        /// Like `SEARCH_PATH`, but use the `PATH` of the child's environment.
        const SEARCH_PATH_FROM_ENVP = 1 << 3;
        /// Use `posix_spawn` when nothing in the request rules it out.
        const PREFER_FAST_PATH = 1 << 4;
    }
}

/// One `(source → target)` assignment for the child's fd table.
///
/// `source` is an fd open in the parent at spawn time. It is duplicated, never
/// moved, so one source may feed several targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdRemap {
    pub source: RawFd,
    pub target: RawFd,
}

#[derive(Debug, Clone)]
pub struct SpawnRequest {
    program: Option<PathBuf>,
    argv: Vec<OsString>,
    working_directory: Option<PathBuf>,
    environment: Environment,
    flags: SpawnFlags,
    stdio: [Stdio; 3],
    remaps: Vec<FdRemap>,
}

impl SpawnRequest {
    /// Build a request whose program is `argv[0]`.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: None,
            argv: argv.into_iter().map(Into::into).collect(),
            working_directory: None,
            environment: Environment::inherit(),
            flags: SpawnFlags::empty(),
            stdio: [Stdio::Inherit; 3],
            remaps: Vec::new(),
        }
    }

    /// Execute `path` while passing `argv[0]` through unchanged.
    pub fn program(mut self, path: impl Into<PathBuf>) -> Self {
        self.program = Some(path.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the whole argument vector, `argv[0]` included.
    pub fn with_argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.argv = argv.into_iter().map(Into::into).collect();
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.environment.set(key, value);
        self
    }

    pub fn env_remove(mut self, key: impl Into<OsString>) -> Self {
        self.environment.remove(key);
        self
    }

    pub fn env_clear(mut self) -> Self {
        self.environment.clear();
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn flags(mut self, flags: SpawnFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn insert_flags(mut self, flags: SpawnFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    pub fn stdin(self, stdio: Stdio) -> Self {
        self.stdio_for(StreamKind::Stdin, stdio)
    }

    pub fn stdout(self, stdio: Stdio) -> Self {
        self.stdio_for(StreamKind::Stdout, stdio)
    }

    pub fn stderr(self, stdio: Stdio) -> Self {
        self.stdio_for(StreamKind::Stderr, stdio)
    }

    pub fn stdio_for(mut self, stream: StreamKind, stdio: Stdio) -> Self {
        self.stdio[stream.fd() as usize] = stdio;
        self
    }

    /// Make the parent's `source` fd appear as `target` in the child.
    pub fn remap_fd(mut self, source: RawFd, target: RawFd) -> Self {
        self.remaps.push(FdRemap { source, target });
        self
    }

    /// The path that will be executed.
    pub fn program_path(&self) -> &Path {
        match &self.program {
            Some(p) => p.as_path(),
            None => self
                .argv
                .first()
                .map(|a| Path::new(a.as_os_str()))
                .unwrap_or_else(|| Path::new("")),
        }
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn env_policy(&self) -> &Environment {
        &self.environment
    }

    pub fn spawn_flags(&self) -> SpawnFlags {
        self.flags
    }

    pub fn stdio(&self, stream: StreamKind) -> Stdio {
        self.stdio[stream.fd() as usize].normalized()
    }

    pub fn remaps(&self) -> &[FdRemap] {
        &self.remaps
    }

    /// Checks that need no OS access.
    pub fn validate(&self) -> Result<()> {
        if self.argv.is_empty() {
            return Err(SpawnError::invalid("argv must not be empty"));
        }
        if self.program_path().as_os_str().is_empty() {
            return Err(SpawnError::invalid("program path must not be empty"));
        }
        if contains_nul(self.program_path().as_os_str())
            || self.argv.iter().any(|a| contains_nul(a))
        {
            return Err(SpawnError::invalid(
                "program and arguments must not contain NUL bytes",
            ));
        }
        Ok(())
    }
}

fn contains_nul(s: &OsStr) -> bool {
    use std::os::unix::ffi::OsStrExt;
    s.as_bytes().contains(&0)
}
