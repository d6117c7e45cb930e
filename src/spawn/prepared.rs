// src/spawn/prepared.rs

//! Everything the child needs, allocated before `fork`.

use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::ptr;

use nix::errno::Errno;

use crate::errors::{Result, SpawnError};
use crate::request::{SpawnFlags, SpawnRequest};

const DEFAULT_PATH: &str = "/bin:/usr/bin";
const SHELL: &str = "/bin/sh";

/// A NUL-terminated array of C strings, as `execve` and `posix_spawn` take it.
///
/// The pointer array borrows from `strings`, which is never mutated after
/// construction.
pub(crate) struct CStringArray {
    strings: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl CStringArray {
    fn new(strings: Vec<CString>) -> Self {
        let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(ptr::null());
        Self { strings, ptrs }
    }

    pub fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

impl std::fmt::Debug for CStringArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.strings).finish()
    }
}

/// One path to try with `execve`, plus the `/bin/sh` argv used if the file
/// turns out not to be a binary (`ENOEXEC`).
#[derive(Debug)]
pub(crate) struct Candidate {
    pub path: CString,
    pub shell_argv: CStringArray,
}

#[derive(Debug)]
pub(crate) struct PreparedExec {
    pub program: String,
    pub argv: CStringArray,
    pub envp: CStringArray,
    pub candidates: Vec<Candidate>,
    pub shell: CString,
    pub working_directory: Option<CString>,
}

impl PreparedExec {
    pub fn new(request: &SpawnRequest) -> Result<Self> {
        let program = request.program_path();
        let argv: Vec<CString> = request
            .argv()
            .iter()
            .map(|a| to_cstring(a))
            .collect::<Result<_>>()?;

        let env = request.env_policy();
        let envp: Vec<CString> = env
            .resolve()
            .into_iter()
            .map(|(k, v)| {
                let mut pair = k.into_vec();
                pair.push(b'=');
                pair.extend(v.into_vec());
                CString::new(pair)
                    .map_err(|_| SpawnError::invalid("environment must not contain NUL bytes"))
            })
            .collect::<Result<_>>()?;

        let flags = request.spawn_flags();
        let path_var = if flags.contains(SpawnFlags::SEARCH_PATH_FROM_ENVP) {
            Some(env.get(OsStr::new("PATH")))
        } else if flags.contains(SpawnFlags::SEARCH_PATH) {
            Some(std::env::var_os("PATH"))
        } else {
            None
        };

        let paths = match path_var {
            Some(path) => candidate_paths(program, path.as_deref()),
            None => vec![program.to_path_buf()],
        };

        let candidates = paths
            .into_iter()
            .map(|path| {
                let path = to_cstring(path.as_os_str())?;
                let mut shell_argv = Vec::with_capacity(argv.len() + 1);
                shell_argv.push(CString::new(SHELL).map_err(|_| SpawnError::invalid(SHELL))?);
                shell_argv.push(path.clone());
                shell_argv.extend(argv.iter().skip(1).cloned());
                Ok(Candidate {
                    path,
                    shell_argv: CStringArray::new(shell_argv),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let working_directory = request
            .working_dir()
            .map(|d| to_cstring(d.as_os_str()))
            .transpose()?;

        Ok(Self {
            program: program.to_string_lossy().into_owned(),
            argv: CStringArray::new(argv),
            envp: CStringArray::new(envp),
            candidates,
            shell: CString::new(SHELL).map_err(|_| SpawnError::invalid(SHELL))?,
            working_directory,
        })
    }

    /// Every path that will be tried, in order.
    pub fn candidate_names(&self) -> impl Iterator<Item = &CString> {
        self.candidates.iter().map(|c| &c.path)
    }

    /// Try each candidate in order until one runs.
    ///
    /// `attempt(path, argv)` starts the program and returns its error on
    /// failure. Lookup failures (`ENOENT`, `ENOTDIR`, `EACCES`) move on to the
    /// next candidate. A file that is not a binary (`ENOEXEC`) is retried once
    /// as a `/bin/sh` script. If every candidate failed and any of them was
    /// `EACCES`, that is the error returned, since it is the more useful one.
    ///
    /// Makes no allocation, so the child may call it after `fork`.
    pub fn try_candidates<T, F>(&self, mut attempt: F) -> std::result::Result<T, Errno>
    where
        F: FnMut(*const libc::c_char, *const *const libc::c_char) -> std::result::Result<T, Errno>,
    {
        let mut saw_eacces = false;
        let mut last = Errno::ENOENT;

        for candidate in &self.candidates {
            let err = match attempt(candidate.path.as_ptr(), self.argv.as_ptr()) {
                Ok(done) => return Ok(done),
                Err(Errno::ENOEXEC) => {
                    match attempt(self.shell.as_ptr(), candidate.shell_argv.as_ptr()) {
                        Ok(done) => return Ok(done),
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            match err {
                Errno::EACCES => {
                    saw_eacces = true;
                    last = err;
                }
                Errno::ENOENT | Errno::ENOTDIR => last = err,
                other => return Err(other),
            }
        }

        Err(if saw_eacces { Errno::EACCES } else { last })
    }
}

/// Expand `program` against a `PATH` value.
///
/// A program containing `/` is used as given. An empty `PATH` element means
/// the current directory, and an unset `PATH` means `/bin:/usr/bin`.
pub fn candidate_paths(program: &Path, path_var: Option<&OsStr>) -> Vec<PathBuf> {
    if program.as_os_str().as_bytes().contains(&b'/') {
        return vec![program.to_path_buf()];
    }

    let path_var = path_var.unwrap_or_else(|| OsStr::new(DEFAULT_PATH));
    path_var
        .as_bytes()
        .split(|&b| b == b':')
        .map(|dir| {
            let dir = if dir.is_empty() { b"." as &[u8] } else { dir };
            Path::new(OsStr::from_bytes(dir)).join(program)
        })
        .collect()
}

fn to_cstring(s: &OsStr) -> Result<CString> {
    CString::new(OsString::from(s).into_vec())
        .map_err(|_| SpawnError::invalid("program and arguments must not contain NUL bytes"))
}
