#![allow(dead_code)]

//! OS-level helpers for setting up fd tables in tests.

use std::fs::{self, File};
use std::io::Read;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::unistd::{dup, pipe};

/// A pipe with both ends close-on-exec: `(read, write)`.
pub fn cloexec_pipe() -> (OwnedFd, OwnedFd) {
    let (read, write) = pipe().expect("pipe");
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).expect("set cloexec");
    }
    (read, write)
}

/// Read `fd` until EOF.
pub fn read_all(fd: OwnedFd) -> Vec<u8> {
    let mut buf = Vec::new();
    File::from(fd).read_to_end(&mut buf).expect("read pipe");
    buf
}

/// `count` duplicates of `fd`, each at the lowest free number.
pub fn dup_many(fd: &impl AsRawFd, count: usize) -> Vec<OwnedFd> {
    (0..count)
        .map(|_| {
            let raw = dup(fd.as_raw_fd()).expect("dup");
            // SAFETY: dup returned a fresh descriptor owned by nobody else.
            unsafe { OwnedFd::from_raw_fd(raw) }
        })
        .collect()
}

/// Write an executable file at `dir/name`.
pub fn write_executable(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write script");
    let mut perms = fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Whether `fd` is open in this process.
pub fn is_open(fd: i32) -> bool {
    fcntl(fd, FcntlArg::F_GETFD).is_ok()
}
