// src/sys.rs

//! Thin wrappers over the raw libc calls used on both sides of `fork`.
//!
//! Everything here returns `nix::errno::Errno` rather than `io::Error` so the
//! child can use the same helpers without allocating.

use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;

/// Convert a `-1`-on-error libc return value into a `Result`.
pub(crate) fn cvt(ret: libc::c_int) -> Result<libc::c_int, Errno> {
    if ret == -1 { Err(Errno::last()) } else { Ok(ret) }
}

/// Like [`cvt`], retrying while the call is interrupted by a signal.
pub(crate) fn cvt_r<F>(mut f: F) -> Result<libc::c_int, Errno>
where
    F: FnMut() -> libc::c_int,
{
    loop {
        match cvt(f()) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

/// Create a pipe with both ends close-on-exec.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub(crate) fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd), Errno> {
    let mut fds: [RawFd; 2] = [-1; 2];
    cvt(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    // SAFETY: pipe2 succeeded, so both fds are fresh and owned by us.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Create a pipe with both ends close-on-exec.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub(crate) fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd), Errno> {
    let mut fds: [RawFd; 2] = [-1; 2];
    cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    // SAFETY: pipe succeeded, so both fds are fresh and owned by us.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    set_cloexec(fds[0])?;
    set_cloexec(fds[1])?;
    Ok((read, write))
}

/// Duplicate `fd` to the lowest free descriptor `>= floor`, close-on-exec.
///
/// The kernel performs the upward scan atomically, so concurrent spawns on
/// other threads can never be handed the same number.
pub(crate) fn dup_cloexec_above(fd: RawFd, floor: RawFd) -> Result<OwnedFd, Errno> {
    let new = cvt(unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, floor) })?;
    // SAFETY: F_DUPFD_CLOEXEC returned a fresh descriptor we now own.
    Ok(unsafe { OwnedFd::from_raw_fd(new) })
}

#[cfg_attr(
    any(target_os = "linux", target_os = "android", target_os = "freebsd"),
    allow(dead_code)
)]
pub(crate) fn set_cloexec(fd: RawFd) -> Result<(), Errno> {
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    if flags & libc::FD_CLOEXEC == 0 {
        cvt(unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) })?;
    }
    Ok(())
}

pub(crate) fn set_nonblocking(fd: RawFd) -> Result<(), Errno> {
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    if flags & libc::O_NONBLOCK == 0 {
        cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    }
    Ok(())
}

/// Whether `fd` refers to an open descriptor in this process.
pub(crate) fn is_open(fd: RawFd) -> bool {
    unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
}

/// Upper bound for the fallback descriptor sweep.
pub(crate) fn open_max() -> RawFd {
    const FALLBACK: RawFd = 1024;
    const CAP: RawFd = 1 << 16;

    let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if max <= 0 {
        FALLBACK
    } else {
        (max as RawFd).min(CAP)
    }
}

/// Soft `RLIMIT_NOFILE`: every descriptor this process can use is below it.
pub(crate) fn fd_limit() -> RawFd {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } == -1 {
        return open_max();
    }
    if limit.rlim_cur == libc::RLIM_INFINITY || limit.rlim_cur > RawFd::MAX as libc::rlim_t {
        RawFd::MAX
    } else {
        limit.rlim_cur as RawFd
    }
}

/// Read into `buf` until it is full or the writer closes, retrying `EINTR`.
///
/// Returns the number of bytes read.
pub(crate) fn read_full(fd: RawFd, buf: &mut [u8]) -> Result<usize, Errno> {
    let mut filled = 0;
    while filled < buf.len() {
        let rest = &mut buf[filled..];
        let n = unsafe { libc::read(fd, rest.as_mut_ptr().cast(), rest.len()) };
        match n {
            -1 if Errno::last() == Errno::EINTR => continue,
            -1 => return Err(Errno::last()),
            0 => break,
            n => filled += n as usize,
        }
    }
    Ok(filled)
}

/// Write all of `buf`, retrying `EINTR`. Async-signal-safe.
pub(crate) fn write_all(fd: RawFd, buf: &[u8]) -> Result<(), Errno> {
    let mut written = 0;
    while written < buf.len() {
        let rest = &buf[written..];
        let n = unsafe { libc::write(fd, rest.as_ptr().cast(), rest.len()) };
        match n {
            -1 if Errno::last() == Errno::EINTR => continue,
            -1 => return Err(Errno::last()),
            n => written += n as usize,
        }
    }
    Ok(())
}
