// src/fdmap/sweep.rs

//! Close-on-exec sweep of every descriptor the child was not asked to keep.

use std::os::fd::RawFd;

use crate::sys;

/// Bounds for the child-side sweep, computed before `fork`.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    /// Targets, ascending. These survive `exec`.
    keep: Vec<RawFd>,
    /// Exclusive upper bound for the `fcntl` fallback.
    open_max: RawFd,
}

impl SweepPlan {
    pub fn new(targets: &[RawFd]) -> Self {
        let mut keep = targets.to_vec();
        keep.sort_unstable();
        keep.dedup();
        Self {
            keep,
            open_max: sys::open_max(),
        }
    }

    pub fn keeps(&self, fd: RawFd) -> bool {
        fd <= 2 || self.keep.binary_search(&fd).is_ok()
    }

    /// Mark every fd `>= 3` that is not a target close-on-exec.
    ///
    /// # Safety
    ///
    /// Runs in the forked child. Makes no allocation and takes no locks. Errors
    /// are ignored: an fd that cannot be marked is left as it is.
    pub(crate) unsafe fn apply(&self) {
        #[cfg(target_os = "linux")]
        {
            if unsafe { self.apply_close_range() } {
                return;
            }
        }
        unsafe { self.apply_fcntl() }
    }

    #[cfg(target_os = "linux")]
    unsafe fn apply_close_range(&self) -> bool {
        const CLOSE_RANGE_CLOEXEC: libc::c_uint = 1 << 2;

        let mut first: RawFd = 3;
        for &target in self.keep.iter().filter(|&&t| t >= 3) {
            if target > first && !close_range_cloexec(first, target - 1, CLOSE_RANGE_CLOEXEC) {
                return false;
            }
            match target.checked_add(1) {
                Some(next) => first = next,
                None => return true,
            }
        }
        close_range_cloexec(first, RawFd::MAX, CLOSE_RANGE_CLOEXEC)
    }

    unsafe fn apply_fcntl(&self) {
        for fd in 3..self.open_max {
            if self.keeps(fd) {
                continue;
            }
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            if flags != -1 && flags & libc::FD_CLOEXEC == 0 {
                unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn close_range_cloexec(first: RawFd, last: RawFd, flags: libc::c_uint) -> bool {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_close_range,
            first as libc::c_uint,
            last as libc::c_uint,
            flags,
        )
    };
    ret == 0
}
