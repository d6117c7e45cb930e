// src/fdmap/mod.rs

//! FD remap table.
//!
//! Turns the standard-stream requests and the caller's `(source, target)`
//! pairs into an ordered list of actions the child applies before `exec`.
//!
//! - [`RemapTable`] is the validated, ordered list of requested entries. The
//!   stdio shortcuts come first (targets 0, 1, 2), followed by the explicit
//!   remaps in caller order. Two entries may never share a target.
//! - [`plan`] stages colliding sources in the parent so the child never reads
//!   from an fd it has already overwritten.
//! - [`sweep`] marks every unrequested fd close-on-exec in the child.

pub mod plan;
pub mod sweep;

use std::collections::BTreeSet;
use std::os::fd::RawFd;

use crate::errors::{Result, SpawnError};
use crate::request::FdRemap;
use crate::sys;

pub use plan::{FdAction, RemapPlan};
pub use sweep::SweepPlan;

/// One requested entry of the remap table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapEntry {
    /// Duplicate the parent's `source` onto `target`.
    Dup { source: RawFd, target: RawFd },
    /// Close `target` in the child.
    Close { target: RawFd },
}

impl RemapEntry {
    pub fn target(&self) -> RawFd {
        match *self {
            RemapEntry::Dup { target, .. } | RemapEntry::Close { target } => target,
        }
    }

    pub fn source(&self) -> Option<RawFd> {
        match *self {
            RemapEntry::Dup { source, .. } => Some(source),
            RemapEntry::Close { .. } => None,
        }
    }
}

impl From<FdRemap> for RemapEntry {
    fn from(r: FdRemap) -> Self {
        RemapEntry::Dup {
            source: r.source,
            target: r.target,
        }
    }
}

/// Descriptors the generic path may open above the floor: both ends of the
/// error-report pipe, and of the pid pipe when the child is detached.
const ENGINE_FDS: RawFd = 4;

/// Validated list of remap entries in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapTable {
    entries: Vec<RemapEntry>,
}

impl RemapTable {
    /// Build the table from the expanded stdio entries and the explicit remaps.
    ///
    /// Rejected before anything is attempted:
    /// - negative fds;
    /// - two entries with the same target, including an explicit remap onto a
    ///   standard stream that already has a non-inherit request;
    /// - targets at or above `RLIMIT_NOFILE`, or so close to it that the
    ///   staged sources and the engine's own pipes no longer fit above the floor.
    ///   Both spawn paths see the same [`SpawnError::TargetOutOfRange`].
    pub fn build(stdio: &[RemapEntry], explicit: &[FdRemap]) -> Result<Self> {
        Self::build_with_limit(stdio, explicit, sys::fd_limit())
    }

    fn build_with_limit(stdio: &[RemapEntry], explicit: &[FdRemap], limit: RawFd) -> Result<Self> {
        let mut entries = Vec::with_capacity(stdio.len() + explicit.len());
        let mut seen = BTreeSet::new();

        let all = stdio
            .iter()
            .copied()
            .chain(explicit.iter().copied().map(RemapEntry::from));

        for entry in all {
            if let Some(source) = entry.source() {
                if source < 0 {
                    return Err(SpawnError::invalid(format!(
                        "source fd {source} is negative"
                    )));
                }
            }
            let target = entry.target();
            if target < 0 {
                return Err(SpawnError::invalid(format!(
                    "target fd {target} is negative"
                )));
            }
            if target >= limit {
                return Err(SpawnError::TargetOutOfRange { target, limit });
            }
            if !seen.insert(target) {
                return Err(SpawnError::invalid(format!(
                    "fd {target} is assigned more than once"
                )));
            }
            entries.push(entry);
        }

        let table = Self { entries };
        let floor = table.reserved_fd_floor();
        let needed = ENGINE_FDS.saturating_add(table.colliding_sources().len() as RawFd);
        if limit.saturating_sub(floor) < needed {
            return Err(SpawnError::TargetOutOfRange {
                target: floor - 1,
                limit,
            });
        }
        Ok(table)
    }

    pub fn entries(&self) -> &[RemapEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All targets, ascending.
    pub fn targets(&self) -> Vec<RawFd> {
        let mut targets: Vec<RawFd> = self.entries.iter().map(RemapEntry::target).collect();
        targets.sort_unstable();
        targets
    }

    /// Sources that are also a target of some entry (themselves included).
    ///
    /// These must be moved out of the way before the child starts
    /// overwriting targets.
    pub fn colliding_sources(&self) -> BTreeSet<RawFd> {
        let targets: BTreeSet<RawFd> = self.entries.iter().map(RemapEntry::target).collect();
        self.entries
            .iter()
            .filter_map(RemapEntry::source)
            .filter(|s| targets.contains(s))
            .collect()
    }

    /// Lowest fd number the engine may use for its own descriptors.
    pub fn reserved_fd_floor(&self) -> RawFd {
        reserved_fd_floor(self.entries.iter().map(RemapEntry::target))
    }
}

/// First fd number above every target and above the standard streams.
///
/// Any descriptor the engine keeps open across `fork` (the error-report pipe,
/// staged sources) is placed at or above this number, so no remap target can
/// ever overwrite it.
pub fn reserved_fd_floor<I>(targets: I) -> RawFd
where
    I: IntoIterator<Item = RawFd>,
{
    targets.into_iter().fold(2, RawFd::max).saturating_add(1)
}
