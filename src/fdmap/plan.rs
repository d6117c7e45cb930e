// src/fdmap/plan.rs

//! Staging of the remap table into child-side actions.

use std::collections::BTreeMap;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use tracing::debug;

use crate::errors::{Result, SpawnError};
use crate::sys;

use super::{RemapEntry, RemapTable};

/// A single step the child performs, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdAction {
    /// `dup2(from, to)`. `from` is never equal to any target.
    Dup { from: RawFd, to: RawFd },
    /// `close(fd)`.
    Close { fd: RawFd },
}

/// The child-side remap sequence plus the parent-side fds it relies on.
///
/// Any source that is also a target is duplicated here, in the parent, to a
/// close-on-exec fd above the reserved floor. The child then only ever reads
/// from fds no action writes to, so the order of `dup2` calls cannot corrupt
/// anything. The staged fds must stay open until the child has been created.
#[derive(Debug)]
pub struct RemapPlan {
    actions: Vec<FdAction>,
    targets: Vec<RawFd>,
    floor: RawFd,
    staged: Vec<OwnedFd>,
}

impl RemapPlan {
    pub fn stage(table: &RemapTable) -> Result<Self> {
        let floor = table.reserved_fd_floor();

        for source in table.entries().iter().filter_map(RemapEntry::source) {
            if !sys::is_open(source) {
                return Err(SpawnError::invalid(format!(
                    "source fd {source} is not open in the parent"
                )));
            }
        }

        let mut staged = Vec::new();
        let mut moved: BTreeMap<RawFd, RawFd> = BTreeMap::new();
        for source in table.colliding_sources() {
            let copy = sys::dup_cloexec_above(source, floor).map_err(SpawnError::Pipe)?;
            debug!(source, staged = copy.as_raw_fd(), "staged colliding source fd");
            moved.insert(source, copy.as_raw_fd());
            staged.push(copy);
        }

        let actions = table
            .entries()
            .iter()
            .map(|entry| match *entry {
                RemapEntry::Dup { source, target } => FdAction::Dup {
                    from: moved.get(&source).copied().unwrap_or(source),
                    to: target,
                },
                RemapEntry::Close { target } => FdAction::Close { fd: target },
            })
            .collect();

        Ok(Self {
            actions,
            targets: table.targets(),
            floor,
            staged,
        })
    }

    pub fn actions(&self) -> &[FdAction] {
        &self.actions
    }

    /// Target fds, ascending.
    pub fn targets(&self) -> &[RawFd] {
        &self.targets
    }

    /// Everything the engine keeps open across `fork` lives at or above this.
    pub fn floor(&self) -> RawFd {
        self.floor
    }

    /// Number of sources that had to be staged.
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }
}
