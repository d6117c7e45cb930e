// src/spawn/stdio.rs

//! Expansion of the three `Stdio` requests into remap entries.

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, OwnedFd};

use tracing::trace;

use crate::errors::{Result, SpawnError};
use crate::fdmap::RemapEntry;
use crate::request::SpawnRequest;
use crate::sys;
use crate::types::{Stdio, StreamKind};

/// Parent-side state created for the standard streams of one spawn.
///
/// `child_ends` are the fds the remap entries read from. They are all
/// close-on-exec and are dropped once the child exists. `parent_ends` are
/// handed to the caller through the [`ChildHandle`](crate::handle::ChildHandle).
#[derive(Debug, Default)]
pub(crate) struct StdioSetup {
    pub entries: Vec<RemapEntry>,
    pub child_ends: Vec<OwnedFd>,
    pub parent_ends: [Option<OwnedFd>; 3],
}

impl StdioSetup {
    pub fn prepare(request: &SpawnRequest) -> Result<Self> {
        let mut setup = StdioSetup::default();

        for kind in StreamKind::ALL {
            let target = kind.fd();
            match request.stdio(kind) {
                Stdio::Inherit => {}
                Stdio::Close => setup.entries.push(RemapEntry::Close { target }),
                Stdio::Fd(source) => setup.entries.push(RemapEntry::Dup { source, target }),
                Stdio::Null => {
                    let null = open_dev_null(kind)?;
                    setup.entries.push(RemapEntry::Dup {
                        source: null.as_raw_fd(),
                        target,
                    });
                    setup.child_ends.push(null);
                }
                Stdio::Pipe => {
                    let (read, write) = sys::cloexec_pipe().map_err(SpawnError::Pipe)?;
                    let (child, parent) = match kind {
                        StreamKind::Stdin => (read, write),
                        StreamKind::Stdout | StreamKind::Stderr => (write, read),
                    };
                    trace!(
                        stream = %kind,
                        child_fd = child.as_raw_fd(),
                        parent_fd = parent.as_raw_fd(),
                        "created stdio pipe"
                    );
                    setup.entries.push(RemapEntry::Dup {
                        source: child.as_raw_fd(),
                        target,
                    });
                    setup.child_ends.push(child);
                    setup.parent_ends[target as usize] = Some(parent);
                }
            }
        }

        Ok(setup)
    }
}

fn open_dev_null(kind: StreamKind) -> Result<OwnedFd> {
    let file = match kind {
        StreamKind::Stdin => OpenOptions::new().read(true).open("/dev/null"),
        StreamKind::Stdout | StreamKind::Stderr => OpenOptions::new().write(true).open("/dev/null"),
    }?;
    Ok(OwnedFd::from(file))
}
