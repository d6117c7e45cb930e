// src/notify/mod.rs

//! Completion notifier.
//!
//! Child exit and stream readability are observed inside a tokio runtime and
//! delivered as [`CompletionEvent`]s over one mpsc channel, the same way
//! watchers and executors feed a single runtime loop:
//!
//! - [`child_watch`] waits for a child to terminate (without reaping it) and
//!   emits `ChildExited`.
//! - [`stream_watch`] reads a pipe end through `AsyncFd` and emits
//!   `StreamData` chunks followed by `StreamClosed`.
//! - [`Completion`] folds those events into "everything is done", without
//!   assuming any order between exit and EOF.
//! - [`sync`] builds spawn-and-capture on top of all of the above.

pub mod child_watch;
pub mod stream_watch;
pub mod sync;

use std::collections::BTreeMap;
use std::os::fd::OwnedFd;

use nix::unistd::Pid;
use tokio::sync::mpsc;
use tracing::trace;

use crate::errors::{Result, SpawnError};
use crate::handle::{ChildHandle, ExitReport};
use crate::types::StreamKind;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events produced by the watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    /// The child terminated. It has not been reaped.
    ChildExited { pid: Pid, report: ExitReport },
    /// A chunk was read from one of the child's streams.
    StreamData {
        pid: Pid,
        stream: StreamKind,
        data: Vec<u8>,
    },
    /// EOF (or hang-up) on one of the child's streams.
    StreamClosed { pid: Pid, stream: StreamKind },
    /// A watcher could not continue.
    WatchFailed { pid: Pid, error: String },
}

impl CompletionEvent {
    pub fn pid(&self) -> Pid {
        match self {
            CompletionEvent::ChildExited { pid, .. }
            | CompletionEvent::StreamData { pid, .. }
            | CompletionEvent::StreamClosed { pid, .. }
            | CompletionEvent::WatchFailed { pid, .. } => *pid,
        }
    }
}

/// Owns the event channel and starts watchers that feed it.
///
/// Watchers run as tasks on the current tokio runtime; the `watch_*` methods
/// fail if there is none.
#[derive(Debug)]
pub struct CompletionNotifier {
    tx: mpsc::Sender<CompletionEvent>,
    rx: mpsc::Receiver<CompletionEvent>,
}

impl Default for CompletionNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionNotifier {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx, rx }
    }

    /// Emit `ChildExited` once `handle`'s child terminates.
    pub fn watch_child(&self, handle: &ChildHandle) -> Result<()> {
        child_watch::spawn(handle, self.tx.clone())
    }

    /// Read `fd` until EOF, emitting its data and then `StreamClosed`.
    pub fn watch_stream(&self, pid: Pid, stream: StreamKind, fd: OwnedFd) -> Result<()> {
        stream_watch::spawn(pid, stream, fd, self.tx.clone())
    }

    /// Another sender into the same channel.
    pub fn sender(&self) -> mpsc::Sender<CompletionEvent> {
        self.tx.clone()
    }

    /// Wait for the next event from any watcher.
    pub async fn next_event(&mut self) -> Option<CompletionEvent> {
        let event = self.rx.recv().await;
        if let Some(event) = &event {
            trace!(?event, "completion event");
        }
        event
    }
}

#[derive(Debug, Default)]
struct StreamState {
    done: bool,
    data: Vec<u8>,
}

/// Tracks one child's exit and the streams being drained for it.
///
/// Exit and EOF are independent: a child may exit with data still buffered
/// in a pipe, or close a pipe long before exiting.
#[derive(Debug)]
pub struct Completion {
    pid: Pid,
    exit: Option<ExitReport>,
    streams: BTreeMap<StreamKind, StreamState>,
}

impl Completion {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            exit: None,
            streams: BTreeMap::new(),
        }
    }

    /// Require EOF on `stream` before the child counts as complete.
    pub fn expect_stream(&mut self, stream: StreamKind) {
        self.streams.entry(stream).or_default();
    }

    /// Fold in one event. Returns `true` once the child has exited and every
    /// expected stream has closed. Events for other pids are ignored.
    pub fn apply(&mut self, event: CompletionEvent) -> Result<bool> {
        if event.pid() != self.pid {
            return Ok(self.is_complete());
        }

        match event {
            CompletionEvent::ChildExited { report, .. } => self.exit = Some(report),
            CompletionEvent::StreamData { stream, data, .. } => {
                self.streams.entry(stream).or_default().data.extend(data);
            }
            CompletionEvent::StreamClosed { stream, .. } => {
                self.streams.entry(stream).or_default().done = true;
            }
            CompletionEvent::WatchFailed { error, .. } => {
                return Err(SpawnError::Io(std::io::Error::other(error)));
            }
        }

        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.exit.is_some() && self.streams.values().all(|s| s.done)
    }

    pub fn child_exited(&self) -> bool {
        self.exit.is_some()
    }

    pub fn stream_done(&self, stream: StreamKind) -> bool {
        self.streams.get(&stream).is_some_and(|s| s.done)
    }

    pub fn report(&self) -> Option<ExitReport> {
        self.exit
    }

    pub fn output(&self, stream: StreamKind) -> Option<&[u8]> {
        self.streams.get(&stream).map(|s| s.data.as_slice())
    }

    pub fn take_output(&mut self, stream: StreamKind) -> Option<Vec<u8>> {
        self.streams.get_mut(&stream).map(|s| std::mem::take(&mut s.data))
    }
}
