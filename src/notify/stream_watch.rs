// src/notify/stream_watch.rs

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd};

use nix::unistd::Pid;
use tokio::io::unix::AsyncFd;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::errors::{Result, SpawnError};
use crate::sys;
use crate::types::StreamKind;

use super::CompletionEvent;

const READ_CHUNK: usize = 8192;

pub(crate) fn spawn(
    pid: Pid,
    stream: StreamKind,
    fd: OwnedFd,
    tx: mpsc::Sender<CompletionEvent>,
) -> Result<()> {
    sys::set_nonblocking(fd.as_raw_fd()).map_err(|e| SpawnError::Io(io::Error::from(e)))?;
    let runtime = Handle::try_current()
        .map_err(|e| SpawnError::Io(io::Error::other(e.to_string())))?;

    runtime.spawn(async move {
        let event = match drain(pid, stream, File::from(fd), &tx).await {
            Ok(()) => CompletionEvent::StreamClosed { pid, stream },
            Err(err) => CompletionEvent::WatchFailed {
                pid,
                error: format!("reading child {stream}: {err}"),
            },
        };
        if tx.send(event).await.is_err() {
            debug!(pid = %pid, %stream, "completion receiver dropped");
        }
    });

    Ok(())
}

/// Forward everything readable from `file` until EOF.
async fn drain(
    pid: Pid,
    stream: StreamKind,
    file: File,
    tx: &mpsc::Sender<CompletionEvent>,
) -> io::Result<()> {
    let async_fd = AsyncFd::new(file)?;
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let mut guard = async_fd.readable().await?;
        let read = guard.try_io(|inner| {
            let mut f: &File = inner.get_ref();
            f.read(&mut buf)
        });

        match read {
            Ok(Ok(0)) => {
                trace!(pid = %pid, %stream, "stream closed");
                return Ok(());
            }
            Ok(Ok(n)) => {
                let event = CompletionEvent::StreamData {
                    pid,
                    stream,
                    data: buf[..n].to_vec(),
                };
                if tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => return Err(e),
            // Spurious wakeup; readiness was cleared, wait again.
            Err(_would_block) => continue,
        }
    }
}
