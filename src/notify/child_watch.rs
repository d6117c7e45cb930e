// src/notify/child_watch.rs

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{Result, SpawnError};
use crate::handle::ChildHandle;

use super::CompletionEvent;

pub(crate) fn spawn(handle: &ChildHandle, tx: mpsc::Sender<CompletionEvent>) -> Result<()> {
    let pid = handle.pid();
    if handle.is_detached() {
        return Err(SpawnError::Detached(pid));
    }

    let runtime = Handle::try_current()
        .map_err(|e| SpawnError::Io(std::io::Error::other(e.to_string())))?;
    let exited = handle.exited();

    runtime.spawn(async move {
        let event = match exited.await {
            Ok(report) => CompletionEvent::ChildExited { pid, report },
            Err(err) => CompletionEvent::WatchFailed {
                pid,
                error: err.to_string(),
            },
        };
        if tx.send(event).await.is_err() {
            debug!(pid = %pid, "completion receiver dropped before child exit was delivered");
        }
    });

    Ok(())
}
