//! Shared helpers for the `childspawn` integration tests.
//!
//! - [`builders`]: requests that run the `childspawn-echo` helper.
//! - [`fixtures`]: pipes, duplicated fds and scripts on disk.

pub mod builders;
pub mod fixtures;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// How long a test may wait on a real child before it is considered hung.
pub const CHILD_TIMEOUT: Duration = Duration::from_secs(10);

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured per test and only shown for failures (or with
/// `--nocapture`). The filter comes from `RUST_LOG`, e.g.
/// `RUST_LOG=childspawn::spawn=trace cargo test`, and defaults to `info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // Another harness may have installed one already; keep theirs.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than [`CHILD_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(CHILD_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("timed out after {CHILD_TIMEOUT:?} waiting on a child process"),
    }
}
