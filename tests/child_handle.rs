// tests/child_handle.rs

mod common;
use crate::common::{TestResult, echo};
use childspawn_test_utils::{fixtures, init_tracing, with_timeout};

use childspawn::{
    ExitStatusError, SpawnError, SpawnErrorKind, SpawnPath, Stdio, TryReap, spawn,
};
use nix::sys::signal::Signal;

#[test]
fn killed_child_reports_the_signal() -> TestResult {
    init_tracing();
    let mut child = spawn(&echo().arg("--wait-stdin").stdin(Stdio::Pipe).build())?;
    // Held open so the child blocks until killed.
    let _stdin = child.take_stdin().expect("stdin was piped");

    child.kill(Signal::SIGKILL)?;
    let report = child.reap()?;

    assert!(!report.success());
    assert_eq!(report.signal(), Some(9));
    assert_eq!(report.code(), None);
    assert_eq!(report.check(), Err(ExitStatusError::Signaled(9)));
    assert_eq!(report.as_shell_code(), 137);
    Ok(())
}

#[tokio::test]
async fn detached_child_cannot_be_waited_on() -> TestResult {
    init_tracing();
    let mut child = spawn(&echo().detached().arg("from grandchild").build())?;

    assert!(child.is_detached());
    assert_eq!(child.spawn_path(), SpawnPath::Generic);

    // Its pipes work like any other child's.
    let stdout = child.take_stdout().expect("stdout was piped");
    assert_eq!(fixtures::read_all(stdout), b"from grandchild");

    let err = child.exited().await.expect_err("detached");
    assert!(matches!(err, SpawnError::Detached(pid) if pid == child.pid()));

    let err = child.reap().expect_err("detached");
    assert_eq!(err.kind(), SpawnErrorKind::InvalidRequest);
    Ok(())
}

#[tokio::test]
async fn exited_does_not_reap() -> TestResult {
    init_tracing();
    let child = spawn(&echo().args(&["--exit=6"]).stdout(Stdio::Null).build())?;

    let first = with_timeout(child.exited()).await?;
    let second = with_timeout(child.exited()).await?;
    assert_eq!(first, second);
    assert_eq!(first.code(), Some(6));

    assert_eq!(child.reap()?, first);
    Ok(())
}

#[tokio::test]
async fn exited_future_can_be_moved_into_a_task() -> TestResult {
    init_tracing();
    let child = spawn(&echo().arg("--exit=2").stdout(Stdio::Null).build())?;

    let task = tokio::spawn(child.exited());
    let report = with_timeout(task).await??;

    assert_eq!(report.code(), Some(2));
    assert_eq!(child.reap()?.code(), Some(2));
    Ok(())
}

#[tokio::test]
async fn try_reap_hands_back_a_running_child() -> TestResult {
    init_tracing();
    let mut child = spawn(
        &echo()
            .args(&["--wait-stdin", "eof"])
            .stdin(Stdio::Pipe)
            .build(),
    )?;
    let stdin = child.take_stdin().expect("stdin was piped");
    let stdout = child.take_stdout().expect("stdout was piped");

    let child = match child.try_reap()? {
        TryReap::Running(child) => child,
        TryReap::Exited(report) => panic!("child exited early: {report:?}"),
    };

    drop(stdin);
    let report = with_timeout(child.wait()).await?;

    assert!(report.success());
    assert_eq!(fixtures::read_all(stdout), b"eof");
    Ok(())
}

#[test]
fn kill_and_reap_leaves_no_zombie() -> TestResult {
    init_tracing();
    let mut child = spawn(&echo().arg("--wait-stdin").stdin(Stdio::Pipe).build())?;
    let _stdin = child.take_stdin().expect("stdin was piped");
    let pid = child.pid();

    let report = child.kill_and_reap()?;
    assert_eq!(report.signal(), Some(9));

    let again = nix::sys::wait::waitpid(pid, Some(nix::sys::wait::WaitPidFlag::WNOHANG));
    assert_eq!(again, Err(nix::errno::Errno::ECHILD));
    Ok(())
}
