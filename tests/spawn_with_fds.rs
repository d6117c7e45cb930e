// tests/spawn_with_fds.rs

mod common;
use crate::common::{TestResult, echo};
use childspawn_test_utils::{fixtures, init_tracing};

use std::fs::File;
use std::io::Write;
use std::os::fd::AsRawFd;

use childspawn::{SpawnFlags, Stdio, spawn};

#[test]
fn stdout_to_caller_fd() -> TestResult {
    init_tracing();
    let (read, write) = fixtures::cloexec_pipe();

    let child = spawn(
        &echo()
            .arg("hello")
            .stdout(Stdio::Fd(write.as_raw_fd()))
            .build(),
    )?;
    drop(write);

    assert_eq!(fixtures::read_all(read), b"hello");
    assert!(child.reap()?.success());
    Ok(())
}

#[test]
fn stdin_and_stdout_from_caller_fds() -> TestResult {
    init_tracing();
    let (in_read, in_write) = fixtures::cloexec_pipe();
    let (out_read, out_write) = fixtures::cloexec_pipe();

    let child = spawn(
        &echo()
            .args(&["--wait-stdin", "after eof"])
            .stdin(Stdio::Fd(in_read.as_raw_fd()))
            .stdout(Stdio::Fd(out_write.as_raw_fd()))
            .build(),
    )?;
    drop(in_read);
    drop(out_write);

    let mut input = File::from(in_write);
    input.write_all(b"some input")?;
    drop(input);

    assert_eq!(fixtures::read_all(out_read), b"after eof");
    assert!(child.reap()?.success());
    Ok(())
}

#[test]
fn stdout_and_stderr_aliased_to_one_pipe_interleave() -> TestResult {
    init_tracing();
    let (read, write) = fixtures::cloexec_pipe();
    let fd = write.as_raw_fd();

    let child = spawn(
        &echo()
            .args(&["a", "--fd=2", "b", "--fd=1", "c", "--fd=2", "d"])
            .stdout(Stdio::Fd(fd))
            .stderr(Stdio::Fd(fd))
            .build(),
    )?;
    drop(write);

    assert_eq!(fixtures::read_all(read), b"abcd");
    assert!(child.reap()?.success());
    Ok(())
}

#[test]
fn negative_fd_means_inherit() -> TestResult {
    init_tracing();
    let (read, write) = fixtures::cloexec_pipe();

    let child = spawn(
        &echo()
            .args(&["--fd=2", "to stderr"])
            .stdout(Stdio::Fd(-1))
            .stderr(Stdio::Fd(write.as_raw_fd()))
            .build(),
    )?;
    drop(write);

    assert_eq!(fixtures::read_all(read), b"to stderr");
    assert!(child.reap()?.success());
    Ok(())
}

#[test]
fn null_stdout_swallows_output() -> TestResult {
    init_tracing();
    let (read, write) = fixtures::cloexec_pipe();

    let child = spawn(
        &echo()
            .args(&["discarded", "--fd=2", "kept"])
            .stdout(Stdio::Null)
            .stderr(Stdio::Fd(write.as_raw_fd()))
            .build(),
    )?;
    drop(write);

    assert_eq!(fixtures::read_all(read), b"kept");
    assert!(child.reap()?.success());
    Ok(())
}

#[test]
fn closed_stdin_does_not_break_spawn() -> TestResult {
    init_tracing();
    let mut child = spawn(&echo().arg("ok").stdin(Stdio::Close).build())?;
    let stdout = child.take_stdout().expect("stdout was piped");

    assert_eq!(fixtures::read_all(stdout), b"ok");
    assert!(child.reap()?.success());
    Ok(())
}

#[test]
fn extra_remap_is_visible_at_target() -> TestResult {
    init_tracing();
    let (read, write) = fixtures::cloexec_pipe();

    let child = spawn(
        &echo()
            .args(&["--fd=42", "via 42"])
            .stdout(Stdio::Null)
            .remap(write.as_raw_fd(), 42)
            .build(),
    )?;
    drop(write);

    assert_eq!(fixtures::read_all(read), b"via 42");
    assert!(child.reap()?.success());
    Ok(())
}

#[test]
fn one_source_feeds_several_targets() -> TestResult {
    init_tracing();
    let (read, write) = fixtures::cloexec_pipe();
    let fd = write.as_raw_fd();

    let child = spawn(
        &echo()
            .args(&["--fd=20", "x", "--fd=21", "y", "--fd=1", "z"])
            .stdout(Stdio::Fd(fd))
            .remap(fd, 20)
            .remap(fd, 21)
            .build(),
    )?;
    drop(write);

    assert_eq!(fixtures::read_all(read), b"xyz");
    assert!(child.reap()?.success());
    Ok(())
}

#[test]
fn unrequested_descriptors_are_closed_unless_left_open() -> TestResult {
    init_tracing();
    let file = tempfile::tempfile()?;
    // `dup` does not set close-on-exec, so only the sweep can hide this fd.
    let leaked = fixtures::dup_many(&file, 1).remove(0);
    let probe = format!("--fd-status={}", leaked.as_raw_fd());

    let mut swept = spawn(&echo().arg(&probe).build())?;
    let out = fixtures::read_all(swept.take_stdout().expect("stdout was piped"));
    assert_eq!(out, format!("{}:closed", leaked.as_raw_fd()).into_bytes());
    assert!(swept.reap()?.success());

    let mut kept = spawn(
        &echo()
            .arg(&probe)
            .flags(SpawnFlags::LEAVE_DESCRIPTORS_OPEN)
            .build(),
    )?;
    let out = fixtures::read_all(kept.take_stdout().expect("stdout was piped"));
    assert_eq!(out, format!("{}:open", leaked.as_raw_fd()).into_bytes());
    assert!(kept.reap()?.success());
    Ok(())
}

#[test]
fn stderr_to_a_socket() -> TestResult {
    use nix::sys::socket::{AddressFamily, SockFlag, SockType, socketpair};

    init_tracing();
    for fast in [false, true] {
        let (ours, theirs) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::SOCK_CLOEXEC,
        )?;
        let base = if fast { echo().fast_path() } else { echo() };

        let child = spawn(
            &base
                .args(&["--fd=2", "over a socket"])
                .stdout(Stdio::Null)
                .stderr(Stdio::Fd(theirs.as_raw_fd()))
                .build(),
        )?;
        drop(theirs);

        assert_eq!(fixtures::read_all(ours), b"over a socket", "fast path: {fast}");
        assert!(child.reap()?.success());
    }
    Ok(())
}
