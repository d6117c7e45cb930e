// tests/fast_path.rs

#![cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]

mod common;
use crate::common::{TestResult, echo};
use childspawn_test_utils::{fixtures, init_tracing};

use std::os::fd::AsRawFd;
use std::path::Path;

use childspawn::{
    FastPathBlocker, FastPathSupport, SpawnErrorKind, SpawnFlags, SpawnPath, SpawnRequest, Stdio,
    choose_path, spawn, spawn_sync,
};

const FAST: SpawnFlags = SpawnFlags::PREFER_FAST_PATH
    .union(SpawnFlags::DO_NOT_REAP_CHILD)
    .union(SpawnFlags::LEAVE_DESCRIPTORS_OPEN);

#[test]
fn eligibility_needs_every_flag_and_no_cwd() {
    let base = SpawnRequest::new(["/bin/true"]);

    assert_eq!(FastPathSupport::check(&base.clone().flags(FAST)), Ok(()));
    assert_eq!(choose_path(&base.clone().flags(FAST)), SpawnPath::Fast);

    assert_eq!(
        FastPathSupport::check(&base.clone().flags(FAST - SpawnFlags::PREFER_FAST_PATH)),
        Err(FastPathBlocker::NotPreferred)
    );
    assert_eq!(
        FastPathSupport::check(&base.clone().flags(FAST - SpawnFlags::DO_NOT_REAP_CHILD)),
        Err(FastPathBlocker::ReapsAutomatically)
    );
    assert_eq!(
        FastPathSupport::check(&base.clone().flags(FAST - SpawnFlags::LEAVE_DESCRIPTORS_OPEN)),
        Err(FastPathBlocker::ClosesDescriptors)
    );
    assert_eq!(
        FastPathSupport::check(&base.clone().flags(FAST).working_directory("/")),
        Err(FastPathBlocker::WorkingDirectory)
    );
    assert_eq!(
        choose_path(&base.flags(FAST).working_directory("/")),
        SpawnPath::Generic
    );
}

#[test]
fn fast_child_reports_its_path() -> TestResult {
    init_tracing();
    let mut child = spawn(&echo().fast_path().arg("fast").build())?;

    assert_eq!(child.spawn_path(), SpawnPath::Fast);
    assert!(!child.is_detached());
    let out = fixtures::read_all(child.take_stdout().expect("stdout was piped"));
    assert_eq!(out, b"fast");
    assert!(child.reap()?.success());
    Ok(())
}

#[test]
fn output_matches_generic_path() -> TestResult {
    init_tracing();
    let args = ["a", "--fd=2", "b", "--fd=1", "c", "--exit=5"];

    let generic = spawn_sync(&echo().args(&args).stderr(Stdio::Pipe).build())?;
    let fast = spawn_sync(&echo().fast_path().args(&args).stderr(Stdio::Pipe).build())?;

    assert_eq!(generic.stdout, fast.stdout);
    assert_eq!(generic.stderr, fast.stderr);
    assert_eq!(generic.report, fast.report);
    assert_eq!(fast.report.code(), Some(5));
    Ok(())
}

#[test]
fn remaps_behave_like_generic_path() -> TestResult {
    init_tracing();
    let (read, write) = fixtures::cloexec_pipe();

    let child = spawn(
        &echo()
            .fast_path()
            .args(&["--fd=42", "via 42"])
            .stdout(Stdio::Null)
            .remap(write.as_raw_fd(), 42)
            .build(),
    )?;
    drop(write);

    assert_eq!(child.spawn_path(), SpawnPath::Fast);
    assert_eq!(fixtures::read_all(read), b"via 42");
    assert!(child.reap()?.success());
    Ok(())
}

fn error_kinds_for(program: &Path) -> (SpawnErrorKind, SpawnErrorKind) {
    let generic = spawn(&SpawnRequest::new([program]).flags(SpawnFlags::DO_NOT_REAP_CHILD))
        .expect_err("generic spawn should fail")
        .kind();
    let fast = spawn(&SpawnRequest::new([program]).flags(FAST))
        .expect_err("fast spawn should fail")
        .kind();
    (generic, fast)
}

#[test]
fn missing_program_fails_the_same_way() {
    init_tracing();
    let (generic, fast) = error_kinds_for(Path::new("/nonexistent/childspawn/program"));
    assert_eq!(generic, SpawnErrorKind::NoEnt);
    assert_eq!(fast, SpawnErrorKind::NoEnt);
}

#[test]
fn unexecutable_file_fails_the_same_way() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("plain-file");
    std::fs::write(&path, "not a program\n")?;

    let (generic, fast) = error_kinds_for(&path);
    assert_eq!(generic, SpawnErrorKind::Acces);
    assert_eq!(fast, SpawnErrorKind::Acces);
    Ok(())
}

#[test]
fn script_without_shebang_runs_on_fast_path() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = fixtures::write_executable(dir.path(), "fast-script", "printf '%s' \"$1\"\n");

    let request = SpawnRequest::new([script.as_os_str()])
        .arg("via-sh")
        .flags(FAST)
        .stdout(Stdio::Pipe);
    assert_eq!(choose_path(&request), SpawnPath::Fast);

    let output = spawn_sync(&request)?;
    assert_eq!(output.stdout.as_deref(), Some(&b"via-sh"[..]));
    assert!(output.report.success());
    Ok(())
}

#[test]
fn invalid_remaps_are_rejected_on_both_paths() {
    init_tracing();
    for fast in [false, true] {
        let base = if fast { echo().fast_path() } else { echo() };

        let closed_source = spawn(&base.remap(4000, 10).build())
            .expect_err("fd 4000 is not open");
        assert_eq!(closed_source.kind(), SpawnErrorKind::InvalidRequest);

        let base = if fast { echo().fast_path() } else { echo() };
        let duplicate_target = spawn(&base.remap(2, 10).remap(1, 10).build())
            .expect_err("target 10 appears twice");
        assert_eq!(duplicate_target.kind(), SpawnErrorKind::InvalidRequest);
    }
}

fn descriptor_limit() -> i32 {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) }, 0);
    limit.rlim_cur.min(i32::MAX as libc::rlim_t) as i32
}

#[test]
fn out_of_range_target_fails_the_same_way() {
    init_tracing();
    let (_read, write) = fixtures::cloexec_pipe();
    let source = write.as_raw_fd();

    for target in [descriptor_limit(), i32::MAX - 1, i32::MAX] {
        let generic = spawn(&echo().remap(source, target).build())
            .expect_err("target is past the descriptor limit");
        let fast = spawn(&echo().fast_path().remap(source, target).build())
            .expect_err("target is past the descriptor limit");

        assert_eq!(generic.kind(), SpawnErrorKind::Redirect, "generic, target {target}");
        assert_eq!(fast.kind(), SpawnErrorKind::Redirect, "fast, target {target}");
        assert_eq!(generic.errno(), fast.errno());
    }
}
