// tests/spawn_sync.rs

mod common;
use crate::common::{TestResult, echo, echo_path};
use childspawn_test_utils::{fixtures, init_tracing};

use childspawn::{
    ExitStatusError, SpawnErrorKind, SpawnFlags, SpawnRequest, Stdio, spawn, spawn_sync,
};

#[test]
fn arguments_with_special_characters_arrive_unchanged() -> TestResult {
    init_tracing();
    let args = [
        "two words",
        "\"double\"",
        "'single'",
        "$HOME",
        "back\\slash",
        "*?[glob]",
        "ünïcödé",
        "",
        "semi;colon",
    ];

    let output = spawn_sync(&echo().args(&args).build())?;

    assert_eq!(output.stdout, Some(args.concat().into_bytes()));
    assert!(output.report.success());
    Ok(())
}

#[test]
fn script_without_shebang_runs_through_sh() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = fixtures::write_executable(dir.path(), "no-shebang", "printf '%s-%s' \"$1\" \"$2\"\n");

    let request = SpawnRequest::new([script.as_os_str()])
        .args(["one", "two"])
        .flags(SpawnFlags::DO_NOT_REAP_CHILD)
        .stdout(Stdio::Pipe);
    let output = spawn_sync(&request)?;

    assert_eq!(output.stdout.as_deref(), Some(&b"one-two"[..]));
    assert!(output.report.success());
    Ok(())
}

#[test]
fn nonexistent_program_is_noent_with_no_output() -> TestResult {
    init_tracing();
    let request = SpawnRequest::new(["/nonexistent/childspawn/program"]).stdout(Stdio::Pipe);

    let err = spawn_sync(&request).expect_err("program does not exist");

    assert_eq!(err.kind(), SpawnErrorKind::NoEnt);
    assert!(err.to_string().contains("/nonexistent/childspawn/program"));
    Ok(())
}

#[test]
fn file_without_execute_permission_is_acces() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("not-executable");
    std::fs::write(&path, "echo never\n")?;

    let err = spawn(&SpawnRequest::new([path.as_os_str()]).flags(SpawnFlags::DO_NOT_REAP_CHILD))
        .expect_err("file is not executable");

    assert_eq!(err.kind(), SpawnErrorKind::Acces);
    Ok(())
}

#[test]
fn exit_code_is_reported_not_raised() -> TestResult {
    init_tracing();
    let output = spawn_sync(&echo().arg("--exit=3").build())?;

    assert!(!output.report.success());
    assert_eq!(output.report.code(), Some(3));
    assert_eq!(output.report.signal(), None);
    assert_eq!(output.report.check(), Err(ExitStatusError::Exited(3)));
    assert_eq!(output.report.as_shell_code(), 3);
    Ok(())
}

#[test]
fn successful_exit_passes_check() -> TestResult {
    init_tracing();
    let output = spawn_sync(&echo().arg("fine").build())?;

    assert_eq!(output.report.check(), Ok(()));
    assert_eq!(output.report.code(), Some(0));
    Ok(())
}

#[test]
fn explicit_program_keeps_argv0() -> TestResult {
    init_tracing();
    let request = SpawnRequest::new(["custom-name", "--argv0"])
        .program(echo_path())
        .flags(SpawnFlags::DO_NOT_REAP_CHILD)
        .stdout(Stdio::Pipe);

    let output = spawn_sync(&request)?;

    assert!(output.report.success());
    assert_eq!(output.stdout.as_deref(), Some(&b"custom-name"[..]));
    Ok(())
}

#[test]
fn search_path_finds_sh() -> TestResult {
    init_tracing();
    let request = SpawnRequest::new(["sh", "-c", "printf found"])
        .flags(SpawnFlags::DO_NOT_REAP_CHILD | SpawnFlags::SEARCH_PATH)
        .stdout(Stdio::Pipe);

    let output = spawn_sync(&request)?;

    assert_eq!(output.stdout.as_deref(), Some(&b"found"[..]));
    Ok(())
}

#[test]
fn bare_name_without_search_path_is_not_looked_up() -> TestResult {
    init_tracing();
    // Relative to the cwd, where no `sh` exists.
    let dir = tempfile::tempdir()?;
    let request = SpawnRequest::new(["sh", "-c", "true"])
        .working_directory(dir.path())
        .flags(SpawnFlags::DO_NOT_REAP_CHILD);

    let err = spawn(&request).expect_err("no ./sh in an empty directory");
    assert_eq!(err.kind(), SpawnErrorKind::NoEnt);
    Ok(())
}
