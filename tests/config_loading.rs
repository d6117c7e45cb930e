// tests/config_loading.rs

mod common;
use crate::common::{TestResult, echo_path};
use childspawn_test_utils::init_tracing;

use std::ffi::OsStr;

use childspawn::config::{load_and_validate, load_from_path, parse_and_validate};
use childspawn::{ConfigError, FdRemap, SpawnFlags, Stdio, StreamKind, spawn_sync};

const FULL_PROFILE: &str = r#"
argv = ["/bin/echo", "hi"]
working_directory = "/tmp"
search_path = true
prefer_fast_path = true
leave_descriptors_open = true

[environment]
clear = true
set = { FOO = "bar" }
unset = ["HOME"]

[stdio]
stdin = "null"
stdout = "pipe"
stderr = "fd:7"

[[remap]]
source = 3
target = 10
"#;

#[test]
fn full_profile_becomes_a_request() -> TestResult {
    let config = parse_and_validate(FULL_PROFILE)?;
    let request = config.to_request();

    assert_eq!(request.argv(), &["/bin/echo", "hi"]);
    assert_eq!(request.working_dir().map(|p| p.to_path_buf()), Some("/tmp".into()));
    assert_eq!(
        request.spawn_flags(),
        SpawnFlags::SEARCH_PATH
            | SpawnFlags::PREFER_FAST_PATH
            | SpawnFlags::LEAVE_DESCRIPTORS_OPEN
            | SpawnFlags::DO_NOT_REAP_CHILD
    );
    assert_eq!(request.stdio(StreamKind::Stdin), Stdio::Null);
    assert_eq!(request.stdio(StreamKind::Stdout), Stdio::Pipe);
    assert_eq!(request.stdio(StreamKind::Stderr), Stdio::Fd(7));
    assert_eq!(request.remaps(), &[FdRemap { source: 3, target: 10 }]);

    let env = request.env_policy();
    assert!(!env.is_inherited());
    assert_eq!(env.get(OsStr::new("FOO")).as_deref(), Some(OsStr::new("bar")));
    assert_eq!(env.get(OsStr::new("HOME")), None);
    Ok(())
}

#[test]
fn minimal_profile_uses_defaults() -> TestResult {
    let config = parse_and_validate(r#"argv = ["/bin/true"]"#)?;
    let request = config.to_request();

    assert_eq!(request.spawn_flags(), SpawnFlags::DO_NOT_REAP_CHILD);
    assert!(request.env_policy().is_inherited());
    assert!(request.remaps().is_empty());
    for stream in StreamKind::ALL {
        assert_eq!(request.stdio(stream), Stdio::Inherit);
    }
    Ok(())
}

#[test]
fn do_not_reap_false_detaches() -> TestResult {
    let config = parse_and_validate("argv = [\"/bin/true\"]\ndo_not_reap = false\n")?;
    assert!(!config.flags().contains(SpawnFlags::DO_NOT_REAP_CHILD));
    Ok(())
}

fn assert_invalid(profile: &str, needle: &str) {
    match parse_and_validate(profile) {
        Err(ConfigError::Invalid(msg)) => {
            assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'")
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn missing_argv_is_rejected() {
    assert_invalid("working_directory = \"/tmp\"\n", "argv");
}

#[test]
fn duplicate_remap_target_is_rejected() {
    let profile = r#"
argv = ["/bin/true"]

[[remap]]
source = 3
target = 10

[[remap]]
source = 4
target = 10
"#;
    assert_invalid(profile, "remap[1]");
}

#[test]
fn remap_onto_redirected_stream_is_rejected() {
    let profile = r#"
argv = ["/bin/true"]

[stdio]
stdout = "pipe"

[[remap]]
source = 3
target = 1
"#;
    assert_invalid(profile, "already assigned");
}

#[test]
fn remap_onto_inherited_stream_is_accepted() -> TestResult {
    let profile = r#"
argv = ["/bin/true"]

[stdio]
stdout = "fd:-1"

[[remap]]
source = 3
target = 1
"#;
    parse_and_validate(profile)?;
    Ok(())
}

#[test]
fn negative_fd_is_rejected() {
    let profile = r#"
argv = ["/bin/true"]

[[remap]]
source = -2
target = 10
"#;
    assert_invalid(profile, "negative");
}

#[test]
fn variable_both_set_and_unset_is_rejected() {
    let profile = r#"
argv = ["/bin/true"]

[environment]
set = { FOO = "1" }
unset = ["FOO"]
"#;
    assert_invalid(profile, "FOO");
}

#[test]
fn unknown_field_is_a_parse_error() {
    let err = parse_and_validate("argv = [\"/bin/true\"]\nretries = 3\n")
        .expect_err("unknown field");
    assert!(matches!(err, ConfigError::Toml(_)), "got {err:?}");
}

#[test]
fn bad_stdio_mode_is_a_parse_error() {
    let profile = "argv = [\"/bin/true\"]\n[stdio]\nstdout = \"socket\"\n";
    let err = parse_and_validate(profile).expect_err("unknown stdio mode");
    assert!(matches!(err, ConfigError::Toml(_)), "got {err:?}");
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_from_path("/nonexistent/childspawn/profile.toml").expect_err("no such file");
    assert!(matches!(err, ConfigError::Io(_)), "got {err:?}");
}

#[test]
fn profile_on_disk_runs_end_to_end() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("echo.toml");
    let profile = format!(
        "argv = [{echo:?}, \"from \", \"profile\"]\n\n[stdio]\nstdout = \"pipe\"\n",
        echo = echo_path().to_string_lossy()
    );
    std::fs::write(&path, profile)?;

    let request = load_and_validate(&path)?.to_request();
    let output = spawn_sync(&request)?;

    assert_eq!(output.stdout.as_deref(), Some(&b"from profile"[..]));
    assert!(output.report.success());
    Ok(())
}
