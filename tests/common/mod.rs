#![allow(dead_code)]

use std::path::PathBuf;

use childspawn_test_utils::builders::EchoRequestBuilder;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Path of the `childspawn-echo` helper built alongside the tests.
pub fn echo_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_childspawn-echo"))
}

/// An echo request with stdout piped and the child kept reapable.
pub fn echo() -> EchoRequestBuilder {
    EchoRequestBuilder::new(&echo_path())
}
