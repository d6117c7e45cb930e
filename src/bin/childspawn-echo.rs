// src/bin/childspawn-echo.rs

//! Deterministic child program for exercising the spawner.
//!
//! Arguments are processed left to right:
//! - `--fd=N`: write subsequent output to fd `N` (default 1)
//! - `--exit=N`: exit with code `N` once done
//! - `--wait-stdin`: read stdin until EOF before continuing
//! - `--cwd`: write the current directory
//! - `--argv0`: write `argv[0]` as received
//! - `--env=NAME`: write the value of `NAME`, or nothing if unset
//! - `--fd-status=N`: write `N:open` or `N:closed`
//! - anything else is written as is, with no separator

use std::fs::File;
use std::io::{self, Read, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{FromRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;

use anyhow::{Context, Result};

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("childspawn-echo: {err:?}");
            std::process::exit(2);
        }
    }
}

fn run() -> Result<i32> {
    let mut fd: RawFd = 1;
    let mut code = 0;

    for arg in std::env::args_os().skip(1) {
        let bytes = arg.as_bytes();
        let text = arg.to_str();

        if let Some(n) = text.and_then(|t| t.strip_prefix("--fd=")) {
            fd = n.parse().with_context(|| format!("bad --fd value '{n}'"))?;
        } else if let Some(n) = text.and_then(|t| t.strip_prefix("--exit=")) {
            code = n.parse().with_context(|| format!("bad --exit value '{n}'"))?;
        } else if text == Some("--wait-stdin") {
            let mut sink = Vec::new();
            io::stdin().lock().read_to_end(&mut sink)?;
        } else if text == Some("--argv0") {
            if let Some(argv0) = std::env::args_os().next() {
                write_to(fd, argv0.as_bytes())?;
            }
        } else if text == Some("--cwd") {
            let cwd = std::env::current_dir()?;
            write_to(fd, cwd.as_os_str().as_bytes())?;
        } else if let Some(name) = text.and_then(|t| t.strip_prefix("--env=")) {
            if let Some(value) = std::env::var_os(name) {
                write_to(fd, value.as_bytes())?;
            }
        } else if let Some(n) = text.and_then(|t| t.strip_prefix("--fd-status=")) {
            let probe: RawFd = n.parse().with_context(|| format!("bad --fd-status value '{n}'"))?;
            let open = unsafe { libc::fcntl(probe, libc::F_GETFD) } != -1;
            let status = if open { "open" } else { "closed" };
            write_to(fd, format!("{probe}:{status}").as_bytes())?;
        } else {
            write_to(fd, bytes)?;
        }
    }

    Ok(code)
}

fn write_to(fd: RawFd, bytes: &[u8]) -> Result<()> {
    // The fd belongs to the process, not to this function.
    let mut file = ManuallyDrop::new(unsafe { File::from_raw_fd(fd) });
    file.write_all(bytes)
        .with_context(|| format!("writing to fd {fd}"))?;
    file.flush()?;
    Ok(())
}
