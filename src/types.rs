// src/types.rs

use std::fmt;
use std::os::fd::RawFd;
use std::str::FromStr;

use serde::Deserialize;

/// What to connect one of the child's standard streams to.
///
/// - `Inherit`: leave the parent's fd in place (default).
/// - `Close`: close the fd in the child.
/// - `Null`: connect it to `/dev/null`.
/// - `Pipe`: create a pipe; the caller gets the other end on the
///   [`ChildHandle`](crate::handle::ChildHandle).
/// - `Fd(n)`: duplicate the parent's fd `n` onto the stream. A negative `n`
///   means "unset" and behaves like `Inherit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Stdio {
    #[default]
    Inherit,
    Close,
    Null,
    Pipe,
    Fd(RawFd),
}

impl Stdio {
    /// Collapse negative fds to `Inherit`.
    pub fn normalized(self) -> Self {
        match self {
            Stdio::Fd(fd) if fd < 0 => Stdio::Inherit,
            other => other,
        }
    }
}

impl FromStr for Stdio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "inherit" => Ok(Stdio::Inherit),
            "close" => Ok(Stdio::Close),
            "null" => Ok(Stdio::Null),
            "pipe" => Ok(Stdio::Pipe),
            other => match other.strip_prefix("fd:") {
                Some(n) => n
                    .parse::<RawFd>()
                    .map(Stdio::Fd)
                    .map_err(|_| format!("invalid fd number in stdio mode: {other}")),
                None => Err(format!(
                    "invalid stdio mode: {other} (expected inherit, close, null, pipe or fd:N)"
                )),
            },
        }
    }
}

impl TryFrom<String> for Stdio {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Stdio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stdio::Inherit => f.write_str("inherit"),
            Stdio::Close => f.write_str("close"),
            Stdio::Null => f.write_str("null"),
            Stdio::Pipe => f.write_str("pipe"),
            Stdio::Fd(fd) => write!(f, "fd:{fd}"),
        }
    }
}

/// One of the three standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Stdin, StreamKind::Stdout, StreamKind::Stderr];

    /// The fd number this stream occupies in the child.
    pub fn fd(self) -> RawFd {
        match self {
            StreamKind::Stdin => 0,
            StreamKind::Stdout => 1,
            StreamKind::Stderr => 2,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdin => f.write_str("stdin"),
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}
