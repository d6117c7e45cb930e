// src/config/model.rs

use std::collections::BTreeMap;
use std::os::fd::RawFd;
use std::path::PathBuf;

use serde::Deserialize;

use crate::request::{Environment, SpawnFlags, SpawnRequest};
use crate::types::Stdio;

/// A spawn profile as read from a TOML file.
///
/// ```toml
/// argv = ["/bin/echo", "hi"]
/// working_directory = "/tmp"
/// do_not_reap = true
///
/// [environment]
/// set = { FOO = "bar" }
///
/// [stdio]
/// stdout = "pipe"
///
/// [[remap]]
/// source = 3
/// target = 10
/// ```
///
/// Everything except `argv` is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawSpawnConfig {
    #[serde(default)]
    pub argv: Vec<String>,

    /// Executable to run instead of `argv[0]`.
    #[serde(default)]
    pub program: Option<PathBuf>,

    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    #[serde(default)]
    pub search_path: bool,

    #[serde(default)]
    pub search_path_from_envp: bool,

    #[serde(default)]
    pub prefer_fast_path: bool,

    #[serde(default)]
    pub leave_descriptors_open: bool,

    /// Keep the child waitable. Defaults to `true`; `false` detaches it.
    #[serde(default = "default_do_not_reap")]
    pub do_not_reap: bool,

    #[serde(default)]
    pub environment: EnvironmentSection,

    #[serde(default)]
    pub stdio: StdioSection,

    #[serde(default)]
    pub remap: Vec<RemapConfig>,
}

fn default_do_not_reap() -> bool {
    true
}

/// `[environment]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSection {
    /// Start from an empty environment instead of the parent's.
    #[serde(default)]
    pub clear: bool,

    #[serde(default)]
    pub set: BTreeMap<String, String>,

    #[serde(default)]
    pub unset: Vec<String>,
}

/// `[stdio]` section. Each value is `inherit`, `close`, `null`, `pipe` or
/// `fd:N`.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StdioSection {
    #[serde(default)]
    pub stdin: Stdio,
    #[serde(default)]
    pub stdout: Stdio,
    #[serde(default)]
    pub stderr: Stdio,
}

/// One `[[remap]]` entry.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemapConfig {
    pub source: RawFd,
    pub target: RawFd,
}

/// A profile that passed validation. Built with `SpawnConfig::try_from`.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    raw: RawSpawnConfig,
}

impl SpawnConfig {
    pub(crate) fn new_unchecked(raw: RawSpawnConfig) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &RawSpawnConfig {
        &self.raw
    }

    pub fn flags(&self) -> SpawnFlags {
        let raw = &self.raw;
        let mut flags = SpawnFlags::empty();
        flags.set(SpawnFlags::SEARCH_PATH, raw.search_path);
        flags.set(SpawnFlags::SEARCH_PATH_FROM_ENVP, raw.search_path_from_envp);
        flags.set(SpawnFlags::PREFER_FAST_PATH, raw.prefer_fast_path);
        flags.set(SpawnFlags::LEAVE_DESCRIPTORS_OPEN, raw.leave_descriptors_open);
        flags.set(SpawnFlags::DO_NOT_REAP_CHILD, raw.do_not_reap);
        flags
    }

    pub fn environment(&self) -> Environment {
        let section = &self.raw.environment;
        let mut env = if section.clear {
            Environment::replace(std::iter::empty::<(String, String)>())
        } else {
            Environment::inherit()
        };
        for (key, value) in &section.set {
            env.set(key, value);
        }
        for key in &section.unset {
            env.remove(key);
        }
        env
    }

    /// Build the request this profile describes.
    pub fn to_request(&self) -> SpawnRequest {
        let raw = &self.raw;
        let mut request = SpawnRequest::new(raw.argv.iter())
            .environment(self.environment())
            .flags(self.flags())
            .stdin(raw.stdio.stdin)
            .stdout(raw.stdio.stdout)
            .stderr(raw.stdio.stderr);

        if let Some(program) = &raw.program {
            request = request.program(program);
        }
        if let Some(dir) = &raw.working_directory {
            request = request.working_directory(dir);
        }
        for remap in &raw.remap {
            request = request.remap_fd(remap.source, remap.target);
        }
        request
    }
}
