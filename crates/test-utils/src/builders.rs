#![allow(dead_code)]

use std::path::Path;

use childspawn::{SpawnFlags, SpawnRequest, Stdio};

/// Builder for requests that run the `childspawn-echo` helper.
///
/// Defaults to a reapable child (`DO_NOT_REAP_CHILD`) with stdout piped,
/// which is what most tests want to observe.
pub struct EchoRequestBuilder {
    request: SpawnRequest,
}

impl EchoRequestBuilder {
    pub fn new(echo: &Path) -> Self {
        Self {
            request: SpawnRequest::new([echo.as_os_str()])
                .flags(SpawnFlags::DO_NOT_REAP_CHILD)
                .stdout(Stdio::Pipe),
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.request = self.request.arg(arg);
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.request = self.request.args(args.iter().copied());
        self
    }

    pub fn flags(mut self, flags: SpawnFlags) -> Self {
        self.request = self.request.insert_flags(flags);
        self
    }

    /// The flag set that makes a request eligible for `posix_spawn`.
    pub fn fast_path(self) -> Self {
        self.flags(SpawnFlags::PREFER_FAST_PATH | SpawnFlags::LEAVE_DESCRIPTORS_OPEN)
    }

    /// Start the child through an intermediate process.
    pub fn detached(mut self) -> Self {
        let flags = self.request.spawn_flags() - SpawnFlags::DO_NOT_REAP_CHILD;
        self.request = self.request.flags(flags);
        self
    }

    pub fn stdin(mut self, stdio: Stdio) -> Self {
        self.request = self.request.stdin(stdio);
        self
    }

    pub fn stdout(mut self, stdio: Stdio) -> Self {
        self.request = self.request.stdout(stdio);
        self
    }

    pub fn stderr(mut self, stdio: Stdio) -> Self {
        self.request = self.request.stderr(stdio);
        self
    }

    pub fn remap(mut self, source: i32, target: i32) -> Self {
        self.request = self.request.remap_fd(source, target);
        self
    }

    pub fn working_directory(mut self, dir: &Path) -> Self {
        self.request = self.request.working_directory(dir);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.request = self.request.env(key, value);
        self
    }

    pub fn build(self) -> SpawnRequest {
        self.request
    }
}
