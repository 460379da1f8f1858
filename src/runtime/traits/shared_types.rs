// ABOUTME: Shared types used across runtime engine trait definitions.
// ABOUTME: ProcessSpec, ProcessIo, PulledImage, ExitStatus, Signal, RegistryAuth.

use crate::types::ImageId;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Registry authentication credentials.
#[derive(Clone)]
pub struct RegistryAuth {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl RegistryAuth {
    /// Credentials are only sent when a username was supplied.
    pub fn from_parts(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() {
            return None;
        }
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An image pulled into the node's image store.
#[derive(Debug, Clone)]
pub struct PulledImage {
    /// Name the pod spec should reference.
    pub name: String,
    /// Content id, used for deletion.
    pub id: ImageId,
    /// Unpacked size in bytes.
    pub size: u64,
    /// `KEY=value` entries from the image config.
    pub env: Vec<String>,
}

/// Resolved identity a process runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessUser {
    pub uid: u32,
    pub gid: u32,
    pub username: String,
}

/// Fully resolved execution specification for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// argv, program first.
    pub args: Vec<String>,
    /// `KEY=value` entries.
    pub env: Vec<String>,
    pub cwd: String,
    pub user: ProcessUser,
    /// Applied as both the bounding and inheritable set.
    pub capabilities: Vec<String>,
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Caller-side streams wired to a process.
#[derive(Default)]
pub struct ProcessIo {
    pub stdin: Option<BoxedReader>,
    pub stdout: Option<BoxedWriter>,
    pub stderr: Option<BoxedWriter>,
}

impl fmt::Debug for ProcessIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessIo")
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Exit status reported by the runtime for a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i32,
    /// Failure the runtime attached to the exit, if any.
    pub error: Option<String>,
}

impl ExitStatus {
    pub fn code(code: i32) -> Self {
        Self { code, error: None }
    }
}

/// Generic signals a caller can deliver to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

impl Signal {
    /// The platform signal this maps to.
    pub fn platform(self) -> nix::sys::signal::Signal {
        match self {
            Signal::Terminate => nix::sys::signal::Signal::SIGTERM,
            Signal::Kill => nix::sys::signal::Signal::SIGKILL,
        }
    }
}
