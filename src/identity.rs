// ABOUTME: Resolves a username to uid/gid/home inside a sandbox's root filesystem.
// ABOUTME: UserLookup trait plus an /etc/passwd reader rooted at /proc/<pid>/root.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

const ROOT_USER: &str = "root";

/// A user resolved inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecUser {
    pub uid: u32,
    pub gid: u32,
    pub home: String,
}

impl ExecUser {
    fn root() -> Self {
        Self {
            uid: 0,
            gid: 0,
            home: "/root".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("unable to find user {username}")]
    UnknownUser { username: String },

    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("malformed passwd entry for {username}")]
    Malformed { username: String },
}

#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Look up `username` in the filesystem rooted at `root`.
    /// An empty username means root.
    async fn lookup(&self, root: &Path, username: &str) -> Result<ExecUser, IdentityError>;
}

/// Root filesystem of a running process as seen from the host.
pub fn process_root(pid: u32) -> PathBuf {
    PathBuf::from(format!("/proc/{}/root", pid))
}

/// Reads `etc/passwd` under the sandbox root.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswdLookup;

#[async_trait]
impl UserLookup for PasswdLookup {
    async fn lookup(&self, root: &Path, username: &str) -> Result<ExecUser, IdentityError> {
        let username = if username.is_empty() {
            ROOT_USER
        } else {
            username
        };

        let path = root.join("etc/passwd");
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && username == ROOT_USER => {
                return Ok(ExecUser::root());
            }
            Err(e) => {
                return Err(IdentityError::Read {
                    path: path.display().to_string(),
                    message: e.to_string(),
                });
            }
        };

        match parse_passwd(&contents, username)? {
            Some(user) => Ok(user),
            None if username == ROOT_USER => Ok(ExecUser::root()),
            None => Err(IdentityError::UnknownUser {
                username: username.to_string(),
            }),
        }
    }
}

/// Find `username` in passwd-formatted text.
fn parse_passwd(contents: &str, username: &str) -> Result<Option<ExecUser>, IdentityError> {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // name:password:uid:gid:gecos:home:shell
        let fields: Vec<&str> = line.split(':').collect();
        if fields.first() != Some(&username) {
            continue;
        }

        let malformed = || IdentityError::Malformed {
            username: username.to_string(),
        };
        if fields.len() < 6 {
            return Err(malformed());
        }
        let uid = fields[2].parse().map_err(|_| malformed())?;
        let gid = fields[3].parse().map_err(|_| malformed())?;

        return Ok(Some(ExecUser {
            uid,
            gid,
            home: fields[5].to_string(),
        }));
    }
    Ok(None)
}
