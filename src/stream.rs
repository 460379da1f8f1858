// ABOUTME: Bulk file copy into and out of a running sandbox by process id.
// ABOUTME: BulkCopy trait plus an implementation driving the node's nstar helper.

use crate::runtime::BoxedReader;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("failed to send tar stream: {message}: {stderr}")]
    Input { message: String, stderr: String },

    #[error("exit status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

#[async_trait]
pub trait BulkCopy: Send + Sync {
    /// Extract a tar stream at `path` inside the sandbox of `pid`, as `user`.
    async fn stream_in(
        &self,
        pid: u32,
        path: &str,
        user: &str,
        tar: BoxedReader,
    ) -> Result<(), CopyError>;

    /// Produce a tar stream of `path` inside the sandbox of `pid`, as `user`.
    async fn stream_out(&self, pid: u32, path: &str, user: &str) -> Result<BoxedReader, CopyError>;
}

/// Split a stream-out source into the directory to enter and the entry to
/// archive. A trailing slash archives the directory's contents.
fn split_source_path(path: &str) -> (String, String) {
    if path.ends_with('/') {
        return (path.to_string(), ".".to_string());
    }

    let p = std::path::Path::new(path);
    let dir = p
        .parent()
        .map(|d| d.to_string_lossy().into_owned())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| ".".to_string());
    let base = p
        .file_name()
        .map(|b| b.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    (dir, base)
}

/// Runs `nstar <tar> <pid> <user> ...` to enter the sandbox's mount namespace.
#[derive(Debug, Clone)]
pub struct NstarCopier {
    nstar_bin: PathBuf,
    tar_bin: PathBuf,
}

impl NstarCopier {
    pub fn new(nstar_bin: impl Into<PathBuf>, tar_bin: impl Into<PathBuf>) -> Self {
        Self {
            nstar_bin: nstar_bin.into(),
            tar_bin: tar_bin.into(),
        }
    }

    fn command(&self, pid: u32, user: &str) -> Command {
        let mut cmd = Command::new(&self.nstar_bin);
        cmd.arg(&self.tar_bin).arg(pid.to_string()).arg(user);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> CopyError {
        CopyError::Spawn {
            program: self.nstar_bin.display().to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl BulkCopy for NstarCopier {
    async fn stream_in(
        &self,
        pid: u32,
        path: &str,
        user: &str,
        mut tar: BoxedReader,
    ) -> Result<(), CopyError> {
        let mut child = self
            .command(pid, user)
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // stdin is dropped at the end of this block so the helper sees EOF.
        let sent = match child.stdin.take() {
            Some(mut stdin) => tokio::io::copy(&mut tar, &mut stdin).await.map(|_| ()),
            None => Ok(()),
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if let Err(e) = sent {
            return Err(CopyError::Input {
                message: e.to_string(),
                stderr,
            });
        }
        if !output.status.success() {
            return Err(CopyError::Failed {
                code: output.status.code(),
                stderr,
            });
        }
        Ok(())
    }

    async fn stream_out(&self, pid: u32, path: &str, user: &str) -> Result<BoxedReader, CopyError> {
        let (dir, base) = split_source_path(path);

        let mut child = self
            .command(pid, user)
            .arg(&dir)
            .arg(&base)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child.stdout.take().ok_or_else(|| CopyError::Spawn {
            program: self.nstar_bin.display().to_string(),
            message: "stdout was not captured".to_string(),
        })?;

        // Reap the helper once the reader has drained its output.
        let source = path.to_string();
        tokio::spawn(async move {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    tracing::warn!("stream-out of {} exited with {}: {}", source, status, stderr.trim())
                }
                Err(e) => tracing::warn!("stream-out of {} could not be reaped: {}", source, e),
            }
        });

        Ok(Box::new(stdout))
    }
}
