//! Remote execution channel
//!
//! Everything that touches the managed host goes through [`RemoteChannel`].
//! The production implementation is [`ssh::SshChannel`]; tests substitute an
//! in-memory fake.

pub mod lock;
pub mod ssh;

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::{DeployError, DeployResult};
use crate::utils::shell_quote;

/// Exit code used by [`RemoteChannel::read_file`] to signal a missing file
const MISSING_FILE_EXIT: i32 = 3;

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty, trimmed stdout lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }

    /// Stderr if present, stdout otherwise
    pub fn detail(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Channel to the single managed host
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run a shell command and capture its output. A non-zero exit code is
    /// not an error at this level; transport failures are.
    async fn exec(&self, command: &str) -> DeployResult<CommandOutput>;

    /// Write `content` to `remote_path` atomically (temp file, then move)
    /// with the given permission bits. Parent directories are created.
    async fn write_file(&self, content: &[u8], remote_path: &str, mode: u32) -> DeployResult<()>;

    /// Copy the contents of a local directory into `remote_dir`
    async fn transfer_files(&self, local_dir: &Path, remote_dir: &str) -> DeployResult<()>;

    /// Copy one remote file to a local path
    async fn download_file(&self, remote_path: &str, local_path: &Path) -> DeployResult<()>;

    /// Run a command, reporting only whether it succeeded
    async fn run_command(&self, command: &str) -> bool {
        match self.exec(command).await {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!(
                    "Remote command failed ({}): {} :: {}",
                    output.exit_code,
                    command,
                    output.detail()
                );
                false
            }
            Err(e) => {
                warn!("Remote command could not run: {} :: {}", command, e);
                false
            }
        }
    }

    /// Run a command and turn a non-zero exit code into `DeployError::Command`
    async fn check(&self, command: &str) -> DeployResult<CommandOutput> {
        let output = self.exec(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(DeployError::Command(format!(
                "`{}` exited with {}: {}",
                command,
                output.exit_code,
                output.detail()
            )))
        }
    }

    /// Read a remote text file, `None` if it does not exist
    async fn read_file(&self, remote_path: &str) -> DeployResult<Option<String>> {
        let path = shell_quote(remote_path);
        let command = format!(
            "if [ -f {path} ]; then cat {path}; else exit {MISSING_FILE_EXIT}; fi"
        );
        let output = self.exec(&command).await?;
        match output.exit_code {
            0 => Ok(Some(output.stdout)),
            MISSING_FILE_EXIT => {
                debug!("Remote file does not exist: {}", remote_path);
                Ok(None)
            }
            code => Err(DeployError::Command(format!(
                "Failed to read {} ({}): {}",
                remote_path,
                code,
                output.detail()
            ))),
        }
    }

    /// Whether a remote path exists
    async fn path_exists(&self, remote_path: &str) -> DeployResult<bool> {
        let output = self
            .exec(&format!("test -e {}", shell_quote(remote_path)))
            .await?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(DeployError::Command(format!(
                "Failed to check {} ({}): {}",
                remote_path,
                code,
                output.detail()
            ))),
        }
    }
}
