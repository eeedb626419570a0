//! SSH-backed remote channel
//!
//! Shells out to the system `ssh`, `rsync` and `scp` binaries so that the
//! user's existing agent, known_hosts and ssh config apply unchanged.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{DeployError, DeployResult};
use crate::remote::{CommandOutput, RemoteChannel};
use crate::storage::layout::{BACKUPS_DIR, DATA_DIR, ENV_FILE, HISTORY_FILE, LOCK_DIR, SECRETS_FILE};
use crate::storage::settings::Settings;
use crate::utils::shell_quote;

/// Exit code ssh reserves for its own (connection) failures
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Paths rsync must never overwrite on the remote side
const TRANSFER_EXCLUDES: [&str; 8] = [
    ".git",
    DATA_DIR,
    BACKUPS_DIR,
    ENV_FILE,
    SECRETS_FILE,
    HISTORY_FILE,
    LOCK_DIR,
    "target",
];

/// Connection options for [`SshChannel`]
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,

    /// Upper bound for any single remote call
    pub command_timeout: Duration,

    /// Passed to ssh as `ConnectTimeout`
    pub connect_timeout: Duration,
}

impl SshOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.vps.host.clone(),
            user: settings.vps.user.clone(),
            port: settings.vps.port,
            identity_file: settings
                .vps
                .ssh_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .map(expand_home),
            command_timeout: Duration::from_secs(settings.deployment.command_timeout_secs.max(1)),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Remote channel over the system ssh client
#[derive(Debug, Clone)]
pub struct SshChannel {
    options: SshOptions,
}

impl SshChannel {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.options.user, self.options.host)
    }

    /// Options shared by ssh invocations, without the port flag
    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout.as_secs().max(1)),
        ];
        if let Some(identity) = &self.options.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-p".to_string());
        args.push(self.options.port.to_string());
        args.push(self.target());
        args.push("--".to_string());
        args.push(remote_command.to_string());
        args
    }

    /// The `-e` transport string handed to rsync
    fn rsync_shell(&self) -> String {
        let mut parts = vec!["ssh".to_string()];
        parts.extend(self.common_options().iter().map(|a| shell_quote(a)));
        parts.push("-p".to_string());
        parts.push(self.options.port.to_string());
        parts.join(" ")
    }

    fn rsync_args(&self, local_dir: &Path, remote_dir: &str) -> Vec<String> {
        let mut args = vec!["-az".to_string(), "-e".to_string(), self.rsync_shell()];
        for exclude in TRANSFER_EXCLUDES {
            args.push(format!("--exclude=/{}", exclude));
        }
        args.push(format!("{}/", local_dir.display().to_string().trim_end_matches('/')));
        args.push(format!("{}:{}/", self.target(), remote_dir.trim_end_matches('/')));
        args
    }

    fn scp_args(&self, remote_path: &str, local_path: &Path) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-P".to_string());
        args.push(self.options.port.to_string());
        args.push(format!("{}:{}", self.target(), remote_path));
        args.push(local_path.display().to_string());
        args
    }

    /// Spawn a local program, feed optional stdin, and wait under the
    /// configured timeout. The child is killed if the timeout fires.
    async fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>) -> DeployResult<CommandOutput> {
        let timeout = self.options.command_timeout;
        let description = format!("{} {}", program, args.last().map(String::as_str).unwrap_or(""));

        let call = async {
            let mut child = Command::new(program)
                .args(args)
                .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| DeployError::Connection(format!("Failed to run {}: {}", program, e)))?;

            if let (Some(content), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(content).await?;
                pipe.shutdown().await?;
            }

            let output = child.wait_with_output().await?;
            Ok::<_, DeployError>(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            })
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DeployError::Timeout {
                what: description,
                secs: timeout.as_secs(),
            }),
        }
    }

    fn connection_check(&self, output: CommandOutput) -> DeployResult<CommandOutput> {
        if output.exit_code == SSH_CONNECTION_FAILURE {
            return Err(DeployError::Connection(format!(
                "Cannot reach {}:{}: {}",
                self.options.host,
                self.options.port,
                output.detail()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn exec(&self, command: &str) -> DeployResult<CommandOutput> {
        debug!("ssh {}: {}", self.options.host, command);
        let output = self.run("ssh", &self.ssh_args(command), None).await?;
        self.connection_check(output)
    }

    async fn write_file(&self, content: &[u8], remote_path: &str, mode: u32) -> DeployResult<()> {
        let path = shell_quote(remote_path);
        let temp = shell_quote(&format!("{}.tmp-{}", remote_path, uuid::Uuid::new_v4().simple()));
        let command = format!(
            "mkdir -p \"$(dirname {path})\" && umask 077 && cat > {temp} && chmod {mode:o} {temp} && mv -f {temp} {path}"
        );
        debug!("ssh {}: write {} ({} bytes)", self.options.host, remote_path, content.len());

        let output = self.run("ssh", &self.ssh_args(&command), Some(content)).await?;
        let output = self.connection_check(output)?;
        if !output.success() {
            let _ = self.exec(&format!("rm -f {}", temp)).await;
            return Err(DeployError::Command(format!(
                "Failed to write {}: {}",
                remote_path,
                output.detail()
            )));
        }
        Ok(())
    }

    async fn transfer_files(&self, local_dir: &Path, remote_dir: &str) -> DeployResult<()> {
        self.check(&format!("mkdir -p {}", shell_quote(remote_dir)))
            .await?;

        debug!("rsync {} -> {}:{}", local_dir.display(), self.options.host, remote_dir);
        let output = self.run("rsync", &self.rsync_args(local_dir, remote_dir), None).await?;
        if !output.success() {
            return Err(DeployError::Command(format!(
                "rsync failed with exit code {}: {}",
                output.exit_code,
                output.detail()
            )));
        }
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> DeployResult<()> {
        debug!("scp {}:{} -> {}", self.options.host, remote_path, local_path.display());
        let output = self.run("scp", &self.scp_args(remote_path, local_path), None).await?;
        if !output.success() {
            return Err(DeployError::Command(format!(
                "scp failed with exit code {}: {}",
                output.exit_code,
                output.detail()
            )));
        }
        Ok(())
    }
}
