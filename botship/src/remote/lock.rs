//! Advisory lock on the remote deployment directory
//!
//! `mkdir` is atomic on POSIX filesystems, so the lock is a directory that
//! exists while some invocation is in a read-modify-write sequence on the
//! shared history, secret or backup files. Participants cooperate; nothing
//! stops a process that ignores the lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::{DeployError, DeployResult};
use crate::remote::RemoteChannel;
use crate::utils::{calc_exp_backoff, shell_quote, CooldownOptions};

/// Locks older than this are assumed to belong to a crashed invocation
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);

pub struct RemoteLock {
    channel: Arc<dyn RemoteChannel>,
    path: String,
    timeout: Duration,
    stale_after: Duration,
    cooldown: CooldownOptions,
}

impl RemoteLock {
    pub fn new(channel: Arc<dyn RemoteChannel>, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            channel,
            path: path.into(),
            timeout,
            stale_after: DEFAULT_STALE_AFTER,
            cooldown: CooldownOptions::default(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: CooldownOptions) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run `operation` while holding the lock. The lock is released on every
    /// exit path of `operation`, including errors.
    pub async fn run<T, F>(&self, operation: F) -> DeployResult<T>
    where
        F: Future<Output = DeployResult<T>>,
    {
        self.acquire().await?;
        let result = operation.await;
        self.release().await;
        result
    }

    /// Acquire the lock, retrying with exponential backoff until the timeout
    pub async fn acquire(&self) -> DeployResult<()> {
        let lock = shell_quote(&self.path);
        let parent = shell_quote(parent_dir(&self.path));
        let acquire_cmd = format!(
            "mkdir -p {parent} && mkdir {lock} 2>/dev/null && date -u +%s > {lock}/acquired_at"
        );

        let started = Instant::now();
        let mut attempt = 0;
        loop {
            let output = self.channel.exec(&acquire_cmd).await?;
            if output.success() {
                debug!("Acquired remote lock {}", self.path);
                return Ok(());
            }

            if self.break_if_stale().await? {
                continue;
            }

            let delay = calc_exp_backoff(&self.cooldown, attempt);
            if started.elapsed() + delay > self.timeout {
                return Err(DeployError::Lock(format!(
                    "{} is held by another botship invocation (waited {}s). \
                     Remove it manually if no deployment is running.",
                    self.path,
                    self.timeout.as_secs()
                )));
            }
            debug!("Remote lock {} busy, retrying in {:?}", self.path, delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Release the lock. Failures are logged, not returned: the stale-lock
    /// check on the next acquisition recovers from them.
    pub async fn release(&self) {
        let command = format!("rm -rf {}", shell_quote(&self.path));
        if !self.channel.run_command(&command).await {
            warn!("Failed to release remote lock {}", self.path);
        } else {
            debug!("Released remote lock {}", self.path);
        }
    }

    async fn break_if_stale(&self) -> DeployResult<bool> {
        let minutes = (self.stale_after.as_secs() / 60).max(1);
        let command = format!(
            "find {} -maxdepth 0 -mmin +{}",
            shell_quote(&self.path),
            minutes
        );
        let output = self.channel.exec(&command).await?;
        if output.success() && output.lines().next().is_some() {
            warn!(
                "Breaking remote lock {} older than {} minutes",
                self.path, minutes
            );
            self.channel
                .check(&format!("rm -rf {}", shell_quote(&self.path)))
                .await?;
            return Ok(true);
        }
        Ok(false)
    }
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}
