//! Backups of the deployment's persistent state
//!
//! A backup is a gzipped tarball of whichever of `data/`, `.env` and the
//! encrypted secret file exist, stored under `backups/` in the deployment
//! root. The process is stopped while the archive is written or extracted
//! and restarted afterwards on every path once it has been stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::deploy::process::ProcessControl;
use crate::errors::{DeployError, DeployResult};
use crate::filesys::dir::Dir;
use crate::prompt::Prompt;
use crate::remote::lock::RemoteLock;
use crate::remote::RemoteChannel;
use crate::storage::layout::{RemoteLayout, BACKUPS_DIR};
use crate::utils::shell_quote;

const FILENAME_PREFIX: &str = "backup-";
const FILENAME_SUFFIX: &str = ".tar.gz";
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub filename: String,

    /// Human-readable size as reported by `du -h`
    pub size: String,

    /// UTC time parsed from the filename, `None` if it does not parse
    pub created_at: Option<NaiveDateTime>,
}

/// `backup-YYYYMMDD-HHMMSS.tar.gz`
pub fn backup_filename(at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        FILENAME_PREFIX,
        at.format(TIMESTAMP_FORMAT),
        FILENAME_SUFFIX
    )
}

pub fn parse_backup_timestamp(filename: &str) -> Option<NaiveDateTime> {
    let stamp = filename
        .strip_prefix(FILENAME_PREFIX)?
        .strip_suffix(FILENAME_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// Backup names are plain file names inside `backups/`
fn validate_filename(filename: &str) -> DeployResult<()> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.starts_with('.')
        || !filename.ends_with(FILENAME_SUFFIX)
    {
        return Err(DeployError::Validation(format!(
            "Invalid backup name: {}",
            filename
        )));
    }
    Ok(())
}

/// Pick the backups to delete: everything older than the retention window,
/// then the oldest of what remains beyond `max_count`. `backups` must be
/// sorted newest first; undated backups count as oldest.
pub fn select_for_cleanup(
    backups: &[BackupInfo],
    now: NaiveDateTime,
    retention_days: u32,
    max_count: usize,
) -> Vec<String> {
    let cutoff = now - Duration::days(i64::from(retention_days));

    let (expired, kept): (Vec<&BackupInfo>, Vec<&BackupInfo>) = backups
        .iter()
        .partition(|b| b.created_at.is_some_and(|t| t < cutoff));

    let mut selected: Vec<String> = expired.iter().map(|b| b.filename.clone()).collect();
    if kept.len() > max_count {
        selected.extend(kept[max_count..].iter().map(|b| b.filename.clone()));
    }
    selected
}

fn announce(silent: bool, message: &str) {
    if silent {
        debug!("{}", message);
    } else {
        info!("{}", message);
    }
}

pub struct BackupManager {
    channel: Arc<dyn RemoteChannel>,
    layout: RemoteLayout,
    process: ProcessControl,
    lock: Arc<RemoteLock>,
}

impl BackupManager {
    pub fn new(
        channel: Arc<dyn RemoteChannel>,
        layout: RemoteLayout,
        process: ProcessControl,
        lock: Arc<RemoteLock>,
    ) -> Self {
        Self {
            channel,
            layout,
            process,
            lock,
        }
    }

    /// Candidate paths (relative to the root) that currently exist
    async fn existing_candidates(&self) -> DeployResult<Vec<String>> {
        let candidates = self
            .layout
            .backup_candidates()
            .iter()
            .map(|c| shell_quote(c))
            .collect::<Vec<_>>()
            .join(" ");
        let command = format!(
            "cd {} 2>/dev/null && for p in {}; do [ -e \"$p\" ] && echo \"$p\"; done; true",
            shell_quote(self.layout.root()),
            candidates
        );
        let output = self.channel.check(&command).await?;
        Ok(output.lines().map(str::to_string).collect())
    }

    /// Archive the persistent state. Returns the archive name, or `None` if
    /// there was nothing to back up. A failed stop or archive is returned as
    /// `Err`; the process is restarted first if it had been stopped.
    pub async fn create_backup(&self, silent: bool) -> DeployResult<Option<String>> {
        let candidates = self.existing_candidates().await?;
        if candidates.is_empty() {
            announce(silent, "Nothing to back up (no data directory, env or secret file)");
            return Ok(None);
        }

        let filename = backup_filename(Utc::now());
        let command = format!(
            "cd {} && mkdir -p {} && tar -czf {} {}",
            shell_quote(self.layout.root()),
            BACKUPS_DIR,
            shell_quote(&format!("{}/{}", BACKUPS_DIR, filename)),
            candidates
                .iter()
                .map(|c| shell_quote(c))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let was_running = self.process.is_running().await?;
        if was_running {
            self.process.stop().await?;
        }

        let result = self
            .lock
            .run(async { self.channel.check(&command).await.map(|_| ()) })
            .await;

        if was_running {
            self.restart().await;
        }

        result?;
        announce(silent, &format!("Created backup {}", filename));
        Ok(Some(filename))
    }

    /// Backups in the remote backup directory, newest first
    pub async fn list_backups(&self) -> DeployResult<Vec<BackupInfo>> {
        let dir = shell_quote(&self.layout.backups_dir());
        let command = format!(
            "if [ -d {dir} ]; then cd {dir} && for f in *{FILENAME_SUFFIX}; do [ -f \"$f\" ] && \
             printf '%s|%s\\n' \"$f\" \"$(du -h \"$f\" | cut -f1)\"; done; fi; true"
        );
        let output = self.channel.check(&command).await?;

        let mut backups: Vec<BackupInfo> = output
            .lines()
            .map(|line| {
                let (filename, size) = line.split_once('|').unwrap_or((line, ""));
                BackupInfo {
                    filename: filename.to_string(),
                    size: size.trim().to_string(),
                    created_at: parse_backup_timestamp(filename),
                }
            })
            .collect();
        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(backups)
    }

    async fn require_backup(&self, filename: &str) -> DeployResult<String> {
        validate_filename(filename)?;
        let path = self.layout.backup_file(filename);
        if !self.channel.path_exists(&path).await? {
            return Err(DeployError::NotFound(format!("Backup not found: {}", filename)));
        }
        Ok(path)
    }

    /// Extract a backup over the deployment directory. Returns `false` if
    /// the operator declined. A missing backup is `Err(NotFound)`, a failed
    /// extraction `Err(Command)`.
    pub async fn restore_backup(&self, filename: &str, prompt: Option<&dyn Prompt>) -> DeployResult<bool> {
        let path = self.require_backup(filename).await?;

        if let Some(prompt) = prompt {
            let question = format!(
                "Restore {}? Current data in {} will be overwritten.",
                filename,
                self.layout.root()
            );
            if !prompt.confirm(&question) {
                info!("Restore cancelled");
                return Ok(false);
            }
        }

        let command = format!(
            "tar -xzf {} -C {}",
            shell_quote(&path),
            shell_quote(self.layout.root())
        );

        let was_running = self.process.is_running().await?;
        if was_running {
            self.process.stop().await?;
        }

        let result = self
            .lock
            .run(async { self.channel.check(&command).await.map(|_| ()) })
            .await;

        if was_running {
            self.restart().await;
        }

        result?;
        info!("Restored backup {}", filename);
        Ok(true)
    }

    /// Copy a backup into `local_dir`, creating it if needed
    pub async fn download_backup(&self, filename: &str, local_dir: &Path) -> DeployResult<PathBuf> {
        let remote_path = self.require_backup(filename).await?;

        let dir = Dir::new(local_dir);
        dir.create().await?;
        let local_path = dir.path().join(filename);

        self.channel.download_file(&remote_path, &local_path).await?;
        info!("Downloaded {} to {}", filename, local_path.display());
        Ok(local_path)
    }

    /// Delete expired backups, then the oldest beyond `max_count`. Returns
    /// the number deleted.
    pub async fn cleanup_old_backups(&self, retention_days: u32, max_count: usize) -> DeployResult<usize> {
        self.lock
            .run(async {
                let backups = self.list_backups().await?;
                let doomed = select_for_cleanup(
                    &backups,
                    Utc::now().naive_utc(),
                    retention_days,
                    max_count,
                );

                let mut deleted = 0;
                for filename in &doomed {
                    let command = format!("rm -f {}", shell_quote(&self.layout.backup_file(filename)));
                    if self.channel.run_command(&command).await {
                        debug!("Deleted backup {}", filename);
                        deleted += 1;
                    }
                }
                if deleted > 0 {
                    info!("Deleted {} old backup(s)", deleted);
                }
                Ok(deleted)
            })
            .await
    }

    async fn restart(&self) {
        if let Err(e) = self.process.start().await {
            error!("Failed to restart {}: {}", self.process.instance_name(), e);
            warn!("The bot is stopped; start it manually or redeploy");
        }
    }
}
