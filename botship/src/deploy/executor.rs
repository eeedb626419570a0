//! Deployment executor
//!
//! Wires the components together for one configured bot and runs the
//! deploy, rollback, teardown and status flows.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::backup::manager::BackupManager;
use crate::deploy::git;
use crate::deploy::process::ProcessControl;
use crate::deploy::state::{ProcessState, StateDetector};
use crate::errors::{DeployError, DeployResult};
use crate::filesys::dir::Dir;
use crate::prompt::Prompt;
use crate::remote::lock::RemoteLock;
use crate::remote::RemoteChannel;
use crate::secrets::cipher::SecretCipher;
use crate::secrets::format;
use crate::secrets::store::{SecretStore, SECRET_FILE_MODE};
use crate::storage::layout::{RemoteLayout, BACKUPS_DIR, ENV_FILE};
use crate::storage::settings::{BackupSettings, DeploymentMethod, Settings};
use crate::utils::shell_quote;
use crate::version::status::{VersionEvent, VersionStatus};
use crate::version::tag::BuildTag;
use crate::version::tracker::{DeploymentVersion, VersionTracker};

/// Result of a completed deployment
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub build_tag: BuildTag,

    /// Backup taken before the deployment, if any
    pub backup: Option<String>,
}

/// Current state of the deployment
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatus {
    pub bot_name: String,
    pub method: DeploymentMethod,
    pub remote_dir: String,
    pub process: ProcessState,
    pub active: Option<DeploymentVersion>,
}

pub struct Deployer {
    bot_name: String,
    channel: Arc<dyn RemoteChannel>,
    layout: RemoteLayout,
    backup_settings: BackupSettings,
    process: ProcessControl,
    detector: StateDetector,
    backups: BackupManager,
    versions: VersionTracker,
    secrets: SecretStore,
}

impl Deployer {
    pub fn new(settings: &Settings, channel: Arc<dyn RemoteChannel>) -> DeployResult<Self> {
        settings.validate()?;

        let bot_name = settings.bot.name.clone();
        let layout = RemoteLayout::new(settings.remote_dir());
        let lock = Arc::new(RemoteLock::new(
            channel.clone(),
            layout.lock_dir(),
            Duration::from_secs(settings.deployment.lock_timeout_secs),
        ));
        let process = ProcessControl::new(
            channel.clone(),
            layout.clone(),
            settings.deployment.method,
            bot_name.clone(),
            &settings.vps.user,
        );

        let cipher = match settings.encryption_key() {
            Some(key) => Some(SecretCipher::new(&key, &bot_name)?),
            None => None,
        };

        Ok(Self {
            detector: StateDetector::new(process.clone()),
            backups: BackupManager::new(
                channel.clone(),
                layout.clone(),
                process.clone(),
                lock.clone(),
            ),
            versions: VersionTracker::new(
                channel.clone(),
                layout.clone(),
                bot_name.clone(),
                settings.deployment.max_history,
                lock.clone(),
                process.clone(),
            ),
            secrets: SecretStore::new(channel.clone(), layout.clone(), cipher, lock, bot_name.clone()),
            backup_settings: settings.backup.clone(),
            bot_name,
            channel,
            layout,
            process,
        })
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn process(&self) -> &ProcessControl {
        &self.process
    }

    pub fn detector(&self) -> &StateDetector {
        &self.detector
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn versions(&self) -> &VersionTracker {
        &self.versions
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    /// Deploy the contents of `local_dir`. Returns `None` if the operator
    /// declined to replace a running instance.
    pub async fn deploy(
        &self,
        local_dir: &Path,
        force: bool,
        prompt: &dyn Prompt,
    ) -> DeployResult<Option<DeployOutcome>> {
        Dir::new(local_dir).require().await?;
        info!("Deploying {} to {}", self.bot_name, self.layout.root());

        if !self.detector.check_before_deploy(force, prompt).await? {
            return Ok(None);
        }

        // A running instance may already have been removed above
        let backup = if self.backup_settings.auto_backup {
            match self.backups.create_backup(true).await {
                Ok(backup) => backup,
                Err(e) => {
                    warn!("Pre-deployment backup failed (continuing without one): {}", e);
                    None
                }
            }
        } else {
            None
        };

        let revision = git::source_revision(local_dir).await;
        let tag = self.versions.generate_build_tag(&revision);

        if let Err(e) = self.release(local_dir, &tag).await {
            error!("Deployment of {} failed: {}", tag, e);
            if let Err(record_err) = self.versions.add_deployment(&tag, VersionStatus::Failed).await {
                warn!("Could not record failed deployment: {}", record_err);
            }
            return Err(e);
        }

        self.versions.add_deployment(&tag, VersionStatus::Active).await?;
        info!("Deployed {}", tag);

        self.housekeeping().await;
        Ok(Some(DeployOutcome { build_tag: tag, backup }))
    }

    async fn release(&self, local_dir: &Path, tag: &BuildTag) -> DeployResult<()> {
        self.channel
            .transfer_files(local_dir, self.layout.root())
            .await?;
        self.materialize_env(local_dir).await?;
        self.process.launch(tag).await
    }

    /// Write the runtime `.env`: the local `.env` (if any) with decrypted
    /// secrets layered on top. The remote file is removed when both are empty.
    async fn materialize_env(&self, local_dir: &Path) -> DeployResult<()> {
        let local_env = Dir::new(local_dir).file(ENV_FILE).read_optional().await?;
        let mut entries = local_env
            .map(|content| format::parse_dotenv(&content))
            .unwrap_or_default();

        let secrets = self.secrets.load_all_decrypted().await?;
        for (name, value) in &secrets {
            entries.upsert(name.as_str(), value.expose_secret());
        }

        if entries.is_empty() {
            // Drop whatever an earlier release left behind, removed secrets included
            self.channel
                .check(&format!("rm -f {}", shell_quote(&self.layout.env_file())))
                .await?;
            return Ok(());
        }
        let content = format::render_env(entries.iter());
        self.channel
            .write_file(content.as_bytes(), &self.layout.env_file(), SECRET_FILE_MODE)
            .await?;
        info!(
            "Wrote {} ({} variable(s), {} from secrets)",
            ENV_FILE,
            entries.len(),
            secrets.len()
        );
        Ok(())
    }

    async fn housekeeping(&self) {
        if let Err(e) = self.versions.cleanup_old_images(&self.bot_name).await {
            warn!("Image cleanup failed: {}", e);
        }
        if let Err(e) = self
            .backups
            .cleanup_old_backups(
                self.backup_settings.retention_days,
                self.backup_settings.max_backups,
            )
            .await
        {
            warn!("Backup cleanup failed: {}", e);
        }
    }

    /// Roll back to `target` (a build tag) or, if `None`, to the previous
    /// version. Returns the version now active, or `None` if declined.
    pub async fn rollback(
        &self,
        target: Option<&str>,
        prompt: &dyn Prompt,
    ) -> DeployResult<Option<DeploymentVersion>> {
        if self.process.method() != DeploymentMethod::Docker {
            return Err(DeployError::Validation(format!(
                "Rollback requires the docker deployment method (configured: {})",
                self.process.method()
            )));
        }

        let mut target = match target {
            Some(tag) => self
                .versions
                .get_version_by_tag(tag)
                .await
                .ok_or_else(|| DeployError::NotFound(format!("Version not found: {}", tag)))?,
            None => self.versions.get_previous_version().await.ok_or_else(|| {
                DeployError::NotFound("No previous version to roll back to".to_string())
            })?,
        };
        let restored = target.status.apply(VersionEvent::Restored).map_err(|_| {
            DeployError::Validation(format!(
                "Cannot roll back to {} (status: {})",
                target.build_tag, target.status
            ))
        })?;

        let current = self.versions.active_version().await;
        let question = match &current {
            Some(current) => format!("Roll back from {} to {}?", current.build_tag, target.build_tag),
            None => format!("Roll back to {}?", target.build_tag),
        };
        if !prompt.confirm(&question) {
            info!("Rollback cancelled");
            return Ok(None);
        }

        if self.backup_settings.auto_backup {
            self.backups.create_backup(true).await?;
        }

        if self.process.query_state().await?.exists {
            if let Err(e) = self.process.remove().await {
                warn!("Failed to remove current instance (continuing): {}", e);
            }
        }
        self.process.activate(&target.build_tag).await?;

        if let Some(current) = &current {
            if current.status.apply(VersionEvent::RolledBack).is_ok() {
                self.versions
                    .mark_version_status(&current.build_tag, VersionStatus::RolledBack)
                    .await?;
            }
        }
        self.versions
            .mark_version_status(&target.build_tag, restored)
            .await?;

        target.status = restored;
        info!("Rolled back to {}", target.build_tag);
        Ok(Some(target))
    }

    /// Stop and remove the deployed process. With `remove_files`, also
    /// delete the deployment directory except `backups/`, after taking a
    /// backup. Returns `false` if declined.
    pub async fn teardown(&self, remove_files: bool, prompt: &dyn Prompt) -> DeployResult<bool> {
        let question = if remove_files {
            format!(
                "Remove {} and delete {} (backups are kept)?",
                self.process.instance_name(),
                self.layout.root()
            )
        } else {
            format!("Stop and remove {}?", self.process.instance_name())
        };
        if !prompt.confirm(&question) {
            info!("Teardown cancelled");
            return Ok(false);
        }

        if remove_files {
            if let Some(backup) = self.backups.create_backup(false).await? {
                info!("State saved to {}", backup);
            }
        }

        if self.process.query_state().await?.exists {
            self.process.remove().await?;
        } else {
            info!("{} is not deployed", self.process.instance_name());
        }

        if remove_files {
            let command = format!(
                "cd {} && find . -mindepth 1 -maxdepth 1 ! -name {} -exec rm -rf {{}} +",
                shell_quote(self.layout.root()),
                BACKUPS_DIR
            );
            self.channel.check(&command).await?;
            info!("Removed deployment files from {}", self.layout.root());
        }
        Ok(true)
    }

    pub async fn status(&self) -> DeployResult<DeploymentStatus> {
        Ok(DeploymentStatus {
            bot_name: self.bot_name.clone(),
            method: self.process.method(),
            remote_dir: self.layout.root().to_string(),
            process: self.process.query_state().await?,
            active: self.versions.active_version().await,
        })
    }
}
