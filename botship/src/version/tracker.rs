//! Deployment history on the remote host
//!
//! The history file is a bounded, newest-first list of every deployment.
//! Reading it is fail-open: a missing or corrupt file reads as an empty
//! history so it can never block a new deployment. Every read-modify-write
//! sequence holds the remote lock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::deploy::process::ProcessControl;
use crate::errors::DeployResult;
use crate::remote::lock::RemoteLock;
use crate::remote::RemoteChannel;
use crate::storage::layout::RemoteLayout;
use crate::version::status::{VersionEvent, VersionStatus};
use crate::version::tag::BuildTag;

pub const DEFAULT_MAX_VERSIONS: usize = 5;

const HISTORY_FILE_MODE: u32 = 0o644;
const DEPLOYED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One recorded deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentVersion {
    /// Seconds since the epoch, kept as a string in the file
    pub timestamp: String,

    #[serde(rename = "git_commit")]
    pub source_revision: String,

    #[serde(rename = "docker_tag")]
    pub build_tag: String,

    pub status: VersionStatus,
    pub deployed_at: String,
}

impl DeploymentVersion {
    pub fn new(tag: &BuildTag, status: VersionStatus) -> Self {
        Self {
            timestamp: tag.timestamp.to_string(),
            source_revision: tag.source_revision.clone(),
            build_tag: tag.to_string(),
            status,
            deployed_at: Local::now().format(DEPLOYED_AT_FORMAT).to_string(),
        }
    }
}

/// On-disk shape of `.deploy-history.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentHistory {
    #[serde(default)]
    pub bot_name: String,

    #[serde(default)]
    pub versions: Vec<DeploymentVersion>,
}

pub struct VersionTracker {
    channel: Arc<dyn RemoteChannel>,
    layout: RemoteLayout,
    bot_name: String,
    max_versions: usize,
    lock: Arc<RemoteLock>,
    process: ProcessControl,
}

impl VersionTracker {
    pub fn new(
        channel: Arc<dyn RemoteChannel>,
        layout: RemoteLayout,
        bot_name: impl Into<String>,
        max_versions: usize,
        lock: Arc<RemoteLock>,
        process: ProcessControl,
    ) -> Self {
        Self {
            channel,
            layout,
            bot_name: bot_name.into(),
            max_versions: max_versions.max(1),
            lock,
            process,
        }
    }

    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    pub fn generate_build_tag(&self, source_revision: &str) -> BuildTag {
        BuildTag::now(self.bot_name.clone(), source_revision)
    }

    /// Newest-first history; empty if the file is missing or unreadable
    pub async fn load_history(&self) -> Vec<DeploymentVersion> {
        let path = self.layout.history_file();
        let content = match self.channel.read_file(&path).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!("No deployment history at {}", path);
                return Vec::new();
            }
            Err(e) => {
                warn!("Could not read deployment history (treating as empty): {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<DeploymentHistory>(&content) {
            Ok(history) => history.versions,
            Err(e) => {
                warn!("Deployment history is corrupt (treating as empty): {}", e);
                Vec::new()
            }
        }
    }

    async fn save_history(&self, versions: Vec<DeploymentVersion>) -> DeployResult<()> {
        let history = DeploymentHistory {
            bot_name: self.bot_name.clone(),
            versions,
        };
        let content = serde_json::to_vec_pretty(&history)?;
        self.channel
            .write_file(&content, &self.layout.history_file(), HISTORY_FILE_MODE)
            .await
    }

    /// Record a deployment as the newest entry. Every entry that was active
    /// is demoted to `old`, and the history is truncated to the cap.
    pub async fn add_deployment(&self, tag: &BuildTag, status: VersionStatus) -> DeployResult<()> {
        self.lock
            .run(async {
                let mut versions = self.load_history().await;
                demote_active(&mut versions, None);

                versions.insert(0, DeploymentVersion::new(tag, status));
                versions.truncate(self.max_versions);

                self.save_history(versions).await?;
                info!("Recorded deployment {} ({})", tag, status);
                Ok(())
            })
            .await
    }

    pub async fn get_version_by_tag(&self, build_tag: &str) -> Option<DeploymentVersion> {
        self.load_history()
            .await
            .into_iter()
            .find(|v| v.build_tag == build_tag)
    }

    pub async fn active_version(&self) -> Option<DeploymentVersion> {
        self.load_history()
            .await
            .into_iter()
            .find(|v| v.status == VersionStatus::Active)
    }

    /// The rollback target: the first `old` or `rolled_back` entry after
    /// the active one
    pub async fn get_previous_version(&self) -> Option<DeploymentVersion> {
        previous_version(&self.load_history().await).cloned()
    }

    /// Set the status of one entry; `false` if the tag is not in the
    /// history. Marking an entry active demotes any other active entry.
    pub async fn mark_version_status(&self, build_tag: &str, status: VersionStatus) -> DeployResult<bool> {
        self.lock
            .run(async {
                let mut versions = self.load_history().await;
                let Some(index) = versions.iter().position(|v| v.build_tag == build_tag) else {
                    warn!("Version {} not found in history", build_tag);
                    return Ok(false);
                };

                if status == VersionStatus::Active {
                    demote_active(&mut versions, Some(index));
                }
                versions[index].status = status;

                self.save_history(versions).await?;
                debug!("Marked {} as {}", build_tag, status);
                Ok(true)
            })
            .await
    }

    /// Remove images of this bot that no history entry references. The
    /// `latest` alias is always kept.
    pub async fn cleanup_old_images(&self, bot_name: &str) -> DeployResult<usize> {
        let referenced: HashSet<String> = self
            .load_history()
            .await
            .into_iter()
            .map(|v| v.build_tag)
            .collect();
        let latest = format!("{}:latest", bot_name);
        let prefix = format!("{}:", bot_name);

        let mut removed = 0;
        for image in self.process.list_images().await? {
            if !image.starts_with(&prefix) || image == latest || referenced.contains(&image) {
                continue;
            }
            match self.process.remove_image(&image).await {
                Ok(()) => {
                    debug!("Removed image {}", image);
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove image {}: {}", image, e),
            }
        }
        if removed > 0 {
            info!("Removed {} unreferenced image(s)", removed);
        }
        Ok(removed)
    }
}

/// Demote every active entry except `keep` to `old`
fn demote_active(versions: &mut [DeploymentVersion], keep: Option<usize>) {
    for (i, version) in versions.iter_mut().enumerate() {
        if Some(i) == keep || version.status != VersionStatus::Active {
            continue;
        }
        if let Ok(next) = version.status.apply(VersionEvent::Superseded) {
            version.status = next;
        }
    }
}

/// First `old`/`rolled_back` entry after the active one. With no active
/// entry (the last deployment failed) the search starts at the top.
pub fn previous_version(versions: &[DeploymentVersion]) -> Option<&DeploymentVersion> {
    if versions.len() < 2 {
        return None;
    }
    let start = versions
        .iter()
        .position(|v| v.status == VersionStatus::Active)
        .map_or(0, |active| active + 1);
    versions[start..].iter().find(|v| v.status.is_restorable())
}
