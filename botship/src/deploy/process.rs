//! Process manager control for the deployed bot
//!
//! Dispatches to docker or systemd commands depending on the configured
//! deployment method. The container (or unit) carries the bot name; with
//! docker the compose file is expected to set `container_name` accordingly.

use std::sync::Arc;

use tracing::{debug, info};

use crate::deploy::compose::compose_up;
use crate::deploy::state::ProcessState;
use crate::deploy::{docker, systemd};
use crate::errors::{DeployError, DeployResult};
use crate::remote::RemoteChannel;
use crate::storage::layout::RemoteLayout;
use crate::storage::settings::DeploymentMethod;
use crate::version::tag::BuildTag;

#[derive(Clone)]
pub struct ProcessControl {
    channel: Arc<dyn RemoteChannel>,
    layout: RemoteLayout,
    method: DeploymentMethod,
    name: String,
    sudo: &'static str,
}

impl ProcessControl {
    pub fn new(
        channel: Arc<dyn RemoteChannel>,
        layout: RemoteLayout,
        method: DeploymentMethod,
        name: impl Into<String>,
        remote_user: &str,
    ) -> Self {
        Self {
            channel,
            layout,
            method,
            name: name.into(),
            sudo: systemd::privilege_prefix(remote_user),
        }
    }

    pub fn method(&self) -> DeploymentMethod {
        self.method
    }

    /// Container name or unit name, depending on the method
    pub fn instance_name(&self) -> String {
        match self.method {
            DeploymentMethod::Docker => self.name.clone(),
            DeploymentMethod::Systemd => systemd::unit_name(&self.name),
        }
    }

    fn latest_tag(&self) -> String {
        format!("{}:latest", self.name)
    }

    /// Query the process manager. Never cached.
    pub async fn query_state(&self) -> DeployResult<ProcessState> {
        match self.method {
            DeploymentMethod::Docker => {
                let output = self.channel.check(&docker::status_command(&self.name)).await?;
                Ok(docker::parse_status(&output.stdout))
            }
            DeploymentMethod::Systemd => {
                let unit = self.instance_name();
                let output = self.channel.exec(&systemd::status_command(&unit)).await?;
                Ok(systemd::parse_status(&output.stdout, &unit))
            }
        }
    }

    pub async fn is_running(&self) -> DeployResult<bool> {
        Ok(self.query_state().await?.running)
    }

    pub async fn stop(&self) -> DeployResult<()> {
        info!("Stopping {}", self.instance_name());
        let command = match self.method {
            DeploymentMethod::Docker => docker::stop_command(&self.name),
            DeploymentMethod::Systemd => systemd::stop_command(self.sudo, &self.instance_name()),
        };
        self.channel.check(&command).await.map(|_| ())
    }

    pub async fn start(&self) -> DeployResult<()> {
        info!("Starting {}", self.instance_name());
        let command = match self.method {
            DeploymentMethod::Docker => docker::start_command(&self.name),
            DeploymentMethod::Systemd => systemd::start_command(self.sudo, &self.instance_name()),
        };
        self.channel.check(&command).await.map(|_| ())
    }

    /// Stop (if needed) and remove the instance
    pub async fn remove(&self) -> DeployResult<()> {
        info!("Removing {}", self.instance_name());
        let command = match self.method {
            DeploymentMethod::Docker => docker::remove_command(&self.name),
            DeploymentMethod::Systemd => systemd::remove_command(self.sudo, &self.instance_name()),
        };
        self.channel.check(&command).await.map(|_| ())
    }

    /// Instances in a terminal state whose name contains the bot name
    pub async fn list_stale(&self) -> DeployResult<Vec<String>> {
        let command = match self.method {
            DeploymentMethod::Docker => docker::stale_command(),
            DeploymentMethod::Systemd => systemd::stale_command(),
        };
        let output = self.channel.check(&command).await?;
        let names = match self.method {
            DeploymentMethod::Docker => docker::parse_name_list(&output.stdout),
            DeploymentMethod::Systemd => systemd::parse_unit_list(&output.stdout),
        };
        Ok(names
            .into_iter()
            .filter(|n| n.contains(&self.name))
            .collect())
    }

    pub async fn remove_stale(&self, instance: &str) -> DeployResult<()> {
        debug!("Removing stale instance {}", instance);
        let command = match self.method {
            DeploymentMethod::Docker => docker::remove_stale_command(instance),
            DeploymentMethod::Systemd => systemd::reset_failed_command(self.sudo, instance),
        };
        self.channel.check(&command).await.map(|_| ())
    }

    /// Image tags in the bot's repository; always empty for systemd
    pub async fn list_images(&self) -> DeployResult<Vec<String>> {
        if self.method != DeploymentMethod::Docker {
            return Ok(Vec::new());
        }
        let output = self.channel.check(&docker::images_command(&self.name)).await?;
        Ok(output
            .lines()
            .filter(|tag| !tag.ends_with(":<none>"))
            .map(str::to_string)
            .collect())
    }

    pub async fn remove_image(&self, tag: &str) -> DeployResult<()> {
        self.channel
            .check(&docker::remove_image_command(tag))
            .await
            .map(|_| ())
    }

    /// Build (docker) or install (systemd) the files already transferred to
    /// the deployment root, then start them
    pub async fn launch(&self, tag: &BuildTag) -> DeployResult<()> {
        let root = self.layout.root();
        match self.method {
            DeploymentMethod::Docker => {
                info!("Building image {}", tag);
                self.channel
                    .check(&docker::build_command(root, &tag.to_string(), &self.latest_tag()))
                    .await?;
                compose_up(self.channel.as_ref(), root).await
            }
            DeploymentMethod::Systemd => {
                info!("Installing {}", self.instance_name());
                self.channel
                    .check(&systemd::install_command(self.sudo, root, &self.instance_name()))
                    .await
                    .map(|_| ())
            }
        }
    }

    /// Point `latest` back at an earlier image and start it
    pub async fn activate(&self, build_tag: &str) -> DeployResult<()> {
        if self.method != DeploymentMethod::Docker {
            return Err(DeployError::Validation(format!(
                "Rolling back images requires the docker deployment method (configured: {})",
                self.method
            )));
        }
        info!("Activating image {}", build_tag);
        self.channel
            .check(&docker::retag_command(build_tag, &self.latest_tag()))
            .await?;
        compose_up(self.channel.as_ref(), self.layout.root()).await
    }
}
