//! Docker Compose startup on the remote host

use tracing::{debug, info};

use crate::errors::{DeployError, DeployResult};
use crate::remote::RemoteChannel;
use crate::utils::shell_quote;

/// Bring the compose project in `root` up in detached mode.
///
/// Tries the `docker compose` plugin first and falls back to the standalone
/// `docker-compose` binary on hosts that only have the older tool.
pub async fn compose_up(channel: &dyn RemoteChannel, root: &str) -> DeployResult<()> {
    info!("Starting Docker Compose project in {}", root);
    let root = shell_quote(root);

    let plugin = channel
        .exec(&format!("cd {} && docker compose up -d --remove-orphans", root))
        .await?;
    if plugin.success() {
        return Ok(());
    }

    debug!("docker compose failed ({}), trying docker-compose...", plugin.detail());
    let standalone = channel
        .exec(&format!("cd {} && docker-compose up -d --remove-orphans", root))
        .await?;
    if !standalone.success() {
        return Err(DeployError::Command(format!(
            "Docker Compose failed: {}",
            standalone.detail()
        )));
    }
    Ok(())
}
