//! Source revision of the local deployment directory

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::version::tag::UNKNOWN_REVISION;

/// Short git revision of `local_dir`, or `unknown` if it is not a git
/// checkout or git is unavailable
pub async fn source_revision(local_dir: &Path) -> String {
    let output = Command::new("git")
        .current_dir(local_dir)
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if revision.is_empty() {
                UNKNOWN_REVISION.to_string()
            } else {
                revision
            }
        }
        Ok(output) => {
            debug!(
                "git rev-parse failed in {}: {}",
                local_dir.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            UNKNOWN_REVISION.to_string()
        }
        Err(e) => {
            debug!("Failed to run git: {}", e);
            UNKNOWN_REVISION.to_string()
        }
    }
}
