//! Pre-deployment state detection
//!
//! Before a deployment proceeds the detector inspects the remote process
//! manager, removes leftovers from earlier incomplete runs, and decides
//! whether the new release may replace what is currently there. Deciding and
//! asking are separate steps: [`StateDetector::assess`] never prompts, and
//! [`StateDetector::check_before_deploy`] routes confirmation through a
//! [`Prompt`].

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::deploy::process::ProcessControl;
use crate::errors::DeployResult;
use crate::prompt::Prompt;

/// Health as reported by the process manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Health {
    Healthy,
    Unhealthy,
    Starting,
    NoHealthcheck,
    NotRunning,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Health::Healthy => "healthy",
            Health::Unhealthy => "unhealthy",
            Health::Starting => "starting",
            Health::NoHealthcheck => "no-healthcheck",
            Health::NotRunning => "not-running",
        };
        f.write_str(s)
    }
}

/// Snapshot of the deployed process, computed fresh on every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessState {
    pub exists: bool,
    pub running: bool,

    /// Raw status descriptor from the process manager
    pub status: String,
    pub uptime: Option<String>,
    pub health: Health,

    /// Image (docker) or unit name (systemd)
    pub image: Option<String>,
}

impl ProcessState {
    pub fn absent() -> Self {
        Self {
            exists: false,
            running: false,
            status: "not found".to_string(),
            uptime: None,
            health: Health::NotRunning,
            image: None,
        }
    }
}

/// Outcome of the pre-deployment check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployDecision {
    /// Nothing was deployed under this name
    ProceedClean,

    /// A previous instance was stopped and/or removed
    ProceedAfterStop,

    /// An instance is running; replacing it needs the caller's consent
    NeedsConfirmation { state: ProcessState },

    Abort,
}

impl DeployDecision {
    pub fn proceeds(&self) -> bool {
        matches!(
            self,
            DeployDecision::ProceedClean | DeployDecision::ProceedAfterStop
        )
    }
}

pub struct StateDetector {
    process: ProcessControl,
}

impl StateDetector {
    pub fn new(process: ProcessControl) -> Self {
        Self { process }
    }

    pub async fn get_process_state(&self) -> DeployResult<ProcessState> {
        self.process.query_state().await
    }

    /// Exited or never-started instances whose name contains the bot name
    pub async fn detect_stale_instances(&self) -> DeployResult<Vec<String>> {
        self.process.list_stale().await
    }

    /// Remove every stale instance. Failures are logged and skipped.
    pub async fn cleanup_stale_instances(&self) -> usize {
        let stale = match self.detect_stale_instances().await {
            Ok(stale) => stale,
            Err(e) => {
                warn!("Could not list stale instances: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for instance in &stale {
            match self.process.remove_stale(instance).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale instance {}: {}", instance, e),
            }
        }
        if removed > 0 {
            info!("Removed {} stale instance(s)", removed);
        }
        removed
    }

    /// Decide whether a deployment may proceed, without prompting.
    ///
    /// Stale instances are cleaned up unconditionally. A dead instance is
    /// removed. A running instance is stopped and removed only when `force`
    /// is set; otherwise the caller gets `NeedsConfirmation`.
    pub async fn assess(&self, force: bool) -> DeployResult<DeployDecision> {
        self.cleanup_stale_instances().await;

        let state = self.get_process_state().await?;
        if !state.exists {
            info!("No existing {} instance found", self.process.instance_name());
            return Ok(DeployDecision::ProceedClean);
        }

        if !state.running {
            info!(
                "Removing stopped {} instance ({})",
                self.process.instance_name(),
                state.status
            );
            self.remove_quietly().await;
            return Ok(DeployDecision::ProceedAfterStop);
        }

        if force {
            info!(
                "Force-stopping running {} instance",
                self.process.instance_name()
            );
            self.remove_quietly().await;
            return Ok(DeployDecision::ProceedAfterStop);
        }

        Ok(DeployDecision::NeedsConfirmation { state })
    }

    /// Apply the caller's answer to a `NeedsConfirmation` decision. Other
    /// decisions pass through unchanged.
    pub async fn resolve(&self, decision: DeployDecision, confirmed: bool) -> DeployDecision {
        match decision {
            DeployDecision::NeedsConfirmation { .. } if confirmed => {
                self.remove_quietly().await;
                DeployDecision::ProceedAfterStop
            }
            DeployDecision::NeedsConfirmation { .. } => DeployDecision::Abort,
            other => other,
        }
    }

    /// Full pre-deployment check; `true` means the deployment may proceed
    pub async fn check_before_deploy(&self, force: bool, prompt: &dyn Prompt) -> DeployResult<bool> {
        let decision = self.assess(force).await?;
        let decision = match &decision {
            DeployDecision::NeedsConfirmation { state } => {
                let question = format!(
                    "{} is running (status: {}, uptime: {}, health: {}). Stop it and deploy?",
                    self.process.instance_name(),
                    state.status,
                    state.uptime.as_deref().unwrap_or("unknown"),
                    state.health
                );
                let confirmed = prompt.confirm(&question);
                self.resolve(decision, confirmed).await
            }
            _ => decision,
        };

        if decision == DeployDecision::Abort {
            info!("Deployment aborted: existing instance left running");
        }
        Ok(decision.proceeds())
    }

    /// Remote failures here are not fatal: the deployment steps that follow
    /// report the underlying problem with more context.
    async fn remove_quietly(&self) {
        if let Err(e) = self.process.remove().await {
            warn!(
                "Failed to remove {} (continuing): {}",
                self.process.instance_name(),
                e
            );
        }
    }
}
