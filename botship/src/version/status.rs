//! Version status state machine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Status of one history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Currently deployed; at most one entry at a time
    Active,

    /// Superseded by a newer deployment
    Old,

    /// Deployment attempt did not complete
    Failed,

    /// Replaced by an explicit rollback
    RolledBack,
}

/// Transition trigger for a version status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionEvent {
    /// A newer deployment became active
    Superseded,

    /// The deployment was rolled away from
    RolledBack,

    /// An explicit rollback made this version current again
    Restored,
}

impl VersionStatus {
    /// Apply an event and return the new status
    pub fn apply(self, event: VersionEvent) -> Result<VersionStatus, String> {
        let next = match (self, event) {
            (VersionStatus::Active, VersionEvent::Superseded) => VersionStatus::Old,
            (VersionStatus::Active, VersionEvent::RolledBack) => VersionStatus::RolledBack,
            (VersionStatus::Old, VersionEvent::RolledBack) => VersionStatus::RolledBack,
            (VersionStatus::Old, VersionEvent::Restored) => VersionStatus::Active,
            (VersionStatus::RolledBack, VersionEvent::Restored) => VersionStatus::Active,

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };
        Ok(next)
    }

    /// Whether an explicit rollback may target a version in this status
    pub fn is_restorable(self) -> bool {
        matches!(self, VersionStatus::Old | VersionStatus::RolledBack)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VersionStatus::Active => "active",
            VersionStatus::Old => "old",
            VersionStatus::Failed => "failed",
            VersionStatus::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "active" => Ok(VersionStatus::Active),
            "old" => Ok(VersionStatus::Old),
            "failed" => Ok(VersionStatus::Failed),
            "rolled_back" => Ok(VersionStatus::RolledBack),
            other => Err(DeployError::Validation(format!(
                "Unknown version status: {}",
                other
            ))),
        }
    }
}
