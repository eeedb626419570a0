//! Build tags
//!
//! A tag identifies one deployed artifact. It is generated once per
//! deployment and carried through to the history entry as a structured
//! value; the string form `{name}:v{timestamp}-{revision}` is only rendered
//! for the process manager and parsed back for CLI input or old history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::errors::DeployError;

/// Revision recorded when the source directory is not a git checkout
pub const UNKNOWN_REVISION: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildTag {
    pub name: String,
    pub timestamp: i64,
    pub source_revision: String,
}

impl BuildTag {
    pub fn new(name: impl Into<String>, timestamp: i64, source_revision: impl Into<String>) -> Self {
        let source_revision = source_revision.into();
        Self {
            name: name.into(),
            timestamp,
            source_revision: if source_revision.trim().is_empty() {
                UNKNOWN_REVISION.to_string()
            } else {
                source_revision.trim().to_string()
            },
        }
    }

    pub fn now(name: impl Into<String>, source_revision: impl Into<String>) -> Self {
        Self::new(name, Utc::now().timestamp(), source_revision)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

impl fmt::Display for BuildTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:v{}-{}", self.name, self.timestamp, self.source_revision)
    }
}

impl FromStr for BuildTag {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DeployError::Validation(format!("Invalid build tag: {}", s));

        let (name, version) = s.rsplit_once(":v").ok_or_else(invalid)?;
        let (timestamp, revision) = version.split_once('-').ok_or_else(invalid)?;
        if name.is_empty() || revision.is_empty() {
            return Err(invalid());
        }
        let timestamp = timestamp.parse::<i64>().map_err(|_| invalid())?;

        Ok(Self {
            name: name.to_string(),
            timestamp,
            source_revision: revision.to_string(),
        })
    }
}
