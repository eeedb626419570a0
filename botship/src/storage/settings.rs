//! Settings file management

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Environment variable that overrides `secrets.encryption_key`
pub const ENCRYPTION_KEY_ENV: &str = "BOTSHIP_ENCRYPTION_KEY";

/// Deployment settings, read from `botship.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub vps: VpsSettings,

    #[serde(default)]
    pub bot: BotSettings,

    #[serde(default)]
    pub secrets: SecretsSettings,

    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub deployment: DeploymentSettings,
}

impl Settings {
    /// Load settings from a JSON file and apply environment overrides
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            return Err(DeployError::Validation(format!(
                "Config file not found: {}",
                file.path().display()
            )));
        }
        let mut settings: Settings = file.read_json().await?;
        if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
            if !key.is_empty() {
                settings.secrets.encryption_key = Some(key);
            }
        }
        Ok(settings)
    }

    /// Check that the settings every command needs are present
    pub fn validate(&self) -> Result<(), DeployError> {
        let required = [
            ("vps.host", self.vps.host.as_str()),
            ("vps.user", self.vps.user.as_str()),
            ("bot.name", self.bot.name.as_str()),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(DeployError::Validation(format!(
                "Missing required configuration: {}",
                missing.join(", ")
            )));
        }
        if self.bot.name.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(DeployError::Validation(format!(
                "bot.name must not contain whitespace or '/': {:?}",
                self.bot.name
            )));
        }
        Ok(())
    }

    /// Resolve a dotted path such as `backup.retention_days`
    pub fn lookup(&self, dotted: &str) -> Option<serde_json::Value> {
        let root = serde_json::to_value(self).ok()?;
        dotted
            .split('.')
            .try_fold(root, |node, key| node.get(key).cloned())
            .filter(|v| !v.is_null())
    }

    /// The configured encryption key, if any
    pub fn encryption_key(&self) -> Option<SecretString> {
        self.secrets
            .encryption_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(SecretString::from)
    }

    /// Remote deployment root
    pub fn remote_dir(&self) -> String {
        if let Some(dir) = self.deployment.remote_dir.as_deref().filter(|d| !d.is_empty()) {
            return dir.trim_end_matches('/').to_string();
        }
        if self.vps.user == "root" {
            format!("/root/{}", self.bot.name)
        } else {
            format!("/home/{}/{}", self.vps.user, self.bot.name)
        }
    }
}

/// Remote host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpsSettings {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_user")]
    pub user: String,

    /// Path to the private key passed to ssh with `-i`
    #[serde(default)]
    pub ssh_key: Option<String>,

    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

impl Default for VpsSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: default_user(),
            ssh_key: None,
            port: default_ssh_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotSettings {
    #[serde(default)]
    pub name: String,
}

/// Secret store settings
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SecretsSettings {
    /// Fernet key, or a passphrase a key is derived from
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<String>,
}

impl fmt::Debug for SecretsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsSettings")
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Backup retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Take a backup before every deploy and rollback
    #[serde(default = "default_true")]
    pub auto_backup: bool,
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    7
}

fn default_max_backups() -> usize {
    10
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            max_backups: default_max_backups(),
            auto_backup: true,
        }
    }
}

/// How the bot process is managed on the remote host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMethod {
    #[default]
    Docker,
    Systemd,
}

impl fmt::Display for DeploymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMethod::Docker => write!(f, "docker"),
            DeploymentMethod::Systemd => write!(f, "systemd"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSettings {
    #[serde(default)]
    pub method: DeploymentMethod,

    #[serde(default)]
    pub remote_dir: Option<String>,

    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

fn default_max_history() -> usize {
    5
}

fn default_command_timeout() -> u64 {
    300
}

fn default_lock_timeout() -> u64 {
    60
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            method: DeploymentMethod::default(),
            remote_dir: None,
            max_history: default_max_history(),
            command_timeout_secs: default_command_timeout(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}
