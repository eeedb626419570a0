//! Secret store backed by the remote `.secrets.env.encrypted` file
//!
//! The whole file is rewritten atomically (mode 0600) on every change, under
//! the remote lock. Plaintext only exists in memory.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::errors::{DeployError, DeployResult};
use crate::remote::lock::RemoteLock;
use crate::remote::RemoteChannel;
use crate::secrets::cipher::SecretCipher;
use crate::secrets::format::{self, Entries};
use crate::storage::layout::RemoteLayout;

pub const SECRET_FILE_MODE: u32 = 0o600;

/// Placeholder shown instead of a value by `list_secrets`
pub const MASK: &str = "********";

pub struct SecretStore {
    channel: Arc<dyn RemoteChannel>,
    layout: RemoteLayout,
    cipher: Option<SecretCipher>,
    lock: Arc<RemoteLock>,
    bot_name: String,
}

impl SecretStore {
    /// `cipher` is `None` when no encryption key is configured; reads of an
    /// empty store still work in that case.
    pub fn new(
        channel: Arc<dyn RemoteChannel>,
        layout: RemoteLayout,
        cipher: Option<SecretCipher>,
        lock: Arc<RemoteLock>,
        bot_name: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            layout,
            cipher,
            lock,
            bot_name: bot_name.into(),
        }
    }

    pub fn generate_key() -> SecretString {
        SecretCipher::generate_key()
    }

    fn cipher(&self) -> DeployResult<&SecretCipher> {
        self.cipher.as_ref().ok_or_else(|| {
            DeployError::Validation(
                "No encryption key configured (set secrets.encryption_key or BOTSHIP_ENCRYPTION_KEY)"
                    .to_string(),
            )
        })
    }

    /// Current entries, still encrypted
    async fn read_entries(&self) -> DeployResult<Entries> {
        let content = self.channel.read_file(&self.layout.secrets_file()).await?;
        Ok(content
            .map(|c| format::parse_secret_file(&c))
            .unwrap_or_default())
    }

    async fn write_entries(&self, entries: &Entries) -> DeployResult<()> {
        let content = format::render_secret_file(&self.bot_name, entries);
        self.channel
            .write_file(content.as_bytes(), &self.layout.secrets_file(), SECRET_FILE_MODE)
            .await
    }

    /// Encrypt and store one secret, replacing any previous value
    pub async fn set_secret(&self, name: &str, value: &SecretString) -> DeployResult<()> {
        format::validate_name(name)?;
        let token = self.cipher()?.encrypt(value.expose_secret());

        self.lock
            .run(async {
                let mut entries = self.read_entries().await?;
                entries.upsert(name, token);
                self.write_entries(&entries).await
            })
            .await?;
        info!("Secret {} stored", name);
        Ok(())
    }

    /// Decrypt one secret. `None` if it is absent or cannot be decrypted.
    pub async fn get_secret(&self, name: &str) -> DeployResult<Option<SecretString>> {
        let entries = self.read_entries().await?;
        let Some(token) = entries.get(name) else {
            debug!("Secret {} not found", name);
            return Ok(None);
        };

        match self.cipher()?.decrypt(token) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Failed to decrypt secret {}: {}", name, e);
                Ok(None)
            }
        }
    }

    /// Secret names paired with a mask, or with the raw token if `reveal`
    pub async fn list_secrets(&self, reveal: bool) -> DeployResult<Vec<(String, String)>> {
        let entries = self.read_entries().await?;
        Ok(entries
            .iter()
            .map(|(name, token)| {
                let shown = if reveal { token } else { MASK };
                (name.to_string(), shown.to_string())
            })
            .collect())
    }

    /// `false` if no secret with that name exists
    pub async fn remove_secret(&self, name: &str) -> DeployResult<bool> {
        let removed = self
            .lock
            .run(async {
                let mut entries = self.read_entries().await?;
                if !entries.remove(name) {
                    return Ok(false);
                }
                self.write_entries(&entries).await?;
                Ok(true)
            })
            .await?;

        if removed {
            info!("Secret {} removed", name);
        } else {
            warn!("Secret {} not found", name);
        }
        Ok(removed)
    }

    /// Decrypt every secret. Entries that fail to decrypt are skipped.
    pub async fn load_all_decrypted(&self) -> DeployResult<Vec<(String, SecretString)>> {
        let entries = self.read_entries().await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let Some(cipher) = self.cipher.as_ref() else {
            warn!(
                "{} secret(s) stored but no encryption key configured; skipping them",
                entries.len()
            );
            return Ok(Vec::new());
        };

        let mut secrets = Vec::with_capacity(entries.len());
        for (name, token) in entries.iter() {
            match cipher.decrypt(token) {
                Ok(value) => secrets.push((name.to_string(), value)),
                Err(e) => warn!("Skipping secret {}: {}", name, e),
            }
        }
        Ok(secrets)
    }

    /// Encrypt every variable of a dotenv file in one rewrite. Returns the
    /// number of secrets written.
    pub async fn import_env(&self, dotenv: &str) -> DeployResult<usize> {
        let parsed = format::parse_dotenv(dotenv);
        if parsed.is_empty() {
            return Ok(0);
        }
        let cipher = self.cipher()?;
        let tokens: Vec<(String, String)> = parsed
            .iter()
            .map(|(name, value)| (name.to_string(), cipher.encrypt(value)))
            .collect();

        self.lock
            .run(async {
                let mut entries = self.read_entries().await?;
                for (name, token) in &tokens {
                    entries.upsert(name.as_str(), token.as_str());
                }
                self.write_entries(&entries).await
            })
            .await?;
        info!("Imported {} secret(s)", tokens.len());
        Ok(tokens.len())
    }
}
