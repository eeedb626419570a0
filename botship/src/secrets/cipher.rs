//! Fernet encryption of secret values
//!
//! Values are encrypted with Fernet (AES-128-CBC + HMAC-SHA256, random IV).
//! A configured key that is not a valid Fernet key is treated as a
//! passphrase and stretched with PBKDF2-HMAC-SHA256, salted with the bot
//! name. That path exists for configurations written before keys were
//! generated with `botship secrets generate-key`; it logs a warning each
//! time it is taken.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use fernet::Fernet;
use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::warn;

use crate::errors::{DeployError, DeployResult};

pub const KDF_ITERATIONS: u32 = 100_000;

pub struct SecretCipher {
    fernet: Fernet,
}

impl SecretCipher {
    /// A fresh random Fernet key
    pub fn generate_key() -> SecretString {
        SecretString::from(Fernet::generate_key())
    }

    pub fn new(key: &SecretString, salt: &str) -> DeployResult<Self> {
        let key = key.expose_secret().trim();
        if key.is_empty() {
            return Err(DeployError::Encryption(
                "Encryption key is empty".to_string(),
            ));
        }

        if let Some(fernet) = Fernet::new(key) {
            return Ok(Self { fernet });
        }

        warn!(
            "Configured encryption key is not a Fernet key; deriving one from it as a passphrase. \
             Generate a proper key with `botship secrets generate-key`."
        );
        let derived = derive_key(key, salt);
        let fernet = Fernet::new(&derived).ok_or_else(|| {
            DeployError::Encryption("Failed to derive an encryption key".to_string())
        })?;
        Ok(Self { fernet })
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        self.fernet.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt(&self, token: &str) -> DeployResult<SecretString> {
        let bytes = self.fernet.decrypt(token.trim()).map_err(|_| {
            DeployError::Encryption("Invalid token or wrong encryption key".to_string())
        })?;
        let plaintext = String::from_utf8(bytes).map_err(|_| {
            DeployError::Encryption("Decrypted value is not valid UTF-8".to_string())
        })?;
        Ok(SecretString::from(plaintext))
    }
}

/// URL-safe base64 of PBKDF2-HMAC-SHA256(passphrase, salt), the encoding
/// Fernet expects for its 32-byte key
fn derive_key(passphrase: &str, salt: &str) -> String {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt.as_bytes(), KDF_ITERATIONS, &mut key);
    URL_SAFE.encode(key)
}
