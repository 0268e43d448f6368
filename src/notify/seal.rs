//! Sealing of outbound notification bodies
//!
//! Notifications carry live coordinates, so sinks that leave the process
//! can wrap the JSON body in an AES-256-GCM envelope. Each envelope names
//! the key it was sealed with, which lets receivers keep old keys around
//! while a new one rolls out.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SealConfig;
use crate::error::{BeaconError, Result};

/// Sealed body as sent on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedPayload {
    pub key_id: String,

    /// Base64 96-bit nonce
    pub nonce: String,

    /// Base64 ciphertext with tag
    pub ciphertext: String,

    #[serde(default = "default_sealed")]
    pub sealed: bool,
}

fn default_sealed() -> bool {
    true
}

impl SealedPayload {
    pub fn is_sealed(value: &serde_json::Value) -> bool {
        value
            .get("sealed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// AES-256-GCM sealer keyed by id
///
/// Seals with the active key and opens with any registered key.
pub struct PayloadSealer {
    active_key_id: String,
    keys: HashMap<String, Aes256Gcm>,
}

impl std::fmt::Debug for PayloadSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSealer")
            .field("active_key_id", &self.active_key_id)
            .field("keys", &self.keys.len())
            .finish()
    }
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|_| {
        BeaconError::Encryption(format!(
            "Seal key must be 32 bytes, got {}",
            key.len()
        ))
    })
}

impl PayloadSealer {
    pub fn new(key_id: impl Into<String>, key: &[u8]) -> Result<Self> {
        let key_id = key_id.into();
        let mut keys = HashMap::new();
        keys.insert(key_id.clone(), cipher_for(key)?);
        Ok(Self {
            active_key_id: key_id,
            keys,
        })
    }

    /// Build from `[notifications.seal]`, decoding the base64 key
    pub fn from_config(config: &SealConfig) -> Result<Self> {
        let key = BASE64
            .decode(config.key.trim())
            .map_err(|e| BeaconError::Config(format!("Invalid seal key encoding: {}", e)))?;
        Self::new(config.key_id.clone(), &key)
    }

    /// Register an extra key for opening older envelopes
    pub fn add_key(&mut self, key_id: impl Into<String>, key: &[u8]) -> Result<()> {
        self.keys.insert(key_id.into(), cipher_for(key)?);
        Ok(())
    }

    pub fn active_key_id(&self) -> &str {
        &self.active_key_id
    }

    pub fn seal(&self, payload: &serde_json::Value) -> Result<serde_json::Value> {
        let plaintext = serde_json::to_vec(payload)?;
        let cipher = self.keys.get(&self.active_key_id).ok_or_else(|| {
            BeaconError::Encryption(format!("Active key '{}' not found", self.active_key_id))
        })?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| BeaconError::Encryption(format!("Sealing failed: {}", e)))?;

        let envelope = SealedPayload {
            key_id: self.active_key_id.clone(),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
            sealed: true,
        };
        Ok(serde_json::to_value(envelope)?)
    }

    pub fn open(&self, sealed: &serde_json::Value) -> Result<serde_json::Value> {
        let envelope: SealedPayload = serde_json::from_value(sealed.clone())?;
        let cipher = self.keys.get(&envelope.key_id).ok_or_else(|| {
            BeaconError::Encryption(format!("Key '{}' not registered", envelope.key_id))
        })?;

        let nonce_bytes = BASE64
            .decode(&envelope.nonce)
            .map_err(|e| BeaconError::Encryption(format!("Invalid nonce encoding: {}", e)))?;
        if nonce_bytes.len() != 12 {
            return Err(BeaconError::Encryption("Nonce must be 12 bytes".to_string()));
        }
        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .map_err(|e| BeaconError::Encryption(format!("Invalid ciphertext encoding: {}", e)))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| BeaconError::Encryption(format!("Opening failed: {}", e)))?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}
