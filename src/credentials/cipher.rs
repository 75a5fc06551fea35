//! Credential payload encryption
//!
//! Payloads are JSON objects sealed with AES-256-GCM. The stored form is
//! `base64(nonce || ciphertext || tag)`.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::{Map, Value};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce length for AES-GCM.
const NONCE_LEN: usize = 12;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;

/// Decryption service consumed by the credential provider
///
/// Implementations must be deterministic for a given ciphertext.
pub trait CredentialCipher: Send + Sync {
    /// Decrypt a stored payload into its key/value fields
    fn decrypt(&self, ciphertext: &str) -> Result<Map<String, Value>>;
}

/// Key material, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct CipherKey([u8; KEY_LEN]);

/// AES-256-GCM credential cipher
#[derive(Clone)]
pub struct AesGcmCipher {
    key: CipherKey,
    rng: SystemRandom,
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmCipher").field("key", &"[REDACTED]").finish()
    }
}

impl AesGcmCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key: CipherKey(key), rng: SystemRandom::new() }
    }

    /// Build from a base64 encoded 32 byte key
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| anyhow!("Credential key is not valid base64: {}", e))?;

        if raw.len() != KEY_LEN {
            let len = raw.len();
            raw.zeroize();
            return Err(anyhow!("Credential key must be {} bytes, got {}", KEY_LEN, len));
        }

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Self::new(key))
    }

    /// Generate a fresh random key, base64 encoded
    pub fn generate_key() -> Result<String> {
        let mut key = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| anyhow!("Failed to generate credential key"))?;
        let encoded = STANDARD.encode(key);
        key.zeroize();
        Ok(encoded)
    }

    fn sealing_key(&self) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key.0)
            .map_err(|_| anyhow!("Failed to create encryption key"))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// Encrypt a payload for storage
    pub fn encrypt(&self, fields: &Map<String, Value>) -> Result<String> {
        self.seal(serde_json::to_vec(fields)?)
    }

    /// Seal raw plaintext bytes into the stored form
    fn seal(&self, mut sealed: Vec<u8>) -> Result<String> {
        let key = self.sealing_key()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| anyhow!("Failed to generate nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut sealed)
            .map_err(|_| anyhow!("Encryption failed"))?;

        let mut out = nonce_bytes.to_vec();
        out.extend(sealed);
        Ok(STANDARD.encode(out))
    }
}

impl CredentialCipher for AesGcmCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<Map<String, Value>> {
        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| anyhow!("Credential payload is not valid base64"))?;

        if raw.len() < NONCE_LEN {
            return Err(anyhow!("Credential payload is truncated"));
        }

        let (nonce_bytes, encrypted) = raw.split_at(NONCE_LEN);
        let nonce_array: [u8; NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| anyhow!("Credential payload has an invalid nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_array);

        let key = self.sealing_key()?;
        let mut data = encrypted.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut data)
            .map_err(|_| anyhow!("Credential payload failed authentication"))?;

        let parsed = serde_json::from_slice::<Value>(plaintext);
        data.zeroize();

        let value = parsed.map_err(|_| anyhow!("Credential payload is not valid JSON"))?;

        match value {
            Value::Object(fields) => Ok(fields),
            _ => Err(anyhow!("Credential payload is not a JSON object")),
        }
    }
}
