//! Content encryption at rest (spec §4.9)
//!
//! Each user gets their own AES-256-GCM key, derived from the engine's
//! master key via PBKDF2-HMAC-SHA256 with the `user_id` as salt (spec
//! §4.9: "per-user key derivation"). The derived key never leaves this
//! module and is zeroized on drop.

use crate::error::{MemoryError, Result};
use crate::model::{EncryptionMetadata, Memory};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypts/decrypts `Memory.content`. Implementations must be
/// deterministic about metadata: `encrypt` returns `None` metadata iff
/// the stored content is plaintext.
pub trait ContentCipher: Send + Sync {
    fn encrypt(&self, user_id: &str, plaintext: &str) -> Result<(String, Option<EncryptionMetadata>)>;
    fn decrypt(&self, user_id: &str, memory: &Memory) -> Result<String>;
}

/// No-op cipher for `encryption_enabled = false` deployments.
pub struct PlaintextCipher;

impl ContentCipher for PlaintextCipher {
    fn encrypt(&self, _user_id: &str, plaintext: &str) -> Result<(String, Option<EncryptionMetadata>)> {
        Ok((plaintext.to_string(), None))
    }

    fn decrypt(&self, _user_id: &str, memory: &Memory) -> Result<String> {
        Ok(memory.content.clone())
    }
}

/// AES-256-GCM field encryption with a PBKDF2-derived per-user key.
pub struct VaultCipher {
    master_key: Zeroizing<Vec<u8>>,
    iterations: u32,
}

impl VaultCipher {
    pub fn new(master_key: &str, iterations: u32) -> Self {
        Self {
            master_key: Zeroizing::new(master_key.as_bytes().to_vec()),
            iterations,
        }
    }

    fn derive_user_key(&self, user_id: &str) -> Zeroizing<[u8; 32]> {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(&self.master_key, user_id.as_bytes(), self.iterations, &mut key);
        Zeroizing::new(key)
    }
}

impl ContentCipher for VaultCipher {
    fn encrypt(&self, user_id: &str, plaintext: &str) -> Result<(String, Option<EncryptionMetadata>)> {
        let key = self.derive_user_key(user_id);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| MemoryError::Internal(format!("cipher init: {e}")))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| MemoryError::Internal(format!("encryption failed: {e}")))?;
        if sealed.len() < TAG_LEN {
            return Err(MemoryError::Internal("ciphertext shorter than auth tag".into()));
        }
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let b64 = base64::engine::general_purpose::STANDARD;
        Ok((
            b64.encode(ciphertext),
            Some(EncryptionMetadata {
                algorithm: "AES-256-GCM".to_string(),
                iv: b64.encode(nonce_bytes),
                auth_tag: b64.encode(tag),
            }),
        ))
    }

    fn decrypt(&self, user_id: &str, memory: &Memory) -> Result<String> {
        let Some(metadata) = &memory.encryption_metadata else {
            return Ok(memory.content.clone());
        };

        let b64 = base64::engine::general_purpose::STANDARD;
        let nonce_bytes = b64
            .decode(&metadata.iv)
            .map_err(|e| MemoryError::Corrupt { id: memory.id.clone(), reason: format!("bad iv: {e}") })?;
        let tag_bytes = b64
            .decode(&metadata.auth_tag)
            .map_err(|e| MemoryError::Corrupt { id: memory.id.clone(), reason: format!("bad auth tag: {e}") })?;
        let ciphertext = b64
            .decode(&memory.content)
            .map_err(|e| MemoryError::Corrupt { id: memory.id.clone(), reason: format!("bad ciphertext: {e}") })?;

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag_bytes);

        let key = self.derive_user_key(user_id);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| MemoryError::Internal(format!("cipher init: {e}")))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = cipher.decrypt(nonce, sealed.as_slice()).map_err(|_| MemoryError::Corrupt {
            id: memory.id.clone(),
            reason: "decryption failed: wrong key or corrupted data".into(),
        })?;

        String::from_utf8(plaintext)
            .map_err(|e| MemoryError::Corrupt { id: memory.id.clone(), reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryType;

    fn memory_with(content: String, metadata: Option<EncryptionMetadata>) -> Memory {
        Memory {
            id: "m1".into(),
            user_id: "u1".into(),
            character_id: None,
            conversation_id: None,
            content,
            content_hash: "h".into(),
            embedding: vec![0.0; crate::config::EMBEDDING_DIMS],
            importance_score: 0.5,
            emotional_weight: 0.0,
            decay_factor: 1.0,
            access_frequency: 0,
            semantic_cluster_id: None,
            memory_type: MemoryType::Fact,
            cross_character_shared: false,
            created_at: 0,
            updated_at: 0,
            last_accessed: 0,
            encryption_metadata: metadata,
        }
    }

    #[test]
    fn round_trips_plaintext() {
        let cipher = VaultCipher::new("master-key", 1000);
        let (ciphertext, metadata) = cipher.encrypt("u1", "hello there").unwrap();
        assert_ne!(ciphertext, "hello there");
        let metadata = metadata.unwrap();

        let memory = memory_with(ciphertext, Some(metadata));
        let plaintext = cipher.decrypt("u1", &memory).unwrap();
        assert_eq!(plaintext, "hello there");
    }

    #[test]
    fn wrong_user_key_fails_to_decrypt() {
        let cipher = VaultCipher::new("master-key", 1000);
        let (ciphertext, metadata) = cipher.encrypt("u1", "secret").unwrap();
        let memory = memory_with(ciphertext, metadata);
        assert!(cipher.decrypt("u2", &memory).is_err());
    }

    #[test]
    fn different_users_get_different_ciphertext_for_same_plaintext() {
        let cipher = VaultCipher::new("master-key", 1000);
        let (c1, _) = cipher.encrypt("u1", "same text").unwrap();
        let (c2, _) = cipher.encrypt("u2", "same text").unwrap();
        assert_ne!(c1, c2);
    }

    #[test]
    fn plaintext_cipher_is_transparent() {
        let cipher = PlaintextCipher;
        let (content, metadata) = cipher.encrypt("u1", "hello").unwrap();
        assert_eq!(content, "hello");
        assert!(metadata.is_none());

        let memory = memory_with("hello".into(), None);
        assert_eq!(cipher.decrypt("u1", &memory).unwrap(), "hello");
    }
}
