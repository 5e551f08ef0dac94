//! Credential encryption.
//!
//! AES-256-GCM with HKDF-SHA256 per-organization key derivation from a
//! single server-held master key. The key is supplied out-of-band
//! (environment or secret store); rotation is out of scope.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use uuid::Uuid;

use rostersync_core::{SyncError, SyncResult};

/// Length of AES-256 key in bytes.
const KEY_LENGTH: usize = 32;

/// Length of GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;

/// Length of GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// Context string for HKDF key derivation.
const HKDF_INFO: &[u8] = b"rostersync-registry-credentials-v1";

/// Encrypts and decrypts registry credentials.
///
/// Each organization gets its own derived key; the stored layout is
/// `nonce || ciphertext || tag`.
#[derive(Clone)]
pub struct CredentialCipher {
    master_key: [u8; KEY_LENGTH],
}

impl CredentialCipher {
    /// Create a cipher from a 32-byte master key.
    #[must_use]
    pub fn new(master_key: [u8; KEY_LENGTH]) -> Self {
        Self { master_key }
    }

    /// Create a cipher from a hex-encoded master key.
    pub fn from_hex(hex_key: &str) -> SyncResult<Self> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| SyncError::encryption(format!("invalid hex key: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Create a cipher from a base64-encoded master key.
    pub fn from_base64(base64_key: &str) -> SyncResult<Self> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let bytes = STANDARD
            .decode(base64_key)
            .map_err(|e| SyncError::encryption(format!("invalid base64 key: {e}")))?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(SyncError::encryption(format!(
                "key must be {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self::new(key))
    }

    /// Derive an organization-specific key using HKDF.
    fn derive_key(&self, organization_id: Uuid) -> [u8; KEY_LENGTH] {
        let hkdf = Hkdf::<Sha256>::new(Some(organization_id.as_bytes()), &self.master_key);
        let mut derived = [0u8; KEY_LENGTH];
        // 32 bytes is always a valid HKDF-SHA256 output length.
        hkdf.expand(HKDF_INFO, &mut derived)
            .expect("HKDF-SHA256 supports 32-byte output");
        derived
    }

    /// Encrypt a credential for one organization.
    pub fn encrypt(&self, organization_id: Uuid, plaintext: &[u8]) -> SyncResult<Vec<u8>> {
        let key = self.derive_key(organization_id);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| SyncError::encryption(format!("failed to create cipher: {e}")))?;

        use rand::rngs::OsRng;
        use rand::RngCore;
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| SyncError::encryption(format!("encryption failed: {e}")))?;

        let mut result = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt a credential for one organization.
    pub fn decrypt(&self, organization_id: Uuid, ciphertext: &[u8]) -> SyncResult<Vec<u8>> {
        if ciphertext.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(SyncError::decryption("ciphertext too short"));
        }

        let key = self.derive_key(organization_id);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| SyncError::decryption(format!("failed to create cipher: {e}")))?;

        let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, encrypted)
            .map_err(|e| SyncError::decryption(format!("decryption failed: {e}")))
    }

    /// Encrypt a string credential.
    pub fn encrypt_string(&self, organization_id: Uuid, plaintext: &str) -> SyncResult<Vec<u8>> {
        self.encrypt(organization_id, plaintext.as_bytes())
    }

    /// Decrypt to a string credential.
    pub fn decrypt_string(&self, organization_id: Uuid, ciphertext: &[u8]) -> SyncResult<String> {
        let plaintext = self.decrypt(organization_id, ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| SyncError::decryption(format!("decrypted data is not valid UTF-8: {e}")))
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}
