use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::errors::CoreError;

/// Argon2id parameters for key derivation.
/// Stored in every table header so they can be raised later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Number of iterations (default: 3)
    pub time_cost: u32,
    /// Degree of parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: 65_536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// A derived table key together with the salt and parameters it came from.
///
/// Argon2id is slow on purpose, so a table derives once when opened and
/// reuses the key for every commit of the run, with a fresh nonce each time.
pub struct SealedKey {
    key: [u8; 32],
    pub salt: [u8; 16],
    pub params: KdfParams,
}

impl std::fmt::Debug for SealedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedKey")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl SealedKey {
    /// Derive a key for a brand new table (fresh random salt).
    pub fn generate(password: &str, params: KdfParams) -> Result<Self, CoreError> {
        let salt = generate_salt()?;
        Self::derive(password, salt, params)
    }

    /// Re-derive the key of an existing table from its header.
    pub fn derive(password: &str, salt: [u8; 16], params: KdfParams) -> Result<Self, CoreError> {
        let key = derive_key(password, &salt, &params)?;
        Ok(Self { key, salt, params })
    }

    /// Encrypt with a fresh nonce. Returns `(nonce, ciphertext)`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<([u8; 12], Vec<u8>), CoreError> {
        let nonce = generate_nonce()?;
        let ciphertext = encrypt(plaintext, &self.key, &nonce)?;
        Ok((nonce, ciphertext))
    }

    pub fn open(&self, ciphertext: &[u8], nonce: &[u8; 12]) -> Result<Vec<u8>, CoreError> {
        decrypt(ciphertext, &self.key, nonce)
    }
}

/// Derive a 256-bit key from a password with Argon2id.
pub fn derive_key(password: &str, salt: &[u8; 16], params: &KdfParams) -> Result<[u8; 32], CoreError> {
    let argon2_params = Params::new(params.memory_cost, params.time_cost, params.parallelism, Some(32))
        .map_err(|e| CoreError::Encryption(format!("Invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CoreError::Encryption(format!("Argon2 key derivation failed: {e}")))?;

    Ok(key)
}

/// AES-256-GCM; the 16-byte tag is appended to the ciphertext.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32], nonce: &[u8; 12]) -> Result<Vec<u8>, CoreError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CoreError::Encryption(format!("Failed to create cipher: {e}")))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CoreError::Encryption(format!("Encryption failed: {e}")))
}

/// Fails with `CoreError::Decryption` on a wrong key or tampered data.
pub fn decrypt(ciphertext: &[u8], key: &[u8; 32], nonce: &[u8; 12]) -> Result<Vec<u8>, CoreError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CoreError::Encryption(format!("Failed to create cipher: {e}")))?;
    Ok(cipher.decrypt(Nonce::from_slice(nonce), ciphertext)?)
}

pub fn generate_salt() -> Result<[u8; 16], CoreError> {
    let mut salt = [0u8; 16];
    getrandom::getrandom(&mut salt)
        .map_err(|e| CoreError::Encryption(format!("Failed to generate random salt: {e}")))?;
    Ok(salt)
}

pub fn generate_nonce() -> Result<[u8; 12], CoreError> {
    let mut nonce = [0u8; 12];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| CoreError::Encryption(format!("Failed to generate random nonce: {e}")))?;
    Ok(nonce)
}
