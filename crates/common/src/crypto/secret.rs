//! Symmetric authenticated encryption using XChaCha20-Poly1305
//!
//! A [`Secret`] seals one item: a blob behind a Ref, the payload of an ACL cell
//! write, or the bytes of a symmetric cell. The sealed format is
//! `nonce (24 bytes) || ciphertext || tag (16 bytes)`.
//!
//! Random nonces are drawn fresh for every seal. Convergent encryption derives
//! both the key and the nonce from the plaintext, so a (key, nonce) pair is only
//! ever reused for the identical message.

use std::ops::Deref;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use serde::{Deserialize, Serialize};

/// Size of an XChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 24;
/// Size of the Poly1305 tag in bytes
pub const TAG_SIZE: usize = 16;
/// Size of an XChaCha20-Poly1305 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;
/// Bytes added to a plaintext by [`Secret::seal`]
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

const CONVERGENT_NONCE_CONTEXT: &str = "cellfs 2024 convergent nonce";

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret error: {0}")]
    Default(#[from] anyhow::Error),
    /// The box failed authentication: wrong key or tampered bytes
    #[error("decryption failed")]
    Open,
}

/// A 256-bit symmetric key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret([u8; SECRET_SIZE]);

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl Default for Secret {
    fn default() -> Self {
        Secret([0; SECRET_SIZE])
    }
}

impl Deref for Secret {
    type Target = [u8; SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Secret {
    /// Generate a new random secret using a cryptographically secure RNG
    pub fn generate() -> Result<Self, SecretError> {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff)
            .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
        Ok(Self(buff))
    }

    /// Derive a convergent key: keyed BLAKE3 of the plaintext under `seed`
    pub fn convergent(seed: &Secret, data: &[u8]) -> Self {
        Self(*blake3::keyed_hash(seed, data).as_bytes())
    }

    /// Create a secret from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        if data.len() != SECRET_SIZE {
            return Err(anyhow::anyhow!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    pub fn from_hex(hex: &str) -> Result<Self, SecretError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; SECRET_SIZE];
        hex::decode_to_slice(hex, &mut buff).map_err(|_| anyhow::anyhow!("secret hex decode error"))?;
        Ok(buff.into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Seal `data` under a fresh random nonce
    pub fn seal(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;
        self.seal_with_nonce(data, &nonce)
    }

    /// Seal `data` under a nonce derived from the key.
    ///  Only safe when the key itself is unique to `data`, i.e. convergent keys.
    pub fn seal_convergent(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let derived = blake3::derive_key(CONVERGENT_NONCE_CONTEXT, &self.0);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&derived[..NONCE_SIZE]);
        self.seal_with_nonce(data, &nonce)
    }

    fn seal_with_nonce(&self, data: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>, SecretError> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(self.bytes()));
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(nonce), data)
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open a box produced by [`Secret::seal`] or [`Secret::seal_convergent`]
    ///
    /// # Errors
    ///
    /// Fails closed with [`SecretError::Open`] on a short input, a wrong key, or
    /// any tampering. No partial plaintext is ever returned.
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if data.len() < SEAL_OVERHEAD {
            return Err(SecretError::Open);
        }
        let cipher = XChaCha20Poly1305::new(Key::from_slice(self.bytes()));
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::Open)
    }
}
