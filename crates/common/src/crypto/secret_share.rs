//! Wrapping a DEK for one reader using ephemeral X25519 + AES Key Wrap
//!
//! To wrap a secret for a recipient:
//! 1. **Generate ephemeral keypair**: a fresh X25519 scalar per message
//! 2. **Perform ECDH**: ephemeral secret with the recipient's static encryption key
//! 3. **Derive KEK**: BLAKE3 derive-key over the shared point and both public keys
//! 4. **Wrap key**: AES-KW (RFC 3394) the DEK under the KEK
//! 5. **Package**: `ephemeral_pubkey || wrapped_secret`
//!
//! The recipient repeats the ECDH with their static secret and the ephemeral
//! public key. The sender's long-term identity never enters the exchange.

use std::convert::TryFrom;

use aes_kw::KekAes256 as Kek;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::keys::{Entity, PublicEntity, PUBLIC_KEY_SIZE};
use super::secret::{Secret, SecretError, SECRET_SIZE};

/// Size of AES Key Wrap integrity block in bytes
pub const KW_NONCE_SIZE: usize = 8;
/// Total size of a share in bytes
///
/// Layout: ephemeral_pubkey (32) || wrapped_secret (40) = 72 bytes
pub const SECRET_SHARE_SIZE: usize = PUBLIC_KEY_SIZE + SECRET_SIZE + KW_NONCE_SIZE;

const KEK_CONTEXT: &str = "cellfs 2024 dek wrap";

/// Errors that can occur during share creation or recovery
#[derive(Debug, thiserror::Error)]
pub enum SecretShareError {
    #[error("share error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

/// A DEK wrapped for exactly one recipient
///
/// # Wire Format
///
/// ```text
/// [ ephemeral_pubkey: 32 bytes ][ wrapped_secret: 40 bytes ]
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SecretShare(pub(crate) [u8; SECRET_SHARE_SIZE]);

impl Serialize for SecretShare {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretShare {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{Error, Visitor};
        use std::fmt;

        struct ShareVisitor;

        impl<'de> Visitor<'de> for ShareVisitor {
            type Value = SecretShare;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte array or sequence of SECRET_SHARE_SIZE")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: Error,
            {
                SecretShare::try_from(v).map_err(|_| {
                    E::invalid_length(v.len(), &format!("{} bytes", SECRET_SHARE_SIZE).as_str())
                })
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(SECRET_SHARE_SIZE);
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                SecretShare::try_from(bytes.as_slice()).map_err(|_| {
                    A::Error::invalid_length(
                        bytes.len(),
                        &format!("{} bytes", SECRET_SHARE_SIZE).as_str(),
                    )
                })
            }
        }

        // bytes for bincode, seq for JSON
        deserializer.deserialize_byte_buf(ShareVisitor)
    }
}

impl TryFrom<&[u8]> for SecretShare {
    type Error = SecretShareError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != SECRET_SHARE_SIZE {
            return Err(anyhow::anyhow!(
                "invalid share size, expected {}, got {}",
                SECRET_SHARE_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut share = [0u8; SECRET_SHARE_SIZE];
        share.copy_from_slice(bytes);
        Ok(SecretShare(share))
    }
}

fn derive_kek(
    shared: &[u8; 32],
    ephemeral: &X25519PublicKey,
    recipient: &X25519PublicKey,
) -> Kek {
    let mut material = Vec::with_capacity(3 * PUBLIC_KEY_SIZE);
    material.extend_from_slice(shared);
    material.extend_from_slice(ephemeral.as_bytes());
    material.extend_from_slice(recipient.as_bytes());
    Kek::from(blake3::derive_key(KEK_CONTEXT, &material))
}

impl SecretShare {
    /// Wrap `secret` so that only `recipient` can recover it
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG fails, the recipient's key is degenerate, or
    /// the key wrap fails.
    pub fn new(secret: &Secret, recipient: &PublicEntity) -> Result<Self, SecretShareError> {
        let mut scalar = [0u8; SECRET_SIZE];
        getrandom::getrandom(&mut scalar)
            .map_err(|e| anyhow::anyhow!("failed to generate ephemeral key: {}", e))?;
        let ephemeral_private = StaticSecret::from(scalar);
        let ephemeral_public = X25519PublicKey::from(&ephemeral_private);
        let recipient_public = recipient.encryption_key();

        let shared = ephemeral_private.diffie_hellman(&recipient_public);
        if !shared.was_contributory() {
            return Err(anyhow::anyhow!("recipient encryption key is degenerate").into());
        }

        let kek = derive_kek(shared.as_bytes(), &ephemeral_public, &recipient_public);
        let wrapped = kek
            .wrap_vec(secret.bytes())
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error"))?;

        if PUBLIC_KEY_SIZE + wrapped.len() != SECRET_SHARE_SIZE {
            return Err(anyhow::anyhow!("expected share size is incorrect").into());
        }

        let mut share = [0u8; SECRET_SHARE_SIZE];
        share[..PUBLIC_KEY_SIZE].copy_from_slice(ephemeral_public.as_bytes());
        share[PUBLIC_KEY_SIZE..].copy_from_slice(&wrapped);
        Ok(SecretShare(share))
    }

    /// Recover the wrapped secret with the recipient's private entity
    ///
    /// # Errors
    ///
    /// Fails if the share was made for a different recipient or was tampered with.
    pub fn recover(&self, recipient: &Entity) -> Result<Secret, SecretShareError> {
        let mut ephemeral_bytes = [0u8; PUBLIC_KEY_SIZE];
        ephemeral_bytes.copy_from_slice(&self.0[..PUBLIC_KEY_SIZE]);
        let ephemeral_public = X25519PublicKey::from(ephemeral_bytes);
        let recipient_public = recipient.public().encryption_key();

        let shared = recipient.encryption_secret().diffie_hellman(&ephemeral_public);
        let kek = derive_kek(shared.as_bytes(), &ephemeral_public, &recipient_public);
        let unwrapped = kek
            .unwrap_vec(&self.0[PUBLIC_KEY_SIZE..])
            .map_err(|_| anyhow::anyhow!("AES-KW unwrap error"))?;

        Ok(Secret::from_slice(&unwrapped)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}
