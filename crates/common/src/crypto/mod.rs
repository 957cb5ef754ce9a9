//! Cryptographic primitives for cellfs
//!
//! - **Identity & Authentication**: an [`Entity`] holds an Ed25519 signing pair
//!   and an X25519 encryption pair. Signatures cover the SHA-256 digest of the
//!   canonical (bincode) serialization of the signed record.
//! - **Content Encryption**: XChaCha20-Poly1305 [`Secret`]s seal blobs, cell
//!   payloads and symmetric cells. Random nonces for mutable data, key-derived
//!   nonces for convergent blobs.
//! - **Key Sharing**: a per-write DEK is wrapped for every reader as a
//!   [`SecretShare`] using an ephemeral X25519 exchange and AES-KW.

mod keys;
mod secret;
mod secret_share;

pub use keys::{Entity, KeyError, PublicEntity, Signature, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use secret::{Secret, SecretError, NONCE_SIZE, SEAL_OVERHEAD, SECRET_SIZE, TAG_SIZE};
pub use secret_share::{SecretShare, SecretShareError, SECRET_SHARE_SIZE};
