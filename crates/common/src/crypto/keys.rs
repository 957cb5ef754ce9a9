use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

pub use ed25519_dalek::Signature;

/// Size of an Ed25519 or X25519 private scalar in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of an Ed25519 or X25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

const ENTITY_PEM_TAG: &str = "CELLFS ENTITY";

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("signature verification failed")]
    BadSignature,
}

/// Public half of an [`Entity`]
///
/// Carries the Ed25519 verifying key used to check `Who`/`What` signatures and the
/// X25519 public key that DEKs are wrapped to. Entities are compared structurally;
/// there is no separate identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicEntity {
    signing: [u8; PUBLIC_KEY_SIZE],
    encryption: [u8; PUBLIC_KEY_SIZE],
}

impl PublicEntity {
    pub fn signing_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.signing
    }

    pub fn encryption_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.encryption
    }

    pub(crate) fn encryption_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(self.encryption)
    }

    /// Short hex fingerprint of the signing key, for logs
    pub fn to_hex(&self) -> String {
        hex::encode(&self.signing[..8])
    }

    /// Verify a signature produced by [`Entity::sign`]
    pub fn verify_sig(&self, data: &[u8], signature: &Signature) -> Result<(), KeyError> {
        let verifying_key = VerifyingKey::from_bytes(&self.signing)
            .map_err(|_| anyhow::anyhow!("invalid verifying key"))?;
        verifying_key
            .verify_strict(&digest(data), signature)
            .map_err(|_| KeyError::BadSignature)
    }
}

/// A private identity: an Ed25519 signing pair plus an X25519 encryption pair.
///
/// # Examples
///
/// ```ignore
/// let alice = Entity::generate();
/// let sig = alice.sign(b"payload");
/// alice.public().verify_sig(b"payload", &sig)?;
///
/// // Persist to PEM
/// let pem = alice.to_pem();
/// let recovered = Entity::from_pem(&pem)?;
/// ```
#[derive(Clone)]
pub struct Entity {
    signing: SigningKey,
    encryption: StaticSecret,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("public", &self.public().to_hex())
            .finish_non_exhaustive()
    }
}

impl Entity {
    /// Generate a new entity from the system RNG
    pub fn generate() -> Result<Self, KeyError> {
        let mut signing = [0u8; PRIVATE_KEY_SIZE];
        let mut encryption = [0u8; PRIVATE_KEY_SIZE];
        getrandom::getrandom(&mut signing)
            .and_then(|_| getrandom::getrandom(&mut encryption))
            .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
        Ok(Self::from_bytes(signing, encryption))
    }

    pub fn from_bytes(
        signing: [u8; PRIVATE_KEY_SIZE],
        encryption: [u8; PRIVATE_KEY_SIZE],
    ) -> Self {
        Self {
            signing: SigningKey::from_bytes(&signing),
            encryption: StaticSecret::from(encryption),
        }
    }

    /// Strip the private scalars
    pub fn public(&self) -> PublicEntity {
        PublicEntity {
            signing: self.signing.verifying_key().to_bytes(),
            encryption: X25519PublicKey::from(&self.encryption).to_bytes(),
        }
    }

    pub(crate) fn encryption_secret(&self) -> &StaticSecret {
        &self.encryption
    }

    /// Sign the SHA-256 digest of `data`
    pub fn sign(&self, data: &[u8]) -> Signature {
        self.signing.sign(&digest(data))
    }

    /// Encode both private scalars in PEM format
    pub fn to_pem(&self) -> String {
        let mut contents = Vec::with_capacity(2 * PRIVATE_KEY_SIZE);
        contents.extend_from_slice(&self.signing.to_bytes());
        contents.extend_from_slice(&self.encryption.to_bytes());
        pem::encode(&pem::Pem::new(ENTITY_PEM_TAG, contents))
    }

    /// Parse an entity from PEM format
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM is malformed, carries the wrong tag, or has the
    /// wrong length.
    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str).map_err(|e| anyhow::anyhow!("failed to parse PEM: {}", e))?;
        if pem.tag() != ENTITY_PEM_TAG {
            return Err(anyhow::anyhow!("invalid PEM tag, expected {}", ENTITY_PEM_TAG).into());
        }
        let contents = pem.contents();
        if contents.len() != 2 * PRIVATE_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid entity size in PEM, expected {}, got {}",
                2 * PRIVATE_KEY_SIZE,
                contents.len()
            )
            .into());
        }
        let mut signing = [0u8; PRIVATE_KEY_SIZE];
        let mut encryption = [0u8; PRIVATE_KEY_SIZE];
        signing.copy_from_slice(&contents[..PRIVATE_KEY_SIZE]);
        encryption.copy_from_slice(&contents[PRIVATE_KEY_SIZE..]);
        Ok(Self::from_bytes(signing, encryption))
    }
}

fn digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_public_is_stable() {
        let entity = Entity::generate().unwrap();
        assert_eq!(entity.public(), entity.public());
        assert_ne!(entity.public(), Entity::generate().unwrap().public());
    }

    #[test]
    fn test_pem_serialization() {
        let entity = Entity::generate().unwrap();
        let pem = entity.to_pem();
        let recovered = Entity::from_pem(&pem).unwrap();
        assert_eq!(entity.public(), recovered.public());

        let other = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![0u8; 64]));
        assert!(Entity::from_pem(&other).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let entity = Entity::generate().unwrap();
        let public = entity.public();
        let message = b"hello, world!".to_vec();
        let signature = entity.sign(&message);

        assert!(public.verify_sig(&message, &signature).is_ok());

        // flipping any byte of the data fails
        for i in 0..message.len() {
            let mut tampered = message.clone();
            tampered[i] ^= 0x01;
            assert!(public.verify_sig(&tampered, &signature).is_err());
        }

        // flipping any byte of the signature fails
        let sig_bytes = signature.to_bytes();
        for i in 0..sig_bytes.len() {
            let mut tampered = sig_bytes;
            tampered[i] ^= 0x01;
            let tampered = Signature::from_bytes(&tampered);
            assert!(public.verify_sig(&message, &tampered).is_err());
        }

        // wrong key fails
        let other = Entity::generate().unwrap().public();
        assert!(other.verify_sig(&message, &signature).is_err());
    }
}
