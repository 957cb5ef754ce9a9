use serde::{Deserialize, Serialize};

use crate::codec::BlockEncoded;
use crate::crypto::Secret;

/// Cipher used to seal a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgo {
    XChaCha20Poly1305,
}

/// Everything needed to fetch, verify and open one blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub algo: EncryptionAlgo,
    pub key: Secret,
    /// Opaque, store-issued locator
    pub locator: String,
    /// Plaintext length; everything past it is padding
    pub length: u64,
    /// BLAKE3 of the stored ciphertext
    pub hash: [u8; 32],
}

/// A self-describing pointer to an immutable blob
///
/// A `Mirror` names several replicas of the same plaintext; readers try them in
/// order until one verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ref {
    Blob(BlobRef),
    Mirror(Vec<Ref>),
}

impl BlockEncoded for Ref {}

impl Ref {
    /// Plaintext length of the referenced blob
    pub fn len(&self) -> u64 {
        match self {
            Ref::Blob(blob) => blob.length,
            Ref::Mirror(replicas) => replicas.first().map(Ref::len).unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every locator reachable from this ref, replicas included
    pub fn locators(&self) -> Vec<&str> {
        match self {
            Ref::Blob(blob) => vec![blob.locator.as_str()],
            Ref::Mirror(replicas) => replicas.iter().flat_map(Ref::locators).collect(),
        }
    }
}

impl std::fmt::Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ref::Blob(blob) => write!(f, "{}", blob.locator),
            Ref::Mirror(replicas) => {
                write!(f, "mirror[")?;
                for (i, r) in replicas.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", r)?;
                }
                write!(f, "]")
            }
        }
    }
}
