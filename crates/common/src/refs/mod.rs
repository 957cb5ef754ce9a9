//! Encrypted, replicated blob references
//!
//! [`RefStore`] turns plaintext into a [`Ref`]: pad, seal, hash the ciphertext,
//! post it to every replica. Reading a `Ref` fetches the ciphertext, checks its
//! BLAKE3 against the hash recorded in the ref, opens it and strips the padding.
//! A blob that fails the hash check is treated as absent on that replica, so a
//! hostile or corrupted backend can only deny service, never substitute content.

mod reference;

use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};

use crate::codec::{BlockEncoded, CodecError};
use crate::context::{Cancelled, Context};
use crate::crypto::{Secret, SecretError, SEAL_OVERHEAD};
use crate::store::{BlobStore, BlobStoreError};

pub use reference::{BlobRef, EncryptionAlgo, Ref};

/// Default padding block in bytes
pub const DEFAULT_PADDING: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("ref error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blob store error: {0}")]
    Store(#[from] BlobStoreError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("blob not found on any replica: {0}")]
    NotFound(Ref),
    #[error("blob content hash mismatch at {0}")]
    HashMismatch(String),
    #[error("plaintext of {size} bytes exceeds ceiling {max}")]
    TooLarge { size: usize, max: usize },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// How blob keys are chosen
#[derive(Debug, Clone)]
pub enum KeyMode {
    /// Key = keyed BLAKE3(seed, plaintext); identical plaintexts dedup
    Convergent { seed: Secret },
    /// Fresh random key and nonce per post
    Random,
}

#[derive(Debug, Clone)]
pub struct RefStoreConfig {
    pub key_mode: KeyMode,
    /// Plaintext is zero-padded to a multiple of this many bytes; 0 or 1 disables
    pub padding: usize,
}

impl Default for RefStoreConfig {
    fn default() -> Self {
        Self {
            key_mode: KeyMode::Random,
            padding: DEFAULT_PADDING,
        }
    }
}

/// A replica: a backend plus the prefix blobs are posted under
#[derive(Debug, Clone)]
pub struct Replica {
    pub store: Arc<dyn BlobStore>,
    pub prefix: String,
}

impl Replica {
    pub fn new(store: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefStore {
    replicas: Arc<Vec<Replica>>,
    config: RefStoreConfig,
}

impl RefStore {
    /// A single-replica ref store
    pub fn new(store: Arc<dyn BlobStore>, config: RefStoreConfig) -> Self {
        Self {
            replicas: Arc::new(vec![Replica::new(store, "blocks")]),
            config,
        }
    }

    /// A ref store that mirrors every blob to each replica
    pub fn replicated(replicas: Vec<Replica>, config: RefStoreConfig) -> Result<Self, RefError> {
        if replicas.is_empty() {
            return Err(anyhow::anyhow!("a ref store needs at least one replica").into());
        }
        Ok(Self {
            replicas: Arc::new(replicas),
            config,
        })
    }

    pub fn config(&self) -> &RefStoreConfig {
        &self.config
    }

    /// Largest plaintext that still fits every replica once sealed and padded
    pub fn max_plaintext_size(&self) -> usize {
        let max_blob = self
            .replicas
            .iter()
            .map(|r| r.store.max_blob_size())
            .min()
            .unwrap_or(0);
        let room = max_blob.saturating_sub(SEAL_OVERHEAD);
        match self.config.padding {
            0 | 1 => room,
            block => room - room % block,
        }
    }

    fn pad(&self, data: &[u8]) -> Vec<u8> {
        let block = self.config.padding.max(1);
        let padded_len = data.len().div_ceil(block).max(1) * block;
        let mut padded = Vec::with_capacity(padded_len);
        padded.extend_from_slice(data);
        padded.resize(padded_len, 0);
        padded
    }

    /// Encrypt and post `data`, returning a ref to it
    pub async fn post(&self, ctx: &Context, data: &[u8]) -> Result<Ref, RefError> {
        let max = self.max_plaintext_size();
        if data.len() > max {
            return Err(RefError::TooLarge {
                size: data.len(),
                max,
            });
        }

        let padded = self.pad(data);
        let (key, ciphertext) = match &self.config.key_mode {
            KeyMode::Convergent { seed } => {
                let key = Secret::convergent(seed, data);
                let sealed = key.seal_convergent(&padded)?;
                (key, sealed)
            }
            KeyMode::Random => {
                let key = Secret::generate()?;
                let sealed = key.seal(&padded)?;
                (key, sealed)
            }
        };
        let hash = *blake3::hash(&ciphertext).as_bytes();
        let ciphertext = Bytes::from(ciphertext);

        let mut refs = Vec::with_capacity(self.replicas.len());
        let mut last_err = None;
        for replica in self.replicas.iter() {
            match replica
                .store
                .post(ctx, &replica.prefix, ciphertext.clone())
                .await
            {
                Ok(locator) => refs.push(Ref::Blob(BlobRef {
                    algo: EncryptionAlgo::XChaCha20Poly1305,
                    key: key.clone(),
                    locator,
                    length: data.len() as u64,
                    hash,
                })),
                Err(BlobStoreError::Cancelled(c)) => return Err(c.into()),
                Err(e) => {
                    tracing::warn!(prefix = %replica.prefix, "replica post failed: {}", e);
                    last_err = Some(e);
                }
            }
        }

        match (refs.len(), last_err) {
            (0, Some(e)) => Err(e.into()),
            (0, None) => Err(anyhow::anyhow!("no replicas accepted the blob").into()),
            (1, _) => Ok(refs.remove(0)),
            _ => Ok(Ref::Mirror(refs)),
        }
    }

    /// Fetch, verify and decrypt the blob behind `r`
    pub fn get<'a>(
        &'a self,
        ctx: &'a Context,
        r: &'a Ref,
    ) -> BoxFuture<'a, Result<Vec<u8>, RefError>> {
        async move {
            match r {
                Ref::Blob(blob) => self.get_blob(ctx, blob).await,
                Ref::Mirror(replicas) => {
                    for replica in replicas {
                        match self.get(ctx, replica).await {
                            Ok(data) => return Ok(data),
                            Err(RefError::Cancelled(c)) => return Err(c.into()),
                            Err(e) => {
                                tracing::warn!(replica = %replica, "mirror replica unreadable: {}", e)
                            }
                        }
                    }
                    Err(RefError::NotFound(r.clone()))
                }
            }
        }
        .boxed()
    }

    async fn get_blob(&self, ctx: &Context, blob: &BlobRef) -> Result<Vec<u8>, RefError> {
        let mut mismatch = false;
        let mut last_err = None;
        for replica in self.replicas_for(&blob.locator) {
            let ciphertext = match replica.store.get(ctx, &blob.locator).await {
                Ok(Some(ciphertext)) => ciphertext,
                Ok(None) => continue,
                Err(BlobStoreError::Cancelled(c)) => return Err(c.into()),
                Err(e) => {
                    tracing::warn!(locator = %blob.locator, prefix = %replica.prefix, "replica get failed: {}", e);
                    last_err = Some(e);
                    continue;
                }
            };
            if blake3::hash(&ciphertext).as_bytes() != &blob.hash {
                tracing::warn!(locator = %blob.locator, prefix = %replica.prefix, "blob failed content hash check");
                mismatch = true;
                continue;
            }
            let padded = match blob.algo {
                EncryptionAlgo::XChaCha20Poly1305 => blob.key.open(&ciphertext)?,
            };
            let length = blob.length as usize;
            if length > padded.len() {
                return Err(anyhow::anyhow!(
                    "ref length {} exceeds decrypted size {}",
                    length,
                    padded.len()
                )
                .into());
            }
            let mut plaintext = padded;
            plaintext.truncate(length);
            return Ok(plaintext);
        }

        match (mismatch, last_err) {
            (true, _) => Err(RefError::HashMismatch(blob.locator.clone())),
            (false, Some(e)) => Err(e.into()),
            (false, None) => Err(RefError::NotFound(Ref::Blob(blob.clone()))),
        }
    }

    /// Replicas in read order: the one the locator was posted under first
    fn replicas_for<'a>(&'a self, locator: &'a str) -> impl Iterator<Item = &'a Replica> + 'a {
        let owns = move |r: &&Replica| {
            locator
                .split_once('/')
                .is_some_and(|(prefix, _)| prefix == r.prefix)
        };
        self.replicas
            .iter()
            .filter(owns)
            .chain(self.replicas.iter().filter(move |r| !owns(r)))
    }

    pub async fn post_encoded<T: BlockEncoded>(&self, ctx: &Context, value: &T) -> Result<Ref, RefError> {
        self.post(ctx, &value.encode()?).await
    }

    pub async fn get_decoded<T: BlockEncoded>(&self, ctx: &Context, r: &Ref) -> Result<T, RefError> {
        let data = self.get(ctx, r).await?;
        Ok(T::decode(&data)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::MemoryStore;

    fn random_store(store: &MemoryStore) -> RefStore {
        RefStore::new(Arc::new(store.clone()), RefStoreConfig::default())
    }

    #[tokio::test]
    async fn test_post_get() {
        let ctx = Context::background();
        let store = MemoryStore::new();
        let refs = random_store(&store);

        let r = refs.post(&ctx, b"hello refs").await.unwrap();
        assert_eq!(r.len(), 10);
        assert_eq!(refs.get(&ctx, &r).await.unwrap(), b"hello refs");

        let empty = refs.post(&ctx, b"").await.unwrap();
        assert_eq!(refs.get(&ctx, &empty).await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_padding_hides_length() {
        let ctx = Context::background();
        let store = MemoryStore::new();
        let refs = random_store(&store);

        let r = refs.post(&ctx, &[7u8; 10]).await.unwrap();
        let Ref::Blob(blob) = &r else { panic!("expected blob ref") };
        let stored = store.get(&ctx, &blob.locator).await.unwrap().unwrap();
        assert_eq!(stored.len(), DEFAULT_PADDING + SEAL_OVERHEAD);
    }

    #[tokio::test]
    async fn test_convergent_dedups() {
        let ctx = Context::background();
        let store = MemoryStore::new();
        let seed = Secret::generate().unwrap();
        let refs = RefStore::new(
            Arc::new(store.clone()),
            RefStoreConfig {
                key_mode: KeyMode::Convergent { seed },
                padding: DEFAULT_PADDING,
            },
        );

        let a = refs.post(&ctx, b"same bytes").await.unwrap();
        let b = refs.post(&ctx, b"same bytes").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);

        // random keys never dedup
        let random = random_store(&store);
        let c = random.post(&ctx, b"same bytes").await.unwrap();
        let d = random.post(&ctx, b"same bytes").await.unwrap();
        assert_ne!(c, d);
    }

    #[tokio::test]
    async fn test_tampered_blob_rejected() {
        let ctx = Context::background();
        let store = MemoryStore::new();
        let refs = random_store(&store);

        let r = refs.post(&ctx, b"trust me").await.unwrap();
        let Ref::Blob(blob) = &r else { panic!("expected blob ref") };
        let mut stored = store.get(&ctx, &blob.locator).await.unwrap().unwrap().to_vec();
        stored[30] ^= 0x01;
        store.corrupt(&blob.locator, Bytes::from(stored));

        assert!(matches!(
            refs.get(&ctx, &r).await,
            Err(RefError::HashMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_mirror_survives_lost_replica() {
        let ctx = Context::background();
        let primary = MemoryStore::new();
        let backup = MemoryStore::new();
        let refs = RefStore::replicated(
            vec![
                Replica::new(Arc::new(primary.clone()), "primary"),
                Replica::new(Arc::new(backup.clone()), "backup"),
            ],
            RefStoreConfig::default(),
        )
        .unwrap();

        let r = refs.post(&ctx, b"replicated").await.unwrap();
        let Ref::Mirror(replicas) = &r else { panic!("expected mirror ref") };
        assert_eq!(replicas.len(), 2);
        assert_eq!(r.locators().len(), 2);

        // wipe the primary copy; the backup still serves it
        let Ref::Blob(first) = &replicas[0] else { panic!("expected blob ref") };
        primary.corrupt(&first.locator, Bytes::from_static(b"garbage"));
        assert_eq!(refs.get(&ctx, &r).await.unwrap(), b"replicated");
    }

    #[tokio::test]
    async fn test_too_large() {
        let ctx = Context::background();
        let store = MemoryStore::with_max_blob_size(1024);
        let refs = random_store(&store);
        let max = refs.max_plaintext_size();
        assert_eq!(max, 768);
        assert!(refs.post(&ctx, &vec![0u8; max]).await.is_ok());
        assert!(matches!(
            refs.post(&ctx, &vec![0u8; max + 1]).await,
            Err(RefError::TooLarge { .. })
        ));
    }
}
