//! Content-addressed blob storage
//!
//! The core only needs the small capability in [`BlobStore`]: post bytes under a
//! prefix and get back a stable, content-derived locator; fetch by locator;
//! probe existence; report the largest blob the backend accepts.
//!
//! Backends shipped here are an in-memory map ([`MemoryStore`]) and a directory
//! tree ([`FsStore`]). Locators have the form `<prefix>/<blake3-hex>`.

mod fs;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::{Cancelled, Context};

pub use fs::FsStore;
pub use memory::MemoryStore;

/// Default ceiling on a single blob (256 KiB)
pub const DEFAULT_MAX_BLOB_SIZE: usize = 256 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("blobs store error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blob store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob of {size} bytes exceeds max blob size {max}")]
    TooLarge { size: usize, max: usize },
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Store `data` under `prefix`, returning its locator.
    ///  Posting identical bytes twice yields the same locator.
    async fn post(&self, ctx: &Context, prefix: &str, data: Bytes) -> Result<String, BlobStoreError>;

    /// Fetch a blob; `Ok(None)` if the store has never seen it
    async fn get(&self, ctx: &Context, locator: &str) -> Result<Option<Bytes>, BlobStoreError>;

    async fn check(&self, ctx: &Context, locator: &str) -> Result<bool, BlobStoreError>;

    fn max_blob_size(&self) -> usize;
}

/// Hex BLAKE3 of `data`, the content part of every locator
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

pub(crate) fn locator(prefix: &str, data: &[u8]) -> Result<String, BlobStoreError> {
    validate_prefix(prefix)?;
    Ok(format!("{}/{}", prefix, content_hash(data)))
}

fn validate_prefix(prefix: &str) -> Result<(), BlobStoreError> {
    let ok = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(BlobStoreError::InvalidLocator(prefix.to_string()))
    }
}

/// Split a locator into `(prefix, hash)`, rejecting anything malformed
pub(crate) fn parse_locator(locator: &str) -> Result<(&str, &str), BlobStoreError> {
    let (prefix, hash) = locator
        .split_once('/')
        .ok_or_else(|| BlobStoreError::InvalidLocator(locator.to_string()))?;
    validate_prefix(prefix).map_err(|_| BlobStoreError::InvalidLocator(locator.to_string()))?;
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BlobStoreError::InvalidLocator(locator.to_string()));
    }
    Ok((prefix, hash))
}
