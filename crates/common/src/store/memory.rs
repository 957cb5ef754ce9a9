use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{locator, parse_locator, BlobStore, BlobStoreError, DEFAULT_MAX_BLOB_SIZE};
use crate::context::Context;

/// In-memory blob store.
///  Clones share the same backing map.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
    max_blob_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_blob_size(DEFAULT_MAX_BLOB_SIZE)
    }

    pub fn with_max_blob_size(max_blob_size: usize) -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
            max_blob_size,
        }
    }

    /// Number of distinct blobs held
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Overwrite a stored blob in place. Only useful for simulating a hostile backend.
    pub fn corrupt(&self, locator: &str, data: Bytes) {
        self.blobs.write().insert(locator.to_string(), data);
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn post(&self, ctx: &Context, prefix: &str, data: Bytes) -> Result<String, BlobStoreError> {
        ctx.check()?;
        if data.len() > self.max_blob_size {
            return Err(BlobStoreError::TooLarge {
                size: data.len(),
                max: self.max_blob_size,
            });
        }
        let locator = locator(prefix, &data)?;
        self.blobs.write().entry(locator.clone()).or_insert(data);
        Ok(locator)
    }

    async fn get(&self, ctx: &Context, locator: &str) -> Result<Option<Bytes>, BlobStoreError> {
        ctx.check()?;
        parse_locator(locator)?;
        Ok(self.blobs.read().get(locator).cloned())
    }

    async fn check(&self, ctx: &Context, locator: &str) -> Result<bool, BlobStoreError> {
        ctx.check()?;
        parse_locator(locator)?;
        Ok(self.blobs.read().contains_key(locator))
    }

    fn max_blob_size(&self) -> usize {
        self.max_blob_size
    }
}
