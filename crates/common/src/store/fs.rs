use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::{locator, parse_locator, BlobStore, BlobStoreError, DEFAULT_MAX_BLOB_SIZE};
use crate::context::Context;

/// Blob store over a local directory.
///  Blobs live at `<root>/<prefix>/<hash[..2]>/<hash>`; writes go through a
///  temp file and a rename so a reader never sees a torn blob.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    max_blob_size: usize,
}

impl FsStore {
    pub async fn open(root: &Path) -> Result<Self, BlobStoreError> {
        Self::open_with_max_blob_size(root, DEFAULT_MAX_BLOB_SIZE).await
    }

    pub async fn open_with_max_blob_size(
        root: &Path,
        max_blob_size: usize,
    ) -> Result<Self, BlobStoreError> {
        tracing::debug!("FsStore::open called with path: {:?}", root);
        tokio::fs::create_dir_all(root).await?;
        Ok(Self {
            root: root.to_path_buf(),
            max_blob_size,
        })
    }

    fn path_for(&self, locator: &str) -> Result<PathBuf, BlobStoreError> {
        let (prefix, hash) = parse_locator(locator)?;
        Ok(self.root.join(prefix).join(&hash[..2]).join(hash))
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn post(&self, ctx: &Context, prefix: &str, data: Bytes) -> Result<String, BlobStoreError> {
        if data.len() > self.max_blob_size {
            return Err(BlobStoreError::TooLarge {
                size: data.len(),
                max: self.max_blob_size,
            });
        }
        let locator = locator(prefix, &data)?;
        let path = self.path_for(&locator)?;

        ctx.run(async {
            if tokio::fs::try_exists(&path).await? {
                return Ok::<_, std::io::Error>(());
            }
            let dir = path.parent().unwrap_or(&self.root);
            tokio::fs::create_dir_all(dir).await?;
            let tmp = tempfile::NamedTempFile::new_in(dir)?;
            tokio::fs::write(tmp.path(), &data).await?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await??;

        tracing::debug!(locator = %locator, size = data.len(), "posted blob");
        Ok(locator)
    }

    async fn get(&self, ctx: &Context, locator: &str) -> Result<Option<Bytes>, BlobStoreError> {
        let path = self.path_for(locator)?;
        match ctx.run(tokio::fs::read(&path)).await? {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn check(&self, ctx: &Context, locator: &str) -> Result<bool, BlobStoreError> {
        let path = self.path_for(locator)?;
        Ok(ctx.run(tokio::fs::try_exists(&path)).await??)
    }

    fn max_blob_size(&self) -> usize {
        self.max_blob_size
    }
}
