use serde::{Deserialize, Serialize};

use super::{FsError, Object};
use crate::codec::BlockEncoded;
use crate::context::Context;
use crate::refs::{Ref, RefStore};
use crate::tree::Tree;

/// Upper bound on chunk size; the ref store's ceiling may force smaller chunks
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A file: chunk refs keyed by the big-endian end offset of each chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    size: u64,
    chunks: Tree,
}

fn chunk_key(end: u64) -> [u8; 8] {
    end.to_be_bytes()
}

fn parse_key(key: &[u8]) -> Result<u64, FsError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| FsError::CorruptIndex(format!("chunk key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

impl File {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// A new file holding `data`
    pub async fn write(ctx: &Context, refs: &RefStore, data: &[u8]) -> Result<File, FsError> {
        File::new().append(ctx, refs, data).await
    }

    /// A copy with `data` added at the end
    pub async fn append(&self, ctx: &Context, refs: &RefStore, data: &[u8]) -> Result<File, FsError> {
        let chunk_size = DEFAULT_CHUNK_SIZE.min(refs.max_plaintext_size());
        if chunk_size == 0 {
            return Err(anyhow::anyhow!("blob store too small to hold any file data").into());
        }

        let mut file = self.clone();
        for chunk in data.chunks(chunk_size) {
            let r = refs.post(ctx, chunk).await?;
            let end = file.size + chunk.len() as u64;
            file.chunks = file.chunks.put(ctx, refs, &chunk_key(end), r).await?;
            file.size = end;
        }
        Ok(file)
    }

    /// Up to `len` bytes from `offset`; short at end of file
    pub async fn read_at(
        &self,
        ctx: &Context,
        refs: &RefStore,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, FsError> {
        let end = self.size.min(offset.saturating_add(len as u64));
        let mut out = Vec::with_capacity(end.saturating_sub(offset) as usize);
        let mut pos = offset;

        while pos < end {
            // first chunk whose end offset lies past `pos`
            let entry = self
                .chunks
                .min_gt(ctx, refs, &chunk_key(pos))
                .await?
                .ok_or_else(|| FsError::CorruptIndex(format!("no chunk covers offset {}", pos)))?;
            let chunk_end = parse_key(&entry.key)?;
            let chunk = refs.get(ctx, &entry.r#ref).await?;

            let remaining = chunk_end - pos;
            let start = (chunk.len() as u64).checked_sub(remaining).ok_or_else(|| {
                FsError::CorruptIndex(format!(
                    "chunk ending at {} holds only {} bytes",
                    chunk_end,
                    chunk.len()
                ))
            })? as usize;
            let take = (end.min(chunk_end) - pos) as usize;
            out.extend_from_slice(&chunk[start..start + take]);
            pos += take as u64;
        }
        Ok(out)
    }

    pub async fn read_all(&self, ctx: &Context, refs: &RefStore) -> Result<Vec<u8>, FsError> {
        self.read_at(ctx, refs, 0, self.size as usize).await
    }

    pub(crate) async fn chunk_refs(&self, ctx: &Context, refs: &RefStore) -> Result<Vec<Ref>, FsError> {
        let entries = self.chunks.iter().collect(ctx, refs).await?;
        Ok(entries.into_iter().map(|e| e.r#ref).collect())
    }

    pub(crate) async fn fit(&self, ctx: &Context, refs: &RefStore) -> Result<File, FsError> {
        let max = refs.max_plaintext_size();
        let mut file = self.clone();
        while Object::File(file.clone()).encoded_len()? > max {
            file.chunks = file.chunks.split(ctx, refs, true).await?;
        }
        Ok(file)
    }
}

impl TryFrom<Object> for File {
    type Error = FsError;

    fn try_from(object: Object) -> Result<Self, Self::Error> {
        match object {
            Object::File(file) => Ok(file),
            other => Err(FsError::NotAFile(other.kind().to_string())),
        }
    }
}
