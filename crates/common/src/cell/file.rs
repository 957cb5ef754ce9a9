use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::{Cell, CellError, Context};

/// Cell stored as a whole file.
///  CAS is atomic against other users of this handle (and its clones) only;
///  another process writing the same file can still interleave.
#[derive(Debug, Clone)]
pub struct FileCell {
    path: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl FileCell {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<u8>, CellError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<(), CellError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir).await?;
        let tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tokio::fs::write(tmp.path(), data).await?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl Cell for FileCell {
    async fn get(&self, ctx: &Context) -> Result<Vec<u8>, CellError> {
        ctx.run(self.read()).await?
    }

    async fn cas(&self, ctx: &Context, current: &[u8], next: &[u8]) -> Result<bool, CellError> {
        let _guard = ctx.run(self.lock.lock()).await?;
        let value = self.read().await?;
        if value != current {
            return Ok(false);
        }
        self.write(next).await?;
        tracing::debug!(path = ?self.path, len = next.len(), "file cell updated");
        Ok(true)
    }

    fn id(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
