//! The named cells this daemon serves
//!
//! Every read and swap goes through one lock, so the compare and the store of
//! a CAS can never interleave with another request. When a directory is
//! configured each cell is mirrored to `<dir>/<name>` before the swap is
//! acknowledged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::cell::CasResponse;
use tokio::sync::Mutex;

const MAX_NAME_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum CellTableError {
    #[error("invalid cell name: {0:?}")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct CellTable {
    cells: Mutex<HashMap<String, Vec<u8>>>,
    dir: Option<PathBuf>,
}

impl CellTable {
    /// A table that forgets everything on restart
    pub fn in_memory() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            dir: None,
        }
    }

    /// Open a table mirrored to `dir`, loading any cells already there
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, CellTableError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut cells = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_name(&name).is_err() || !entry.file_type().await?.is_file() {
                continue;
            }
            let value = tokio::fs::read(entry.path()).await?;
            cells.insert(name, value);
        }
        tracing::info!(dir = ?dir, cells = cells.len(), "opened cell table");

        Ok(Self {
            cells: Mutex::new(cells),
            dir: Some(dir),
        })
    }

    /// Current value, or `None` if the cell was never created
    pub async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, CellTableError> {
        validate_name(name)?;
        Ok(self.cells.lock().await.get(name).cloned())
    }

    /// Create the cell, or reset an existing one to empty
    pub async fn create(&self, name: &str) -> Result<(), CellTableError> {
        validate_name(name)?;
        let mut cells = self.cells.lock().await;
        self.persist(name, &[]).await?;
        if cells.insert(name.to_string(), Vec::new()).is_some() {
            tracing::warn!(cell = name, "cell reset to empty");
        }
        Ok(())
    }

    /// Store `next` iff the cell holds exactly `current`.
    ///  `None` if the cell was never created.
    pub async fn swap(
        &self,
        name: &str,
        current: &[u8],
        next: &[u8],
    ) -> Result<Option<CasResponse>, CellTableError> {
        validate_name(name)?;
        let mut cells = self.cells.lock().await;
        let Some(value) = cells.get_mut(name) else {
            return Ok(None);
        };
        if value.as_slice() != current {
            return Ok(Some(CasResponse {
                changed: false,
                current: value.clone(),
            }));
        }
        self.persist(name, next).await?;
        *value = next.to_vec();
        tracing::debug!(cell = name, len = next.len(), "cell swapped");
        Ok(Some(CasResponse {
            changed: true,
            current: next.to_vec(),
        }))
    }

    pub async fn len(&self) -> usize {
        self.cells.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether the backing directory (if any) is still reachable
    pub async fn is_ready(&self) -> bool {
        match &self.dir {
            Some(dir) => tokio::fs::metadata(dir).await.is_ok(),
            None => true,
        }
    }

    async fn persist(&self, name: &str, data: &[u8]) -> Result<(), CellTableError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        // temp names start with '.', which open() skips
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        tokio::fs::write(tmp.path(), data).await?;
        tmp.persist(dir.join(name)).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Names become file names, so keep them to a safe alphabet
fn validate_name(name: &str) -> Result<(), CellTableError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CellTableError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_swap_semantics() {
        let table = CellTable::in_memory();
        assert_eq!(table.get("root").await.unwrap(), None);
        assert_eq!(table.swap("root", b"", b"x").await.unwrap(), None);

        table.create("root").await.unwrap();
        assert_eq!(table.get("root").await.unwrap(), Some(Vec::new()));

        let won = table.swap("root", b"", b"one").await.unwrap().unwrap();
        assert!(won.changed);
        assert_eq!(won.current, b"one");

        let lost = table.swap("root", b"", b"two").await.unwrap().unwrap();
        assert!(!lost.changed);
        assert_eq!(lost.current, b"one");
        assert_eq!(table.get("root").await.unwrap().unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_create_resets() {
        let table = CellTable::in_memory();
        table.create("a").await.unwrap();
        table.swap("a", b"", b"full").await.unwrap();
        table.create("a").await.unwrap();
        assert_eq!(table.get("a").await.unwrap().unwrap(), b"");
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_names_are_checked() {
        let table = CellTable::in_memory();
        for bad in ["", ".hidden", "a/b", "../up", "sp ace"] {
            assert!(matches!(
                table.create(bad).await,
                Err(CellTableError::InvalidName(_))
            ));
        }
        table.create("vol-1_root.cell").await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_keeps_cells() {
        let temp = tempfile::TempDir::new().unwrap();
        {
            let table = CellTable::open(temp.path()).await.unwrap();
            table.create("kept").await.unwrap();
            table.swap("kept", b"", b"value").await.unwrap();
            table.create("empty").await.unwrap();
        }

        let table = CellTable::open(temp.path()).await.unwrap();
        assert_eq!(table.len().await, 2);
        assert_eq!(table.get("kept").await.unwrap().unwrap(), b"value");
        assert_eq!(table.get("empty").await.unwrap().unwrap(), b"");
        assert!(table.is_ready().await);
    }
}
