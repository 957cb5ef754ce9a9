use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use super::acl::AclCell;
use super::{Cell, CellError, FileCell, HttpCell, MemoryCell, SymmetricCell};
use crate::crypto::{Entity, Secret};

/// Everything needed to open a cell, including the layers stacked on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellSpec {
    Memory { name: String },
    File { path: PathBuf },
    Http { url: Url },
    Symmetric { key: Secret, inner: Box<CellSpec> },
    Acl {
        inner: Box<CellSpec>,
        local_who: Box<CellSpec>,
    },
}

impl CellSpec {
    /// Stable name for deduplication. Keys show up only as a fingerprint.
    pub fn identity(&self) -> String {
        match self {
            CellSpec::Memory { name } => format!("memory:{}", name),
            CellSpec::File { path } => format!("file:{}", path.display()),
            CellSpec::Http { url } => url.to_string(),
            CellSpec::Symmetric { key, inner } => {
                let fingerprint = blake3::hash(key.bytes()).to_hex();
                format!("symmetric:{}:{}", &fingerprint[..16], inner.identity())
            }
            CellSpec::Acl { inner, local_who } => {
                format!("acl:{}:{}", inner.identity(), local_who.identity())
            }
        }
    }
}

/// Opens cells from specs and hands out one shared instance per identity.
///  Owned by whatever holds the filesystem; dropping it drops the cells.
#[derive(Debug)]
pub struct CellRegistry {
    entity: Option<Entity>,
    client: reqwest::Client,
    cells: Mutex<HashMap<String, Arc<dyn Cell>>>,
}

impl CellRegistry {
    /// `entity` is required only to open ACL cells
    pub fn new(entity: Option<Entity>) -> Self {
        Self {
            entity,
            client: reqwest::Client::new(),
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub fn open(&self, spec: &CellSpec) -> Result<Arc<dyn Cell>, CellError> {
        let identity = spec.identity();
        if let Some(cell) = self.cells.lock().get(&identity) {
            return Ok(cell.clone());
        }

        let cell: Arc<dyn Cell> = match spec {
            CellSpec::Memory { .. } => Arc::new(MemoryCell::new()),
            CellSpec::File { path } => Arc::new(FileCell::new(path)),
            CellSpec::Http { url } => Arc::new(HttpCell::with_client(url.clone(), self.client.clone())),
            CellSpec::Symmetric { key, inner } => {
                Arc::new(SymmetricCell::new(self.open(inner)?, key.clone()))
            }
            CellSpec::Acl { inner, local_who } => {
                let entity = self
                    .entity
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("opening an acl cell needs an entity"))?;
                Arc::new(AclCell::new(self.open(inner)?, self.open(local_who)?, entity))
            }
        };

        tracing::debug!(identity = %identity, "opened cell");
        Ok(self.cells.lock().entry(identity).or_insert(cell).clone())
    }

    /// Forget a cell; later opens build a fresh instance
    pub fn close(&self, spec: &CellSpec) -> bool {
        self.cells.lock().remove(&spec.identity()).is_some()
    }

    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.lock().is_empty()
    }
}
