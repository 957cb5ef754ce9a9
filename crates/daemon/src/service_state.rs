use std::sync::Arc;

use common::prelude::PublicEntity;

use crate::cell_table::{CellTable, CellTableError};
use crate::ServiceConfig;

/// Shared state handed to every HTTP handler
#[derive(Debug, Clone)]
pub struct State {
    cells: Arc<CellTable>,
    identity: PublicEntity,
}

impl State {
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StateSetupError> {
        let cells = match &config.cells_dir {
            Some(dir) => CellTable::open(dir).await?,
            None => {
                tracing::warn!("no cells directory configured, cells will not survive a restart");
                CellTable::in_memory()
            }
        };
        Ok(Self::new(cells, config.entity.public()))
    }

    pub fn new(cells: CellTable, identity: PublicEntity) -> Self {
        Self {
            cells: Arc::new(cells),
            identity,
        }
    }

    pub fn cells(&self) -> &CellTable {
        &self.cells
    }

    pub fn identity(&self) -> &PublicEntity {
        &self.identity
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to open cell table: {0}")]
    CellTable(#[from] CellTableError),
}
