use std::path::PathBuf;

use clap::Args;

use cellfs_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Cell API server port
    #[arg(long, default_value_t = 5080)]
    pub api_port: u16,

    /// Where to persist served cells (defaults to <config dir>/cells)
    #[arg(long)]
    pub cells_dir: Option<PathBuf>,

    /// Default log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            api_port: self.api_port,
            cells_dir: self.cells_dir.clone(),
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        let entity = state.load_entity()?;

        Ok(format!(
            "Initialized cellfs directory at: {}\n\
             - Entity: {} ({})\n\
             - Cells: {}\n\
             - Config: {}\n\
             - API port: {}",
            state.cellfs_dir.display(),
            state.key_path.display(),
            entity.public().to_hex(),
            state.cells_path.display(),
            state.config_path.display(),
            state.config.api_port,
        ))
    }
}
