use clap::Args;

use cellfs_daemon::state::{AppState, StateError};
use cellfs_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Directory for log files (default from config)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,

    /// Keep cells in memory only
    #[arg(long)]
    pub ephemeral: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let entity = state.load_entity()?;

        let cells_dir = if self.ephemeral {
            None
        } else {
            Some(state.cells_path.clone())
        };

        let config = ServiceConfig {
            entity,
            api_port: self.api_port.unwrap_or(state.config.api_port),
            cells_dir,
            log_level: state.config.log_level()?,
            log_dir: self.log_dir.clone().or(state.config.log_dir.clone()),
        };

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}
