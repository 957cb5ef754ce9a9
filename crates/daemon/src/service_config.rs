use std::path::PathBuf;

use common::prelude::Entity;

#[derive(Debug)]
pub struct Config {
    /// this node's identity, reported on the status routes
    pub entity: Entity,

    // http server configuration
    /// Port for the cell API server
    pub api_port: u16,

    // cell storage
    /// where served cells are mirrored to disk,
    ///  if not set then cells live in memory only
    pub cells_dir: Option<PathBuf>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}
