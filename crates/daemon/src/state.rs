use std::{fs, path::PathBuf};

use common::prelude::Entity;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "cellfs";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "entity.pem";
pub const CELLS_DIR_NAME: &str = "cells";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the cell API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Where served cells are persisted (defaults to <cellfs dir>/cells)
    #[serde(default)]
    pub cells_dir: Option<PathBuf>,
    /// Default tracing level, overridable with RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily log files (stdout only if not set)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_api_port() -> u16 {
    5080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            cells_dir: None,
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        self.log_level
            .parse()
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the cellfs directory (~/.cellfs)
    pub cellfs_dir: PathBuf,
    /// Path to the entity PEM file
    pub key_path: PathBuf,
    /// Path to the served cells directory
    pub cells_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the cellfs directory path (custom or default ~/.cellfs)
    pub fn cellfs_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new cellfs state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let cellfs_dir = Self::cellfs_dir(custom_path)?;
        if cellfs_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&cellfs_dir)?;

        let config = config.unwrap_or_default();
        config.log_level()?;
        let cells_path = Self::cells_path_for(&cellfs_dir, &config);
        fs::create_dir_all(&cells_path)?;

        let entity = Entity::generate().map_err(|e| StateError::InvalidKey(e.to_string()))?;
        let key_path = cellfs_dir.join(KEY_FILE_NAME);
        fs::write(&key_path, entity.to_pem())?;

        let config_path = cellfs_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            cellfs_dir,
            key_path,
            cells_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the cellfs directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let cellfs_dir = Self::cellfs_dir(custom_path)?;
        if !cellfs_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = cellfs_dir.join(KEY_FILE_NAME);
        let config_path = cellfs_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        if !key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;
        let cells_path = Self::cells_path_for(&cellfs_dir, &config);

        Ok(Self {
            cellfs_dir,
            key_path,
            cells_path,
            config_path,
            config,
        })
    }

    /// Load this node's entity from the key file
    pub fn load_entity(&self) -> Result<Entity, StateError> {
        let pem = fs::read_to_string(&self.key_path)?;
        Entity::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))
    }

    fn cells_path_for(cellfs_dir: &std::path::Path, config: &AppConfig) -> PathBuf {
        config
            .cells_dir
            .clone()
            .unwrap_or_else(|| cellfs_dir.join(CELLS_DIR_NAME))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("cellfs directory not initialized. Run 'cellfs init' first")]
    NotInitialized,

    #[error("cellfs directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
