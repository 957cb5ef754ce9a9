use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use cellfs_daemon::state::AppState;

const DEFAULT_API_PORT: u16 = 5080;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolve the remote URL of the daemon.
///
/// Priority: explicit `--remote` flag > config file `api_port` > hardcoded 5080.
pub fn resolve_remote(
    explicit: Option<Url>,
    config_path: Option<PathBuf>,
) -> Result<Url, url::ParseError> {
    if let Some(url) = explicit {
        return Ok(url);
    }
    let port = AppState::load(config_path)
        .map(|state| state.config.api_port)
        .unwrap_or(DEFAULT_API_PORT);
    Url::parse(&format!("http://localhost:{}", port))
}

#[derive(Clone)]
pub struct OpContext {
    /// Base URL of the daemon
    pub remote: Url,
    /// Shared HTTP client
    pub client: reqwest::Client,
    /// Optional custom config path (defaults to ~/.cellfs)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(remote: Url, config_path: Option<PathBuf>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            remote,
            client,
            config_path,
        })
    }

    /// Endpoint of a named cell on the daemon
    pub fn cell_url(&self, name: &str) -> Result<Url, url::ParseError> {
        self.remote.join(&format!("/api/v0/cells/{}", name))
    }

    /// Endpoint of a status route on the daemon
    pub fn status_url(&self, route: &str) -> Result<Url, url::ParseError> {
        self.remote.join(&format!("/_status/{}", route))
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
