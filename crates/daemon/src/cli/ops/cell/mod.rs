use std::time::Duration;

use clap::{Args, Subcommand};

pub mod get;
pub mod init;
pub mod set;

use common::cell::{CellError, HttpCell};
use common::context::Context;

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (Init, init::Init),
    (Get, get::Get),
    (Set, set::Set),
}

// Rename the generated Command to CellCommand for clarity
pub type CellCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Cell {
    #[command(subcommand)]
    pub command: CellCommand,
}

#[async_trait::async_trait]
impl Op for Cell {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

const CELL_OP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum CellOpError {
    #[error("bad cell url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Cell(#[from] CellError),
}

/// The named cell on the daemon, plus a context bounding the whole op
pub(crate) fn open(ctx: &OpContext, name: &str) -> Result<(HttpCell, Context), CellOpError> {
    let cell = HttpCell::with_client(ctx.cell_url(name)?, ctx.client.clone());
    Ok((cell, Context::with_timeout(CELL_OP_TIMEOUT)))
}
