use clap::Args;

use common::cell::retry::{self, DEFAULT_CAS_ATTEMPTS};

use super::CellOpError;

#[derive(Args, Debug, Clone)]
pub struct Set {
    /// Cell to write
    pub name: String,

    /// New value
    pub value: String,

    /// How many lost races to tolerate before giving up
    #[arg(long, default_value_t = DEFAULT_CAS_ATTEMPTS)]
    pub attempts: usize,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Set {
    type Error = CellOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (cell, cx) = super::open(ctx, &self.name)?;
        retry::write(&cx, &cell, self.value.as_bytes(), self.attempts).await?;
        Ok(format!("set {} ({} bytes)", self.name, self.value.len()))
    }
}
