use clap::Args;

use super::CellOpError;

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Cell to create (resets it if it exists)
    pub name: String,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = CellOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (cell, cx) = super::open(ctx, &self.name)?;
        cell.create(&cx).await?;
        Ok(format!("created cell {} at {}", self.name, cell.url()))
    }
}
