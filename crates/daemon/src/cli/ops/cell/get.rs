use clap::Args;

use common::cell::Cell as _;

use super::CellOpError;

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Cell to read
    pub name: String,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = CellOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (cell, cx) = super::open(ctx, &self.name)?;
        let value = cell.get(&cx).await?;
        Ok(render(&value))
    }
}

/// Text as-is, anything else as hex
fn render(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(text) => text.to_string(),
        Err(_) => format!("binary value ({} bytes): {}", value.len(), hex::encode(value)),
    }
}
