use clap::Args;

use cellfs_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("bad status url: {0}")]
    Url(#[from] url::ParseError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        lines.push("Config:".to_string());
        match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                lines.push(format!("  directory:    {}", state.cellfs_dir.display()));
                lines.push("  config.toml:  OK".to_string());
                match state.load_entity() {
                    Ok(entity) => {
                        lines.push(format!("  entity.pem:   OK ({})", entity.public().to_hex()))
                    }
                    Err(e) => lines.push(format!("  entity.pem:   {}", e)),
                }
                lines.push(format!("  cells:        {}", state.cells_path.display()));
                lines.push(format!("  api_port:     {}", state.config.api_port));
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
            }
        }

        lines.push(String::new());
        lines.push(format!("Daemon ({}):", ctx.remote));

        for route in ["livez", "readyz"] {
            let url = ctx.status_url(route)?;
            match ctx.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    lines.push(format!("  {}: OK", route));
                }
                Ok(resp) => {
                    lines.push(format!("  {}: UNHEALTHY ({})", route, resp.status()));
                }
                Err(_) => {
                    lines.push(format!("  {}: NOT REACHABLE", route));
                }
            }
        }

        Ok(lines.join("\n"))
    }
}
