#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use tracing::info;
use workload_injector::{serve, AgentConfig};

fn init_tracing() {
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
    fmt.json().init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = AgentConfig::from_env()?;
    info!(bind = %config.bind_address, "starting agent");
    serve(config).await?;
    info!("agent stopped");
    Ok(())
}
