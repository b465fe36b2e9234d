//! # Switchboard Node
//!
//! Hosts the demo services and the HTTP gateway over one in-process
//! broker. `RUST_LOG` controls verbosity; configuration comes from an
//! optional JSON file named by `SWITCHBOARD_CONFIG` plus individual
//! `SWITCHBOARD_*` environment overrides.
//!
//! ```text
//! $ switchboard
//! $ curl localhost:3000/api/inventory/items/42
//! {"id":42,"name":"Widget"}
//! ```

use anyhow::{Context, Result};
use switchboard_runtime::{demo, RuntimeConfig, SwitchboardRuntime};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = RuntimeConfig::load().context("failed to load configuration")?;
    let addr = config.gateway.socket_addr();

    let mut runtime = SwitchboardRuntime::new(config)?;
    demo::install_demo_services(&mut runtime);

    info!(%addr, "switchboard is up, press ctrl-c to stop");
    runtime
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
