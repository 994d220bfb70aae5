use anyhow::{Context, Result};
use gatewatch_core::Config;
use tracing_subscriber::EnvFilter;

mod dbus_interface;
mod engine;

const BUS_NAME: &str = "org.gatewatch.Access1";
const OBJECT_PATH: &str = "/org/gatewatch/Access1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("gatewatchd starting");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(
        roster = %config.roster_path.display(),
        gallery = %config.gallery_path.display(),
        ledger = %config.ledger_path.display(),
        rejections = %config.rejections_path.display(),
        threshold = config.match_threshold,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(&config).context("failed to start engine")?;
    let service = dbus_interface::AccessService::new(engine);

    let system_bus = std::env::var("GATEWATCH_SYSTEM_BUS")
        .map(|v| v == "1")
        .unwrap_or(false);
    let builder = if system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = if system_bus { "system" } else { "session" }, name = BUS_NAME, "gatewatchd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("gatewatchd shutting down");

    Ok(())
}
