use bpbridge::server;
use bpbridge::server::AppState;
use bpbridge::BridgeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = BridgeConfig::from_env()?;
    log::info!("Health Pad bridge for {} devices", config.device_name);
    log::debug!("{config:?}");

    let app = AppState::new(&config);
    let device = app.device.clone();

    server::serve(config.bind, app, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("Shutting down");
    })
    .await?;

    device.disconnect().await;
    Ok(())
}
