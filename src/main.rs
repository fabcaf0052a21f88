use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use hls_relay::{AppConfig, ApplicationServer, Logger, connect_registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards are kept alive to flush logs and maintain the sentry connection
    let _guards = Logger::init(config.cargo_env, config.sentry_dsn.clone());

    info!("logger and env prepped, wiring channel registry...");

    let (channels, redis) = connect_registry(&config).await?;

    info!("registry ok, starting proxy server...");

    ApplicationServer::serve(config, channels, redis)
        .await
        .context("proxy server failed to start")?;

    Ok(())
}
