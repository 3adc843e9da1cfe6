use anyhow::Context;

use campusstay_infra::config::{AppConfig, LogFormat};
use campusstay_observability::Format;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    campusstay_observability::init(match config.log_format {
        LogFormat::Json => Format::Json,
        LogFormat::Pretty => Format::Pretty,
    });
    tracing::info!(?config, "starting");

    let services = campusstay_api::app::services::build_services(&config).await?;
    let app = campusstay_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
