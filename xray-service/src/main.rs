use service_core::observability::init_tracing;
use xray_service::config::XrayConfig;
use xray_service::startup::Application;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = XrayConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "xray-service",
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        provider = ?config.provider,
        model = %config.models.vision_model,
        port = config.common.port,
        "Starting xray-service"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped().await
}
