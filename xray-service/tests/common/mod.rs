//! Test helpers for xray-service integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use xray_service::config::XrayConfig;
use xray_service::services::providers::mock::MockVisionProvider;
use xray_service::startup::Application;

/// A tiny PNG header, enough to look like an image reference.
pub const PNG_DATA_URI: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAAB";

pub fn fracture_output() -> Value {
    json!({
        "analysis": {
            "hasIssues": true,
            "issues": "Fracture detected in left radius",
            "confidenceScore": 0.87
        }
    })
}

/// Spawn the application on a random port backed by `provider`.
pub async fn spawn_app(provider: Arc<MockVisionProvider>) -> String {
    spawn_app_with_config(XrayConfig::for_mock(0), provider).await
}

/// Spawn the application with a custom configuration.
pub async fn spawn_app_with_config(
    config: XrayConfig,
    provider: Arc<MockVisionProvider>,
) -> String {
    let app = Application::build_with_provider(config, provider)
        .await
        .expect("Failed to build application");

    let port = app.port();

    // Spawn the server in the background
    tokio::spawn(async move {
        let _ = app.run_until_stopped().await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{}", port)
}
