//! HTTP API tests for the analysis endpoints.
//!
//! Run with: cargo test -p xray-service --test api_test

mod common;

use common::{fracture_output, spawn_app, spawn_app_with_config, PNG_DATA_URI};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::sync::Arc;
use xray_service::config::XrayConfig;
use xray_service::services::providers::mock::MockVisionProvider;
use xray_service::services::providers::ProviderError;

/// First bytes of a PNG file.
const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

#[tokio::test]
async fn analyze_returns_model_result() {
    let provider = Arc::new(MockVisionProvider::with_output(fracture_output()));
    let base = spawn_app(provider.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze", base))
        .json(&json!({ "photoUrl": PNG_DATA_URI }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, fracture_output());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn empty_photo_url_is_unprocessable() {
    let provider = Arc::new(MockVisionProvider::with_output(fracture_output()));
    let base = spawn_app(provider.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze", base))
        .json(&json!({ "photoUrl": "" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Validation error");
    assert!(body["details"].as_str().unwrap().contains("photoUrl"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let provider = Arc::new(MockVisionProvider::with_output(fracture_output()));
    let base = spawn_app(provider.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze", base))
        .header("content-type", "application/json")
        .body("{\"photoUrl\": ")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn empty_model_output_is_bad_gateway() {
    let provider = Arc::new(MockVisionProvider::empty());
    let base = spawn_app(provider.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze", base))
        .json(&json!({ "photoUrl": PNG_DATA_URI }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 502);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn provider_rate_limit_is_too_many_requests() {
    let provider = Arc::new(MockVisionProvider::failing(ProviderError::RateLimited));
    let base = spawn_app(provider.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze", base))
        .json(&json!({ "photoUrl": "https://example.com/scans/wrist.jpg" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 429);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn upload_png_is_analysed() {
    let provider = Arc::new(MockVisionProvider::with_output(fracture_output()));
    let base = spawn_app(provider.clone()).await;

    let form = Form::new().part(
        "file",
        Part::bytes(PNG_BYTES.to_vec())
            .file_name("wrist.png")
            .mime_str("image/png")
            .unwrap(),
    );

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["analysis"]["hasIssues"], true);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn upload_rejects_non_image_files() {
    let provider = Arc::new(MockVisionProvider::with_output(fracture_output()));
    let base = spawn_app(provider.clone()).await;

    let form = Form::new().part(
        "file",
        Part::bytes(b"patient notes".to_vec())
            .file_name("notes.txt")
            .mime_str("text/plain")
            .unwrap(),
    );

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn upload_without_file_is_bad_request() {
    let provider = Arc::new(MockVisionProvider::with_output(fracture_output()));
    let base = spawn_app(provider.clone()).await;

    let form = Form::new().text("comment", "left wrist");

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn upload_under_other_field_name_is_ignored() {
    let provider = Arc::new(MockVisionProvider::with_output(fracture_output()));
    let base = spawn_app(provider.clone()).await;

    let form = Form::new().part(
        "attachment",
        Part::bytes(PNG_BYTES.to_vec())
            .file_name("wrist.png")
            .mime_str("image/png")
            .unwrap(),
    );

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(provider.calls(), 0);
}

fn small_upload_config() -> XrayConfig {
    let mut config = XrayConfig::for_mock(0);
    config.upload.max_bytes = 1024;
    config
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let provider = Arc::new(MockVisionProvider::with_output(fracture_output()));
    let base = spawn_app_with_config(small_upload_config(), provider.clone()).await;

    let form = Form::new().part(
        "file",
        Part::bytes(vec![0u8; 8 * 1024])
            .file_name("chest.png")
            .mime_str("image/png")
            .unwrap(),
    );

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 413);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn oversized_json_body_is_payload_too_large() {
    let provider = Arc::new(MockVisionProvider::with_output(fracture_output()));
    let base = spawn_app_with_config(small_upload_config(), provider.clone()).await;

    // Well past the JSON limit derived from a 1KB upload limit
    let photo_url = format!("data:image/png;base64,{}", "A".repeat(16 * 1024));

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/analyze", base))
        .json(&json!({ "photoUrl": photo_url }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 413);
    assert_eq!(provider.calls(), 0);
}
