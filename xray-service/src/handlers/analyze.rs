//! Analysis endpoints: JSON image reference or multipart file upload.

use crate::models::{AnalysisRequest, AnalysisResult};
use crate::schema::Boundary;
use crate::services::providers::ProviderError;
use crate::services::AnalysisError;
use crate::startup::AppState;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use service_core::error::AppError;

/// Upload field carrying the image.
const FILE_FIELD: &str = "file";

/// `POST /api/v1/analyze` with `{ "photoUrl": "..." }`.
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AnalysisResult>, AppError> {
    let Json(input) = payload.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(e.body_text())
        } else {
            AppError::BadRequest(anyhow::anyhow!("Json parse error: {}", e.body_text()))
        }
    })?;

    let result = state
        .pipeline
        .analyze_value(&input)
        .await
        .map_err(analysis_error_to_app_error)?;

    Ok(Json(result))
}

/// `POST /api/v1/analyze/upload` with a multipart `file` field.
///
/// The image is embedded as a base64 data URI and analysed. Other form
/// fields are ignored, and only the first `file` field is used.
pub async fn analyze_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResult>, AppError> {
    let mut photo_url = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("unnamed").to_string();
        let mime_type = image_mime_type(&file_name, field.content_type()).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "{}: only .png, .jpg and .jpeg images are accepted",
                file_name
            ))
        })?;

        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "{}: file is empty",
                file_name
            )));
        }

        tracing::info!(
            file_name = %file_name,
            mime_type,
            size = data.len(),
            "Received X-ray upload"
        );

        photo_url = Some(format!(
            "data:{};base64,{}",
            mime_type,
            general_purpose::STANDARD.encode(&data)
        ));
        break;
    }

    let photo_url = photo_url.ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "multipart form must contain an image in the '{}' field",
            FILE_FIELD
        ))
    })?;

    let result = state
        .pipeline
        .analyze_image(AnalysisRequest::new(photo_url))
        .await
        .map_err(analysis_error_to_app_error)?;

    Ok(Json(result))
}

/// Accept PNG and JPEG by extension, falling back to the declared content type.
fn image_mime_type(file_name: &str, content_type: Option<&str>) -> Option<&'static str> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => return Some("image/png"),
        Some("jpg") | Some("jpeg") => return Some("image/jpeg"),
        _ => {}
    }

    match content_type.map(|c| c.to_ascii_lowercase()).as_deref() {
        Some("image/png") => Some("image/png"),
        Some("image/jpeg") | Some("image/jpg") => Some("image/jpeg"),
        _ => None,
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(anyhow::anyhow!("Multipart error: {}", e.body_text()))
    }
}

/// Convert pipeline failures to HTTP errors.
pub fn analysis_error_to_app_error(error: AnalysisError) -> AppError {
    match error {
        AnalysisError::SchemaValidation(e) if e.boundary == Boundary::Request => {
            AppError::ValidationError(e.to_string())
        }
        AnalysisError::SchemaValidation(e) => {
            AppError::BadGateway(format!("model output failed validation: {}", e))
        }
        AnalysisError::EmptyModelOutput => {
            AppError::BadGateway("model returned no output".to_string())
        }
        AnalysisError::ModelInvocation(e) => match e {
            ProviderError::RateLimited => {
                AppError::TooManyRequests("Rate limited by AI provider".to_string(), None)
            }
            ProviderError::NotConfigured(msg) => AppError::ServiceUnavailable(msg),
            ProviderError::InvalidRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ProviderError::ContentFiltered => AppError::ValidationError(
                "Content was filtered by AI provider safety settings".to_string(),
            ),
            ProviderError::ApiError(msg) => {
                AppError::BadGateway(format!("Provider API error: {}", msg))
            }
            ProviderError::NetworkError(msg) => {
                AppError::BadGateway(format!("Network error: {}", msg))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaError;

    #[test]
    fn accepts_png_and_jpeg_uploads_only() {
        assert_eq!(image_mime_type("wrist.PNG", None), Some("image/png"));
        assert_eq!(image_mime_type("chest.jpeg", None), Some("image/jpeg"));
        assert_eq!(image_mime_type("scan", Some("image/jpeg")), Some("image/jpeg"));
        assert_eq!(image_mime_type("scan.gif", Some("image/gif")), None);
        assert_eq!(image_mime_type("notes.txt", Some("text/plain")), None);
    }

    #[test]
    fn request_and_response_schema_errors_map_differently() {
        let request_error = AnalysisError::SchemaValidation(SchemaError {
            boundary: Boundary::Request,
            field: "photoUrl".to_string(),
            reason: "is required".to_string(),
        });
        assert_eq!(
            analysis_error_to_app_error(request_error).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let response_error = AnalysisError::SchemaValidation(SchemaError {
            boundary: Boundary::Response,
            field: "analysis.issues".to_string(),
            reason: "is required".to_string(),
        });
        assert_eq!(
            analysis_error_to_app_error(response_error).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn provider_errors_map_to_gateway_statuses() {
        let cases = [
            (ProviderError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                ProviderError::NotConfigured("no key".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ProviderError::NetworkError("reset".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ProviderError::ApiError("500".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (ProviderError::ContentFiltered, StatusCode::UNPROCESSABLE_ENTITY),
            (
                ProviderError::InvalidRequest("image too small".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            let app_error = analysis_error_to_app_error(AnalysisError::ModelInvocation(error));
            assert_eq!(app_error.status_code(), status);
        }
        assert_eq!(
            analysis_error_to_app_error(AnalysisError::EmptyModelOutput).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
