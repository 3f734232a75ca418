//! Request and result records exchanged with the analysis pipeline.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// An image to analyse.
///
/// `photo_url` is either a remote `http(s)` URL or an embedded
/// `data:image/...;base64,...` URI. The pipeline passes it through to the
/// model provider without fetching or decoding the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[validate(
        length(min = 1, message = "must not be empty"),
        custom(function = "crate::schema::validate_image_reference")
    )]
    pub photo_url: String,
}

impl AnalysisRequest {
    pub fn new(photo_url: impl Into<String>) -> Self {
        Self {
            photo_url: photo_url.into(),
        }
    }
}

/// Structured findings returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis: Analysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// Whether the X-ray image shows any issues.
    pub has_issues: bool,

    /// Description of the issues found (or their absence).
    pub issues: String,

    /// Model's self-reported confidence, documented as 0-1.
    pub confidence_score: f64,
}

impl AnalysisResult {
    pub fn new(has_issues: bool, issues: impl Into<String>, confidence_score: f64) -> Self {
        Self {
            analysis: Analysis {
                has_issues,
                issues: issues.into(),
                confidence_score,
            },
        }
    }
}
