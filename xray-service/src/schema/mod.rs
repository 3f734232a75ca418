//! Shape checks for the two boundaries of the analysis pipeline.
//!
//! Requests are checked when they arrive from the caller and model output is
//! checked before it is handed back. Both checks are pure and report the
//! offending field by its wire name (`photoUrl`, `analysis.confidenceScore`).

use crate::models::{Analysis, AnalysisRequest, AnalysisResult, MediaReference};
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Which side of the model call a value was checked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Request,
    Response,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Request => f.write_str("request"),
            Boundary::Response => f.write_str("response"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {boundary}: field '{field}' {reason}")]
pub struct SchemaError {
    pub boundary: Boundary,
    pub field: String,
    pub reason: String,
}

impl SchemaError {
    fn request(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            boundary: Boundary::Request,
            field: field.into(),
            reason: reason.into(),
        }
    }

    fn response(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            boundary: Boundary::Response,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

const ROOT: &str = "$";

/// Check an arbitrary caller-supplied value against the request shape.
pub fn validate_request(input: &Value) -> Result<AnalysisRequest, SchemaError> {
    let object = input
        .as_object()
        .ok_or_else(|| SchemaError::request(ROOT, format!("expected object, got {}", kind(input))))?;

    let photo_url = match object.get("photoUrl") {
        None | Some(Value::Null) => return Err(SchemaError::request("photoUrl", "is required")),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(SchemaError::request(
                "photoUrl",
                format!("expected string, got {}", kind(other)),
            ))
        }
    };

    let request = AnalysisRequest { photo_url };
    check_request(&request)?;
    Ok(request)
}

/// Apply the request content rules to an already-typed request.
pub fn check_request(request: &AnalysisRequest) -> Result<(), SchemaError> {
    request.validate().map_err(first_field_error)
}

/// Check model output against the result shape.
///
/// Only the types are enforced. A numeric `confidenceScore` outside 0-1 is
/// accepted and logged.
pub fn validate_response(output: &Value) -> Result<AnalysisResult, SchemaError> {
    let root = output.as_object().ok_or_else(|| {
        SchemaError::response(ROOT, format!("expected object, got {}", kind(output)))
    })?;

    let analysis_value = required(root, "analysis", "analysis")?;
    let analysis = analysis_value
        .as_object()
        .ok_or_else(|| wrong_type("analysis", "object", analysis_value))?;

    let has_issues = match required(analysis, "hasIssues", "analysis.hasIssues")? {
        Value::Bool(b) => *b,
        other => return Err(wrong_type("analysis.hasIssues", "boolean", other)),
    };

    let issues = match required(analysis, "issues", "analysis.issues")? {
        Value::String(s) => s.clone(),
        other => return Err(wrong_type("analysis.issues", "string", other)),
    };

    let confidence_score = match required(analysis, "confidenceScore", "analysis.confidenceScore")?
    {
        Value::Number(n) => n.as_f64().ok_or_else(|| {
            SchemaError::response("analysis.confidenceScore", "is not representable as f64")
        })?,
        other => return Err(wrong_type("analysis.confidenceScore", "number", other)),
    };

    if !(0.0..=1.0).contains(&confidence_score) {
        tracing::warn!(
            confidence_score,
            "Model returned confidence score outside the documented 0-1 range"
        );
    }

    Ok(AnalysisResult {
        analysis: Analysis {
            has_issues,
            issues,
            confidence_score,
        },
    })
}

/// Output schema declared to the model, in the OpenAPI subset Gemini accepts.
pub fn analysis_result_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "analysis": {
                "type": "object",
                "properties": {
                    "hasIssues": {
                        "type": "boolean",
                        "description": "Whether or not the X-ray image shows any issues."
                    },
                    "issues": {
                        "type": "string",
                        "description": "The description of the issues found in the X-ray image."
                    },
                    "confidenceScore": {
                        "type": "number",
                        "description": "The confidence score of the analysis (0-1)."
                    }
                },
                "required": ["hasIssues", "issues", "confidenceScore"]
            }
        },
        "required": ["analysis"]
    })
}

/// `validator` hook for `AnalysisRequest::photo_url`.
pub fn validate_image_reference(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        // Reported by the length rule.
        return Ok(());
    }

    MediaReference::parse(value).map(|_| ()).map_err(|e| {
        let mut error = ValidationError::new("image_reference");
        error.message = Some(format!("is not an image reference: {}", e).into());
        error
    })
}

fn required<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Value, SchemaError> {
    match object.get(key) {
        None | Some(Value::Null) => Err(SchemaError::response(path, "is required")),
        Some(value) => Ok(value),
    }
}

fn wrong_type(path: &str, expected: &str, actual: &Value) -> SchemaError {
    SchemaError::response(path, format!("expected {}, got {}", expected, kind(actual)))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn first_field_error(errors: ValidationErrors) -> SchemaError {
    let mut fields: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let reason = errs
                .first()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => e.code.to_string(),
                })
                .unwrap_or_else(|| "is invalid".to_string());
            (wire_name(&field.to_string()), reason)
        })
        .collect();
    fields.sort();

    match fields.into_iter().next() {
        Some((field, reason)) => SchemaError::request(field, reason),
        None => SchemaError::request(ROOT, errors.to_string()),
    }
}

/// `photo_url` -> `photoUrl`.
fn wire_name(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
