//! X-ray analysis pipeline: validate request, call the model once, validate output.

use crate::models::{AnalysisRequest, AnalysisResult};
use crate::schema::{self, SchemaError};
use crate::services::metrics;
use crate::services::prompt::render_prompt;
use crate::services::providers::{ProviderError, VisionProvider};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Schema validation failed: {0}")]
    SchemaValidation(#[from] SchemaError),

    #[error("Model returned no output")]
    EmptyModelOutput,

    #[error("Model invocation failed: {0}")]
    ModelInvocation(#[from] ProviderError),
}

impl AnalysisError {
    /// Outcome label for metrics.
    fn outcome(&self) -> &'static str {
        match self {
            AnalysisError::SchemaValidation(e) if e.boundary == schema::Boundary::Request => {
                "invalid_request"
            }
            AnalysisError::SchemaValidation(_) => "invalid_output",
            AnalysisError::EmptyModelOutput => "empty_output",
            AnalysisError::ModelInvocation(_) => "provider_error",
        }
    }
}

/// Runs one model call per analysed image.
///
/// Holds no state besides the injected provider, so clones are cheap and
/// concurrent calls are independent.
#[derive(Clone)]
pub struct AnalysisPipeline {
    provider: Arc<dyn VisionProvider>,
}

impl AnalysisPipeline {
    pub fn new(provider: Arc<dyn VisionProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn VisionProvider> {
        &self.provider
    }

    /// Validate an untyped caller value, then analyse it.
    pub async fn analyze_value(&self, input: &Value) -> Result<AnalysisResult, AnalysisError> {
        let request = schema::validate_request(input).inspect_err(|e| {
            tracing::info!(field = %e.field, reason = %e.reason, "Rejected analysis request");
            metrics::record_analysis("invalid_request");
        })?;
        self.analyze_image(request).await
    }

    /// Analyse one X-ray image.
    ///
    /// Makes exactly one provider call when the request is valid and none
    /// otherwise. Failures are never retried.
    #[tracing::instrument(
        skip(self, request),
        fields(request_id = tracing::field::Empty, media_kind = tracing::field::Empty)
    )]
    pub async fn analyze_image(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResult, AnalysisError> {
        let result = self.run(request).await;

        match &result {
            Ok(result) => {
                metrics::record_analysis("success");
                tracing::info!(
                    has_issues = result.analysis.has_issues,
                    confidence_score = result.analysis.confidence_score,
                    "Analysis completed"
                );
            }
            Err(e) => {
                metrics::record_analysis(e.outcome());
                tracing::warn!(error = %e, outcome = e.outcome(), "Analysis failed");
            }
        }

        result
    }

    async fn run(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());

        schema::check_request(&request)?;

        let prompt = render_prompt(&request).map_err(|e| SchemaError {
            boundary: schema::Boundary::Request,
            field: "photoUrl".to_string(),
            reason: format!("is not an image reference: {}", e),
        })?;
        let media_kind = if prompt.media().any(|m| m.is_inline()) {
            "inline"
        } else {
            "remote"
        };
        tracing::Span::current().record("media_kind", media_kind);

        let provider = self.provider.name();
        let model = self.provider.model().to_string();
        let output_schema = schema::analysis_result_schema();

        tracing::info!(
            request_id = %request_id,
            provider,
            model = %model,
            "Invoking vision model"
        );

        let started = Instant::now();
        let response = self.provider.generate(&prompt, &output_schema).await;
        metrics::record_provider_latency(provider, &model, started.elapsed().as_secs_f64());

        let response = response.inspect_err(|e| {
            metrics::record_provider_error(provider, e.kind());
        })?;

        metrics::record_tokens(&model, response.input_tokens, response.output_tokens);
        tracing::debug!(
            request_id = %request_id,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            finish_reason = response.finish_reason.as_str(),
            "Vision model responded"
        );

        let output = match response.output {
            None | Some(Value::Null) => return Err(AnalysisError::EmptyModelOutput),
            Some(output) => output,
        };

        Ok(schema::validate_response(&output)?)
    }
}
