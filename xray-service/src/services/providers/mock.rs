//! Mock provider implementation for testing and local development.

use super::{FinishReason, ProviderError, ProviderResponse, VisionProvider};
use crate::services::prompt::Prompt;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Canned behaviour for a single call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Output(Value),
    Empty,
    Error(ProviderError),
}

/// Mock vision provider.
///
/// Replies are served from a queue; once it is drained the default reply is
/// repeated. Every call is counted.
pub struct MockVisionProvider {
    default_reply: MockReply,
    queued: Mutex<VecDeque<MockReply>>,
    calls: AtomicUsize,
}

impl MockVisionProvider {
    pub fn new(default_reply: MockReply) -> Self {
        Self {
            default_reply,
            queued: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always return `output`.
    pub fn with_output(output: Value) -> Self {
        Self::new(MockReply::Output(output))
    }

    /// Always return no output.
    pub fn empty() -> Self {
        Self::new(MockReply::Empty)
    }

    /// Always fail with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::new(MockReply::Error(error))
    }

    /// A plausible "no findings" result, used when the service runs with
    /// `GENAI_PROVIDER=mock`.
    pub fn healthy_scan() -> Self {
        Self::with_output(json!({
            "analysis": {
                "hasIssues": false,
                "issues": "No fractures or abnormalities detected.",
                "confidenceScore": 0.92
            }
        }))
    }

    /// Queue a reply for the next call, ahead of the default.
    pub fn push_reply(&self, reply: MockReply) {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(reply);
        }
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> MockReply {
        self.queued
            .lock()
            .ok()
            .and_then(|mut queued| queued.pop_front())
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-vision"
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        _output_schema: &Value,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let input_tokens = prompt.text_len() as i32 / 4;

        match self.next_reply() {
            MockReply::Output(output) => Ok(ProviderResponse {
                output: Some(output),
                input_tokens,
                output_tokens: 10,
                finish_reason: FinishReason::Complete,
            }),
            MockReply::Empty => Ok(ProviderResponse {
                output: None,
                input_tokens,
                output_tokens: 0,
                finish_reason: FinishReason::Complete,
            }),
            MockReply::Error(e) => Err(e),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
