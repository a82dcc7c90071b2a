//! Client side of the text-completion service.
//!
//! The pipeline and the quality gate only see the `OracleClient` trait; the
//! concrete HTTP client lives in [`openai`].

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::OracleError;

pub use openai::OpenAiCompletionClient;

/// Marker that ends every generation: the closing code fence.
pub const STOP_SEQUENCE: &str = "```";

/// One completion request: a single prompt, a length cap and stop markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            stop: vec![STOP_SEQUENCE.to_string()],
        }
    }
}

/// Text completion. Output is not deterministic: the same prompt is expected
/// to yield a different generation on every call.
#[async_trait]
pub trait OracleClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError>;
}

#[async_trait]
impl OracleClient for Arc<dyn OracleClient> {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        (**self).complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_stops_at_closing_fence() {
        let req = CompletionRequest::new("write it", 2048);
        assert_eq!(req.stop, vec!["```".to_string()]);
        assert_eq!(req.max_tokens, 2048);
        assert_eq!(req.prompt, "write it");
    }
}
