//! Model provider trait and the OpenAI-compatible implementation.

pub mod http;
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::TernConfig;
use crate::error::TernError;
use crate::types::{GenerationSettings, ModelMessage, TextStreamDelta};
use crate::types::{AgentToolCall, FinishReason, Usage};

/// A request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<ModelMessage>,
    pub settings: GenerationSettings,
    pub tools: Option<Vec<ToolDefinition>>,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Response from a provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: Option<Usage>,
    pub tool_calls: Vec<AgentToolCall>,
    pub finish_reason: Option<FinishReason>,
}

/// Core trait implemented by model providers.
///
/// Both request protocols funnel through the same delta-source shape: a
/// provider either streams natively via [`stream_text`](Self::stream_text) or
/// reports `supports_streaming() == false`, in which case the runtime wraps a
/// blocking completion as a single-fragment stream. Either way the consumer
/// pulls fragments from one `BoxStream`.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Whether the provider implements an incremental streaming protocol.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Generate text (non-streaming).
    async fn generate_text(&self, request: &ProviderRequest)
        -> Result<ProviderResponse, TernError>;

    /// Generate text (streaming).
    async fn stream_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<TextStreamDelta, TernError>>, TernError>;
}

impl std::fmt::Debug for dyn ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider")
            .field("model_id", &self.model_id())
            .finish_non_exhaustive()
    }
}

/// Create a provider for the given model identifier, using the provided config.
///
/// The API key is resolved here, once, at agent-build time. A missing key or
/// an empty model id is a configuration error, not a runtime condition.
pub fn create_provider(
    model_id: &str,
    config: &TernConfig,
) -> Result<Box<dyn ModelProvider>, TernError> {
    let model_id = model_id.trim();
    if model_id.is_empty() {
        return Err(TernError::Configuration("empty model identifier".into()));
    }

    let api_key = config
        .get_api_key("openai")
        .ok_or_else(|| TernError::Configuration("missing API key (set TERN_API_KEY)".into()))?;

    Ok(Box::new(openai::OpenAiProvider::new(
        model_id.to_string(),
        api_key,
        config.get_base_url("openai"),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_fails_without_api_key() {
        let config = TernConfig::new();
        let err = create_provider("gpt-4o-mini", &config).unwrap_err();
        assert!(err.is_configuration());
        assert!(!err.to_string().contains("sk-"), "no key material in errors");
    }

    #[test]
    fn create_provider_rejects_empty_model_id() {
        let config = TernConfig::new();
        config.set_api_key("openai", "sk-test".to_string());
        let err = create_provider("   ", &config).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn create_provider_binds_model_id() {
        let config = TernConfig::new();
        config.set_api_key("openai", "sk-test".to_string());
        let provider = create_provider("gpt-4o-mini", &config).unwrap();
        assert_eq!(provider.model_id(), "gpt-4o-mini");
        assert!(provider.supports_streaming());
    }
}
