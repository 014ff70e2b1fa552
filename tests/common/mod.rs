//! Shared test helpers and mock provider.

use async_trait::async_trait;
use futures::stream::BoxStream;

use tern::error::TernError;
use tern::provider::{ModelProvider, ProviderRequest, ProviderResponse};
use tern::types::*;

/// One scripted event in a mocked stream.
pub enum ScriptedDelta {
    Text(String),
    ToolCall(AgentToolCall),
    Fail(String),
}

/// One mocked delta source: its events plus the usage on the final delta.
pub struct ScriptedStream {
    pub deltas: Vec<ScriptedDelta>,
    pub usage: Option<Usage>,
}

/// A mock provider that returns canned responses and scripted streams.
pub struct MockProvider {
    model_id: String,
    streaming: bool,
    responses: std::sync::Mutex<Vec<ProviderResponse>>,
    scripts: std::sync::Mutex<Vec<ScriptedStream>>,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            streaming: true,
            responses: std::sync::Mutex::new(Vec::new()),
            scripts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A provider that reports no streaming protocol; blocking completions
    /// get wrapped as single-fragment sources by the runtime.
    pub fn non_streaming(model_id: &str) -> Self {
        Self {
            streaming: false,
            ..Self::new(model_id)
        }
    }

    fn default_usage() -> Usage {
        Usage {
            input_tokens: 10,
            output_tokens: 20,
            total_tokens: 30,
            ..Default::default()
        }
    }

    /// Queue a blocking text response.
    pub fn queue_response(&self, text: &str) {
        self.responses.lock().unwrap().push(ProviderResponse {
            text: text.to_string(),
            usage: Some(Self::default_usage()),
            tool_calls: vec![],
            finish_reason: Some(FinishReason::Stop),
        });
    }

    /// Queue a blocking tool call response.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.responses.lock().unwrap().push(ProviderResponse {
            text: String::new(),
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
                ..Default::default()
            }),
            tool_calls: vec![AgentToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args,
            }],
            finish_reason: Some(FinishReason::ToolCalls),
        });
    }

    /// Queue a stream with exactly the given fragments, in order.
    pub fn queue_fragments(&self, fragments: &[&str]) {
        self.scripts.lock().unwrap().push(ScriptedStream {
            deltas: fragments
                .iter()
                .map(|f| ScriptedDelta::Text(f.to_string()))
                .collect(),
            usage: Some(Self::default_usage()),
        });
    }

    /// Queue a stream that emits a tool call and no text.
    pub fn queue_stream_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.scripts.lock().unwrap().push(ScriptedStream {
            deltas: vec![ScriptedDelta::ToolCall(AgentToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args,
            })],
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
                ..Default::default()
            }),
        });
    }

    /// Queue a stream that fails after the given fragments.
    pub fn queue_stream_error_after(&self, fragments: &[&str], message: &str) {
        let mut deltas: Vec<ScriptedDelta> = fragments
            .iter()
            .map(|f| ScriptedDelta::Text(f.to_string()))
            .collect();
        deltas.push(ScriptedDelta::Fail(message.to_string()));
        self.scripts
            .lock()
            .unwrap()
            .push(ScriptedStream { deltas, usage: None });
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn generate_text(
        &self,
        _request: &ProviderRequest,
    ) -> Result<ProviderResponse, TernError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(ProviderResponse {
                text: "Mock response".to_string(),
                usage: None,
                tool_calls: vec![],
                finish_reason: Some(FinishReason::Stop),
            });
        }
        Ok(responses.remove(0))
    }

    async fn stream_text(
        &self,
        _request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<TextStreamDelta, TernError>>, TernError> {
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Fall back to the blocking queue, chunked.
                let text = {
                    let mut responses = self.responses.lock().unwrap();
                    if responses.is_empty() {
                        "Mock streamed response".to_string()
                    } else {
                        responses.remove(0).text
                    }
                };
                ScriptedStream {
                    deltas: text
                        .chars()
                        .collect::<Vec<_>>()
                        .chunks(5)
                        .map(|c| ScriptedDelta::Text(c.iter().collect()))
                        .collect(),
                    usage: Some(Self::default_usage()),
                }
            } else {
                scripts.remove(0)
            }
        };

        let stream = async_stream::stream! {
            for delta in script.deltas {
                match delta {
                    ScriptedDelta::Text(text) => yield Ok(TextStreamDelta::text(text)),
                    ScriptedDelta::ToolCall(call) => yield Ok(TextStreamDelta {
                        text: String::new(),
                        event_type: StreamEventType::ToolCallDelta,
                        tool_call: Some(call),
                        finish_reason: None,
                        usage: None,
                    }),
                    ScriptedDelta::Fail(message) => {
                        yield Err(TernError::Stream(message));
                        return;
                    }
                }
            }
            yield Ok(TextStreamDelta::done(Some(FinishReason::Stop), script.usage));
        };

        Ok(Box::pin(stream))
    }
}
