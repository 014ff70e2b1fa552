//! Turn execution: blocking runs and cancellable streaming runs.
//!
//! A turn is one caller-initiated execution of the agent against one user
//! message. The streaming path is a cooperative state machine,
//! `Idle → Streaming → {Completed | Cancelled | Failed}`, whose only
//! suspension point is the await on the next fragment. The cancellation
//! token is checked before each fragment is consumed; a fragment arriving
//! after cancellation is neither forwarded nor counted.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::config::TernConfig;
use crate::error::TernError;
use crate::provider::{create_provider, ModelProvider, ProviderRequest, ToolDefinition};
use crate::tools::tool::{Tool, ToolExecutionContext};
use crate::tools::web::{web_fetch_tool, FetchPolicy};
use crate::tools::ToolArguments;
use crate::types::{
    normalize, AgentToolCall, AgentToolResult, ContentPart, GenerationSettings, ModelMessage, Role,
    StreamEventType, StreamResult, Usage, UsagePayload,
};

use super::AgentConfig;

/// Guard against runaway tool loops within a single turn.
const MAX_TOOL_ITERATIONS: usize = 8;

/// Result of a blocking (non-streaming) turn.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final response text.
    pub text: String,
    /// Normalized usage mapping, aggregated across tool-loop steps.
    pub usage: Option<serde_json::Map<String, serde_json::Value>>,
    /// Wall-clock latency of the turn.
    pub latency_ms: u64,
}

/// An agent bound to a model, system prompt, decoding parameters, and tools.
///
/// Built once from an [`AgentConfig`]; the configuration is immutable for
/// the agent's lifetime. Turns are independent: each owns its accumulator
/// and shares nothing mutable with concurrent turns.
pub struct Agent {
    name: String,
    model_id: String,
    system_prompt: String,
    settings: GenerationSettings,
    provider: Box<dyn ModelProvider>,
    tools: Vec<Arc<dyn Tool>>,
    tool_filter: Vec<String>,
}

impl Agent {
    /// Build an agent with the default fetch policy.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Configuration`] when the config fails validation
    /// or no API key is available. Build failures always surface; they are
    /// never degraded into a runtime condition.
    pub fn build(
        config: AgentConfig,
        include_web: bool,
        runtime_config: &TernConfig,
    ) -> Result<Self, TernError> {
        Self::build_with_policy(config, include_web, runtime_config, FetchPolicy::default())
    }

    /// Build an agent with an injected fetch policy.
    pub fn build_with_policy(
        config: AgentConfig,
        include_web: bool,
        runtime_config: &TernConfig,
        policy: FetchPolicy,
    ) -> Result<Self, TernError> {
        config.validate()?;
        let provider = create_provider(&config.model, runtime_config)?;

        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        if include_web {
            tools.push(web_fetch_tool(Arc::new(policy)));
        }

        Ok(Self {
            name: config.name,
            model_id: config.model,
            system_prompt: config.system_prompt,
            settings: GenerationSettings {
                temperature: Some(config.temperature),
                top_p: Some(config.top_p),
                ..Default::default()
            },
            provider,
            tools,
            tool_filter: config.tools,
        })
    }

    /// Build an agent around an existing provider (used by tests and callers
    /// that manage their own client).
    pub fn with_provider(
        config: AgentConfig,
        provider: Box<dyn ModelProvider>,
    ) -> Result<Self, TernError> {
        config.validate()?;
        Ok(Self {
            name: config.name,
            model_id: config.model,
            system_prompt: config.system_prompt,
            settings: GenerationSettings {
                temperature: Some(config.temperature),
                top_p: Some(config.top_p),
                ..Default::default()
            },
            provider,
            tools: Vec::new(),
            tool_filter: config.tools,
        })
    }

    /// Register an additional tool.
    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Agent display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound model identifier.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Execute a turn to completion, including the bounded tool loop.
    ///
    /// Underlying client failures are wrapped as [`TernError::Execution`]
    /// with the cause preserved and are never retried here.
    pub async fn run(&self, message: impl Into<String>) -> Result<RunOutcome, TernError> {
        let started = Instant::now();
        let mut messages = self.base_messages(message.into());
        let mut total_usage: Option<Usage> = None;

        for _ in 0..MAX_TOOL_ITERATIONS {
            let request = self.provider_request(&messages);
            let response = self
                .provider
                .generate_text(&request)
                .await
                .map_err(into_execution)?;

            if let Some(usage) = response.usage {
                merge_usage(&mut total_usage, usage);
            }

            if response.tool_calls.is_empty() {
                return Ok(RunOutcome {
                    text: response.text,
                    usage: normalize(total_usage.map(UsagePayload::Typed)),
                    latency_ms: started.elapsed().as_millis() as u64,
                });
            }

            messages.push(assistant_step(&response.text, &response.tool_calls));
            for call in &response.tool_calls {
                let result = self.execute_tool(call).await;
                messages.push(ModelMessage::tool_result(
                    result.tool_call_id,
                    result.result,
                    result.is_error,
                ));
            }
        }

        Err(TernError::execution("tool loop exceeded maximum iterations"))
    }

    /// Execute a turn as a cancellable stream, forwarding each delta to
    /// `on_delta` in strict arrival order.
    ///
    /// The returned [`StreamResult::text`] is exactly the concatenation of
    /// every delta delivered to `on_delta` this turn. Cancellation is not an
    /// error: the result carries `aborted = true` with whatever text was
    /// already delivered.
    pub async fn run_stream<F>(
        &self,
        message: impl Into<String>,
        on_delta: F,
        cancel: &CancellationToken,
    ) -> Result<StreamResult, TernError>
    where
        F: FnMut(&str),
    {
        self.run_stream_with_id(message, on_delta, cancel, Uuid::new_v4())
            .await
    }

    /// [`run_stream`](Self::run_stream) with a caller-supplied correlation id.
    pub async fn run_stream_with_id<F>(
        &self,
        message: impl Into<String>,
        mut on_delta: F,
        cancel: &CancellationToken,
        correlation_id: Uuid,
    ) -> Result<StreamResult, TernError>
    where
        F: FnMut(&str),
    {
        let started = Instant::now();
        debug!(%correlation_id, agent = %self.name, model = %self.model_id, "turn start");

        let mut messages = self.base_messages(message.into());
        let mut text = String::new();
        let mut total_usage: Option<Usage> = None;
        let mut aborted = false;
        let mut steps = 0usize;

        'steps: loop {
            if cancel.is_cancelled() {
                aborted = true;
                break;
            }
            steps += 1;
            if steps > MAX_TOOL_ITERATIONS {
                return Err(TernError::execution("tool loop exceeded maximum iterations"));
            }

            let request = self.provider_request(&messages);
            let mut stream = self.open_delta_source(&request).await.map_err(into_execution)?;
            let mut step_text = String::new();
            let mut step_usage: Option<Usage> = None;
            let mut tool_calls: Vec<AgentToolCall> = Vec::new();

            loop {
                // Check-before-consume: once the token is observed set, no
                // further fragment is consumed, forwarded, or counted.
                if cancel.is_cancelled() {
                    aborted = true;
                    break 'steps;
                }
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        aborted = true;
                        break 'steps;
                    }
                    next = stream.next() => next,
                };
                let Some(delta) = next else { break };
                let delta = delta.map_err(into_execution)?;

                match delta.event_type {
                    StreamEventType::TextDelta => {
                        if !delta.text.is_empty() {
                            // Deliver first, then accumulate the same fragment.
                            on_delta(&delta.text);
                            text.push_str(&delta.text);
                            step_text.push_str(&delta.text);
                        }
                    }
                    StreamEventType::ToolCallDelta => {
                        if let Some(call) = delta.tool_call {
                            upsert_tool_call(&mut tool_calls, call);
                        }
                    }
                    StreamEventType::Error => {
                        let message = if delta.text.is_empty() {
                            "stream error".to_string()
                        } else {
                            delta.text
                        };
                        return Err(TernError::execution(message));
                    }
                    StreamEventType::Done => {}
                }

                // Usage is taken once per delta source, from the first
                // fragment carrying it.
                if step_usage.is_none() {
                    step_usage = delta.usage;
                }
            }

            if let Some(usage) = step_usage {
                merge_usage(&mut total_usage, usage);
            }

            if tool_calls.is_empty() {
                break; // Completed
            }

            messages.push(assistant_step(&step_text, &tool_calls));
            for call in &tool_calls {
                // A cancellation observed between tool steps skips the
                // remaining fetches; one already in flight runs to its own
                // timeout.
                if cancel.is_cancelled() {
                    aborted = true;
                    break 'steps;
                }
                let result = self.execute_tool(call).await;
                messages.push(ModelMessage::tool_result(
                    result.tool_call_id,
                    result.result,
                    result.is_error,
                ));
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        debug!(%correlation_id, latency_ms, aborted, "turn end");

        Ok(StreamResult {
            text,
            usage: normalize(total_usage.map(UsagePayload::Typed)),
            latency_ms,
            aborted,
        })
    }

    /// Unify both provider protocols behind one fragment-pull interface.
    ///
    /// Non-streaming providers are wrapped as a single-fragment source, so
    /// the check-before-consume rule above applies identically to both.
    async fn open_delta_source(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<crate::types::TextStreamDelta, TernError>>, TernError>
    {
        use crate::types::TextStreamDelta;

        if self.provider.supports_streaming() {
            return self.provider.stream_text(request).await;
        }

        let response = self.provider.generate_text(request).await?;
        let (resp_text, tool_calls, finish_reason, usage) = (
            response.text,
            response.tool_calls,
            response.finish_reason,
            response.usage,
        );
        let stream = async_stream::stream! {
            if !resp_text.is_empty() {
                yield Ok(TextStreamDelta::text(resp_text));
            }
            for call in tool_calls {
                yield Ok(TextStreamDelta {
                    text: String::new(),
                    event_type: StreamEventType::ToolCallDelta,
                    tool_call: Some(call),
                    finish_reason: None,
                    usage: None,
                });
            }
            yield Ok(TextStreamDelta::done(finish_reason, usage));
        };
        Ok(Box::pin(stream))
    }

    /// Tools advertised to the provider, honoring the configured name order.
    fn enabled_tools(&self) -> Vec<Arc<dyn Tool>> {
        if self.tool_filter.is_empty() {
            return self.tools.clone();
        }
        self.tool_filter
            .iter()
            .filter_map(|name| self.tools.iter().find(|t| t.name() == name).cloned())
            .collect()
    }

    fn base_messages(&self, message: String) -> Vec<ModelMessage> {
        let mut messages = Vec::new();
        if !self.system_prompt.is_empty() {
            messages.push(ModelMessage::system(self.system_prompt.clone()));
        }
        messages.push(ModelMessage::user(message));
        messages
    }

    fn provider_request(&self, messages: &[ModelMessage]) -> ProviderRequest {
        let tools = self.enabled_tools();
        let tool_defs = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| ToolDefinition {
                        name: t.name().to_string(),
                        description: t.description().to_string(),
                        parameters: t.parameters().schema.clone(),
                    })
                    .collect(),
            )
        };
        ProviderRequest {
            messages: messages.to_vec(),
            settings: self.settings.clone(),
            tools: tool_defs,
        }
    }

    /// Execute one tool call. Tool failures become error-flagged results the
    /// model can read; they never abort the turn.
    async fn execute_tool(&self, call: &AgentToolCall) -> AgentToolResult {
        let Some(tool) = self
            .enabled_tools()
            .into_iter()
            .find(|t| t.name() == call.name)
        else {
            return AgentToolResult {
                tool_call_id: call.id.clone(),
                result: serde_json::json!({ "error": format!("Tool '{}' not found", call.name) }),
                is_error: true,
            };
        };

        let args = ToolArguments::new(call.arguments.clone());
        let ctx = ToolExecutionContext {
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
        };
        match tool.execute(&args, &ctx).await {
            Ok(value) => AgentToolResult {
                tool_call_id: call.id.clone(),
                result: value,
                is_error: false,
            },
            Err(e) => {
                let err = TernError::ToolExecution {
                    tool_name: call.name.clone(),
                    message: e.to_string(),
                };
                AgentToolResult {
                    tool_call_id: call.id.clone(),
                    result: serde_json::json!({ "error": err.to_string() }),
                    is_error: true,
                }
            }
        }
    }
}

fn merge_usage(total: &mut Option<Usage>, usage: Usage) {
    match total {
        Some(t) => t.merge(&usage),
        None => *total = Some(usage),
    }
}

fn assistant_step(text: &str, tool_calls: &[AgentToolCall]) -> ModelMessage {
    let mut content: Vec<ContentPart> = Vec::new();
    if !text.is_empty() {
        content.push(ContentPart::Text {
            text: text.to_string(),
        });
    }
    for call in tool_calls {
        content.push(ContentPart::ToolCall(call.clone()));
    }
    ModelMessage {
        role: Role::Assistant,
        content,
        timestamp: Some(chrono::Utc::now()),
    }
}

/// Streamed tool calls may arrive as progressively more complete objects;
/// the last version for a given id wins.
fn upsert_tool_call(calls: &mut Vec<AgentToolCall>, call: AgentToolCall) {
    match calls.iter_mut().find(|c| c.id == call.id) {
        Some(existing) => *existing = call,
        None => calls.push(call),
    }
}

/// Wrap an underlying client failure as an execution error, preserving the
/// original cause. Configuration errors pass through untouched.
fn into_execution(err: TernError) -> TernError {
    match err {
        e @ (TernError::Execution { .. } | TernError::Configuration(_)) => e,
        other => TernError::execution_from("model request failed", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_call_with_same_id() {
        let mut calls = Vec::new();
        upsert_tool_call(
            &mut calls,
            AgentToolCall {
                id: "c1".into(),
                name: "web_fetch".into(),
                arguments: serde_json::json!({}),
            },
        );
        upsert_tool_call(
            &mut calls,
            AgentToolCall {
                id: "c1".into(),
                name: "web_fetch".into(),
                arguments: serde_json::json!({"url": "https://example.com"}),
            },
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["url"], "https://example.com");
    }

    #[test]
    fn into_execution_preserves_configuration_errors() {
        let err = into_execution(TernError::Configuration("missing key".into()));
        assert!(err.is_configuration());
    }

    #[test]
    fn into_execution_wraps_other_errors_with_cause() {
        let err = into_execution(TernError::Stream("connection reset".into()));
        let source = std::error::Error::source(&err).expect("cause preserved");
        assert!(source.to_string().contains("connection reset"));
    }

    #[test]
    fn assistant_step_keeps_text_and_calls() {
        let msg = assistant_step(
            "thinking",
            &[AgentToolCall {
                id: "c1".into(),
                name: "web_fetch".into(),
                arguments: serde_json::json!({}),
            }],
        );
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), "thinking");
        assert_eq!(msg.tool_calls().len(), 1);
    }
}
