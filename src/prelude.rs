//! Convenience re-exports for common use.

pub use crate::agent::{Agent, AgentConfig, RunOutcome};
pub use crate::config::TernConfig;
pub use crate::error::{Result, TernError};
pub use crate::provider::ModelProvider;
pub use crate::telemetry::{RunRecord, WebStatus};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments};
pub use crate::tools::web::{FetchInput, FetchPolicy};
pub use crate::types::{
    ContentPart, FinishReason, GenerationSettings, ModelMessage, Role, StreamEventType,
    StreamResult, TextStreamDelta, Usage, UsagePayload,
};
