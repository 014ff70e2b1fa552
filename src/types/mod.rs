//! Core types for messages, generation settings, streaming, and usage.

pub mod generation;
pub mod message;
pub mod stream;
pub mod usage;

pub use generation::{FinishReason, GenerationSettings};
pub use message::{AgentToolCall, AgentToolResult, ContentPart, ModelMessage, Role};
pub use stream::{StreamEventType, StreamResult, TextStreamDelta};
pub use usage::{normalize, Usage, UsagePayload};
