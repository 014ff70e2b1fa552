//! Tool system for function calling.

pub mod arguments;
pub mod tool;
pub mod types;
pub mod web;

pub use arguments::ToolArguments;
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::AgentToolParameters;
pub use web::{fetch, FetchInput, FetchPolicy};
