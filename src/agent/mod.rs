//! Agent configuration and the turn-execution runtime.

pub mod runtime;

pub use runtime::{Agent, RunOutcome};

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::TernError;

/// Caller-owned agent configuration. Immutable once an agent is built.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name, recorded in telemetry.
    #[builder(into)]
    pub name: String,
    /// Model identifier passed through to the provider.
    #[builder(into)]
    pub model: String,
    /// System prompt prepended to every turn.
    #[builder(into, default)]
    pub system_prompt: String,
    /// Sampling temperature, in `[0.0, 2.0]`.
    #[builder(default = 0.7)]
    pub temperature: f64,
    /// Nucleus sampling bound, in `[0.0, 1.0]`.
    #[builder(default = 1.0)]
    pub top_p: f64,
    /// Ordered list of enabled tool names. Empty means all registered tools.
    #[builder(default)]
    pub tools: Vec<String>,
    /// Free-form extras carried alongside the config.
    #[builder(default)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl AgentConfig {
    /// Validate parameter ranges and required fields.
    pub fn validate(&self) -> Result<(), TernError> {
        if self.model.trim().is_empty() {
            return Err(TernError::Configuration("empty model identifier".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TernError::Configuration(format!(
                "temperature {} out of range [0.0, 2.0]",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(TernError::Configuration(format!(
                "top_p {} out of range [0.0, 1.0]",
                self.top_p
            )));
        }
        Ok(())
    }
}
