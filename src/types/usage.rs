//! Token usage types and the usage normalizer.
//!
//! Providers report usage in several shapes: an already-decoded JSON mapping,
//! a typed [`Usage`] struct, or a raw JSON value of unknown layout.
//! [`normalize`] converts any of them into one canonical mapping, or `None`.
//! Usage is optional telemetry, so normalization never fails.

use serde::{Deserialize, Serialize};

/// Token usage for a generation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

impl Usage {
    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        if let Some(v) = other.cache_read_tokens {
            *self.cache_read_tokens.get_or_insert(0) += v;
        }
        if let Some(v) = other.reasoning_tokens {
            *self.reasoning_tokens.get_or_insert(0) += v;
        }
    }
}

/// The closed set of usage payload shapes the normalizer accepts.
#[derive(Debug, Clone)]
pub enum UsagePayload {
    /// Already a JSON mapping.
    Map(serde_json::Map<String, serde_json::Value>),
    /// Typed usage carrying its own serialization.
    Typed(Usage),
    /// Raw JSON of unknown layout.
    Raw(serde_json::Value),
}

impl From<Usage> for UsagePayload {
    fn from(usage: Usage) -> Self {
        Self::Typed(usage)
    }
}

/// Normalize an optional usage payload into a canonical mapping.
///
/// `None` stays `None`. A mapping is returned as a copy, leaving the caller's
/// data untouched. A typed payload is serialized through its own dump. A raw
/// value is accepted only when it already is an object; anything else yields
/// `None` rather than an error.
pub fn normalize(
    payload: Option<UsagePayload>,
) -> Option<serde_json::Map<String, serde_json::Value>> {
    match payload? {
        UsagePayload::Map(map) => Some(map),
        UsagePayload::Typed(usage) => match serde_json::to_value(&usage) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        },
        UsagePayload::Raw(value) => match value {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        },
    }
}
