//! Per-run telemetry records.
//!
//! The CSV row schema here is an interface consumed by an external writer;
//! this module defines the header, the record shape, and an escaping row
//! serializer, and nothing else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::StreamResult;

/// CSV header, in the exact column order external consumers expect.
pub const CSV_HEADER: &str = "ts,agent_name,model,prompt_tokens,completion_tokens,total_tokens,\
latency_ms,cost_usd,experiment_id,task_label,run_notes,streaming,model_list_source,\
tool_web_enabled,web_status,aborted";

/// Outcome of web-tool access during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WebStatus {
    /// Web tool was not enabled for this run.
    Off,
    /// Web tool was enabled and all fetches succeeded or were unused.
    Ok,
    /// At least one fetch was refused by the allow-list.
    Blocked,
}

/// One telemetry row for one executed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub ts: DateTime<Utc>,
    pub agent_name: String,
    pub model: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub latency_ms: u64,
    pub cost_usd: Option<f64>,
    pub experiment_id: String,
    pub task_label: String,
    pub run_notes: String,
    pub streaming: bool,
    pub model_list_source: String,
    pub tool_web_enabled: bool,
    pub web_status: WebStatus,
    pub aborted: bool,
}

impl RunRecord {
    /// Build a record from a streamed turn's result.
    ///
    /// Token counts are read from the normalized usage mapping when present;
    /// `aborted` is taken literally from the result.
    pub fn from_stream_result(
        agent_name: impl Into<String>,
        model: impl Into<String>,
        result: &StreamResult,
    ) -> Self {
        let token = |key: &str| {
            result
                .usage
                .as_ref()
                .and_then(|u| u.get(key))
                .and_then(|v| v.as_u64())
        };
        Self {
            ts: Utc::now(),
            agent_name: agent_name.into(),
            model: model.into(),
            prompt_tokens: token("input_tokens"),
            completion_tokens: token("output_tokens"),
            total_tokens: token("total_tokens"),
            latency_ms: result.latency_ms,
            cost_usd: None,
            experiment_id: String::new(),
            task_label: String::new(),
            run_notes: String::new(),
            streaming: true,
            model_list_source: String::new(),
            tool_web_enabled: false,
            web_status: WebStatus::Off,
            aborted: result.aborted,
        }
    }

    /// Serialize to one CSV row matching [`CSV_HEADER`]'s column order.
    pub fn to_row(&self) -> String {
        let fields = [
            self.ts.to_rfc3339(),
            self.agent_name.clone(),
            self.model.clone(),
            opt_u64(self.prompt_tokens),
            opt_u64(self.completion_tokens),
            opt_u64(self.total_tokens),
            self.latency_ms.to_string(),
            self.cost_usd.map(|c| c.to_string()).unwrap_or_default(),
            self.experiment_id.clone(),
            self.task_label.clone(),
            self.run_notes.clone(),
            self.streaming.to_string(),
            self.model_list_source.clone(),
            self.tool_web_enabled.to_string(),
            self.web_status.to_string(),
            self.aborted.to_string(),
        ];
        fields
            .iter()
            .map(|f| escape_field(f))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Quote a field when it contains a comma, quote, or newline; double any
/// embedded quotes.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn opt_u64(v: Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}
