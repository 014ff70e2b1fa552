//! Tern — streaming agent runtime with cooperative cancellation.
//!
//! Configure an agent (model, system prompt, decoding parameters, tool
//! access) and execute conversational turns against it, either blocking to
//! completion or as a cancellable stream of incremental text deltas.
//!
//! # Quick Start
//!
//! ```no_run
//! use tern::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> tern::error::Result<()> {
//! let config = AgentConfig::builder()
//!     .name("researcher")
//!     .model("gpt-4o-mini")
//!     .system_prompt("Answer concisely.")
//!     .build();
//! let agent = Agent::build(config, true, &TernConfig::from_env())?;
//!
//! let cancel = CancellationToken::new();
//! let result = agent
//!     .run_stream("Summarize today's news.", |delta| print!("{delta}"), &cancel)
//!     .await?;
//! println!("\n[{} ms, aborted={}]", result.latency_ms, result.aborted);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod telemetry;
pub mod tools;
pub mod types;
