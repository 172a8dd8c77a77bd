//! Quality-gated, multi-stage pipeline for interview transcripts.
//!
//! A transcript moves through Analysis, Metrics and Report. After each stage a
//! judge scores the output; rejected output goes back to the same stage with
//! numbered feedback, and a per-stage revision cap plus a global step budget
//! guarantee the run ends.
//!
//! ```no_run
//! use panel::agents::{Agents, CommandAgent, CommandSpec};
//! use panel::config::PipelineConfig;
//! use panel::review::HeuristicJudge;
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let llm = Arc::new(CommandAgent::new(CommandSpec::new("claude").with_args(["--print"])));
//! let agents = Agents::new(llm.clone(), llm.clone(), llm, Arc::new(HeuristicJudge::default()));
//!
//! let result = panel::run_pipeline("I explained, um, the solution.", agents, PipelineConfig::default()).await?;
//! println!("{}", result.report_text());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod agents;
pub mod audit;
pub mod config;
pub mod errors;
pub mod gates;
pub mod logging;
pub mod orchestrator;
pub mod panel_config;
pub mod payload;
pub mod review;
pub mod revision;
pub mod stage;

pub use aggregate::{RunResult, RunStats};
pub use config::PipelineConfig;
pub use errors::{EvalError, RunError, RunFailure, StageFailure};
pub use orchestrator::{Orchestrator, run_pipeline};
pub use payload::{AgentOutput, Feedback, PayloadKind, StageId, TaggedPayload};
