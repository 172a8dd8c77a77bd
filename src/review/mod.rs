//! Judging of stage outputs.
//!
//! - [`findings`]: verdict and issue types every judge returns
//! - [`heuristic`]: a deterministic, rule-based judge
//!
//! LLM-backed judging lives in [`crate::agents::CommandAgent`].

pub mod findings;
pub mod heuristic;

pub use findings::{Issue, IssueSeverity, JudgeVerdict};
pub use heuristic::HeuristicJudge;
