//! Collaborator seams.
//!
//! The pipeline does not care how analysis, metrics, reports or verdicts are
//! produced, only that each collaborator honours its contract. Real
//! implementation: [`CommandAgent`]. Test doubles implement the traits
//! directly.

pub mod command;
pub mod prompts;

pub use command::{CommandAgent, CommandSpec};

use crate::payload::{AgentOutput, StageId, TaggedPayload};
use crate::review::JudgeVerdict;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns a transcript into an `Analysis` payload.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// `feedback` is empty on the first attempt.
    async fn analyze(&self, transcript: &str, feedback: &[String]) -> Result<AgentOutput>;
}

/// Turns an analysis into a `Metrics` payload.
#[async_trait]
pub trait MetricsCalculator: Send + Sync {
    async fn calculate(&self, analysis: &TaggedPayload, feedback: &[String])
    -> Result<AgentOutput>;
}

/// Turns metrics into a `Report` payload.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, metrics: &TaggedPayload, feedback: &[String]) -> Result<AgentOutput>;
}

/// Scores one stage output.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(
        &self,
        kind: StageId,
        payload: &TaggedPayload,
        source: StageId,
    ) -> Result<JudgeVerdict>;
}

/// The four collaborators one run needs.
#[derive(Clone)]
pub struct Agents {
    pub analyzer: Arc<dyn Analyzer>,
    pub metrics: Arc<dyn MetricsCalculator>,
    pub reporter: Arc<dyn ReportGenerator>,
    pub judge: Arc<dyn Judge>,
}

impl Agents {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        metrics: Arc<dyn MetricsCalculator>,
        reporter: Arc<dyn ReportGenerator>,
        judge: Arc<dyn Judge>,
    ) -> Self {
        Self {
            analyzer,
            metrics,
            reporter,
            judge,
        }
    }
}
