//! Content-producing stages.
//!
//! A [`StageRunner`] reads what a stage needs from [`SharedState`], calls the
//! matching collaborator and validates what comes back. It never mutates
//! state: the result is a [`StageOutput`] delta for the orchestrator to apply.

use crate::agents::Agents;
use crate::errors::StageFailure;
use crate::orchestrator::state::{SharedState, StepRecord};
use crate::payload::{StageId, TaggedPayload, repair_on_read};

/// A validated stage result, ready to be applied to [`SharedState`].
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub stage: StageId,
    pub payload: TaggedPayload,
    /// 1 on the first production, `revisions + 1` afterwards.
    pub attempt: u32,
    /// Evidence counts corrected on read.
    pub repaired: usize,
    pub record: StepRecord,
}

pub struct StageRunner {
    agents: Agents,
}

impl StageRunner {
    pub fn new(agents: Agents) -> Self {
        Self { agents }
    }

    /// Produce `stage`'s output from the current state.
    pub async fn run(
        &self,
        state: &SharedState,
        stage: StageId,
    ) -> Result<StageOutput, StageFailure> {
        let feedback = state.pending_issues(stage);
        let attempt = state.revisions().get(stage) + 1;

        tracing::info!(
            stage = %stage,
            attempt,
            feedback_items = feedback.len(),
            "running stage"
        );

        let result = match stage {
            StageId::Analysis => {
                self.agents
                    .analyzer
                    .analyze(state.transcript(), &feedback)
                    .await
            }
            StageId::Metrics => {
                let analysis = require_input(state, stage, StageId::Analysis)?;
                self.agents.metrics.calculate(analysis, &feedback).await
            }
            StageId::Report => {
                let metrics = require_input(state, stage, StageId::Metrics)?;
                self.agents.reporter.generate(metrics, &feedback).await
            }
        };

        let output = result.map_err(|e| StageFailure::from_collaborator(stage, &e))?;
        let payload = output
            .into_payload(stage.payload_kind())
            .map_err(|e| StageFailure::from_payload(stage, e))?;

        let (payload, repaired) = repair_on_read(payload);
        if repaired > 0 {
            tracing::debug!(stage = %stage, repaired, "corrected evidence counts");
        }

        Ok(StageOutput {
            stage,
            payload,
            attempt,
            repaired,
            record: StepRecord::output(stage, attempt),
        })
    }
}

/// The approved upstream payload `stage` consumes.
fn require_input(
    state: &SharedState,
    stage: StageId,
    upstream: StageId,
) -> Result<&TaggedPayload, StageFailure> {
    state
        .payload(upstream)
        .ok_or_else(|| StageFailure::new(stage, format!("no {} output to work from", upstream)))
}
