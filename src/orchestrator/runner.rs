use crate::aggregate::RunResult;
use crate::agents::Agents;
use crate::config::PipelineConfig;
use crate::errors::{RunError, RunFailure};
use crate::gates::QualityGate;
use crate::orchestrator::state::{PipelineState, SharedState};
use crate::stage::StageRunner;
use std::time::Instant;
use tracing::Instrument;

/// Drives one transcript through Analysis, Metrics and Report, each behind
/// the quality gate.
///
/// An `Orchestrator` holds no per-run state and can serve any number of
/// concurrent runs.
pub struct Orchestrator {
    stages: StageRunner,
    gate: QualityGate,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(agents: Agents, config: PipelineConfig) -> Result<Self, RunError> {
        config.validate()?;
        let gate = QualityGate::new(
            agents.judge.clone(),
            config.pass_threshold,
            config.max_revisions,
        );
        Ok(Self {
            stages: StageRunner::new(agents),
            gate,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline to `Done` or fail.
    ///
    /// On any fatal error, including the run timeout, in-flight work is
    /// dropped and only the history recorded so far is returned.
    pub async fn run(&self, transcript: &str) -> Result<RunResult, RunFailure> {
        let mut state = SharedState::new(transcript);
        let span = tracing::info_span!("run", run_id = %state.run_id());
        let start = Instant::now();

        tracing::info!(
            parent: &span,
            transcript_chars = transcript.len(),
            step_budget = self.config.step_budget,
            max_revisions = self.config.max_revisions,
            "starting pipeline"
        );

        let outcome = tokio::time::timeout(
            self.config.timeout(),
            self.drive(&mut state).instrument(span.clone()),
        )
        .await
        .unwrap_or(Err(RunError::Timeout {
            timeout_ms: self.config.timeout_ms,
        }));
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                let run_id = state.run_id();
                let result = RunResult::from_state(state, elapsed_ms)
                    .map_err(|failure| failure.with_run_id(run_id))?;
                tracing::info!(
                    parent: &span,
                    elapsed_ms,
                    steps = result.stats.total_steps,
                    feedback = result.stats.total_feedback,
                    forced = result.stats.total_forced_passes(),
                    "pipeline done"
                );
                Ok(result)
            }
            Err(cause) => {
                tracing::error!(
                    parent: &span,
                    elapsed_ms,
                    kind = cause.kind(),
                    "pipeline failed: {}",
                    cause
                );
                let run_id = state.run_id();
                state.mark_failed(&cause);
                Err(RunFailure::new(cause, state.into_history()).with_run_id(run_id))
            }
        }
    }

    /// Step the state machine until it reaches a terminal state.
    async fn drive(&self, state: &mut SharedState) -> Result<(), RunError> {
        let mut transitions: u32 = 0;

        loop {
            let active = state.active();
            if active.is_terminal() {
                return Ok(());
            }
            if transitions >= self.config.step_budget {
                return Err(RunError::StepBudgetExceeded {
                    budget: self.config.step_budget,
                });
            }
            transitions += 1;
            tracing::debug!(state = %active, transition = transitions, "transition");

            match active {
                PipelineState::Stage(stage) => {
                    let output = self.stages.run(state, stage).await?;
                    state.apply_output(output);
                }
                PipelineState::Gate(stage) => {
                    let outcome = self.gate.evaluate(state, stage).await?;
                    state.apply_verdict(outcome);
                }
                PipelineState::Done | PipelineState::Failed => {}
            }
        }
    }
}

/// One-shot convenience: build an [`Orchestrator`] and run `transcript`.
pub async fn run_pipeline(
    transcript: &str,
    agents: Agents,
    config: PipelineConfig,
) -> Result<RunResult, RunFailure> {
    let orchestrator =
        Orchestrator::new(agents, config).map_err(|cause| RunFailure::new(cause, Vec::new()))?;
    orchestrator.run(transcript).await
}
