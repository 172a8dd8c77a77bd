//! Typed error hierarchy for the pipeline.
//!
//! - `StageFailure`: a content-producing collaborator gave no usable payload
//! - `EvalError`: the quality gate could not score a payload
//! - `RunError`: everything that ends a run in `Failed`
//! - `RunFailure`: a `RunError` plus the history recorded before it

use crate::payload::{PayloadError, StageId};
use crate::orchestrator::state::StepRecord;
use thiserror::Error;
use uuid::Uuid;

/// A stage could not produce a valid tagged payload.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {cause}")]
pub struct StageFailure {
    pub stage: StageId,
    pub cause: String,
}

impl StageFailure {
    pub fn new(stage: StageId, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    pub fn from_payload(stage: StageId, err: PayloadError) -> Self {
        Self::new(stage, err.to_string())
    }

    /// Collaborator error, flattened with its context chain.
    pub fn from_collaborator(stage: StageId, err: &anyhow::Error) -> Self {
        Self::new(stage, format!("{:#}", err))
    }
}

/// The quality gate could not evaluate a payload.
#[derive(Debug, Error)]
#[error("evaluation of {stage} failed: {message}")]
pub struct EvalError {
    pub stage: StageId,
    pub message: String,
}

impl EvalError {
    pub fn new(stage: StageId, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Fatal causes that move a run to `Failed`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Stage(#[from] StageFailure),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("protocol violation at {stage} gate: {message}")]
    ProtocolViolation { stage: StageId, message: String },

    #[error("step budget exceeded after {budget} transitions")]
    StepBudgetExceeded { budget: u32 },

    #[error("timeout after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl RunError {
    /// The stage the failure is attributed to, when there is one.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::Stage(f) => Some(f.stage),
            Self::Eval(e) => Some(e.stage),
            Self::ProtocolViolation { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Short machine-friendly cause name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stage(_) => "stage_failure",
            Self::Eval(_) => "eval_error",
            Self::ProtocolViolation { .. } => "protocol_violation",
            Self::StepBudgetExceeded { .. } => "step_budget_exceeded",
            Self::Timeout { .. } => "timeout",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// A failed run: the cause plus the audit trail up to the failure.
#[derive(Debug, Error)]
#[error("pipeline run failed: {cause}")]
pub struct RunFailure {
    #[source]
    pub cause: RunError,
    pub partial_history: Vec<StepRecord>,
    /// Absent when the run never started (invalid configuration).
    pub run_id: Option<Uuid>,
}

impl RunFailure {
    pub fn new(cause: RunError, partial_history: Vec<StepRecord>) -> Self {
        Self {
            cause,
            partial_history,
            run_id: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}
