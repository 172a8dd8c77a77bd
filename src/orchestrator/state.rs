use crate::errors::RunError;
use crate::gates::{GateDecision, GateOutcome};
use crate::payload::{Feedback, StageId, TaggedPayload};
use crate::revision::RevisionCounts;
use crate::stage::StageOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum PipelineState {
    /// A stage is about to produce output.
    Stage(StageId),
    /// The quality gate is about to evaluate a stage's output.
    Gate(StageId),
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The stage that follows approval of `stage`.
    pub fn after_approval(stage: StageId) -> Self {
        stage.successor().map(Self::Stage).unwrap_or(Self::Done)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => write!(f, "{}", stage),
            Self::Gate(stage) => write!(f, "QualityGate({})", stage),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepActor {
    Stage(StageId),
    QualityGate,
    Orchestrator,
}

impl fmt::Display for StepActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => write!(f, "{}", stage),
            Self::QualityGate => write!(f, "QualityGate"),
            Self::Orchestrator => write!(f, "Orchestrator"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Output,
    Evaluate,
    Feedback,
    Fail,
}

/// One entry of the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub actor: StepActor,
    pub action: StepAction,
    pub timestamp: DateTime<Utc>,
    /// Stage the entry is about (the evaluated or revised stage).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<StageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Approval granted by the escape valve rather than on merit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forced: bool,
    /// Production attempt for outputs, feedback number for feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Judge issues for evaluations, the issues sent back for feedback.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl StepRecord {
    fn base(actor: StepActor, action: StepAction) -> Self {
        Self {
            actor,
            action,
            timestamp: Utc::now(),
            target: None,
            passed: None,
            score: None,
            forced: false,
            iteration: None,
            detail: None,
            issues: Vec::new(),
        }
    }

    pub fn output(stage: StageId, attempt: u32) -> Self {
        Self {
            target: Some(stage),
            iteration: Some(attempt),
            ..Self::base(StepActor::Stage(stage), StepAction::Output)
        }
    }

    pub fn evaluate(target: StageId, passed: bool, score: f64, forced: bool) -> Self {
        Self {
            target: Some(target),
            passed: Some(passed),
            score: Some(score),
            forced,
            ..Self::base(StepActor::QualityGate, StepAction::Evaluate)
        }
    }

    pub fn feedback(feedback: &Feedback) -> Self {
        Self {
            target: Some(feedback.stage),
            passed: Some(false),
            iteration: Some(feedback.iteration),
            detail: Some(feedback.label()),
            issues: feedback.issues.clone(),
            ..Self::base(StepActor::QualityGate, StepAction::Feedback)
        }
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }

    pub fn failure(stage: Option<StageId>, cause: &str) -> Self {
        Self {
            target: stage,
            detail: Some(cause.to_string()),
            ..Self::base(StepActor::Orchestrator, StepAction::Fail)
        }
    }
}

/// The latest quality gate verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    pub passed: bool,
    pub issues: Vec<String>,
    pub target: StageId,
    #[serde(default)]
    pub forced: bool,
}

/// The single record threaded through a run.
///
/// Stages and the gate only read it; they hand back deltas
/// ([`StageOutput`], [`GateOutcome`]) which the orchestrator applies.
#[derive(Debug, Clone)]
pub struct SharedState {
    pub(crate) run_id: Uuid,
    pub(crate) transcript: String,
    pub(crate) analysis: Option<TaggedPayload>,
    pub(crate) metrics: Option<TaggedPayload>,
    pub(crate) report: Option<TaggedPayload>,
    pub(crate) active: PipelineState,
    pub(crate) evaluation: Option<Evaluation>,
    pub(crate) revisions: RevisionCounts,
    pub(crate) feedback: Vec<Feedback>,
    pub(crate) history: Vec<StepRecord>,
}

impl SharedState {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            transcript: transcript.into(),
            analysis: None,
            metrics: None,
            report: None,
            active: PipelineState::Stage(StageId::Analysis),
            evaluation: None,
            revisions: RevisionCounts::new(),
            feedback: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn active(&self) -> PipelineState {
        self.active
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    pub fn revisions(&self) -> &RevisionCounts {
        &self.revisions
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }

    /// The latest output of `stage`, if it has produced one.
    pub fn payload(&self, stage: StageId) -> Option<&TaggedPayload> {
        match stage {
            StageId::Analysis => self.analysis.as_ref(),
            StageId::Metrics => self.metrics.as_ref(),
            StageId::Report => self.report.as_ref(),
        }
    }

    /// Issues a revising stage must address.
    ///
    /// Empty unless `stage` has been rejected at least once and the latest
    /// verdict targets it. All feedback issued to the stage is included in
    /// order, without duplicates.
    pub fn pending_issues(&self, stage: StageId) -> Vec<String> {
        let targeted = self.evaluation.as_ref().is_some_and(|e| e.target == stage);
        if self.revisions.get(stage) == 0 || !targeted {
            return Vec::new();
        }

        let mut issues: Vec<String> = Vec::new();
        for fb in self.feedback.iter().filter(|fb| fb.stage == stage) {
            for issue in &fb.issues {
                if !issues.contains(issue) {
                    issues.push(issue.clone());
                }
            }
        }
        issues
    }

    pub(crate) fn apply_output(&mut self, output: StageOutput) {
        let StageOutput {
            stage,
            payload,
            record,
            ..
        } = output;

        match stage {
            StageId::Analysis => self.analysis = Some(payload),
            StageId::Metrics => self.metrics = Some(payload),
            StageId::Report => self.report = Some(payload),
        }
        self.history.push(record);
        self.active = PipelineState::Gate(stage);
    }

    pub(crate) fn apply_verdict(&mut self, outcome: GateOutcome) {
        let GateOutcome {
            stage,
            decision,
            score,
            issues,
            feedback,
            next,
            records,
        } = outcome;

        if let Some(fb) = feedback {
            let count = self.revisions.increment(stage);
            debug_assert_eq!(count, fb.iteration, "feedback numbering out of step");
            self.feedback.push(fb);
        }

        self.evaluation = Some(Evaluation {
            score,
            passed: decision.advances(),
            issues,
            target: stage,
            forced: decision == GateDecision::ForcedApproval,
        });
        self.history.extend(records);
        self.active = next;
    }

    pub(crate) fn mark_failed(&mut self, cause: &RunError) {
        self.history
            .push(StepRecord::failure(cause.stage(), &cause.to_string()));
        self.active = PipelineState::Failed;
    }

    pub(crate) fn into_history(self) -> Vec<StepRecord> {
        self.history
    }
}
