//! Quality gate between stages.
//!
//! The gate asks the judge to score the latest output of one stage and turns
//! the verdict into a routing decision: advance, send back with numbered
//! feedback, or force approval once the stage has used up its revisions.

use crate::agents::Judge;
use crate::errors::{EvalError, RunError};
use crate::orchestrator::state::{PipelineState, SharedState, StepRecord};
use crate::payload::{Feedback, PayloadKind, StageId};
use crate::review::JudgeVerdict;
use std::sync::Arc;

/// Minimum score for an output to pass on merit.
pub const DEFAULT_PASS_THRESHOLD: f64 = 8.0;

/// Rejections a stage may receive before the gate forces approval.
pub const DEFAULT_MAX_REVISIONS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Approved,
    /// Approved by the escape valve after `max_revisions` rejections.
    ForcedApproval,
    Rejected,
}

impl GateDecision {
    /// Whether control moves on to the next stage.
    pub fn advances(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// What one evaluation changes in [`SharedState`].
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub stage: StageId,
    pub decision: GateDecision,
    pub score: f64,
    pub issues: Vec<String>,
    /// Present only when the stage is sent back.
    pub feedback: Option<Feedback>,
    pub next: PipelineState,
    pub records: Vec<StepRecord>,
}

/// Route a verdict.
///
/// A verdict passes on merit only if the judge passed it, the score reaches
/// `pass_threshold` and there are no critical issues. Otherwise the stage is
/// rejected, unless its revisions are `exhausted`.
pub fn decide(verdict: &JudgeVerdict, pass_threshold: f64, exhausted: bool) -> GateDecision {
    let merit = verdict.passed && verdict.score >= pass_threshold && verdict.critical_count() == 0;
    if merit {
        GateDecision::Approved
    } else if exhausted {
        GateDecision::ForcedApproval
    } else {
        GateDecision::Rejected
    }
}

pub struct QualityGate {
    judge: Arc<dyn Judge>,
    pass_threshold: f64,
    max_revisions: u32,
}

impl QualityGate {
    pub fn new(judge: Arc<dyn Judge>, pass_threshold: f64, max_revisions: u32) -> Self {
        Self {
            judge,
            pass_threshold,
            max_revisions,
        }
    }

    /// Evaluate the latest output of `stage`.
    pub async fn evaluate(
        &self,
        state: &SharedState,
        stage: StageId,
    ) -> Result<GateOutcome, RunError> {
        let Some(payload) = state.payload(stage) else {
            return Err(RunError::ProtocolViolation {
                stage,
                message: "no output to evaluate".to_string(),
            });
        };

        let expected = stage.payload_kind();
        let labelled = PayloadKind::classify(&payload.raw);
        if payload.kind != expected || labelled != Some(expected) {
            return Err(RunError::ProtocolViolation {
                stage,
                message: format!(
                    "expected {} output, found {}",
                    expected,
                    labelled.map_or_else(|| "unlabelled content".to_string(), |k| k.to_string())
                ),
            });
        }

        let verdict = self
            .judge
            .evaluate(stage, payload, stage)
            .await
            .map_err(|e| EvalError::new(stage, format!("{:#}", e)))?;

        if !verdict.score.is_finite() || !(0.0..=10.0).contains(&verdict.score) {
            return Err(EvalError::new(
                stage,
                format!("score {} is outside 0-10", verdict.score),
            )
            .into());
        }

        let revisions = state.revisions().get(stage);
        let exhausted = state.revisions().is_exhausted(stage, self.max_revisions);
        let decision = decide(&verdict, self.pass_threshold, exhausted);
        let issues = verdict.issue_messages();
        let forced = decision == GateDecision::ForcedApproval;

        let mut records = vec![
            StepRecord::evaluate(stage, decision.advances(), verdict.score, forced)
                .with_issues(issues.clone()),
        ];

        let (feedback, next) = match decision {
            GateDecision::Approved | GateDecision::ForcedApproval => {
                (None, PipelineState::after_approval(stage))
            }
            GateDecision::Rejected => {
                let feedback_issues = if issues.is_empty() {
                    vec![format!(
                        "Score {:.1} is below the pass threshold of {:.1}",
                        verdict.score, self.pass_threshold
                    )]
                } else {
                    issues.clone()
                };
                let fb = Feedback::new(
                    stage,
                    state.revisions().next_feedback_number(stage),
                    feedback_issues,
                );
                records.push(StepRecord::feedback(&fb));
                (Some(fb), PipelineState::Stage(stage))
            }
        };

        match decision {
            GateDecision::Approved => {
                tracing::info!(stage = %stage, score = verdict.score, "output approved")
            }
            GateDecision::ForcedApproval => tracing::warn!(
                stage = %stage,
                score = verdict.score,
                revisions,
                "revision limit reached, forcing approval"
            ),
            GateDecision::Rejected => tracing::info!(
                stage = %stage,
                score = verdict.score,
                issues = issues.len(),
                revision = revisions + 1,
                "output rejected"
            ),
        }

        Ok(GateOutcome {
            stage,
            decision,
            score: verdict.score,
            issues,
            feedback,
            next,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::TaggedPayload;
    use crate::review::Issue;
    use crate::revision::RevisionCounts;
    use crate::stage::StageOutput;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedJudge(Result<JudgeVerdict, String>);

    #[async_trait]
    impl Judge for FixedJudge {
        async fn evaluate(
            &self,
            _kind: StageId,
            _payload: &TaggedPayload,
            _source: StageId,
        ) -> Result<JudgeVerdict> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn gate(verdict: Result<JudgeVerdict, String>) -> QualityGate {
        QualityGate::new(
            Arc::new(FixedJudge(verdict)),
            DEFAULT_PASS_THRESHOLD,
            DEFAULT_MAX_REVISIONS,
        )
    }

    fn state_with(stage: StageId, payload: TaggedPayload) -> SharedState {
        let mut state = SharedState::new("t");
        state.apply_output(StageOutput {
            stage,
            payload,
            attempt: 1,
            repaired: 0,
            record: StepRecord::output(stage, 1),
        });
        state
    }

    fn analysis_state() -> SharedState {
        state_with(
            StageId::Analysis,
            TaggedPayload::new(PayloadKind::Analysis, json!({"strengths": ["clear"]})),
        )
    }

    #[test]
    fn test_decide_requires_all_pass_conditions() {
        let good = JudgeVerdict::new(9.0, true);
        assert_eq!(decide(&good, 8.0, false), GateDecision::Approved);

        let low = JudgeVerdict::new(7.9, true);
        assert_eq!(decide(&low, 8.0, false), GateDecision::Rejected);

        let judge_failed = JudgeVerdict::new(9.5, false);
        assert_eq!(decide(&judge_failed, 8.0, false), GateDecision::Rejected);

        let critical = JudgeVerdict::new(9.0, true).with_issue(Issue::critical("fabricated quote"));
        assert_eq!(decide(&critical, 8.0, false), GateDecision::Rejected);
    }

    #[test]
    fn test_decide_escape_valve_boundary() {
        let bad = JudgeVerdict::new(2.0, false);
        let mut counts = RevisionCounts::new();
        counts.increment(StageId::Analysis);
        let exhausted = counts.is_exhausted(StageId::Analysis, 2);
        assert_eq!(decide(&bad, 8.0, exhausted), GateDecision::Rejected);

        counts.increment(StageId::Analysis);
        let exhausted = counts.is_exhausted(StageId::Analysis, 2);
        assert_eq!(decide(&bad, 8.0, exhausted), GateDecision::ForcedApproval);

        let fresh = RevisionCounts::new();
        assert_eq!(
            decide(&bad, 8.0, fresh.is_exhausted(StageId::Metrics, 0)),
            GateDecision::ForcedApproval
        );
    }

    #[tokio::test]
    async fn test_approval_routes_to_successor() {
        let outcome = gate(Ok(JudgeVerdict::new(9.0, true)))
            .evaluate(&analysis_state(), StageId::Analysis)
            .await
            .unwrap();
        assert_eq!(outcome.decision, GateDecision::Approved);
        assert_eq!(outcome.next, PipelineState::Stage(StageId::Metrics));
        assert!(outcome.feedback.is_none());
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_numbers_feedback() {
        let verdict = JudgeVerdict::new(5.0, false).with_issue(Issue::major("no quotes"));
        let outcome = gate(Ok(verdict))
            .evaluate(&analysis_state(), StageId::Analysis)
            .await
            .unwrap();
        assert_eq!(outcome.next, PipelineState::Stage(StageId::Analysis));
        let fb = outcome.feedback.unwrap();
        assert_eq!(fb.label(), "Feedback for Analysis #1");
        assert_eq!(fb.issues, vec!["no quotes"]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[1].detail.as_deref(), Some("Feedback for Analysis #1"));
    }

    #[tokio::test]
    async fn test_rejection_without_issues_explains_score() {
        let outcome = gate(Ok(JudgeVerdict::new(6.0, true)))
            .evaluate(&analysis_state(), StageId::Analysis)
            .await
            .unwrap();
        let fb = outcome.feedback.unwrap();
        assert!(fb.issues[0].contains("below the pass threshold"));
    }

    #[tokio::test]
    async fn test_judge_error_is_eval_error() {
        let err = gate(Err("judge offline".into()))
            .evaluate(&analysis_state(), StageId::Analysis)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Eval(_)));
        assert!(err.to_string().contains("judge offline"));
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_eval_error() {
        for score in [11.0, -0.5, f64::NAN] {
            let err = gate(Ok(JudgeVerdict::new(score, true)))
                .evaluate(&analysis_state(), StageId::Analysis)
                .await
                .unwrap_err();
            assert!(matches!(err, RunError::Eval(_)), "score {}", score);
        }
    }

    #[tokio::test]
    async fn test_missing_payload_is_protocol_violation() {
        let err = gate(Ok(JudgeVerdict::new(9.0, true)))
            .evaluate(&SharedState::new("t"), StageId::Metrics)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::ProtocolViolation { .. }));
    }

    #[tokio::test]
    async fn test_mislabelled_payload_is_protocol_violation() {
        let mut payload = TaggedPayload::new(PayloadKind::Analysis, json!({}));
        payload.raw = "Evaluation Output: {}".to_string();
        let err = gate(Ok(JudgeVerdict::new(9.0, true)))
            .evaluate(&state_with(StageId::Analysis, payload), StageId::Analysis)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("found Evaluation"));
    }
}
