//! Run results and statistics.
//!
//! Everything here is derived after the fact from the final [`SharedState`]
//! and its history; nothing in this module feeds back into a run.

use crate::errors::{RunError, RunFailure};
use crate::orchestrator::state::{SharedState, StepAction, StepActor, StepRecord};
use crate::payload::{StageId, TaggedPayload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Counters derived from a run's history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Productions per stage (1 when the first output was approved).
    pub iterations_per_stage: BTreeMap<StageId, u32>,
    pub feedback_counts_per_stage: BTreeMap<StageId, u32>,
    /// Merit approvals over evaluations. Stages never evaluated are absent.
    pub pass_rates_per_stage: BTreeMap<StageId, f64>,
    pub forced_passes_per_stage: BTreeMap<StageId, u32>,
    /// Stage productions plus gate evaluations.
    pub total_steps: u32,
    pub total_feedback: u32,
    pub total_duration_ms: u64,
}

impl RunStats {
    pub fn from_history(history: &[StepRecord], total_duration_ms: u64) -> Self {
        let mut stats = Self {
            total_duration_ms,
            ..Default::default()
        };
        for stage in StageId::ALL {
            stats.iterations_per_stage.insert(stage, 0);
            stats.feedback_counts_per_stage.insert(stage, 0);
            stats.forced_passes_per_stage.insert(stage, 0);
        }

        let mut evaluations: BTreeMap<StageId, (u32, u32)> = BTreeMap::new();

        for record in history {
            match (record.action, record.actor, record.target) {
                (StepAction::Output, StepActor::Stage(stage), _) => {
                    *stats.iterations_per_stage.entry(stage).or_default() += 1;
                    stats.total_steps += 1;
                }
                (StepAction::Evaluate, _, Some(stage)) => {
                    let entry = evaluations.entry(stage).or_default();
                    entry.0 += 1;
                    if record.forced {
                        *stats.forced_passes_per_stage.entry(stage).or_default() += 1;
                    } else if record.passed == Some(true) {
                        entry.1 += 1;
                    }
                    stats.total_steps += 1;
                }
                (StepAction::Feedback, _, Some(stage)) => {
                    *stats.feedback_counts_per_stage.entry(stage).or_default() += 1;
                    stats.total_feedback += 1;
                }
                _ => {}
            }
        }

        stats.pass_rates_per_stage = evaluations
            .into_iter()
            .map(|(stage, (total, passed))| (stage, f64::from(passed) / f64::from(total)))
            .collect();
        stats
    }

    pub fn total_forced_passes(&self) -> u32 {
        self.forced_passes_per_stage.values().sum()
    }
}

/// A completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub final_analysis: TaggedPayload,
    pub final_metrics: TaggedPayload,
    pub final_report: TaggedPayload,
    pub history: Vec<StepRecord>,
    pub stats: RunStats,
}

impl RunResult {
    /// Extract the result from a state that reached `Done`.
    ///
    /// A state missing any stage output cannot be a success; it comes back
    /// as a failure carrying the history.
    pub fn from_state(state: SharedState, total_duration_ms: u64) -> Result<Self, RunFailure> {
        let missing = StageId::ALL
            .into_iter()
            .find(|stage| state.payload(*stage).is_none());
        let SharedState {
            run_id,
            analysis,
            metrics,
            report,
            history,
            ..
        } = state;

        match (analysis, metrics, report) {
            (Some(final_analysis), Some(final_metrics), Some(final_report)) => {
                let stats = RunStats::from_history(&history, total_duration_ms);
                Ok(Self {
                    run_id,
                    final_analysis,
                    final_metrics,
                    final_report,
                    history,
                    stats,
                })
            }
            _ => {
                let stage = missing.unwrap_or(StageId::Report);
                let cause = RunError::ProtocolViolation {
                    stage,
                    message: format!("run finished without {} output", stage),
                };
                Err(RunFailure::new(cause, history))
            }
        }
    }

    /// Human-readable report text.
    ///
    /// The report's `humanReadable` field when present, otherwise the report
    /// document as pretty JSON.
    pub fn report_text(&self) -> String {
        match self.final_report.parsed.get("humanReadable").and_then(|v| v.as_str()) {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => serde_json::to_string_pretty(&self.final_report.parsed)
                .unwrap_or_else(|_| self.final_report.raw.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Feedback, PayloadKind};
    use serde_json::json;

    fn history() -> Vec<StepRecord> {
        let fb = Feedback::new(StageId::Analysis, 1, vec!["quote more".into()]);
        vec![
            StepRecord::output(StageId::Analysis, 1),
            StepRecord::evaluate(StageId::Analysis, false, 5.0, false),
            StepRecord::feedback(&fb),
            StepRecord::output(StageId::Analysis, 2),
            StepRecord::evaluate(StageId::Analysis, true, 9.0, false),
            StepRecord::output(StageId::Metrics, 1),
            StepRecord::evaluate(StageId::Metrics, true, 4.0, true),
        ]
    }

    #[test]
    fn test_stats_from_history() {
        let stats = RunStats::from_history(&history(), 1200);
        assert_eq!(stats.iterations_per_stage[&StageId::Analysis], 2);
        assert_eq!(stats.iterations_per_stage[&StageId::Metrics], 1);
        assert_eq!(stats.iterations_per_stage[&StageId::Report], 0);
        assert_eq!(stats.feedback_counts_per_stage[&StageId::Analysis], 1);
        assert_eq!(stats.total_feedback, 1);
        assert_eq!(stats.total_steps, 6);
        assert_eq!(stats.total_duration_ms, 1200);
    }

    #[test]
    fn test_pass_rate_excludes_forced() {
        let stats = RunStats::from_history(&history(), 0);
        assert_eq!(stats.pass_rates_per_stage[&StageId::Analysis], 0.5);
        assert_eq!(stats.pass_rates_per_stage[&StageId::Metrics], 0.0);
        assert!(!stats.pass_rates_per_stage.contains_key(&StageId::Report));
        assert_eq!(stats.forced_passes_per_stage[&StageId::Metrics], 1);
        assert_eq!(stats.total_forced_passes(), 1);
    }

    #[test]
    fn test_from_state_requires_all_outputs() {
        let mut state = SharedState::new("t");
        state.analysis = Some(TaggedPayload::new(PayloadKind::Analysis, json!({})));
        let failure = RunResult::from_state(state, 0).unwrap_err();
        assert!(failure.cause.to_string().contains("without Metrics output"));
    }

    fn result_with_report(report: serde_json::Value) -> RunResult {
        let mut state = SharedState::new("t");
        state.analysis = Some(TaggedPayload::new(PayloadKind::Analysis, json!({})));
        state.metrics = Some(TaggedPayload::new(PayloadKind::Metrics, json!({})));
        state.report = Some(TaggedPayload::new(PayloadKind::Report, report));
        RunResult::from_state(state, 0).unwrap()
    }

    #[test]
    fn test_report_text_prefers_human_readable() {
        let result = result_with_report(json!({"humanReadable": "# Report\nGood pacing."}));
        assert_eq!(result.report_text(), "# Report\nGood pacing.");
    }

    #[test]
    fn test_report_text_falls_back_to_json() {
        let result = result_with_report(json!({"executiveSummary": "Solid"}));
        assert!(result.report_text().contains("\"executiveSummary\": \"Solid\""));
    }
}
