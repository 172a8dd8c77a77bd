use crate::aggregate::{RunResult, RunStats};
use crate::config::PipelineConfig;
use crate::errors::RunFailure;
use crate::orchestrator::state::StepRecord;
use crate::payload::{StageId, TaggedPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A finished run as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_file: Option<PathBuf>,
    pub config: PipelineConfig,
    pub outcome: RunOutcome,
    pub history: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<FinalOutputs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunOutcome {
    Done,
    Failed {
        kind: String,
        cause: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<StageId>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalOutputs {
    pub analysis: TaggedPayload,
    pub metrics: TaggedPayload,
    pub report: TaggedPayload,
}

impl AuditRun {
    pub fn from_result(
        result: &RunResult,
        config: PipelineConfig,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: result.run_id,
            started_at,
            ended_at: Utc::now(),
            transcript_file: None,
            config,
            outcome: RunOutcome::Done,
            history: result.history.clone(),
            stats: Some(result.stats.clone()),
            outputs: Some(FinalOutputs {
                analysis: result.final_analysis.clone(),
                metrics: result.final_metrics.clone(),
                report: result.final_report.clone(),
            }),
        }
    }

    pub fn from_failure(
        failure: &RunFailure,
        config: PipelineConfig,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: failure.run_id.unwrap_or_else(Uuid::new_v4),
            started_at,
            ended_at: Utc::now(),
            transcript_file: None,
            config,
            outcome: RunOutcome::Failed {
                kind: failure.cause.kind().to_string(),
                cause: failure.cause.to_string(),
                stage: failure.cause.stage(),
            },
            history: failure.partial_history.clone(),
            stats: None,
            outputs: None,
        }
    }

    pub fn with_transcript_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcript_file = Some(path.into());
        self
    }

    pub fn is_done(&self) -> bool {
        self.outcome == RunOutcome::Done
    }
}

pub mod logger;
pub use logger::{AuditLogger, write_run};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{RunError, StageFailure};

    #[test]
    fn test_audit_run_from_failure() {
        let failure = RunFailure::new(
            RunError::Stage(StageFailure::new(StageId::Analysis, "bad json")),
            vec![StepRecord::failure(Some(StageId::Analysis), "bad json")],
        );
        let run = AuditRun::from_failure(&failure, PipelineConfig::default(), Utc::now());
        assert!(!run.is_done());
        assert!(run.outputs.is_none());
        assert_eq!(run.history.len(), 1);
        match run.outcome {
            RunOutcome::Failed { kind, stage, .. } => {
                assert_eq!(kind, "stage_failure");
                assert_eq!(stage, Some(StageId::Analysis));
            }
            RunOutcome::Done => panic!("Expected failed outcome"),
        }
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(RunOutcome::Done).unwrap();
        assert_eq!(json["status"], "done");
        let failed = RunOutcome::Failed {
            kind: "timeout".into(),
            cause: "timeout after 5 ms".into(),
            stage: None,
        };
        let json = serde_json::to_value(failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json.get("stage").is_none());
    }
}
