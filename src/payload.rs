//! Tagged payload protocol shared by every pipeline stage.
//!
//! Stages exchange [`TaggedPayload`] values: a [`PayloadKind`] plus the parsed
//! JSON document. The textual label (`"Analysis Output: {...}"`) only exists
//! at the wire boundary, where a collaborator hands back free text; it is
//! recovered with [`TaggedPayload::parse`] and re-rendered in
//! [`TaggedPayload::raw`].
//!
//! ## Example
//!
//! ```
//! use panel::payload::{PayloadKind, TaggedPayload};
//!
//! let payload = TaggedPayload::parse(
//!     r#"Analysis Output: {"strengths":["clear"],"weaknesses":["filler words"]}"#,
//! )
//! .unwrap();
//!
//! assert_eq!(payload.kind, PayloadKind::Analysis);
//! assert_eq!(payload.parsed["strengths"][0], "clear");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

// Opening Markdown fence LLM collaborators like to wrap JSON in.
static OPENING_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```(?:json|JSON)?[ \t]*\r?\n?").unwrap());

/// Errors produced while decoding a labelled payload from text.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("no recognised output label in content: {preview}")]
    MissingLabel { preview: String },

    #[error("{kind} output is not valid JSON: {message}")]
    InvalidJson { kind: PayloadKind, message: String },

    #[error("expected {expected} output, got {actual}")]
    KindMismatch {
        expected: PayloadKind,
        actual: PayloadKind,
    },
}

/// One of the three content-producing pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageId {
    Analysis,
    Metrics,
    Report,
}

impl StageId {
    /// All stages in pipeline order.
    pub const ALL: [StageId; 3] = [StageId::Analysis, StageId::Metrics, StageId::Report];

    /// The stage that runs after this one is approved, or `None` after Report.
    pub fn successor(self) -> Option<StageId> {
        match self {
            Self::Analysis => Some(Self::Metrics),
            Self::Metrics => Some(Self::Report),
            Self::Report => None,
        }
    }

    /// The payload kind this stage must produce.
    pub fn payload_kind(self) -> PayloadKind {
        match self {
            Self::Analysis => PayloadKind::Analysis,
            Self::Metrics => PayloadKind::Metrics,
            Self::Report => PayloadKind::Report,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "Analysis",
            Self::Metrics => "Metrics",
            Self::Report => "Report",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analysis" => Ok(Self::Analysis),
            "metrics" => Ok(Self::Metrics),
            "report" => Ok(Self::Report),
            _ => anyhow::bail!(
                "Invalid stage '{}'. Valid values: analysis, metrics, report",
                s
            ),
        }
    }
}

/// Type marker carried by every labelled output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    Analysis,
    Metrics,
    Report,
    Evaluation,
}

impl PayloadKind {
    const ALL: [PayloadKind; 4] = [
        PayloadKind::Analysis,
        PayloadKind::Metrics,
        PayloadKind::Report,
        PayloadKind::Evaluation,
    ];

    /// The literal wire label, e.g. `"Metrics Output:"`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Analysis => "Analysis Output:",
            Self::Metrics => "Metrics Output:",
            Self::Report => "Report Output:",
            Self::Evaluation => "Evaluation Output:",
        }
    }

    /// Classify text by the earliest output label it contains.
    pub fn classify(text: &str) -> Option<PayloadKind> {
        Self::locate(text).map(|(kind, _)| kind)
    }

    fn locate(text: &str) -> Option<(PayloadKind, usize)> {
        Self::ALL
            .iter()
            .filter_map(|kind| text.find(kind.label()).map(|pos| (*kind, pos)))
            .min_by_key(|(_, pos)| *pos)
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Analysis => "Analysis",
            Self::Metrics => "Metrics",
            Self::Report => "Report",
            Self::Evaluation => "Evaluation",
        };
        f.write_str(s)
    }
}

/// A labelled, parsed stage output.
///
/// `raw` always starts with `kind.label()` followed by the JSON document;
/// `parsed` is passed through untouched apart from accessory repairs such as
/// [`repair_evidence_counts`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedPayload {
    pub kind: PayloadKind,
    pub raw: String,
    pub parsed: Value,
}

impl TaggedPayload {
    pub fn new(kind: PayloadKind, parsed: Value) -> Self {
        let raw = format!("{} {}", kind.label(), parsed);
        Self { kind, raw, parsed }
    }

    /// Decode a collaborator's textual output.
    ///
    /// Prose before the label is ignored. The first JSON document after the
    /// label is taken verbatim; an opening fence in front of it and anything
    /// after it (a closing fence, trailing remarks) are dropped.
    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let Some((kind, pos)) = PayloadKind::locate(text) else {
            return Err(PayloadError::MissingLabel {
                preview: preview(text, 80),
            });
        };

        let after_label = text[pos + kind.label().len()..].trim_start();
        let body = OPENING_FENCE_REGEX.replace(after_label, "");
        let parsed = serde_json::Deserializer::from_str(&body)
            .into_iter::<Value>()
            .next()
            .unwrap_or_else(|| Err(serde::de::Error::custom("no JSON document after label")))
            .map_err(|e| PayloadError::InvalidJson {
                kind,
                message: e.to_string(),
            })?;

        Ok(Self::new(kind, parsed))
    }

    /// Decode and require a specific kind.
    pub fn parse_expecting(text: &str, expected: PayloadKind) -> Result<Self, PayloadError> {
        let payload = Self::parse(text)?;
        payload.expect_kind(expected)?;
        Ok(payload)
    }

    pub fn expect_kind(&self, expected: PayloadKind) -> Result<(), PayloadError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(PayloadError::KindMismatch {
                expected,
                actual: self.kind,
            })
        }
    }

    /// Replace the parsed document and re-render `raw` to match.
    pub fn with_parsed(mut self, parsed: Value) -> Self {
        self.raw = format!("{} {}", self.kind.label(), parsed);
        self.parsed = parsed;
        self
    }
}

/// What a content-producing collaborator hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
    /// Free text carrying a wire label, e.g. straight from an LLM.
    Text(String),
    /// An already-structured payload.
    Payload(TaggedPayload),
}

impl AgentOutput {
    /// Normalize into a payload of the expected kind.
    pub fn into_payload(self, expected: PayloadKind) -> Result<TaggedPayload, PayloadError> {
        match self {
            Self::Text(text) => TaggedPayload::parse_expecting(&text, expected),
            Self::Payload(payload) => {
                payload.expect_kind(expected)?;
                Ok(payload)
            }
        }
    }
}

impl From<TaggedPayload> for AgentOutput {
    fn from(payload: TaggedPayload) -> Self {
        Self::Payload(payload)
    }
}

impl From<String> for AgentOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Revision request sent back to a stage after a failed evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub stage: StageId,
    /// 1-based revision number for this stage.
    pub iteration: u32,
    pub issues: Vec<String>,
}

impl Feedback {
    pub fn new(stage: StageId, iteration: u32, issues: Vec<String>) -> Self {
        Self {
            stage,
            iteration,
            issues,
        }
    }

    /// `"Feedback for <Stage> #<n>"`.
    pub fn label(&self) -> String {
        format!("Feedback for {} #{}", self.stage, self.iteration)
    }

}

/// Numbered issue list, one per line, as injected into a revising stage.
pub fn render_issues(issues: &[String]) -> String {
    if issues.is_empty() {
        return "1. Output did not meet the quality bar.\n".to_string();
    }
    issues
        .iter()
        .enumerate()
        .map(|(i, issue)| format!("{}. {}\n", i + 1, issue))
        .collect()
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Correct `coreCompetencies.<name>.evidenceCount` to the observed length of
/// `evidenceByCompetency.<name>`. Returns how many counts were changed.
pub fn repair_evidence_counts(parsed: &mut Value) -> usize {
    let observed: Vec<(String, usize)> = match parsed.get("evidenceByCompetency") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, items)| items.as_array().map(|a| (name.clone(), a.len())))
            .collect(),
        _ => return 0,
    };

    let Some(Value::Object(competencies)) = parsed.get_mut("coreCompetencies") else {
        return 0;
    };

    let mut repaired = 0;
    for (name, count) in observed {
        let Some(Value::Object(competency)) = competencies.get_mut(&name) else {
            continue;
        };
        let reported = competency.get("evidenceCount").and_then(Value::as_u64);
        if reported != Some(count as u64) {
            competency.insert("evidenceCount".to_string(), Value::from(count));
            repaired += 1;
        }
    }
    repaired
}

/// Apply read-time repairs appropriate for the payload's kind.
pub fn repair_on_read(payload: TaggedPayload) -> (TaggedPayload, usize) {
    if payload.kind != PayloadKind::Analysis {
        return (payload, 0);
    }
    let mut parsed = payload.parsed.clone();
    let repaired = repair_evidence_counts(&mut parsed);
    if repaired == 0 {
        (payload, 0)
    } else {
        (payload.with_parsed(parsed), repaired)
    }
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_labelled_analysis() {
        let payload =
            TaggedPayload::parse(r#"Analysis Output: {"strengths":["clear"],"weaknesses":[]}"#)
                .unwrap();
        assert_eq!(payload.kind, PayloadKind::Analysis);
        assert!(payload.raw.starts_with("Analysis Output:"));
        assert_eq!(payload.parsed["strengths"], json!(["clear"]));
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let text = "Metrics Output:\n```json\n{\"competencyScores\":{\"communication\":7}}\n```";
        let payload = TaggedPayload::parse(text).unwrap();
        assert_eq!(payload.kind, PayloadKind::Metrics);
        assert_eq!(payload.parsed["competencyScores"]["communication"], 7);
    }

    #[test]
    fn test_parse_missing_label() {
        let err = TaggedPayload::parse(r#"{"strengths":[]}"#).unwrap_err();
        assert!(matches!(err, PayloadError::MissingLabel { .. }));
    }

    #[test]
    fn test_parse_invalid_json_carries_kind() {
        let err = TaggedPayload::parse("Report Output: {not json").unwrap_err();
        match err {
            PayloadError::InvalidJson { kind, .. } => assert_eq!(kind, PayloadKind::Report),
            other => panic!("Expected InvalidJson, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_expecting_rejects_other_kind() {
        let err = TaggedPayload::parse_expecting(r#"Report Output: {}"#, PayloadKind::Metrics)
            .unwrap_err();
        assert_eq!(
            err,
            PayloadError::KindMismatch {
                expected: PayloadKind::Metrics,
                actual: PayloadKind::Report,
            }
        );
    }

    #[test]
    fn test_classify_uses_earliest_label() {
        let text = "Metrics Output: {\"note\": \"built from Analysis Output: ...\"}";
        assert_eq!(PayloadKind::classify(text), Some(PayloadKind::Metrics));
        assert_eq!(PayloadKind::classify("plain text"), None);
    }

    #[test]
    fn test_new_renders_label() {
        let payload = TaggedPayload::new(PayloadKind::Report, json!({"humanReadable": "ok"}));
        assert_eq!(payload.raw, r#"Report Output: {"humanReadable":"ok"}"#);
    }

    #[test]
    fn test_agent_output_payload_kind_checked() {
        let payload = TaggedPayload::new(PayloadKind::Analysis, json!({}));
        let out = AgentOutput::from(payload);
        assert!(out.clone().into_payload(PayloadKind::Analysis).is_ok());
        assert!(out.into_payload(PayloadKind::Report).is_err());
    }

    #[test]
    fn test_stage_successors() {
        assert_eq!(StageId::Analysis.successor(), Some(StageId::Metrics));
        assert_eq!(StageId::Metrics.successor(), Some(StageId::Report));
        assert_eq!(StageId::Report.successor(), None);
    }

    #[test]
    fn test_stage_from_str() {
        assert_eq!("METRICS".parse::<StageId>().unwrap(), StageId::Metrics);
        assert!("judge".parse::<StageId>().is_err());
    }

    #[test]
    fn test_parse_keeps_fences_inside_strings() {
        let text = r#"Report Output: {"humanReadable":"Use ```python blocks``` here"}"#;
        let payload = TaggedPayload::parse(text).unwrap();
        assert_eq!(payload.parsed["humanReadable"], "Use ```python blocks``` here");

        let fenced = "Report Output:\n```json\n{\"humanReadable\":\"```json\\nx\\n```\"}\n```\n";
        let payload = TaggedPayload::parse(fenced).unwrap();
        assert_eq!(payload.parsed["humanReadable"], "```json\nx\n```");
    }

    #[test]
    fn test_parse_ignores_prose_around_document() {
        let text = "Sure! Here it is.\nAnalysis Output: {\"strengths\":[\"clear\"]}\nHope that helps.";
        let payload = TaggedPayload::parse(text).unwrap();
        assert_eq!(payload.kind, PayloadKind::Analysis);
        assert_eq!(payload.raw, r#"Analysis Output: {"strengths":["clear"]}"#);
    }

    #[test]
    fn test_parse_label_without_document() {
        let err = TaggedPayload::parse("Metrics Output:   ").unwrap_err();
        assert!(matches!(err, PayloadError::InvalidJson { kind: PayloadKind::Metrics, .. }));
    }

    #[test]
    fn test_feedback_label() {
        let fb = Feedback::new(StageId::Analysis, 2, vec!["Missing evidence".into()]);
        assert_eq!(fb.label(), "Feedback for Analysis #2");
        assert_eq!(fb.to_string(), "Feedback for Analysis #2");
    }

    #[test]
    fn test_render_issues_numbers_each_issue() {
        let rendered = render_issues(&["Missing evidence".into(), "Scores inflated".into()]);
        assert_eq!(rendered, "1. Missing evidence\n2. Scores inflated\n");
        assert!(render_issues(&[]).starts_with("1. "));
    }

    #[test]
    fn test_repair_evidence_counts() {
        let mut parsed = json!({
            "coreCompetencies": {
                "leadership": {"score": 6, "evidenceCount": 5},
                "communication": {"score": 8, "evidenceCount": 2}
            },
            "evidenceByCompetency": {
                "leadership": [{"quote": "a"}, {"quote": "b"}],
                "communication": [{"quote": "c"}, {"quote": "d"}]
            }
        });
        assert_eq!(repair_evidence_counts(&mut parsed), 1);
        assert_eq!(parsed["coreCompetencies"]["leadership"]["evidenceCount"], 2);
        assert_eq!(parsed["coreCompetencies"]["communication"]["evidenceCount"], 2);
    }

    #[test]
    fn test_repair_on_read_ignores_other_kinds() {
        let payload = TaggedPayload::new(
            PayloadKind::Metrics,
            json!({"coreCompetencies": {"x": {"evidenceCount": 9}}, "evidenceByCompetency": {"x": []}}),
        );
        let (out, repaired) = repair_on_read(payload.clone());
        assert_eq!(repaired, 0);
        assert_eq!(out, payload);
    }

    #[test]
    fn test_repair_on_read_rerenders_raw() {
        let payload = TaggedPayload::new(
            PayloadKind::Analysis,
            json!({"coreCompetencies": {"x": {"evidenceCount": 9}}, "evidenceByCompetency": {"x": [1]}}),
        );
        let (out, repaired) = repair_on_read(payload);
        assert_eq!(repaired, 1);
        assert!(out.raw.contains("\"evidenceCount\":1"));
    }
}
