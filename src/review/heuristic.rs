//! Rule-based judge.
//!
//! Scores a payload on structure alone: required fields, list sizes, score
//! ranges and evidence coverage. Scoring starts at 10 and each issue deducts
//! by severity. Malformed input is an error, never a pass.

use crate::agents::Judge;
use crate::gates::DEFAULT_PASS_THRESHOLD;
use crate::payload::{PayloadKind, StageId, TaggedPayload};
use crate::review::findings::{Issue, IssueSeverity, JudgeVerdict};
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value};

const CRITICAL_DEDUCTION: f64 = 3.0;
const MAJOR_DEDUCTION: f64 = 1.5;
const MINOR_DEDUCTION: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct HeuristicJudge {
    pass_threshold: f64,
}

impl Default for HeuristicJudge {
    fn default() -> Self {
        Self::new(DEFAULT_PASS_THRESHOLD)
    }
}

impl HeuristicJudge {
    pub fn new(pass_threshold: f64) -> Self {
        Self { pass_threshold }
    }

    /// Score one payload.
    pub fn score(&self, payload: &TaggedPayload) -> Result<JudgeVerdict> {
        let Some(doc) = payload.parsed.as_object() else {
            bail!("{} payload is not a JSON object", payload.kind);
        };

        let issues = match payload.kind {
            PayloadKind::Analysis => check_analysis(doc),
            PayloadKind::Metrics => check_metrics(doc),
            PayloadKind::Report => check_report(doc),
            PayloadKind::Evaluation => bail!("evaluation payloads cannot be judged"),
        };

        let deductions: f64 = issues
            .iter()
            .map(|issue| match issue.severity {
                IssueSeverity::Critical => CRITICAL_DEDUCTION,
                IssueSeverity::Major => MAJOR_DEDUCTION,
                IssueSeverity::Minor => MINOR_DEDUCTION,
            })
            .sum();
        let score = (10.0 - deductions).max(0.0);

        let verdict = JudgeVerdict::new(score, false).with_issues(issues);
        let passed = verdict.critical_count() == 0 && score >= self.pass_threshold;
        Ok(JudgeVerdict { passed, ..verdict })
    }
}

#[async_trait]
impl Judge for HeuristicJudge {
    async fn evaluate(
        &self,
        kind: StageId,
        payload: &TaggedPayload,
        _source: StageId,
    ) -> Result<JudgeVerdict> {
        if payload.kind != kind.payload_kind() {
            bail!("asked to judge {} but received {} output", kind, payload.kind);
        }
        self.score(payload)
    }
}

fn string_list_len(doc: &Map<String, Value>, key: &str) -> Option<usize> {
    doc.get(key).and_then(Value::as_array).map(Vec::len)
}

fn in_range(value: &Value, min: f64, max: f64) -> bool {
    value.as_f64().is_some_and(|v| (min..=max).contains(&v))
}

/// Minimum evidence examples expected for a competency score.
fn required_evidence(score: f64) -> u64 {
    if score >= 8.0 {
        3
    } else if score >= 6.0 {
        2
    } else {
        1
    }
}

fn check_analysis(doc: &Map<String, Value>) -> Vec<Issue> {
    let mut issues = Vec::new();

    match string_list_len(doc, "strengths") {
        None => issues.push(Issue::critical("Missing strengths list")),
        Some(n) if n < 2 => issues.push(Issue::minor("Insufficient strengths identified")),
        Some(_) => {}
    }
    if string_list_len(doc, "weaknesses").is_none() {
        issues.push(Issue::critical("Missing weaknesses list"));
    }

    match doc.get("coreCompetencies").and_then(Value::as_object) {
        None => issues.push(Issue::minor("Missing core competencies")),
        Some(competencies) => {
            for (name, competency) in competencies {
                let score = competency.get("score");
                if !score.is_some_and(|s| in_range(s, 1.0, 10.0)) {
                    issues.push(Issue::major(format!("{}: score missing or outside 1-10", name)));
                    continue;
                }
                let score = score.and_then(Value::as_f64).unwrap_or_default();
                let evidence = competency
                    .get("evidenceCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let needed = required_evidence(score);
                if evidence < needed {
                    issues.push(Issue::major(format!(
                        "{}: score {} is supported by {} evidence examples, needs at least {}",
                        name, score, evidence, needed
                    )));
                }
                let has_limitations = competency
                    .get("weaknesses")
                    .and_then(Value::as_array)
                    .is_some_and(|w| !w.is_empty());
                if !has_limitations {
                    issues.push(Issue::minor(format!("{}: no limitations identified", name)));
                }
            }
        }
    }

    issues
}

fn check_metrics(doc: &Map<String, Value>) -> Vec<Issue> {
    let mut issues = Vec::new();

    let scores = doc
        .get("competencyScores")
        .or_else(|| doc.get("skills"))
        .and_then(Value::as_object);
    match scores {
        None => issues.push(Issue::critical("Missing competency scores")),
        Some(scores) if scores.is_empty() => {
            issues.push(Issue::critical("Competency scores are empty"))
        }
        Some(scores) => {
            for (name, value) in scores {
                if !in_range(value, 0.0, 10.0) {
                    issues.push(Issue::critical(format!("{}: score outside 0-10", name)));
                }
            }
        }
    }

    let has_gaps = doc.get("gapAnalysis").or_else(|| doc.get("gaps")).is_some_and(Value::is_array);
    if !has_gaps {
        issues.push(Issue::major("No gap analysis"));
    }

    if let Some(rating) = doc.get("overallRating")
        && !rating.get("score").is_some_and(|s| in_range(s, 1.0, 10.0))
    {
        issues.push(Issue::critical("Overall rating score outside 1-10"));
    }

    issues
}

fn check_report(doc: &Map<String, Value>) -> Vec<Issue> {
    let mut issues = Vec::new();

    let non_empty = |key: &str| {
        doc.get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    };
    if !non_empty("humanReadable") && !non_empty("executiveSummary") {
        issues.push(Issue::critical("Report has no readable summary"));
    }

    if let Some(findings) = doc.get("keyFindings").and_then(Value::as_array) {
        for (i, finding) in findings.iter().enumerate() {
            let has_recommendations = finding
                .get("recommendations")
                .and_then(Value::as_array)
                .is_some_and(|r| !r.is_empty());
            if !has_recommendations {
                issues.push(Issue::minor(format!("Finding {} has no recommendations", i + 1)));
            }
        }
    }

    if non_empty("executiveSummary") && !doc.contains_key("developmentPlan") {
        issues.push(Issue::minor("Missing development plan"));
    }

    issues
}
