//! Prompt templates for command-backed collaborators.
//!
//! Every producer prompt ends with the exact output label the pipeline
//! expects, and carries a mandatory revision section whenever feedback is
//! supplied.

use crate::payload::{PayloadKind, StageId, TaggedPayload, render_issues};

/// Build the analysis prompt for a transcript.
pub fn build_analysis_prompt(transcript: &str, feedback: &[String]) -> String {
    let mut prompt = String::new();

    prompt.push_str("# Interview Session Analysis\n\n");
    prompt.push_str(
        "Analyze the interview transcript below. Identify behavioural patterns \
         (filler words, pacing, repetition), strengths and weaknesses. Every \
         claim must be backed by a direct quote. Give each competency both \
         strengths and limitations.\n\n",
    );
    prompt.push_str("Evidence requirements per competency score:\n");
    prompt.push_str("- 8 or higher: at least 3 quoted examples\n");
    prompt.push_str("- 6 to 7: at least 2 quoted examples\n");
    prompt.push_str("- below 6: at least 1 quoted example\n\n");
    prompt.push_str("Return a JSON object with at least `strengths`, `weaknesses` ");
    prompt.push_str("and `coreCompetencies`.\n\n");

    push_feedback(&mut prompt, StageId::Analysis, feedback);

    prompt.push_str("## Transcript\n\n");
    prompt.push_str(transcript.trim());
    prompt.push_str("\n\n");

    push_output_contract(&mut prompt, PayloadKind::Analysis);
    prompt
}

/// Build the metrics prompt from an approved analysis.
pub fn build_metrics_prompt(analysis: &TaggedPayload, feedback: &[String]) -> String {
    let mut prompt = String::new();

    prompt.push_str("# Performance Metrics\n\n");
    prompt.push_str(
        "Turn the analysis below into performance metrics. Score each competency \
         0-10, list skill gaps with development suggestions, and give an overall \
         rating. Benchmarks and percentiles must be justified by the evidence; \
         do not invent industry data.\n\n",
    );
    prompt.push_str("Return a JSON object with `competencyScores`, `gapAnalysis` ");
    prompt.push_str("and `overallRating`.\n\n");

    push_feedback(&mut prompt, StageId::Metrics, feedback);

    prompt.push_str("## Analysis\n\n");
    prompt.push_str(&analysis.raw);
    prompt.push_str("\n\n");

    push_output_contract(&mut prompt, PayloadKind::Metrics);
    prompt
}

/// Build the report prompt from approved metrics.
pub fn build_report_prompt(metrics: &TaggedPayload, feedback: &[String]) -> String {
    let mut prompt = String::new();

    prompt.push_str("# Performance Report\n\n");
    prompt.push_str(
        "Write an evidence-based report from the metrics below. Every finding \
         cites evidence, recommendations are specific and actionable, and no \
         section repeats another.\n\n",
    );
    prompt.push_str("Return a JSON object with `humanReadable` (Markdown), ");
    prompt.push_str("`executiveSummary`, `keyFindings` and `developmentPlan`.\n\n");

    push_feedback(&mut prompt, StageId::Report, feedback);

    prompt.push_str("## Metrics\n\n");
    prompt.push_str(&metrics.raw);
    prompt.push_str("\n\n");

    push_output_contract(&mut prompt, PayloadKind::Report);
    prompt
}

/// Build the judge prompt for one stage output.
pub fn build_judge_prompt(stage: StageId, payload: &TaggedPayload, pass_threshold: f64) -> String {
    let mut prompt = String::new();

    prompt.push_str("# Quality Review\n\n");
    prompt.push_str(&format!(
        "You are the quality judge for the {} stage. Score the output below from \
         0 to 10. Do not approve output with unsupported claims, inflated scores, \
         generic recommendations or missing evidence. Output passes only with a \
         score of at least {:.1} and no critical issues.\n\n",
        stage, pass_threshold
    ));
    prompt.push_str("## Output Under Review\n\n");
    prompt.push_str(&payload.raw);
    prompt.push_str("\n\n");
    prompt.push_str("## Response Format\n\n");
    prompt.push_str("Respond with a single line:\n\n");
    prompt.push_str(&format!(
        "{} {{\"score\": <0-10>, \"passed\": <true|false>, \"issues\": \
         [{{\"severity\": \"critical|major|minor\", \"message\": \"...\"}}]}}\n",
        PayloadKind::Evaluation.label()
    ));
    prompt
}

fn push_feedback(prompt: &mut String, stage: StageId, feedback: &[String]) {
    if feedback.is_empty() {
        return;
    }
    prompt.push_str("## REVISION REQUIRED\n\n");
    prompt.push_str(&format!(
        "Your previous {} output was rejected. Address every point below:\n\n",
        stage
    ));
    prompt.push_str(&render_issues(feedback));
    prompt.push('\n');
}

fn push_output_contract(prompt: &mut String, kind: PayloadKind) {
    prompt.push_str("## Output\n\n");
    prompt.push_str(&format!(
        "Respond with `{}` followed by the JSON object and nothing else.\n",
        kind.label()
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_analysis_prompt_includes_transcript_and_label() {
        let prompt = build_analysis_prompt("I explained, um, the solution.", &[]);
        assert!(prompt.contains("I explained, um, the solution."));
        assert!(prompt.contains("Analysis Output:"));
        assert!(!prompt.contains("REVISION REQUIRED"));
    }

    #[test]
    fn test_feedback_section_is_numbered() {
        let feedback = vec!["Quote the candidate".to_string(), "Lower scores".to_string()];
        let prompt = build_analysis_prompt("t", &feedback);
        assert!(prompt.contains("## REVISION REQUIRED"));
        assert!(prompt.contains("1. Quote the candidate"));
        assert!(prompt.contains("2. Lower scores"));
    }

    #[test]
    fn test_metrics_prompt_embeds_analysis() {
        let analysis = TaggedPayload::new(PayloadKind::Analysis, json!({"strengths": ["x"]}));
        let prompt = build_metrics_prompt(&analysis, &[]);
        assert!(prompt.contains(r#"Analysis Output: {"strengths":["x"]}"#));
        assert!(prompt.contains("Metrics Output:"));
    }

    #[test]
    fn test_report_prompt_mentions_stage_in_feedback() {
        let metrics = TaggedPayload::new(PayloadKind::Metrics, json!({}));
        let prompt = build_report_prompt(&metrics, &["Cite evidence".to_string()]);
        assert!(prompt.contains("previous Report output was rejected"));
    }

    #[test]
    fn test_judge_prompt_states_threshold() {
        let payload = TaggedPayload::new(PayloadKind::Metrics, json!({}));
        let prompt = build_judge_prompt(StageId::Metrics, &payload, 8.0);
        assert!(prompt.contains("at least 8.0"));
        assert!(prompt.contains("Evaluation Output:"));
    }
}
