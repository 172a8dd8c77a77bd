//! Command-backed collaborators.
//!
//! A [`CommandAgent`] spawns an external CLI (by default `claude --print`),
//! writes the prompt to its stdin and reads the labelled answer from stdout.
//! Stage answers must carry an output label; unlabelled stdout is rejected as
//! an invalid response. Judge verdicts may be bare JSON.

use crate::agents::prompts::{
    build_analysis_prompt, build_judge_prompt, build_metrics_prompt, build_report_prompt,
};
use crate::agents::{Analyzer, Judge, MetricsCalculator, ReportGenerator};
use crate::gates::DEFAULT_PASS_THRESHOLD;
use crate::payload::{AgentOutput, PayloadKind, StageId, TaggedPayload, preview};
use crate::review::JudgeVerdict;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};

/// Default per-invocation timeout.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;

/// How to invoke the external command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// `command arg1 arg2`, for logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Collaborator that answers prompts by running an external command.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    spec: CommandSpec,
    pass_threshold: f64,
}

impl CommandAgent {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }

    /// Threshold quoted to the command when it acts as judge.
    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Run the command with `prompt` on stdin and return its stdout.
    pub async fn invoke(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.spec.command);
        cmd.args(&self.spec.args);

        if let Some(ref working_dir) = self.spec.working_dir {
            cmd.current_dir(working_dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.spec.display()))?;

        tracing::debug!(
            command = %self.spec.display(),
            prompt_chars = prompt.len(),
            "spawned collaborator"
        );

        // Writing the prompt and waiting for exit share one deadline.
        let stdin = child.stdin.take();
        let exchange = async {
            let (written, output) =
                tokio::join!(write_prompt(stdin, prompt), child.wait_with_output());
            written?;
            output.context("Failed to wait for process")
        };

        let output = tokio::time::timeout(self.spec.timeout, exchange)
            .await
            .with_context(|| {
                format!(
                    "'{}' timed out after {:?}",
                    self.spec.command, self.spec.timeout
                )
            })??;

        tracing::debug!(
            command = %self.spec.command,
            elapsed_ms = start.elapsed().as_millis() as u64,
            status = ?output.status.code(),
            "collaborator exited"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "'{}' exited with code {}: {}",
                self.spec.command,
                output.status.code().unwrap_or(-1),
                preview(&stderr, 200)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn produce(&self, prompt: String) -> Result<AgentOutput> {
        let stdout = self.invoke(&prompt).await?;
        labelled_output(&stdout)
    }
}

async fn write_prompt(stdin: Option<ChildStdin>, prompt: &str) -> Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(prompt.as_bytes()).await {
        // The child exited without reading; its exit status decides.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other.context("Failed to write prompt to stdin"),
    }
}

/// Stage answers must carry an output label. The stage runner checks that it
/// is the right one.
fn labelled_output(stdout: &str) -> Result<AgentOutput> {
    if PayloadKind::classify(stdout).is_none() {
        bail!(
            "Invalid LLM response: missing output label: {}",
            preview(stdout, 120)
        );
    }
    Ok(AgentOutput::Text(stdout.to_string()))
}

fn parse_verdict(stdout: &str) -> Result<JudgeVerdict> {
    let payload = if PayloadKind::classify(stdout).is_some() {
        TaggedPayload::parse_expecting(stdout, PayloadKind::Evaluation)?
    } else {
        let labelled = format!("{} {}", PayloadKind::Evaluation.label(), stdout.trim());
        TaggedPayload::parse(&labelled)
            .map_err(|_| anyhow!("Invalid judge response: {}", preview(stdout, 120)))?
    };
    serde_json::from_value(payload.parsed).context("Evaluation output is not a verdict")
}

#[async_trait]
impl Analyzer for CommandAgent {
    async fn analyze(&self, transcript: &str, feedback: &[String]) -> Result<AgentOutput> {
        self.produce(build_analysis_prompt(transcript, feedback)).await
    }
}

#[async_trait]
impl MetricsCalculator for CommandAgent {
    async fn calculate(
        &self,
        analysis: &TaggedPayload,
        feedback: &[String],
    ) -> Result<AgentOutput> {
        self.produce(build_metrics_prompt(analysis, feedback)).await
    }
}

#[async_trait]
impl ReportGenerator for CommandAgent {
    async fn generate(&self, metrics: &TaggedPayload, feedback: &[String]) -> Result<AgentOutput> {
        self.produce(build_report_prompt(metrics, feedback)).await
    }
}

#[async_trait]
impl Judge for CommandAgent {
    async fn evaluate(
        &self,
        kind: StageId,
        payload: &TaggedPayload,
        _source: StageId,
    ) -> Result<JudgeVerdict> {
        let prompt = build_judge_prompt(kind, payload, self.pass_threshold);
        let stdout = self.invoke(&prompt).await?;
        parse_verdict(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell(script: &str) -> CommandAgent {
        CommandAgent::new(CommandSpec::new("sh").with_args(["-c", script]))
    }

    #[test]
    fn test_labelled_output_keeps_labelled_text() {
        let out = labelled_output("Metrics Output: {}").unwrap();
        assert_eq!(out, AgentOutput::Text("Metrics Output: {}".into()));
    }

    #[test]
    fn test_labelled_output_rejects_bare_json() {
        let err = labelled_output(r#"{"strengths":["a"],"weaknesses":[]}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid LLM response"));
    }

    #[test]
    fn test_labelled_output_rejects_prose() {
        let err = labelled_output("I could not analyze this.").unwrap_err();
        assert!(err.to_string().contains("Invalid LLM response"));
    }

    #[test]
    fn test_parse_verdict_labelled_and_bare() {
        let v = parse_verdict(r#"Evaluation Output: {"score": 9, "passed": true}"#).unwrap();
        assert!(v.passed);
        let v = parse_verdict(r#"{"score": 3, "passed": false, "issues": ["thin"]}"#).unwrap();
        assert_eq!(v.issues.len(), 1);
        let v = parse_verdict("```json\n{\"score\": 7, \"passed\": false}\n```").unwrap();
        assert_eq!(v.score, 7.0);
    }

    #[test]
    fn test_parse_verdict_rejects_prose_and_stage_labels() {
        let err = parse_verdict("Looks good to me").unwrap_err();
        assert!(err.to_string().contains("Invalid judge response"));
        assert!(parse_verdict(r#"Report Output: {"score": 9, "passed": true}"#).is_err());
    }

    #[test]
    fn test_parse_verdict_rejects_non_verdict() {
        assert!(parse_verdict(r#"Evaluation Output: {"rating": "good"}"#).is_err());
    }

    #[test]
    fn test_spec_display() {
        let spec = CommandSpec::new("claude").with_args(["--print"]);
        assert_eq!(spec.display(), "claude --print");
    }

    #[tokio::test]
    async fn test_invoke_pipes_prompt_through_stdin() {
        let agent = CommandAgent::new(CommandSpec::new("cat"));
        let out = agent.invoke("hello panel").await.unwrap();
        assert_eq!(out, "hello panel");
    }

    #[tokio::test]
    async fn test_invoke_reports_exit_code() {
        let agent = shell("cat >/dev/null; echo boom >&2; exit 3");
        let err = agent.invoke("x").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("code 3"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test]
    async fn test_invoke_times_out() {
        let agent = CommandAgent::new(
            CommandSpec::new("sh")
                .with_args(["-c", "sleep 5"])
                .with_timeout(Duration::from_millis(100)),
        );
        let err = agent.invoke("x").await.unwrap_err();
        assert_eq!(err.to_string(), "'sh' timed out after 100ms");
    }

    #[tokio::test]
    async fn test_timeout_covers_undrained_stdin() {
        let agent = CommandAgent::new(
            CommandSpec::new("sh")
                .with_args(["-c", "sleep 30"])
                .with_timeout(Duration::from_millis(200)),
        );
        let prompt = "x".repeat(4 * 1024 * 1024);

        let result = tokio::time::timeout(Duration::from_secs(3), agent.invoke(&prompt)).await;
        let err = result.expect("per-call timeout should fire").unwrap_err();
        assert!(err.to_string().contains("timed out after 200ms"));
    }

    #[tokio::test]
    async fn test_metrics_rejects_unlabelled_json() {
        let agent = shell(r#"cat >/dev/null; echo '{"competencyScores":{"x":5}}'"#);
        let analysis = TaggedPayload::new(PayloadKind::Analysis, json!({}));
        let err = agent.calculate(&analysis, &[]).await.unwrap_err();
        assert!(err.to_string().contains("Invalid LLM response"));
    }

    #[tokio::test]
    async fn test_analyzer_returns_labelled_text() {
        let agent = shell(r#"cat >/dev/null; echo 'Analysis Output: {"strengths":["a"]}'"#);
        let out = agent.analyze("transcript", &[]).await.unwrap();
        let payload = out.into_payload(PayloadKind::Analysis).unwrap();
        assert_eq!(payload.parsed["strengths"][0], "a");
    }

    #[tokio::test]
    async fn test_judge_parses_verdict() {
        let agent = shell(r#"cat >/dev/null; echo 'Evaluation Output: {"score": 8.5, "passed": true}'"#);
        let payload = TaggedPayload::new(PayloadKind::Report, json!({"humanReadable": "x"}));
        let verdict = agent
            .evaluate(StageId::Report, &payload, StageId::Report)
            .await
            .unwrap();
        assert_eq!(verdict.score, 8.5);
    }
}
