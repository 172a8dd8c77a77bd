//! Pipeline execution: `panel run`.

use anyhow::{Context, Result};
use chrono::Utc;
use panel::aggregate::RunResult;
use panel::audit::{AuditLogger, AuditRun, write_run};
use panel::errors::RunFailure;
use panel::orchestrator::Orchestrator;
use panel::panel_config::PanelConfig;
use panel::payload::StageId;
use std::io::Read;
use std::path::Path;

pub async fn cmd_run(
    config: &PanelConfig,
    transcript: &Path,
    json: bool,
    audit_out: Option<&Path>,
) -> Result<()> {
    let text = read_transcript(transcript)?;
    if text.trim().is_empty() {
        anyhow::bail!("Transcript is empty: {}", transcript.display());
    }

    let pipeline = config.pipeline_config();
    let orchestrator = Orchestrator::new(config.agents(), pipeline)
        .context("Invalid pipeline configuration")?;

    let started_at = Utc::now();
    let outcome = orchestrator.run(&text).await;

    let mut audit = match &outcome {
        Ok(result) => AuditRun::from_result(result, pipeline, started_at),
        Err(failure) => AuditRun::from_failure(failure, pipeline, started_at),
    };
    if !is_stdin(transcript) {
        audit = audit.with_transcript_file(transcript);
    }

    let logger = AuditLogger::new(&config.audit_dir());
    match logger.record(&audit) {
        Ok(path) => tracing::debug!(path = %path.display(), "recorded run"),
        Err(e) => tracing::warn!("Failed to record run: {:#}", e),
    }
    if let Some(path) = audit_out {
        write_run(&audit, path)?;
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&audit).context("Failed to serialize run")?
        );
    }

    match outcome {
        Ok(result) => {
            if !json {
                println!("{}", result.report_text());
            }
            print_summary(&result);
            Ok(())
        }
        Err(failure) => {
            print_failure(&failure);
            Err(failure.into())
        }
    }
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn read_transcript(path: &Path) -> Result<String> {
    if is_stdin(path) {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read transcript from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))
}

fn print_summary(result: &RunResult) {
    let stats = &result.stats;
    eprintln!();
    eprintln!("{}", console::style("Run summary").bold().cyan());
    for stage in StageId::ALL {
        let iterations = stats.iterations_per_stage.get(&stage).copied().unwrap_or(0);
        let feedback = stats.feedback_counts_per_stage.get(&stage).copied().unwrap_or(0);
        let forced = stats.forced_passes_per_stage.get(&stage).copied().unwrap_or(0);
        let pass_rate = stats
            .pass_rates_per_stage
            .get(&stage)
            .map(|r| format!("{:.0}%", r * 100.0))
            .unwrap_or_else(|| "-".to_string());

        let mut line = format!(
            "  {:<8} {} iteration(s), {} feedback, pass rate {}",
            stage, iterations, feedback, pass_rate
        );
        if forced > 0 {
            line.push_str(&format!(" {}", console::style("(forced)").yellow()));
        }
        eprintln!("{}", line);
    }
    eprintln!(
        "  {} steps in {} ms (run {})",
        stats.total_steps,
        stats.total_duration_ms,
        &result.run_id.to_string()[..8]
    );
}

fn print_failure(failure: &RunFailure) {
    eprintln!();
    eprintln!(
        "{} {}",
        console::style("Pipeline failed:").red().bold(),
        failure.cause
    );
    if let Some(last) = failure
        .partial_history
        .iter()
        .rev()
        .find(|r| r.action != panel::orchestrator::StepAction::Fail)
    {
        eprintln!(
            "  Last step: {} {:?} at {}",
            last.actor,
            last.action,
            last.timestamp.format("%H:%M:%S")
        );
    }
    eprintln!("  {} step(s) recorded", failure.partial_history.len());
}
