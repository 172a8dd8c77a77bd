use super::AuditRun;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Persists finished runs as pretty-printed JSON under `<audit_dir>/runs/`.
pub struct AuditLogger {
    audit_dir: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        Self {
            audit_dir: audit_dir.to_path_buf(),
        }
    }

    fn runs_dir(&self) -> PathBuf {
        self.audit_dir.join("runs")
    }

    /// Write `run` to the runs directory and return the file path.
    pub fn record(&self, run: &AuditRun) -> Result<PathBuf> {
        let runs_dir = self.runs_dir();
        fs::create_dir_all(&runs_dir).context("Failed to create audit runs directory")?;

        let filename = format!(
            "{}_{}.json",
            run.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &run.run_id.to_string()[..8]
        );
        let run_file = runs_dir.join(filename);
        write_run(run, &run_file)?;
        Ok(run_file)
    }

    /// Recorded runs, most recent first.
    pub fn list_runs(&self) -> Result<Vec<PathBuf>> {
        let runs_dir = self.runs_dir();
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }

    pub fn load_run(&self, path: &Path) -> Result<AuditRun> {
        let content = fs::read_to_string(path).context("Failed to read audit run file")?;
        let run: AuditRun =
            serde_json::from_str(&content).context("Failed to parse audit run file")?;
        Ok(run)
    }
}

/// Write `run` to an explicit path, creating parent directories.
pub fn write_run(run: &AuditRun, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(run).context("Failed to serialize audit run")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write audit run to {}", path.display()))?;
    Ok(())
}
