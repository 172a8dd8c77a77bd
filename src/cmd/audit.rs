//! Recorded run inspection: `panel audit`.

use anyhow::Result;
use panel::audit::{AuditLogger, RunOutcome};
use panel::panel_config::PanelConfig;

use super::super::AuditCommands;

pub fn cmd_audit(config: &PanelConfig, command: Option<AuditCommands>) -> Result<()> {
    let logger = AuditLogger::new(&config.audit_dir());

    match command {
        None | Some(AuditCommands::List) => {
            let runs = logger.list_runs()?;
            if runs.is_empty() {
                println!("No recorded runs in {}", config.audit_dir().display());
                return Ok(());
            }
            for path in runs {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match logger.load_run(&path) {
                    Ok(run) => {
                        let status = match &run.outcome {
                            RunOutcome::Done => console::style("done".to_string()).green(),
                            RunOutcome::Failed { kind, .. } => console::style(kind.clone()).red(),
                        };
                        println!("  {}  {}  {} step(s)", name, status, run.history.len());
                    }
                    Err(e) => println!("  {}  {}", name, console::style(format!("{:#}", e)).dim()),
                }
            }
        }
        Some(AuditCommands::Show { run }) => {
            let path = logger
                .list_runs()?
                .into_iter()
                .find(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy())
                        .is_some_and(|n| n == run.as_str() || n.contains(run.as_str()))
                })
                .ok_or_else(|| anyhow::anyhow!("No recorded run matching '{}'", run))?;

            let record = logger.load_run(&path)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
