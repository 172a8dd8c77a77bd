//! Configuration view and validation commands: `panel config`.

use anyhow::Result;
use panel::panel_config::{AgentRole, PANEL_DIR, PanelToml};
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_config(
    project_dir: &Path,
    config_override: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let panel_dir = project_dir.join(PANEL_DIR);
    let config_path = config_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| panel_dir.join("panel.toml"));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Panel Configuration");
            println!("===================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                PanelToml::load(&config_path)?
            } else {
                println!("No panel.toml found at {}", config_path.display());
                println!("Using default configuration.");
                PanelToml::default()
            };
            println!();

            println!("[pipeline]");
            println!("  max_revisions = {}", toml.pipeline.max_revisions);
            println!("  step_budget = {}", toml.pipeline.step_budget);
            println!("  timeout_ms = {}", toml.pipeline.timeout_ms);
            println!("  pass_threshold = {}", toml.pipeline.pass_threshold);
            println!();

            println!("[agents]");
            if let Some(cmd) = &toml.agents.command {
                println!("  command = \"{}\"", cmd);
            }
            println!("  args = {:?}", toml.agents.args);
            println!("  timeout_secs = {}", toml.agents.timeout_secs);
            println!("  judge = \"{}\"", toml.agents.judge);
            println!();

            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  format = \"{}\"", toml.logging.format);
            println!();

            println!("Effective commands (with env overrides):");
            for (name, role) in [
                ("analyzer", AgentRole::Analyzer),
                ("metrics", AgentRole::Metrics),
                ("report", AgentRole::Report),
                ("judge", AgentRole::Judge),
            ] {
                println!("  {} = \"{}\"", name, toml.command_for(role).display());
            }
            println!();

            if !config_path.exists() {
                println!("Run 'panel config init' to create a panel.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No panel.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = PanelToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("panel.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            let toml = PanelToml::default();
            toml.save(&config_path)?;

            println!("Created panel.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [pipeline] max_revisions, step_budget, timeout_ms, pass_threshold");
            println!("  - [agents] command, args, timeout_secs, judge");
            println!("  - [agents.analyzer], [agents.metrics], [agents.report], [agents.judge_command]");
            println!();
        }
    }

    Ok(())
}
