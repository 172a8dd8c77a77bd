use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use panel::logging::{self, LogFormat};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "panel")]
#[command(version, about = "Quality-gated interview analysis pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to a panel.toml. Defaults to .panel/panel.toml in the project directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format: pretty, json. Overrides panel.toml
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a transcript through analysis, metrics and report
    Run {
        /// Transcript file, or '-' for stdin
        #[arg(short, long)]
        transcript: PathBuf,

        /// Print the run record as JSON instead of the report
        #[arg(long)]
        json: bool,

        /// Also write the audit record to this file
        #[arg(long)]
        audit_out: Option<PathBuf>,

        /// Rejections per stage before approval is forced
        #[arg(long)]
        max_revisions: Option<u32>,

        /// Maximum stage productions plus gate evaluations
        #[arg(long)]
        step_budget: Option<u32>,

        /// Wall-clock limit for the whole run
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Minimum judge score for approval (0-10)
        #[arg(long)]
        pass_threshold: Option<f64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Inspect recorded runs
    Audit {
        #[command(subcommand)]
        command: Option<AuditCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default panel.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum AuditCommands {
    /// List recorded runs, most recent first
    List,
    /// Show one recorded run
    Show {
        /// Run file name or run id prefix
        run: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            transcript,
            json,
            audit_out,
            max_revisions,
            step_budget,
            timeout_ms,
            pass_threshold,
        } => {
            let overrides = panel::panel_config::PipelineOverrides {
                max_revisions: *max_revisions,
                step_budget: *step_budget,
                timeout_ms: *timeout_ms,
                pass_threshold: *pass_threshold,
            };
            let config = cmd::load_config(&cli, &project_dir)?.with_overrides(overrides);
            init_logging(&cli, &config.toml.logging);
            cmd::cmd_run(&config, transcript, *json, audit_out.as_deref()).await?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&project_dir, cli.config.as_deref(), command.clone())?
        }
        Commands::Audit { command } => {
            let config = cmd::load_config(&cli, &project_dir)?;
            cmd::cmd_audit(&config, command.clone())?
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli, section: &panel::panel_config::LoggingSection) {
    let format = cli.log_format.unwrap_or(section.format);
    let level = if cli.verbose {
        logging::default_level(true).to_string()
    } else {
        section.level.clone()
    };
    if let Err(e) = logging::init(format, &level) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}
