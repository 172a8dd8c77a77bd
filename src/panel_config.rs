//! Project configuration for panel.
//!
//! Settings are read from `.panel/panel.toml` (or an explicit `--config`
//! path) and layered: file, then environment (`PANEL_CMD`), then CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! max_revisions = 2
//! step_budget = 25
//! timeout_ms = 300000
//! pass_threshold = 8.0
//!
//! [agents]
//! command = "claude"
//! args = ["--print"]
//! timeout_secs = 120
//! judge = "command"        # or "heuristic"
//!
//! [agents.judge_command]   # per-role overrides: analyzer, metrics, report, judge_command
//! command = "claude"
//! args = ["--print", "--model", "opus"]
//!
//! [logging]
//! level = "info"
//! format = "pretty"        # or "json"
//! ```

use crate::agents::command::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::agents::{Agents, CommandAgent, CommandSpec, Judge};
use crate::config::{DEFAULT_STEP_BUDGET, DEFAULT_TIMEOUT_MS, PipelineConfig};
use crate::gates::{DEFAULT_MAX_REVISIONS, DEFAULT_PASS_THRESHOLD};
use crate::logging::LogFormat;
use crate::review::HeuristicJudge;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable overriding the default agent command.
pub const CMD_ENV: &str = "PANEL_CMD";

/// Directory holding project configuration and audit runs.
pub const PANEL_DIR: &str = ".panel";

const CONFIG_FILE: &str = "panel.toml";

/// `[pipeline]`: limits for each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    #[serde(default = "default_step_budget")]
    pub step_budget: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

fn default_max_revisions() -> u32 {
    DEFAULT_MAX_REVISIONS
}

fn default_step_budget() -> u32 {
    DEFAULT_STEP_BUDGET
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_pass_threshold() -> f64 {
    DEFAULT_PASS_THRESHOLD
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
            step_budget: default_step_budget(),
            timeout_ms: default_timeout_ms(),
            pass_threshold: default_pass_threshold(),
        }
    }
}

/// Which judge implementation scores stage outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeMode {
    /// Ask the configured command.
    #[default]
    Command,
    /// Rule-based structural checks, no external calls.
    Heuristic,
}

impl fmt::Display for JudgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeMode::Command => write!(f, "command"),
            JudgeMode::Heuristic => write!(f, "heuristic"),
        }
    }
}

impl FromStr for JudgeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command" => Ok(JudgeMode::Command),
            "heuristic" => Ok(JudgeMode::Heuristic),
            _ => anyhow::bail!("Invalid judge mode '{}'. Valid values: command, heuristic", s),
        }
    }
}

/// Per-role command override. Unset fields fall back to `[agents]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleOverride {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// `[agents]`: how collaborators are invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsSection {
    /// Command for every role (default: `PANEL_CMD`, then "claude")
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub judge: JudgeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<RoleOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RoleOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<RoleOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_command: Option<RoleOverride>,
}

fn default_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            command: None,
            args: default_args(),
            timeout_secs: default_timeout_secs(),
            judge: JudgeMode::default(),
            analyzer: None,
            metrics: None,
            report: None,
            judge_command: None,
        }
    }
}

/// A collaborator role that can have its own command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Analyzer,
    Metrics,
    Report,
    Judge,
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Parsed `panel.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelToml {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub agents: AgentsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Pipeline values given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineOverrides {
    pub max_revisions: Option<u32>,
    pub step_budget: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub pass_threshold: Option<f64>,
}

impl PanelToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse panel.toml")
    }

    /// Load `panel.toml` from `panel_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(panel_dir: &Path) -> Result<Self> {
        let config_path = panel_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize panel.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// The shared agent command (file → env → default).
    pub fn agent_cmd(&self) -> String {
        self.agents
            .command
            .clone()
            .or_else(|| std::env::var(CMD_ENV).ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    fn role_override(&self, role: AgentRole) -> Option<&RoleOverride> {
        match role {
            AgentRole::Analyzer => self.agents.analyzer.as_ref(),
            AgentRole::Metrics => self.agents.metrics.as_ref(),
            AgentRole::Report => self.agents.report.as_ref(),
            AgentRole::Judge => self.agents.judge_command.as_ref(),
        }
    }

    /// Resolved command for one role.
    pub fn command_for(&self, role: AgentRole) -> CommandSpec {
        let role_cfg = self.role_override(role);
        let command = role_cfg
            .and_then(|r| r.command.clone())
            .unwrap_or_else(|| self.agent_cmd());
        let args = role_cfg
            .and_then(|r| r.args.clone())
            .unwrap_or_else(|| self.agents.args.clone());
        let timeout_secs = role_cfg
            .and_then(|r| r.timeout_secs)
            .unwrap_or(self.agents.timeout_secs);

        CommandSpec::new(command)
            .with_args(args)
            .with_timeout(Duration::from_secs(timeout_secs))
    }

    /// Pipeline limits with CLI overrides applied.
    pub fn to_pipeline_config(&self, overrides: &PipelineOverrides) -> PipelineConfig {
        PipelineConfig {
            max_revisions: overrides
                .max_revisions
                .unwrap_or(self.pipeline.max_revisions),
            step_budget: overrides.step_budget.unwrap_or(self.pipeline.step_budget),
            timeout_ms: overrides.timeout_ms.unwrap_or(self.pipeline.timeout_ms),
            pass_threshold: overrides
                .pass_threshold
                .unwrap_or(self.pipeline.pass_threshold),
        }
    }

    /// Build the collaborators for a run.
    pub fn build_agents(&self, pass_threshold: f64, working_dir: Option<&Path>) -> Agents {
        let agent = |role| {
            let mut spec = self.command_for(role);
            if let Some(dir) = working_dir {
                spec = spec.with_working_dir(dir);
            }
            Arc::new(CommandAgent::new(spec).with_pass_threshold(pass_threshold))
        };

        let judge: Arc<dyn Judge> = match self.agents.judge {
            JudgeMode::Command => agent(AgentRole::Judge),
            JudgeMode::Heuristic => Arc::new(HeuristicJudge::new(pass_threshold)),
        };

        Agents::new(
            agent(AgentRole::Analyzer),
            agent(AgentRole::Metrics),
            agent(AgentRole::Report),
            judge,
        )
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let pipeline = self.to_pipeline_config(&PipelineOverrides::default());

        if let Err(e) = pipeline.validate() {
            warnings.push(e.to_string());
        }

        if pipeline.step_budget > 0 && pipeline.step_budget < 6 {
            warnings.push(format!(
                "step_budget {} is below the 6 transitions a run needs without revisions",
                pipeline.step_budget
            ));
        } else if u64::from(pipeline.step_budget) < pipeline.worst_case_steps() {
            warnings.push(format!(
                "step_budget {} may run out before max_revisions {} is reached on every stage (needs {})",
                pipeline.step_budget,
                pipeline.max_revisions,
                pipeline.worst_case_steps()
            ));
        }

        if self.agents.timeout_secs == 0 {
            warnings.push("agents.timeout_secs must be greater than 0".to_string());
        }

        if u128::from(self.agents.timeout_secs) * 1000 > u128::from(pipeline.timeout_ms) {
            warnings.push(format!(
                "agents.timeout_secs ({}s) exceeds the run timeout ({} ms)",
                self.agents.timeout_secs, pipeline.timeout_ms
            ));
        }

        for (name, role) in [
            ("analyzer", &self.agents.analyzer),
            ("metrics", &self.agents.metrics),
            ("report", &self.agents.report),
            ("judge_command", &self.agents.judge_command),
        ] {
            if let Some(cmd) = role.as_ref().and_then(|r| r.command.as_deref())
                && cmd.trim().is_empty()
            {
                warnings.push(format!("agents.{}.command is empty", name));
            }
        }

        if self.logging.level.parse::<tracing::Level>().is_err()
            && tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err()
        {
            warnings.push(format!("Invalid logging.level '{}'", self.logging.level));
        }

        warnings
    }
}

/// Configuration resolved for a project directory.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub project_dir: PathBuf,
    pub panel_dir: PathBuf,
    /// File the configuration came from, if one exists.
    pub config_path: PathBuf,
    pub toml: PanelToml,
    pub overrides: PipelineOverrides,
}

impl PanelConfig {
    /// Load from `<project_dir>/.panel/panel.toml`, or from `config_path`
    /// when given.
    pub fn new(project_dir: PathBuf, config_path: Option<PathBuf>) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let panel_dir = project_dir.join(PANEL_DIR);

        let (config_path, toml) = match config_path {
            Some(path) => {
                let toml = PanelToml::load(&path)?;
                (path, toml)
            }
            None => (
                panel_dir.join(CONFIG_FILE),
                PanelToml::load_or_default(&panel_dir)?,
            ),
        };

        Ok(Self {
            project_dir,
            panel_dir,
            config_path,
            toml,
            overrides: PipelineOverrides::default(),
        })
    }

    pub fn with_overrides(mut self, overrides: PipelineOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Pipeline limits (CLI → file → default).
    pub fn pipeline_config(&self) -> PipelineConfig {
        self.toml.to_pipeline_config(&self.overrides)
    }

    pub fn agents(&self) -> Agents {
        let pipeline = self.pipeline_config();
        self.toml
            .build_agents(pipeline.pass_threshold, Some(&self.project_dir))
    }

    /// Directory for recorded runs.
    pub fn audit_dir(&self) -> PathBuf {
        self.panel_dir.join("audit")
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
