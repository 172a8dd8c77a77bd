use crate::errors::RunError;
use crate::gates::{DEFAULT_MAX_REVISIONS, DEFAULT_PASS_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default global transition budget.
pub const DEFAULT_STEP_BUDGET: u32 = 25;

/// Default wall-clock limit for one run (5 minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Runtime limits for one pipeline run.
///
/// Built from `panel.toml` and CLI overrides by
/// [`PanelToml::to_pipeline_config`](crate::panel_config::PanelToml::to_pipeline_config);
/// library callers can start from [`PipelineConfig::default`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rejections per stage before the gate forces approval.
    pub max_revisions: u32,
    /// Total stage productions plus gate evaluations allowed per run.
    pub step_budget: u32,
    pub timeout_ms: u64,
    pub pass_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revisions: DEFAULT_MAX_REVISIONS,
            step_budget: DEFAULT_STEP_BUDGET,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    pub fn with_step_budget(mut self, step_budget: u32) -> Self {
        self.step_budget = step_budget;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_pass_threshold(mut self, pass_threshold: f64) -> Self {
        self.pass_threshold = pass_threshold;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Transitions a run needs when every stage is rejected the maximum
    /// number of times.
    pub fn worst_case_steps(&self) -> u64 {
        // Each stage: (max_revisions + 1) productions and as many evaluations.
        3 * 2 * (u64::from(self.max_revisions) + 1)
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if self.step_budget == 0 {
            return Err(RunError::InvalidConfig(
                "step_budget must be greater than 0".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(RunError::InvalidConfig(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        if !self.pass_threshold.is_finite() || !(0.0..=10.0).contains(&self.pass_threshold) {
            return Err(RunError::InvalidConfig(format!(
                "pass_threshold must be between 0 and 10, got {}",
                self.pass_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_revisions, 2);
        assert_eq!(config.step_budget, 25);
        assert_eq!(config.timeout_ms, 300_000);
        assert_eq!(config.pass_threshold, 8.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_budget_covers_worst_case() {
        let config = PipelineConfig::default();
        assert_eq!(config.worst_case_steps(), 18);
        assert!(u64::from(config.step_budget) >= config.worst_case_steps());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let err = PipelineConfig::default()
            .with_step_budget(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("step_budget"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        assert!(PipelineConfig::default().with_timeout_ms(0).validate().is_err());
    }

    #[test]
    fn test_validate_threshold_range() {
        assert!(PipelineConfig::default().with_pass_threshold(10.0).validate().is_ok());
        assert!(PipelineConfig::default().with_pass_threshold(0.0).validate().is_ok());
        assert!(PipelineConfig::default().with_pass_threshold(10.5).validate().is_err());
        assert!(PipelineConfig::default().with_pass_threshold(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_zero_revisions_is_valid() {
        assert!(PipelineConfig::default().with_max_revisions(0).validate().is_ok());
    }
}
