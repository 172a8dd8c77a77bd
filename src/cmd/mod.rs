//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `config` | `Config`         |
//! | `audit`  | `Audit`          |

pub mod audit;
pub mod config;
pub mod run;

pub use audit::cmd_audit;
pub use config::cmd_config;
pub use run::cmd_run;

use anyhow::Result;
use panel::panel_config::PanelConfig;
use std::path::Path;

use super::Cli;

/// Resolve configuration from the global flags.
pub fn load_config(cli: &Cli, project_dir: &Path) -> Result<PanelConfig> {
    PanelConfig::new(project_dir.to_path_buf(), cli.config.clone())
}
