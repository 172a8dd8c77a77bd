pub mod runner;
pub mod state;

pub use runner::{Orchestrator, run_pipeline};
pub use state::{PipelineState, SharedState, StepAction, StepActor, StepRecord};
