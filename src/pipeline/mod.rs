// Run pipeline: processing stages, orchestration and run storage

pub mod fingerprint;
pub mod orchestrator;
pub mod processing;
pub mod registry;
pub mod state;
pub mod storage;

pub use orchestrator::{Orchestrator, RunOutput};
pub use state::PipelineState;
