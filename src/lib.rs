pub mod apis;
pub mod common;
pub mod config;
pub mod observability;
pub mod pipeline;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

pub use common::{PipelineError, Result};
pub use config::PipelineConfig;
