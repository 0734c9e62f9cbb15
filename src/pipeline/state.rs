use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::error::{PipelineError, Result};

/// Stages of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Fetching,
    Normalizing,
    Merging,
    Validating,
    Analyzing,
    Degraded,
    Rejected,
    Done,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Fetching => "fetching",
            PipelineState::Normalizing => "normalizing",
            PipelineState::Merging => "merging",
            PipelineState::Validating => "validating",
            PipelineState::Analyzing => "analyzing",
            PipelineState::Degraded => "degraded",
            PipelineState::Rejected => "rejected",
            PipelineState::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == PipelineState::Done
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn allowed_transitions(from: PipelineState) -> &'static [PipelineState] {
    use PipelineState::*;
    match from {
        Idle => &[Fetching, Rejected],
        Fetching => &[Normalizing, Rejected],
        Normalizing => &[Merging, Rejected],
        Merging => &[Validating, Rejected],
        Validating => &[Analyzing, Degraded, Rejected],
        Analyzing => &[Done, Rejected],
        Degraded => &[Done, Rejected],
        Rejected => &[Done],
        Done => &[],
    }
}

pub fn validate_transition(from: PipelineState, to: PipelineState) -> Result<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PipelineError::IllegalTransition { from, to })
    }
}

/// Current state plus every state the run has passed through.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: PipelineState,
    trail: Vec<PipelineState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: PipelineState::Idle,
            trail: vec![PipelineState::Idle],
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    pub fn trail(&self) -> &[PipelineState] {
        &self.trail
    }

    pub fn advance(&mut self, to: PipelineState) -> Result<()> {
        validate_transition(self.current, to)?;
        tracing::debug!(from = %self.current, to = %to, "Pipeline transition");
        self.current = to;
        self.trail.push(to);
        Ok(())
    }

    /// The verdict state the run settled in before `Done`.
    pub fn verdict(&self) -> PipelineState {
        self.trail
            .iter()
            .rev()
            .copied()
            .find(|s| !s.is_terminal())
            .unwrap_or(PipelineState::Idle)
    }
}
