use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{RunKey, StoredRun};
use crate::app::ports::RunStore;
use crate::common::error::{PipelineError, Result};

/// In-memory run store for development/testing
#[derive(Clone, Default)]
pub struct InMemoryRunStore {
    runs: Arc<Mutex<HashMap<RunKey, StoredRun>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().map(|runs| runs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> PipelineError {
    PipelineError::Store("in-memory run store lock poisoned".to_string())
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save_run(&self, run: &StoredRun) -> Result<()> {
        let mut runs = self.runs.lock().map_err(poisoned)?;
        runs.insert(run.key.clone(), run.clone());
        debug!("Stored run {} under {}", run.run_id, run.key);
        Ok(())
    }

    async fn load_latest(&self, key: &RunKey) -> Result<Option<StoredRun>> {
        let runs = self.runs.lock().map_err(poisoned)?;
        Ok(runs.get(key).cloned())
    }
}
