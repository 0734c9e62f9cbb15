use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

use super::{RunKey, StoredRun};
use crate::app::ports::RunStore;
use crate::common::error::{PipelineError, Result};

/// One pretty-printed JSON document per run key under `dir`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never sees a half-written run.
pub struct JsonFileRunStore {
    dir: PathBuf,
}

impl JsonFileRunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &RunKey) -> PathBuf {
        self.dir.join(format!("run_{}.json", key.file_stem()))
    }
}

#[async_trait]
impl RunStore for JsonFileRunStore {
    async fn save_run(&self, run: &StoredRun) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&run.key);
        let tmp = path.with_extension(format!("json.{}.tmp", run.run_id.simple()));

        let body = serde_json::to_vec_pretty(run)?;
        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PipelineError::Store(format!(
                "failed to move {} into place: {}",
                path.display(),
                e
            )));
        }
        info!("Stored run {} at {}", run.run_id, path.display());
        Ok(())
    }

    async fn load_latest(&self, key: &RunKey) -> Result<Option<StoredRun>> {
        let path = self.path_for(key);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored run at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&body)?))
    }
}
