use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::apis::{energy_client, weather_client};
use crate::app::ports::{DelayPort, HttpClientPort, RunStore};
use crate::config::PipelineConfig;
use crate::infra::delay::TokioDelay;
use crate::infra::http_client::ReqwestHttp;
use crate::pipeline::orchestrator::{Orchestrator, RunOutput};
use crate::pipeline::storage::{JsonFileRunStore, StoredRun};

/// Wires configuration and ports into an orchestrator.
pub struct PipelineUseCase {
    orchestrator: Orchestrator,
    store: Arc<dyn RunStore>,
}

impl PipelineUseCase {
    /// Production wiring: reqwest transport, tokio timers, JSON file store
    /// under `config.output.dir`.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let http = ReqwestHttp::new(config.fetch.request_timeout())
            .context("Failed to build HTTP client")?;
        let store = JsonFileRunStore::new(config.output.dir.clone());
        Ok(Self::with_ports(
            config,
            Arc::new(http),
            Arc::new(TokioDelay),
            Arc::new(store),
        ))
    }

    pub fn with_ports(
        config: PipelineConfig,
        http: Arc<dyn HttpClientPort>,
        delay: Arc<dyn DelayPort>,
        store: Arc<dyn RunStore>,
    ) -> Self {
        let credentials = &config.api_credentials;
        let weather = weather_client(&credentials.weather_key, &config.fetch, http.clone(), delay.clone());
        let energy = energy_client(&credentials.energy_key, &config.fetch, http, delay);
        let orchestrator = Orchestrator::new(config, Arc::new(weather), Arc::new(energy), store.clone());
        Self { orchestrator, store }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn run(&self, run_date: NaiveDate, cancel: &CancellationToken) -> RunOutput {
        self.orchestrator.run(run_date, cancel).await
    }

    /// The stored run for the configured cities and the window a run on
    /// `run_date` would cover.
    pub async fn latest_run(&self, run_date: NaiveDate) -> Result<Option<StoredRun>> {
        let key = self.orchestrator.run_key(run_date);
        self.store
            .load_latest(&key)
            .await
            .with_context(|| format!("Failed to load stored run {}", key))
    }
}
