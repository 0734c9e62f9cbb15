//! One pipeline run, end to end.
//!
//! `Idle -> Fetching -> Normalizing -> Merging -> Validating ->
//! {Analyzing | Degraded | Rejected} -> Done`. The orchestrator never returns
//! an error: every problem becomes a verdict plus human-readable reasons.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::apis::{FetchOutcome, SourceClient};
use crate::app::ports::RunStore;
use crate::common::error::SourceError;
use crate::common::types::{City, DailyObservation, DateRange, RawObservation, SourceId};
use crate::config::PipelineConfig;
use crate::observability::metrics;
use crate::pipeline::fingerprint::compute_run_fingerprint;
use crate::pipeline::processing::analysis::{AnalysisEngine, AnalysisResult};
use crate::pipeline::processing::merge::{merge, ConflictLog};
use crate::pipeline::processing::normalize::{normalize_batch, RejectionStats};
use crate::pipeline::processing::quality_gate::{annotate, QualityEngine, QualityReport, QualitySettings};
use crate::pipeline::registry::RunRegistry;
use crate::pipeline::state::{PipelineState, StateMachine};
use crate::pipeline::storage::{RunKey, StoredRun};

/// A chunk one source could not deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapRecord {
    pub city: City,
    pub range: DateRange,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub key: Option<RunKey>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub gaps: BTreeMap<SourceId, Vec<GapRecord>>,
    pub raw_records: usize,
    pub rejection_stats: RejectionStats,
    pub conflicts: ConflictLog,
    pub state_trail: Vec<PipelineState>,
    pub fingerprint: Option<String>,
    pub persisted: bool,
}

impl RunMetadata {
    /// `(city, date)` pairs missing from `source` because of gaps.
    pub fn missing_slots(&self, source: SourceId) -> Vec<(City, NaiveDate)> {
        self.gaps
            .get(&source)
            .into_iter()
            .flatten()
            .flat_map(|gap| gap.range.days().map(move |day| (gap.city, day)))
            .collect()
    }
}

/// Everything a run hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// `Done`, `Degraded` or `Rejected`
    pub final_state: PipelineState,
    /// Why the run ended in `final_state`
    pub reasons: Vec<String>,
    /// Advisory findings that did not affect the verdict
    pub notes: Vec<String>,
    pub dataset: Vec<DailyObservation>,
    pub report: Option<QualityReport>,
    pub analysis: Option<AnalysisResult>,
    pub metadata: RunMetadata,
}

impl RunOutput {
    pub fn is_trustworthy(&self) -> bool {
        self.final_state == PipelineState::Done
    }
}

/// Mutable state of one run while it executes.
struct RunContext {
    machine: StateMachine,
    reasons: Vec<String>,
    notes: Vec<String>,
    metadata: RunMetadata,
    started: Instant,
}

impl RunContext {
    fn new(run_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            machine: StateMachine::new(),
            reasons: Vec::new(),
            notes: Vec::new(),
            metadata: RunMetadata {
                run_id: Uuid::new_v4(),
                run_date,
                key: None,
                started_at: now,
                finished_at: now,
                gaps: BTreeMap::new(),
                raw_records: 0,
                rejection_stats: RejectionStats::default(),
                conflicts: ConflictLog::default(),
                state_trail: Vec::new(),
                fingerprint: None,
                persisted: false,
            },
            started: Instant::now(),
        }
    }

    fn advance(&mut self, to: PipelineState) {
        if let Err(e) = self.machine.advance(to) {
            error!("{}", e);
            self.reasons.push(e.to_string());
        }
    }

    fn finish(
        mut self,
        dataset: Vec<DailyObservation>,
        report: Option<QualityReport>,
        analysis: Option<AnalysisResult>,
    ) -> RunOutput {
        let final_state = match self.machine.current() {
            PipelineState::Analyzing => PipelineState::Done,
            other => other,
        };
        self.advance(PipelineState::Done);
        self.metadata.state_trail = self.machine.trail().to_vec();
        self.metadata.finished_at = Utc::now();

        let secs = self.started.elapsed().as_secs_f64();
        metrics::run::completed(final_state.as_str(), secs);
        info!(
            run_id = %self.metadata.run_id,
            final_state = %final_state,
            reasons = self.reasons.len(),
            duration_secs = secs,
            "Pipeline run finished"
        );

        RunOutput {
            final_state,
            reasons: self.reasons,
            notes: self.notes,
            dataset,
            report,
            analysis,
            metadata: self.metadata,
        }
    }

    fn reject(mut self, reasons: Vec<String>, report: Option<QualityReport>) -> RunOutput {
        for reason in &reasons {
            warn!("Run rejected: {}", reason);
        }
        self.reasons.extend(reasons);
        self.advance(PipelineState::Rejected);
        self.finish(Vec::new(), report, None)
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    weather: Arc<dyn SourceClient>,
    energy: Arc<dyn SourceClient>,
    store: Arc<dyn RunStore>,
    registry: RunRegistry,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        weather: Arc<dyn SourceClient>,
        energy: Arc<dyn SourceClient>,
        store: Arc<dyn RunStore>,
    ) -> Self {
        Self {
            config,
            weather,
            energy,
            store,
            registry: RunRegistry::new(),
        }
    }

    /// Share an active-run registry with other orchestrators.
    pub fn with_registry(mut self, registry: RunRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run_key(&self, run_date: NaiveDate) -> RunKey {
        RunKey::new(self.config.cities.clone(), self.config.resolved_range(run_date))
    }

    #[instrument(skip(self, cancel))]
    pub async fn run(&self, run_date: NaiveDate, cancel: &CancellationToken) -> RunOutput {
        let mut ctx = RunContext::new(run_date);

        if let Err(e) = self.config.validate() {
            return ctx.reject(vec![e.to_string()], None);
        }
        let range = self.config.resolved_range(run_date);
        let cities = self.config.cities.clone();
        let key = RunKey::new(cities.clone(), range);
        ctx.metadata.key = Some(key.clone());
        info!(run_id = %ctx.metadata.run_id, key = %key, "Pipeline run starting");

        let _guard = match self
            .registry
            .acquire(&key, self.config.overlap_policy, cancel)
            .await
        {
            Ok(guard) => guard,
            Err(reason) => return ctx.reject(vec![reason], None),
        };

        // Fetching
        ctx.advance(PipelineState::Fetching);
        let fetch_cancel = cancel.child_token();
        let (weather, energy) = tokio::join!(
            fetch_source(self.weather.as_ref(), &cities, range, &fetch_cancel),
            fetch_source(self.energy.as_ref(), &cities, range, &fetch_cancel),
        );
        if cancel.is_cancelled() {
            return ctx.reject(vec!["run cancelled during fetch".to_string()], None);
        }
        let outcomes = match (weather, energy) {
            (Ok(w), Ok(e)) => w.into_iter().chain(e).collect::<Vec<_>>(),
            (w, e) => {
                let reasons = [w.err(), e.err()]
                    .into_iter()
                    .flatten()
                    .filter(|err| !matches!(err, SourceError::Cancelled { .. }))
                    .map(|err| err.to_string())
                    .collect();
                return ctx.reject(reasons, None);
            }
        };
        let raws = collect_outcomes(&mut ctx, outcomes);

        // Normalizing
        ctx.advance(PipelineState::Normalizing);
        let normalized = normalize_batch(&raws, &range);
        drop(raws);
        ctx.metadata.rejection_stats = normalized.stats.clone();
        if normalized.stats.total > 0 {
            ctx.notes.push(format!(
                "{} raw record(s) rejected during normalization",
                normalized.stats.total
            ));
        }
        if cancel.is_cancelled() {
            return ctx.reject(vec!["run cancelled during normalization".to_string()], None);
        }

        // Merging
        ctx.advance(PipelineState::Merging);
        let merged = merge(&normalized.records);
        let mut dataset = merged.observations;
        ctx.metadata.conflicts = merged.conflicts;

        // Validating
        ctx.advance(PipelineState::Validating);
        let engine = QualityEngine::new(QualitySettings {
            outlier_threshold: self.config.outlier_threshold,
            freshness_threshold_days: self.config.freshness_threshold_days,
            profile: self.config.analysis_profile,
        });
        let report = engine.evaluate(&dataset, &ctx.metadata.conflicts, &range, &cities, run_date);
        annotate(&mut dataset, &report);

        let fully_missing = report.fully_missing_cities();
        if !fully_missing.is_empty() {
            let reasons = fully_missing
                .iter()
                .map(|city| format!("{} ({}) has no observations for {}", city.name(), city, range))
                .collect();
            return ctx.reject(reasons, Some(report));
        }

        let mut degraded = Vec::new();
        if report.missing_ratio() > self.config.max_missing_ratio {
            degraded.push(format!(
                "missing ratio {:.3} exceeds {:.3} ({} missing, {} partial of {} slots)",
                report.missing_ratio(),
                self.config.max_missing_ratio,
                report.missing,
                report.partial,
                report.expected
            ));
        }
        if report.outlier_ratio() > self.config.max_outlier_ratio {
            degraded.push(format!(
                "outlier ratio {:.3} exceeds {:.3} ({} of {} values)",
                report.outlier_ratio(),
                self.config.max_outlier_ratio,
                report.outlier_count,
                report.metric_values
            ));
        }
        for city in report.stale_cities() {
            ctx.notes.push(format!("{} data is stale", city.name()));
        }

        if degraded.is_empty() {
            ctx.advance(PipelineState::Analyzing);
        } else {
            for reason in &degraded {
                warn!("Run degraded: {}", reason);
            }
            ctx.reasons.extend(degraded);
            ctx.advance(PipelineState::Degraded);
        }

        let analysis = AnalysisEngine::new(
            self.config.analysis_profile,
            self.config.min_points_for_analysis,
        )
        .analyze(&dataset);
        for city in analysis.insufficient_cities() {
            ctx.notes.push(format!("{} has too few complete days for analysis", city.name()));
        }

        match compute_run_fingerprint(&dataset, &report) {
            Ok(fp) => ctx.metadata.fingerprint = Some(fp),
            Err(e) => ctx.notes.push(format!("failed to fingerprint run: {}", e)),
        }

        if cancel.is_cancelled() {
            return ctx.reject(vec!["run cancelled before persistence".to_string()], Some(report));
        }

        let stored = StoredRun {
            run_id: ctx.metadata.run_id,
            key,
            verdict: ctx.machine.verdict(),
            reasons: ctx.reasons.clone(),
            fingerprint: ctx.metadata.fingerprint.clone().unwrap_or_default(),
            completed_at: Utc::now(),
            dataset: dataset.clone(),
            report: report.clone(),
            analysis: Some(analysis.clone()),
        };
        match self.store.save_run(&stored).await {
            Ok(()) => ctx.metadata.persisted = true,
            Err(e) => {
                error!("Failed to persist run: {}", e);
                ctx.reasons.push(format!("failed to persist run: {}", e));
            }
        }

        ctx.finish(dataset, Some(report), Some(analysis))
    }
}

/// Fetch every city from one source, one city after another. A fatal error
/// cancels `cancel` so the sibling source stops early.
async fn fetch_source(
    client: &dyn SourceClient,
    cities: &BTreeSet<City>,
    range: DateRange,
    cancel: &CancellationToken,
) -> Result<Vec<FetchOutcome>, SourceError> {
    let mut outcomes = Vec::with_capacity(cities.len());
    for &city in cities {
        match client.fetch(city, range, cancel).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                if !matches!(e, SourceError::Cancelled { .. }) {
                    cancel.cancel();
                }
                return Err(e);
            }
        }
    }
    Ok(outcomes)
}

fn collect_outcomes(ctx: &mut RunContext, outcomes: Vec<FetchOutcome>) -> Vec<RawObservation> {
    let mut raws = Vec::new();
    for outcome in outcomes {
        for (range, err) in outcome.gaps() {
            let (attempts, reason) = match err {
                SourceError::Unavailable {
                    attempts, reason, ..
                } => (*attempts, reason.clone()),
                other => (0, other.to_string()),
            };
            ctx.notes.push(format!(
                "{} data for {} unavailable over {}",
                outcome.source, outcome.city, range
            ));
            ctx.metadata
                .gaps
                .entry(outcome.source)
                .or_default()
                .push(GapRecord {
                    city: outcome.city,
                    range: *range,
                    attempts,
                    reason,
                });
        }
        raws.extend(outcome.into_observations());
    }
    ctx.metadata.raw_records = raws.len();
    raws
}
