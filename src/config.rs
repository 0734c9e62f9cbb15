use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::apis::retry::RetryPolicy;
use crate::common::constants::*;
use crate::common::error::{PipelineError, Result};
use crate::common::types::{AnalysisProfile, City, DateRange};

/// Everything one pipeline run needs, passed explicitly into the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cities: BTreeSet<City>,
    /// Defaults to the last 90 days ending on the run date
    pub date_range: Option<DateRange>,
    pub api_credentials: ApiCredentials,
    pub outlier_threshold: f64,
    pub freshness_threshold_days: i64,
    pub min_points_for_analysis: usize,
    pub max_missing_ratio: f64,
    pub max_outlier_ratio: f64,
    pub analysis_profile: AnalysisProfile,
    pub overlap_policy: OverlapPolicy,
    pub fetch: FetchConfig,
    pub output: OutputConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiCredentials {
    pub weather_key: String,
    pub energy_key: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(key: &str) -> &'static str {
            if key.is_empty() { "<unset>" } else { "<redacted>" }
        }
        f.debug_struct("ApiCredentials")
            .field("weather_key", &redact(&self.weather_key))
            .field("energy_key", &redact(&self.energy_key))
            .finish()
    }
}

/// What to do when a run overlaps one that is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    #[default]
    Reject,
    Wait,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: u32,
    pub max_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub weather_max_span_days: u32,
    pub energy_max_span_days: u32,
    pub weather_min_interval_ms: u64,
    pub energy_min_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            weather_max_span_days: NOAA_MAX_SPAN_DAYS,
            energy_max_span_days: EIA_MAX_SPAN_DAYS,
            weather_min_interval_ms: NOAA_MIN_INTERVAL_MS,
            energy_min_interval_ms: 0,
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cities: City::ALL.into_iter().collect(),
            date_range: None,
            api_credentials: ApiCredentials::default(),
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            freshness_threshold_days: DEFAULT_FRESHNESS_THRESHOLD_DAYS,
            min_points_for_analysis: DEFAULT_MIN_POINTS_FOR_ANALYSIS,
            max_missing_ratio: DEFAULT_MAX_MISSING_RATIO,
            max_outlier_ratio: DEFAULT_MAX_OUTLIER_RATIO,
            analysis_profile: AnalysisProfile::default(),
            overlap_policy: OverlapPolicy::default(),
            fetch: FetchConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a TOML file, apply environment credential overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Credentials from `NOAA_API_TOKEN` / `EIA_API_KEY` replace the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(WEATHER_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_credentials.weather_key = key.trim().to_string();
            }
        }
        if let Ok(key) = std::env::var(ENERGY_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_credentials.energy_key = key.trim().to_string();
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cities.is_empty() {
            return Err(PipelineError::Config("At least one city is required".to_string()));
        }
        if let Some(range) = &self.date_range {
            DateRange::new(range.start, range.end)?;
        }
        if !self.outlier_threshold.is_finite() || self.outlier_threshold < 1.0 {
            return Err(PipelineError::Config(format!(
                "outlier_threshold must be a finite number >= 1, got {}",
                self.outlier_threshold
            )));
        }
        if self.freshness_threshold_days < 0 {
            return Err(PipelineError::Config(
                "freshness_threshold_days must not be negative".to_string(),
            ));
        }
        if self.min_points_for_analysis == 0 {
            return Err(PipelineError::Config(
                "min_points_for_analysis must be at least 1".to_string(),
            ));
        }
        for (name, ratio) in [
            ("max_missing_ratio", self.max_missing_ratio),
            ("max_outlier_ratio", self.max_outlier_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(PipelineError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, ratio
                )));
            }
        }
        let fetch = &self.fetch;
        if fetch.max_attempts == 0 || fetch.backoff_factor == 0 {
            return Err(PipelineError::Config(
                "fetch.max_attempts and fetch.backoff_factor must be at least 1".to_string(),
            ));
        }
        if fetch.weather_max_span_days == 0 || fetch.energy_max_span_days == 0 {
            return Err(PipelineError::Config(
                "fetch span limits must be at least one day".to_string(),
            ));
        }
        if fetch.request_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "fetch.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The analysis window for a run executed on `run_date`.
    pub fn resolved_range(&self, run_date: NaiveDate) -> DateRange {
        self.date_range
            .unwrap_or_else(|| DateRange::ending_on(run_date, DEFAULT_WINDOW_DAYS))
    }
}
