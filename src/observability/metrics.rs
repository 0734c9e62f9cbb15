//! Metric names and recording helpers for every pipeline phase.
//!
//! Recording goes through the `metrics` facade. The library never installs
//! a recorder; without one every call is a no-op.

use std::fmt;

/// Enum representing all metric names used in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Source metrics
    SourceRequests,
    SourceRetries,
    SourceGaps,
    SourceRecordsFetched,
    SourceRequestDuration,

    // Normalize metrics
    NormalizeRecordsAccepted,
    NormalizeRecordsRejected,

    // Merge metrics
    MergeObservations,
    MergeConflicts,

    // Quality metrics
    QualityOutliers,
    QualityMissingSlots,
    QualityStaleCities,

    // Run metrics
    RunsCompleted,
    RunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourceRequests => "wep_source_requests_total",
            MetricName::SourceRetries => "wep_source_retries_total",
            MetricName::SourceGaps => "wep_source_gaps_total",
            MetricName::SourceRecordsFetched => "wep_source_records_fetched_total",
            MetricName::SourceRequestDuration => "wep_source_request_duration_seconds",

            MetricName::NormalizeRecordsAccepted => "wep_normalize_records_accepted_total",
            MetricName::NormalizeRecordsRejected => "wep_normalize_records_rejected_total",

            MetricName::MergeObservations => "wep_merge_observations_total",
            MetricName::MergeConflicts => "wep_merge_conflicts_total",

            MetricName::QualityOutliers => "wep_quality_outliers_total",
            MetricName::QualityMissingSlots => "wep_quality_missing_slots_total",
            MetricName::QualityStaleCities => "wep_quality_stale_cities_total",

            MetricName::RunsCompleted => "wep_runs_completed_total",
            MetricName::RunDuration => "wep_run_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Source Metrics
// ============================================================================

pub mod sources {
    use super::MetricName;

    /// Record one HTTP attempt and how it ended (`ok`, `transient`, `rejected`)
    pub fn request(source_id: &str, outcome: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::SourceRequests.as_str(),
            "source_id" => source_id.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        ::metrics::histogram!(MetricName::SourceRequestDuration.as_str(), "source_id" => source_id.to_string())
            .record(secs);
    }

    pub fn retry(source_id: &str) {
        ::metrics::counter!(MetricName::SourceRetries.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }

    pub fn gap(source_id: &str) {
        ::metrics::counter!(MetricName::SourceGaps.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }

    pub fn records_fetched(source_id: &str, count: usize) {
        ::metrics::counter!(MetricName::SourceRecordsFetched.as_str(), "source_id" => source_id.to_string())
            .increment(count as u64);
    }
}

// ============================================================================
// Normalize Metrics
// ============================================================================

pub mod normalize {
    use super::MetricName;

    pub fn accepted(count: usize) {
        ::metrics::counter!(MetricName::NormalizeRecordsAccepted.as_str()).increment(count as u64);
    }

    pub fn rejected(kind: &'static str, count: usize) {
        ::metrics::counter!(MetricName::NormalizeRecordsRejected.as_str(), "kind" => kind)
            .increment(count as u64);
    }
}

// ============================================================================
// Merge Metrics
// ============================================================================

pub mod merge {
    use super::MetricName;

    pub fn merged(observations: usize, conflicts: usize) {
        ::metrics::counter!(MetricName::MergeObservations.as_str()).increment(observations as u64);
        ::metrics::counter!(MetricName::MergeConflicts.as_str()).increment(conflicts as u64);
    }
}

// ============================================================================
// Quality Metrics
// ============================================================================

pub mod quality {
    use super::MetricName;

    pub fn evaluated(outliers: usize, missing_slots: usize, stale_cities: usize) {
        ::metrics::counter!(MetricName::QualityOutliers.as_str()).increment(outliers as u64);
        ::metrics::counter!(MetricName::QualityMissingSlots.as_str()).increment(missing_slots as u64);
        ::metrics::counter!(MetricName::QualityStaleCities.as_str()).increment(stale_cities as u64);
    }
}

// ============================================================================
// Run Metrics
// ============================================================================

pub mod run {
    use super::MetricName;

    pub fn completed(final_state: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::RunsCompleted.as_str(), "final_state" => final_state)
            .increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }
}
