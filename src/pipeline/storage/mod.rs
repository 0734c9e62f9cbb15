//! Run persistence: what a completed run leaves behind, and where.

pub mod in_memory;
pub mod json_file;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::common::types::{City, DailyObservation, DateRange};
use crate::pipeline::processing::analysis::AnalysisResult;
use crate::pipeline::processing::quality_gate::QualityReport;
use crate::pipeline::state::PipelineState;

pub use in_memory::InMemoryRunStore;
pub use json_file::JsonFileRunStore;

/// Identity of a run for overwrite semantics: the city set and date window.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub cities: BTreeSet<City>,
    pub range: DateRange,
}

impl RunKey {
    pub fn new(cities: BTreeSet<City>, range: DateRange) -> Self {
        Self { cities, range }
    }

    /// Filesystem-safe name, e.g. `CHI-SEA_2024-01-01_2024-03-31`.
    pub fn file_stem(&self) -> String {
        let cities: Vec<&str> = self.cities.iter().map(|c| c.code()).collect();
        format!("{}_{}_{}", cities.join("-"), self.range.start, self.range.end)
    }

    /// Two runs conflict when they share a city and their windows overlap.
    pub fn overlaps(&self, other: &RunKey) -> bool {
        self.range.overlaps(&other.range) && !self.cities.is_disjoint(&other.cities)
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

/// Persisted form of a `Done` or `Degraded` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub run_id: Uuid,
    pub key: RunKey,
    /// `Analyzing` or `Degraded`
    pub verdict: PipelineState,
    pub reasons: Vec<String>,
    pub fingerprint: String,
    pub completed_at: DateTime<Utc>,
    pub dataset: Vec<DailyObservation>,
    pub report: QualityReport,
    pub analysis: Option<AnalysisResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(cities: &[City], start: u32, end: u32) -> RunKey {
        RunKey::new(
            cities.iter().copied().collect(),
            DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, start).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, end).unwrap(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_file_stem_is_stable() {
        let k = key(&[City::Seattle, City::Chicago], 1, 31);
        assert_eq!(k.file_stem(), "CHI-SEA_2024-01-01_2024-01-31");
    }

    #[test]
    fn test_overlap_requires_shared_city_and_dates() {
        let a = key(&[City::Seattle], 1, 10);
        assert!(a.overlaps(&key(&[City::Seattle, City::Houston], 10, 20)));
        assert!(!a.overlaps(&key(&[City::Houston], 1, 10)));
        assert!(!a.overlaps(&key(&[City::Seattle], 11, 20)));
    }
}
