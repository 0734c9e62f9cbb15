//! Quality evaluation of the merged dataset.
//!
//! The engine is advisory: it counts missing and partial slots, flags
//! outliers and measures freshness. The orchestrator decides what the
//! numbers mean for the run.

pub mod outliers;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::common::types::{AnalysisProfile, City, DailyObservation, DateRange, Metric};
use crate::observability::metrics;
use crate::pipeline::processing::merge::ConflictLog;

/// Classification of one expected (city, date) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// Observation exists and carries every required metric
    Present,
    /// Observation exists but lacks at least one required metric
    Partial,
    /// No observation at all
    Missing,
}

/// A slot that is not fully present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotIssue {
    pub city: City,
    pub date: NaiveDate,
    pub status: SlotStatus,
    /// Required metrics absent from the slot
    pub missing_metrics: Vec<Metric>,
}

/// A value whose modified z-score exceeded the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierFlag {
    pub city: City,
    pub date: NaiveDate,
    pub metric: Metric,
    pub value: f64,
    pub score: f64,
}

/// Per-city breakdown of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityQuality {
    pub present: usize,
    pub partial: usize,
    pub missing: usize,
    pub outliers: usize,
    /// Most recent date with a complete observation
    pub latest_complete: Option<NaiveDate>,
    /// Days between the run date and `latest_complete`
    pub freshness_lag_days: Option<i64>,
    pub stale: bool,
    /// No observation at all for the whole window
    pub fully_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub run_date: NaiveDate,
    pub date_range: DateRange,
    pub profile: AnalysisProfile,
    pub expected: usize,
    pub present: usize,
    pub partial: usize,
    pub missing: usize,
    /// Values of the profile's required metrics; the outlier ratio denominator
    pub metric_values: usize,
    /// Flags on required metrics only
    pub outlier_count: usize,
    /// Every flag, including metrics outside the profile
    pub outliers: Vec<OutlierFlag>,
    pub conflict_count: usize,
    pub slot_issues: Vec<SlotIssue>,
    pub cities: BTreeMap<City, CityQuality>,
}

impl QualityReport {
    /// `(missing + partial) / expected`
    pub fn missing_ratio(&self) -> f64 {
        if self.expected == 0 {
            return 0.0;
        }
        (self.missing + self.partial) as f64 / self.expected as f64
    }

    /// `outliers / metric values`
    pub fn outlier_ratio(&self) -> f64 {
        if self.metric_values == 0 {
            return 0.0;
        }
        self.outlier_count as f64 / self.metric_values as f64
    }

    pub fn fully_missing_cities(&self) -> Vec<City> {
        self.cities
            .iter()
            .filter(|(_, q)| q.fully_missing)
            .map(|(c, _)| *c)
            .collect()
    }

    pub fn stale_cities(&self) -> Vec<City> {
        self.cities
            .iter()
            .filter(|(_, q)| q.stale)
            .map(|(c, _)| *c)
            .collect()
    }

    pub fn slot_status(&self, city: City, date: NaiveDate) -> SlotStatus {
        self.slot_issues
            .iter()
            .find(|issue| issue.city == city && issue.date == date)
            .map(|issue| issue.status)
            .unwrap_or(SlotStatus::Present)
    }

    /// Copy with every field derived from the run date cleared, so that two
    /// runs over the same data compare equal.
    pub fn without_run_date(&self) -> QualityReport {
        let mut copy = self.clone();
        copy.run_date = NaiveDate::MIN;
        for city in copy.cities.values_mut() {
            city.freshness_lag_days = None;
            city.stale = false;
        }
        copy
    }
}

#[derive(Debug, Clone)]
pub struct QualitySettings {
    pub outlier_threshold: f64,
    pub freshness_threshold_days: i64,
    pub profile: AnalysisProfile,
}

pub struct QualityEngine {
    settings: QualitySettings,
}

impl QualityEngine {
    pub fn new(settings: QualitySettings) -> Self {
        Self { settings }
    }

    /// Build the report. Observations outside `cities` or `range` are ignored.
    pub fn evaluate(
        &self,
        observations: &[DailyObservation],
        conflicts: &ConflictLog,
        range: &DateRange,
        cities: &BTreeSet<City>,
        run_date: NaiveDate,
    ) -> QualityReport {
        let required = self.settings.profile.required_metrics();
        let by_slot: BTreeMap<(City, NaiveDate), &DailyObservation> = observations
            .iter()
            .filter(|o| cities.contains(&o.city) && range.contains(o.date))
            .map(|o| ((o.city, o.date), o))
            .collect();

        let mut report = QualityReport {
            run_date,
            date_range: *range,
            profile: self.settings.profile,
            expected: cities.len() * range.len_days() as usize,
            present: 0,
            partial: 0,
            missing: 0,
            metric_values: by_slot
                .values()
                .map(|o| required.iter().filter(|m| o.get(**m).is_some()).count())
                .sum(),
            outlier_count: 0,
            outliers: Vec::new(),
            conflict_count: conflicts.len(),
            slot_issues: Vec::new(),
            cities: BTreeMap::new(),
        };

        for &city in cities {
            let mut quality = CityQuality {
                present: 0,
                partial: 0,
                missing: 0,
                outliers: 0,
                latest_complete: None,
                freshness_lag_days: None,
                stale: false,
                fully_missing: false,
            };

            for date in range.days() {
                match by_slot.get(&(city, date)) {
                    None => {
                        quality.missing += 1;
                        report.slot_issues.push(SlotIssue {
                            city,
                            date,
                            status: SlotStatus::Missing,
                            missing_metrics: required.to_vec(),
                        });
                    }
                    Some(obs) if obs.has_all(required) => {
                        quality.present += 1;
                        quality.latest_complete = Some(date);
                    }
                    Some(obs) => {
                        quality.partial += 1;
                        report.slot_issues.push(SlotIssue {
                            city,
                            date,
                            status: SlotStatus::Partial,
                            missing_metrics: required
                                .iter()
                                .copied()
                                .filter(|m| obs.get(*m).is_none())
                                .collect(),
                        });
                    }
                }
            }

            let flags = self.flag_city_outliers(city, &by_slot);
            quality.outliers = flags.len();
            report.outliers.extend(flags);

            quality.freshness_lag_days = quality
                .latest_complete
                .map(|latest| (run_date - latest).num_days());
            quality.stale = match quality.freshness_lag_days {
                Some(lag) => lag > self.settings.freshness_threshold_days,
                None => true,
            };
            quality.fully_missing = quality.missing as i64 == range.len_days();

            report.present += quality.present;
            report.partial += quality.partial;
            report.missing += quality.missing;
            report.cities.insert(city, quality);
        }
        report.outlier_count = report
            .outliers
            .iter()
            .filter(|f| required.contains(&f.metric))
            .count();

        info!(
            expected = report.expected,
            present = report.present,
            partial = report.partial,
            missing = report.missing,
            outliers = report.outlier_count,
            "Quality evaluated"
        );
        metrics::quality::evaluated(
            report.outlier_count,
            report.missing + report.partial,
            report.stale_cities().len(),
        );
        report
    }

    fn flag_city_outliers(
        &self,
        city: City,
        by_slot: &BTreeMap<(City, NaiveDate), &DailyObservation>,
    ) -> Vec<OutlierFlag> {
        let mut flags = Vec::new();
        for metric in Metric::ALL {
            let series: Vec<(NaiveDate, f64)> = by_slot
                .range((city, NaiveDate::MIN)..=(city, NaiveDate::MAX))
                .filter_map(|((_, date), obs)| obs.get(metric).map(|v| (*date, v)))
                .collect();
            let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
            for (idx, score) in outliers::flag_outliers(&values, self.settings.outlier_threshold) {
                let (date, value) = series[idx];
                flags.push(OutlierFlag {
                    city,
                    date,
                    metric,
                    value,
                    score,
                });
            }
        }
        flags
    }
}

/// Copy outlier flags onto the observations they refer to.
pub fn annotate(observations: &mut [DailyObservation], report: &QualityReport) {
    let flagged: BTreeSet<(City, NaiveDate, Metric)> = report
        .outliers
        .iter()
        .map(|f| (f.city, f.date, f.metric))
        .collect();
    for obs in observations.iter_mut() {
        obs.outliers = obs
            .metrics
            .keys()
            .copied()
            .filter(|m| flagged.contains(&(obs.city, obs.date, *m)))
            .collect();
    }
}
