//! Record normalization: raw source readings into the controlled vocabulary.

pub mod registry;
pub mod units;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::common::types::{City, DateRange, NormalizedRecord, RawObservation, SourceId};
use crate::observability::metrics;
use registry::lookup_metric;
use units::Unit;

/// Why a raw observation did not become a normalized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    UnknownMetric,
    UnknownUnit,
    NonFiniteValue,
    ImplausibleValue,
    OutOfWindow,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::UnknownMetric => "unknown_metric",
            RejectionKind::UnknownUnit => "unknown_unit",
            RejectionKind::NonFiniteValue => "non_finite_value",
            RejectionKind::ImplausibleValue => "implausible_value",
            RejectionKind::OutOfWindow => "out_of_window",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub source: SourceId,
    pub city: City,
    pub date: NaiveDate,
    pub metric: String,
    pub detail: String,
}

impl Rejection {
    fn new(kind: RejectionKind, raw: &RawObservation, detail: String) -> Self {
        Self {
            kind,
            source: raw.source,
            city: raw.city,
            date: raw.date,
            metric: raw.metric.clone(),
            detail,
        }
    }
}

/// Rejection counts by kind and by source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionStats {
    pub total: usize,
    pub by_kind: BTreeMap<RejectionKind, usize>,
    pub by_source: BTreeMap<SourceId, usize>,
}

impl RejectionStats {
    pub fn record(&mut self, rejection: &Rejection) {
        self.total += 1;
        *self.by_kind.entry(rejection.kind).or_default() += 1;
        *self.by_source.entry(rejection.source).or_default() += 1;
    }

    pub fn count(&self, kind: RejectionKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// Map one raw observation into the controlled vocabulary.
///
/// Checks run in a fixed order (metric name, unit, finiteness, plausible
/// range), so the same input always yields the same record or the same
/// rejection kind. Values are never clamped.
pub fn normalize(raw: &RawObservation) -> Result<NormalizedRecord, Rejection> {
    let metric = lookup_metric(raw.source, &raw.metric).ok_or_else(|| {
        Rejection::new(
            RejectionKind::UnknownMetric,
            raw,
            format!("no {} metric named '{}'", raw.source, raw.metric),
        )
    })?;

    let unit = Unit::parse(&raw.unit)
        .filter(|u| u.dimension() == metric.dimension())
        .ok_or_else(|| {
            Rejection::new(
                RejectionKind::UnknownUnit,
                raw,
                format!("unit '{}' is not valid for {}", raw.unit, metric),
            )
        })?;

    if !raw.value.is_finite() {
        return Err(Rejection::new(
            RejectionKind::NonFiniteValue,
            raw,
            format!("value {} is not finite", raw.value),
        ));
    }

    let value = unit.to_standard(raw.value);
    let (min, max) = metric.plausible_range();
    if !value.is_finite() || value < min || value > max {
        return Err(Rejection::new(
            RejectionKind::ImplausibleValue,
            raw,
            format!("{} {} outside {}..={}", metric, value, min, max),
        ));
    }

    Ok(NormalizedRecord {
        city: raw.city,
        date: raw.date,
        metric,
        value,
        source: raw.source,
    })
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOutput {
    pub records: Vec<NormalizedRecord>,
    pub rejections: Vec<Rejection>,
    pub stats: RejectionStats,
}

/// Normalize a batch in parallel. Accepted records dated outside `window`
/// are rejected as `OutOfWindow`. Output order follows input order.
pub fn normalize_batch(raws: &[RawObservation], window: &DateRange) -> NormalizeOutput {
    let results: Vec<Result<NormalizedRecord, Rejection>> = raws
        .par_iter()
        .map(|raw| {
            let record = normalize(raw)?;
            if window.contains(record.date) {
                Ok(record)
            } else {
                Err(Rejection::new(
                    RejectionKind::OutOfWindow,
                    raw,
                    format!("{} is outside {}", record.date, window),
                ))
            }
        })
        .collect();

    let mut output = NormalizeOutput::default();
    for result in results {
        match result {
            Ok(record) => output.records.push(record),
            Err(rejection) => {
                debug!(kind = %rejection.kind, city = %rejection.city, date = %rejection.date, "Rejected: {}", rejection.detail);
                output.stats.record(&rejection);
                output.rejections.push(rejection);
            }
        }
    }

    metrics::normalize::accepted(output.records.len());
    for (kind, count) in &output.stats.by_kind {
        metrics::normalize::rejected(kind.as_str(), *count);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Metric;
    use proptest::prelude::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn raw(source: SourceId, metric: &str, value: f64, unit: &str) -> RawObservation {
        RawObservation {
            source,
            city: City::Phoenix,
            date: d(10),
            metric: metric.to_string(),
            value,
            unit: unit.to_string(),
        }
    }

    #[test]
    fn test_weather_reading_is_mapped() {
        let record = normalize(&raw(SourceId::Weather, "TMAX", 71.6, "fahrenheit")).unwrap();
        assert_eq!(record.metric, Metric::TemperatureMax);
        assert!((record.value - 22.0).abs() < 1e-9);
        assert_eq!(record.source, SourceId::Weather);
    }

    #[test]
    fn test_negative_demand_is_implausible() {
        let rejection = normalize(&raw(SourceId::Energy, "D", -500.0, "megawatthours")).unwrap_err();
        assert_eq!(rejection.kind, RejectionKind::ImplausibleValue);
    }

    #[test]
    fn test_rejection_kinds() {
        let kind = |r: RawObservation| normalize(&r).unwrap_err().kind;
        assert_eq!(kind(raw(SourceId::Weather, "WIND", 1.0, "mm")), RejectionKind::UnknownMetric);
        assert_eq!(kind(raw(SourceId::Weather, "TMAX", 1.0, "parsecs")), RejectionKind::UnknownUnit);
        // a known unit of the wrong dimension is still unusable
        assert_eq!(kind(raw(SourceId::Weather, "PRCP", 1.0, "celsius")), RejectionKind::UnknownUnit);
        assert_eq!(kind(raw(SourceId::Energy, "D", f64::NAN, "mwh")), RejectionKind::NonFiniteValue);
        assert_eq!(kind(raw(SourceId::Weather, "TMIN", 75.0, "celsius")), RejectionKind::ImplausibleValue);
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert!(normalize(&raw(SourceId::Weather, "TMAX", 60.0, "celsius")).is_ok());
        assert!(normalize(&raw(SourceId::Weather, "TMIN", -90.0, "celsius")).is_ok());
        assert!(normalize(&raw(SourceId::Energy, "D", 0.0, "megawatthours")).is_ok());
    }

    #[test]
    fn test_batch_counts_rejections_and_window() {
        let window = DateRange::new(d(1), d(15)).unwrap();
        let mut late = raw(SourceId::Weather, "TMAX", 10.0, "celsius");
        late.date = d(20);
        let batch = vec![
            raw(SourceId::Weather, "TMAX", 10.0, "celsius"),
            raw(SourceId::Energy, "D", -500.0, "megawatthours"),
            late,
        ];

        let output = normalize_batch(&batch, &window);
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.stats.total, 2);
        assert_eq!(output.stats.count(RejectionKind::ImplausibleValue), 1);
        assert_eq!(output.stats.count(RejectionKind::OutOfWindow), 1);
        assert_eq!(output.stats.by_source.get(&SourceId::Energy), Some(&1));
    }

    fn arb_raw() -> impl Strategy<Value = RawObservation> {
        (
            prop_oneof![Just(SourceId::Weather), Just(SourceId::Energy)],
            prop_oneof![Just("TMAX"), Just("PRCP"), Just("D"), Just("XYZ")],
            prop_oneof![Just(f64::NAN), -1.0e7..1.0e7f64],
            prop_oneof![Just("celsius"), Just("fahrenheit"), Just("mm"), Just("mwh"), Just("gwh"), Just("??")],
        )
            .prop_map(|(source, metric, value, unit)| raw(source, metric, value, unit))
    }

    proptest! {
        #[test]
        fn prop_normalize_is_deterministic(input in arb_raw()) {
            let first = normalize(&input);
            let second = normalize(&input);
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(a), Err(b)) => prop_assert_eq!(a.kind, b.kind),
                _ => prop_assert!(false, "outcome changed between calls"),
            }
        }

        #[test]
        fn prop_accepted_values_are_finite_and_plausible(input in arb_raw()) {
            if let Ok(record) = normalize(&input) {
                let (min, max) = record.metric.plausible_range();
                prop_assert!(record.value.is_finite());
                prop_assert!(record.value >= min && record.value <= max);
            }
        }
    }
}
