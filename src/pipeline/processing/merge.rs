use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::common::types::{City, DailyObservation, Metric, NormalizedRecord, SourceId};
use crate::observability::metrics;

/// One value offered for a metric slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub source: SourceId,
    pub value: f64,
}

/// A (city, date, metric) slot that received more than one distinct value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub city: City,
    pub date: NaiveDate,
    pub metric: Metric,
    /// Distinct candidates, ordered by (source, value)
    pub candidates: Vec<Candidate>,
    pub winner: Candidate,
}

impl Conflict {
    pub fn is_cross_source(&self) -> bool {
        self.candidates.iter().any(|c| c.source != self.winner.source)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictLog {
    pub entries: Vec<Conflict>,
}

impl ConflictLog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutput {
    /// Sorted by (city, date)
    pub observations: Vec<DailyObservation>,
    pub conflicts: ConflictLog,
}

/// Join normalized records into one observation per (city, date).
///
/// Exact duplicates collapse silently. Otherwise the higher-precedence
/// source wins a contested metric and, within one source, the largest value
/// wins; each such slot is written to the conflict log. The result does not
/// depend on input order.
pub fn merge(records: &[NormalizedRecord]) -> MergeOutput {
    type Slots = BTreeMap<Metric, Vec<Candidate>>;
    let mut groups: BTreeMap<(City, NaiveDate), (Slots, BTreeSet<SourceId>)> = BTreeMap::new();

    for record in records {
        let (slots, sources) = groups.entry((record.city, record.date)).or_default();
        sources.insert(record.source);
        slots.entry(record.metric).or_default().push(Candidate {
            source: record.source,
            value: record.value,
        });
    }

    let mut output = MergeOutput::default();
    for ((city, date), (slots, sources)) in groups {
        let mut values = BTreeMap::new();
        for (metric, mut candidates) in slots {
            candidates.sort_by(|a, b| {
                a.source
                    .cmp(&b.source)
                    .then_with(|| a.value.total_cmp(&b.value))
            });
            candidates.dedup_by(|a, b| a.source == b.source && a.value.to_bits() == b.value.to_bits());

            // sorted ascending, so the last candidate is the winner
            let Some(winner) = candidates.last().copied() else {
                continue;
            };
            if candidates.len() > 1 {
                debug!(city = %city, date = %date, metric = %metric, winner = %winner.source, "Conflicting values");
                output.conflicts.entries.push(Conflict {
                    city,
                    date,
                    metric,
                    candidates,
                    winner,
                });
            }
            values.insert(metric, winner.value);
        }

        if values.is_empty() {
            continue;
        }
        output.observations.push(DailyObservation {
            city,
            date,
            metrics: values,
            sources,
            outliers: BTreeSet::new(),
        });
    }

    info!(
        observations = output.observations.len(),
        conflicts = output.conflicts.len(),
        "Merged normalized records"
    );
    metrics::merge::merged(output.observations.len(), output.conflicts.len());
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
    }

    fn rec(city: City, day: u32, metric: Metric, value: f64, source: SourceId) -> NormalizedRecord {
        NormalizedRecord {
            city,
            date: d(day),
            metric,
            value,
            source,
        }
    }

    #[test]
    fn test_groups_by_city_and_date() {
        let output = merge(&[
            rec(City::Seattle, 1, Metric::TemperatureMax, 9.0, SourceId::Weather),
            rec(City::Seattle, 1, Metric::DemandMwh, 25_000.0, SourceId::Energy),
            rec(City::Chicago, 1, Metric::TemperatureMax, -2.0, SourceId::Weather),
        ]);

        assert_eq!(output.observations.len(), 2);
        assert!(output.conflicts.is_empty());
        // Chicago sorts before Seattle
        assert_eq!(output.observations[0].city, City::Chicago);
        let seattle = &output.observations[1];
        assert_eq!(seattle.get(Metric::DemandMwh), Some(25_000.0));
        assert_eq!(seattle.sources.len(), 2);
    }

    #[test]
    fn test_exact_duplicates_collapse_without_conflict() {
        let r = rec(City::Houston, 3, Metric::Precipitation, 4.0, SourceId::Weather);
        let output = merge(&[r.clone(), r]);
        assert_eq!(output.observations.len(), 1);
        assert!(output.conflicts.is_empty());
    }

    #[test]
    fn test_higher_precedence_source_wins_and_is_logged() {
        let output = merge(&[
            rec(City::Houston, 3, Metric::TemperatureMax, 30.0, SourceId::Energy),
            rec(City::Houston, 3, Metric::TemperatureMax, 31.0, SourceId::Weather),
        ]);
        assert_eq!(output.observations[0].get(Metric::TemperatureMax), Some(30.0));
        assert_eq!(output.conflicts.len(), 1);
        let conflict = &output.conflicts.entries[0];
        assert_eq!(conflict.winner.source, SourceId::Energy);
        assert!(conflict.is_cross_source());
    }

    #[test]
    fn test_same_source_tie_keeps_largest_value() {
        let output = merge(&[
            rec(City::Phoenix, 5, Metric::DemandMwh, 100.0, SourceId::Energy),
            rec(City::Phoenix, 5, Metric::DemandMwh, 120.0, SourceId::Energy),
        ]);
        assert_eq!(output.observations[0].get(Metric::DemandMwh), Some(120.0));
        assert!(!output.conflicts.entries[0].is_cross_source());
    }

    #[test]
    fn test_no_slots_are_fabricated() {
        assert!(merge(&[]).observations.is_empty());
    }

    fn arb_records() -> impl Strategy<Value = Vec<NormalizedRecord>> {
        let record = (
            prop_oneof![Just(City::NewYork), Just(City::Seattle)],
            1u32..5,
            prop_oneof![Just(Metric::TemperatureMax), Just(Metric::DemandMwh)],
            0u32..4,
            prop_oneof![Just(SourceId::Weather), Just(SourceId::Energy)],
        )
            .prop_map(|(city, day, metric, value, source)| rec(city, day, metric, f64::from(value), source));
        proptest::collection::vec(record, 0..40)
    }

    proptest! {
        #[test]
        fn prop_merge_ignores_input_order(
            (records, shuffled) in arb_records()
                .prop_flat_map(|records| (Just(records.clone()), Just(records).prop_shuffle()))
        ) {
            prop_assert_eq!(merge(&records), merge(&shuffled));
        }

        #[test]
        fn prop_one_observation_per_distinct_slot(records in arb_records()) {
            let distinct: BTreeSet<_> = records.iter().map(|r| (r.city, r.date)).collect();
            prop_assert_eq!(merge(&records).observations.len(), distinct.len());
        }
    }
}
