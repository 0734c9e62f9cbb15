use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::common::constants::MIN_PAIRS_FOR_CORRELATION;
use crate::common::types::{AnalysisProfile, City, DailyObservation, Metric};

/// Direction of a metric over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// OLS slope per day
    pub slope_per_day: f64,
    pub trend: Trend,
}

/// Pearson correlation of `metric` against demand. `coefficient` is `None`
/// when there were too few pairs or one side had no variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub metric: Metric,
    pub against: Metric,
    pub pairs: usize,
    pub coefficient: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitySummary {
    pub complete_days: usize,
    pub correlations: Vec<Correlation>,
    pub aggregates: BTreeMap<Metric, MetricAggregate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CityAnalysis {
    Computed(CitySummary),
    InsufficientData { available: usize, required: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub profile: AnalysisProfile,
    pub cities: BTreeMap<City, CityAnalysis>,
    /// Correlations over every city's observations together
    pub pooled: Vec<Correlation>,
}

impl AnalysisResult {
    pub fn insufficient_cities(&self) -> Vec<City> {
        self.cities
            .iter()
            .filter(|(_, a)| matches!(a, CityAnalysis::InsufficientData { .. }))
            .map(|(c, _)| *c)
            .collect()
    }
}

pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < MIN_PAIRS_FOR_CORRELATION {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// `(day index, value)` points, day index counted from the first point.
fn aggregate(points: &[(f64, f64)]) -> Option<MetricAggregate> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let values = points.iter().map(|(_, v)| *v);
    let mean = values.clone().sum::<f64>() / n;
    let min = values.clone().fold(f64::INFINITY, f64::min);
    let max = values.fold(f64::NEG_INFINITY, f64::max);

    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let (mut sxx, mut sxy) = (0.0, 0.0);
    for (x, y) in points {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean);
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };

    let span = points.last().map(|(x, _)| *x).unwrap_or(0.0) - points[0].0;
    let change = slope * span;
    // flat when the fitted change is under 1% of the mean magnitude
    let trend = if change.abs() < 0.01 * mean.abs() || change == 0.0 {
        Trend::Flat
    } else if change > 0.0 {
        Trend::Rising
    } else {
        Trend::Falling
    };

    Some(MetricAggregate {
        count: points.len(),
        mean,
        min,
        max,
        slope_per_day: slope,
        trend,
    })
}

fn correlations<'a>(observations: impl Iterator<Item = &'a DailyObservation> + Clone) -> Vec<Correlation> {
    Metric::WEATHER
        .into_iter()
        .filter_map(|metric| {
            let pairs: Vec<(f64, f64)> = observations
                .clone()
                .filter_map(|o| Some((o.get(metric)?, o.get(Metric::DemandMwh)?)))
                .collect();
            let seen = observations.clone().any(|o| o.get(metric).is_some());
            seen.then(|| Correlation {
                metric,
                against: Metric::DemandMwh,
                pairs: pairs.len(),
                coefficient: pearson(&pairs),
            })
        })
        .collect()
}

pub struct AnalysisEngine {
    profile: AnalysisProfile,
    min_points: usize,
}

impl AnalysisEngine {
    pub fn new(profile: AnalysisProfile, min_points: usize) -> Self {
        Self { profile, min_points }
    }

    pub fn analyze(&self, observations: &[DailyObservation]) -> AnalysisResult {
        let mut by_city: BTreeMap<City, Vec<&DailyObservation>> = BTreeMap::new();
        for obs in observations {
            by_city.entry(obs.city).or_default().push(obs);
        }

        let required = self.profile.required_metrics();
        let mut cities = BTreeMap::new();
        for (city, mut city_obs) in by_city {
            city_obs.sort_by_key(|o| o.date);
            let complete = city_obs.iter().filter(|o| o.has_all(required)).count();
            if complete < self.min_points {
                warn!(city = %city, available = complete, required = self.min_points, "Insufficient data for analysis");
                cities.insert(
                    city,
                    CityAnalysis::InsufficientData {
                        available: complete,
                        required: self.min_points,
                    },
                );
                continue;
            }

            let first_date = city_obs[0].date;
            let mut aggregates = BTreeMap::new();
            for metric in Metric::ALL {
                let points: Vec<(f64, f64)> = city_obs
                    .iter()
                    .filter_map(|o| {
                        let day = (o.date - first_date).num_days() as f64;
                        o.get(metric).map(|v| (day, v))
                    })
                    .collect();
                if let Some(agg) = aggregate(&points) {
                    aggregates.insert(metric, agg);
                }
            }

            cities.insert(
                city,
                CityAnalysis::Computed(CitySummary {
                    complete_days: complete,
                    correlations: correlations(city_obs.iter().copied()),
                    aggregates,
                }),
            );
        }

        let result = AnalysisResult {
            profile: self.profile,
            cities,
            pooled: correlations(observations.iter()),
        };
        info!(
            cities = result.cities.len(),
            insufficient = result.insufficient_cities().len(),
            "Analysis complete"
        );
        result
    }
}
