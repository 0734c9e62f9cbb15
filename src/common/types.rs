use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::common::error::{PipelineError, Result};

/// The five cities the pipeline covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum City {
    #[serde(rename = "NYC")]
    NewYork,
    #[serde(rename = "CHI")]
    Chicago,
    #[serde(rename = "HOU")]
    Houston,
    #[serde(rename = "PHX")]
    Phoenix,
    #[serde(rename = "SEA")]
    Seattle,
}

impl City {
    pub const ALL: [City; 5] = [
        City::NewYork,
        City::Chicago,
        City::Houston,
        City::Phoenix,
        City::Seattle,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            City::NewYork => "NYC",
            City::Chicago => "CHI",
            City::Houston => "HOU",
            City::Phoenix => "PHX",
            City::Seattle => "SEA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            City::NewYork => "New York",
            City::Chicago => "Chicago",
            City::Houston => "Houston",
            City::Phoenix => "Phoenix",
            City::Seattle => "Seattle",
        }
    }

    pub fn state(&self) -> &'static str {
        match self {
            City::NewYork => "New York",
            City::Chicago => "Illinois",
            City::Houston => "Texas",
            City::Phoenix => "Arizona",
            City::Seattle => "Washington",
        }
    }

    /// GHCND station used for the city's weather readings.
    pub fn noaa_station_id(&self) -> &'static str {
        match self {
            City::NewYork => "GHCND:USW00094728",
            City::Chicago => "GHCND:USW00094846",
            City::Houston => "GHCND:USW00012960",
            City::Phoenix => "GHCND:USW00023183",
            City::Seattle => "GHCND:USW00024233",
        }
    }

    /// EIA balancing authority whose demand stands in for the city.
    pub fn eia_region_code(&self) -> &'static str {
        match self {
            City::NewYork => "NYIS",
            City::Chicago => "PJM",
            City::Houston => "ERCO",
            City::Phoenix => "AZPS",
            City::Seattle => "SCL",
        }
    }

    /// EIA timezone facet matching the city's local calendar day.
    pub fn eia_timezone(&self) -> &'static str {
        match self {
            City::NewYork => "Eastern",
            City::Chicago | City::Houston => "Central",
            City::Phoenix => "Arizona",
            City::Seattle => "Pacific",
        }
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for City {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        City::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(wanted) || c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| PipelineError::Config(format!("Unknown city '{}'", s)))
    }
}

/// Upstream data source. The declaration order is the merge precedence:
/// on a conflicting metric the later variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Weather,
    Energy,
}

impl SourceId {
    pub const ALL: [SourceId; 2] = [SourceId::Weather, SourceId::Energy];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Weather => "weather",
            SourceId::Energy => "energy",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical dimension of a metric, used to decide which units are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Temperature,
    Length,
    Energy,
}

/// Controlled metric vocabulary. Values are always stored in the metric's
/// standard unit: °C for temperatures, mm for precipitation and snowfall,
/// MWh for demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TemperatureMax,
    TemperatureMin,
    TemperatureAvg,
    Precipitation,
    Snowfall,
    DemandMwh,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::TemperatureMax,
        Metric::TemperatureMin,
        Metric::TemperatureAvg,
        Metric::Precipitation,
        Metric::Snowfall,
        Metric::DemandMwh,
    ];

    pub const WEATHER: [Metric; 5] = [
        Metric::TemperatureMax,
        Metric::TemperatureMin,
        Metric::TemperatureAvg,
        Metric::Precipitation,
        Metric::Snowfall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TemperatureMax => "temperature_max",
            Metric::TemperatureMin => "temperature_min",
            Metric::TemperatureAvg => "temperature_avg",
            Metric::Precipitation => "precipitation",
            Metric::Snowfall => "snowfall",
            Metric::DemandMwh => "demand_mwh",
        }
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            Metric::TemperatureMax | Metric::TemperatureMin | Metric::TemperatureAvg => {
                Dimension::Temperature
            }
            Metric::Precipitation | Metric::Snowfall => Dimension::Length,
            Metric::DemandMwh => Dimension::Energy,
        }
    }

    /// Inclusive hard range outside of which a reading is physically implausible.
    pub fn plausible_range(&self) -> (f64, f64) {
        match self.dimension() {
            Dimension::Temperature => (-90.0, 60.0),
            Dimension::Length if *self == Metric::Snowfall => (0.0, 3000.0),
            Dimension::Length => (0.0, 2000.0),
            Dimension::Energy => (0.0, 5_000_000.0),
        }
    }

    pub fn is_weather(&self) -> bool {
        self.dimension() != Dimension::Energy
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis type; fixes which metrics a day needs to count as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisProfile {
    #[default]
    TemperatureDemand,
    FullWeatherDemand,
}

impl AnalysisProfile {
    pub fn required_metrics(&self) -> &'static [Metric] {
        match self {
            AnalysisProfile::TemperatureDemand => {
                &[Metric::TemperatureMax, Metric::TemperatureMin, Metric::DemandMwh]
            }
            AnalysisProfile::FullWeatherDemand => &[
                Metric::TemperatureMax,
                Metric::TemperatureMin,
                Metric::Precipitation,
                Metric::DemandMwh,
            ],
        }
    }
}

/// Closed interval of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(PipelineError::Config(format!(
                "Date range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// The `days`-long window ending on `end` (inclusive).
    pub fn ending_on(end: NaiveDate, days: i64) -> Self {
        let start = end - Duration::days(days.max(1) - 1);
        Self { start, end }
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.len_days()).map(move |offset| start + Duration::days(offset))
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Split into consecutive sub-ranges of at most `max_span_days` days.
    /// The chunks cover the range exactly once, in date order.
    pub fn chunks(&self, max_span_days: u32) -> Vec<DateRange> {
        let span = i64::from(max_span_days.max(1));
        let mut chunks = Vec::new();
        let mut start = self.start;
        while start <= self.end {
            let end = (start + Duration::days(span - 1)).min(self.end);
            chunks.push(DateRange { start, end });
            start = end + Duration::days(1);
        }
        chunks
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// One reading exactly as a source client decoded it from the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub source: SourceId,
    pub city: City,
    pub date: NaiveDate,
    /// Source-specific metric name, e.g. `TMAX` or `D`
    pub metric: String,
    /// NaN when the wire value did not parse
    pub value: f64,
    pub unit: String,
}

/// A reading mapped into the controlled vocabulary and standard units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub city: City,
    pub date: NaiveDate,
    pub metric: Metric,
    pub value: f64,
    pub source: SourceId,
}

/// Merged view of one city on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub city: City,
    pub date: NaiveDate,
    pub metrics: BTreeMap<Metric, f64>,
    pub sources: BTreeSet<SourceId>,
    /// Metrics whose value the quality engine flagged; the values stay in `metrics`
    #[serde(default)]
    pub outliers: BTreeSet<Metric>,
}

impl DailyObservation {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    pub fn has_all(&self, required: &[Metric]) -> bool {
        required.iter().all(|m| self.metrics.contains_key(m))
    }

    pub fn is_outlier(&self, metric: Metric) -> bool {
        self.outliers.contains(&metric)
    }
}
