use crate::common::types::{Metric, SourceId};

/// Fixed `(source, raw metric name) -> Metric` table.
///
/// Raw names are matched case-insensitively. Each source also accepts the
/// canonical vocabulary names for the metrics it provides.
pub fn lookup_metric(source: SourceId, raw: &str) -> Option<Metric> {
    let key = raw.trim().to_ascii_uppercase();
    match source {
        SourceId::Weather => match key.as_str() {
            "TMAX" | "TEMPERATURE_MAX" => Some(Metric::TemperatureMax),
            "TMIN" | "TEMPERATURE_MIN" => Some(Metric::TemperatureMin),
            "TAVG" | "TEMPERATURE_AVG" => Some(Metric::TemperatureAvg),
            "PRCP" | "PRECIPITATION" => Some(Metric::Precipitation),
            "SNOW" | "SNOWFALL" => Some(Metric::Snowfall),
            _ => None,
        },
        SourceId::Energy => match key.as_str() {
            "D" | "DEMAND" | "DEMAND_MWH" => Some(Metric::DemandMwh),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_map_per_source() {
        assert_eq!(lookup_metric(SourceId::Weather, "tmax"), Some(Metric::TemperatureMax));
        assert_eq!(lookup_metric(SourceId::Energy, "D"), Some(Metric::DemandMwh));
        // a name is only valid for the source that emits it
        assert_eq!(lookup_metric(SourceId::Energy, "TMAX"), None);
        assert_eq!(lookup_metric(SourceId::Weather, "SNWD"), None);
    }
}
