use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Page, SourceApi};
use crate::app::ports::HttpRequest;
use crate::common::constants::{EIA_API_URL, EIA_DEMAND_TYPE, EIA_PAGE_LENGTH};
use crate::common::types::{City, DateRange, RawObservation, SourceId};

/// EIA Open Data v2, daily demand per balancing authority.
pub struct EiaApi {
    api_key: String,
    max_span_days: u32,
}

impl EiaApi {
    pub fn new(api_key: impl Into<String>, max_span_days: u32) -> Self {
        Self {
            api_key: api_key.into(),
            max_span_days,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EiaEnvelope {
    response: EiaResponse,
}

#[derive(Debug, Deserialize)]
struct EiaResponse {
    #[serde(default)]
    total: Value,
    #[serde(default)]
    data: Vec<EiaRow>,
}

#[derive(Debug, Deserialize)]
struct EiaRow {
    period: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    value: Value,
    #[serde(rename = "value-units", default)]
    units: Option<String>,
}

/// EIA sends numbers either as JSON numbers or as strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl SourceApi for EiaApi {
    fn source_id(&self) -> SourceId {
        SourceId::Energy
    }

    fn max_span_days(&self) -> u32 {
        self.max_span_days
    }

    fn first_offset(&self) -> u32 {
        0
    }

    fn credential(&self) -> &str {
        &self.api_key
    }

    fn build_request(&self, city: City, chunk: &DateRange, offset: u32) -> HttpRequest {
        HttpRequest::get(EIA_API_URL)
            .query("frequency", "daily")
            .query("data[0]", "value")
            .query("facets[respondent][]", city.eia_region_code())
            .query("facets[type][]", EIA_DEMAND_TYPE)
            .query("facets[timezone][]", city.eia_timezone())
            .query("start", chunk.start.to_string())
            .query("end", chunk.end.to_string())
            .query("sort[0][column]", "period")
            .query("sort[0][direction]", "asc")
            .query("offset", offset.to_string())
            .query("length", EIA_PAGE_LENGTH.to_string())
    }

    fn authenticate(&self, request: HttpRequest) -> HttpRequest {
        request.query("api_key", &self.api_key)
    }

    fn parse_page(
        &self,
        city: City,
        chunk: &DateRange,
        offset: u32,
        body: &[u8],
    ) -> std::result::Result<Page, String> {
        let envelope: EiaEnvelope = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        let total = number(&envelope.response.total).unwrap_or(0.0) as u32;
        let returned = envelope.response.data.len() as u32;

        let mut observations = Vec::with_capacity(envelope.response.data.len());
        for row in envelope.response.data {
            let Ok(date) = NaiveDate::parse_from_str(row.period.trim(), "%Y-%m-%d") else {
                debug!(city = %city, period = %row.period, "Skipping EIA row with bad period");
                continue;
            };
            if !chunk.contains(date) {
                continue;
            }
            observations.push(RawObservation {
                source: SourceId::Energy,
                city,
                date,
                metric: row.kind.unwrap_or_else(|| EIA_DEMAND_TYPE.to_string()),
                value: number(&row.value).unwrap_or(f64::NAN),
                unit: row.units.unwrap_or_else(|| "megawatthours".to_string()),
            });
        }

        let next_offset = (returned > 0 && offset + returned < total).then_some(offset + returned);
        Ok(Page {
            observations,
            next_offset,
        })
    }
}
