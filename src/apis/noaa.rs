use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use super::{Page, SourceApi};
use crate::app::ports::HttpRequest;
use crate::common::constants::{NOAA_API_URL, NOAA_DATASET, NOAA_DATATYPES, NOAA_PAGE_LIMIT};
use crate::common::types::{City, DateRange, RawObservation, SourceId};

/// NOAA Climate Data Online, GHCND daily summaries.
///
/// Requests ask for metric units, so temperatures arrive in °C and
/// precipitation and snowfall in mm. Offsets are 1-based.
pub struct NoaaApi {
    token: String,
    max_span_days: u32,
}

impl NoaaApi {
    pub fn new(token: impl Into<String>, max_span_days: u32) -> Self {
        Self {
            token: token.into(),
            max_span_days,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct NoaaResponse {
    #[serde(default)]
    metadata: Option<NoaaMetadata>,
    #[serde(default)]
    results: Vec<NoaaResult>,
}

#[derive(Debug, Deserialize)]
struct NoaaMetadata {
    resultset: NoaaResultSet,
}

#[derive(Debug, Deserialize)]
struct NoaaResultSet {
    #[serde(default)]
    count: u32,
}

#[derive(Debug, Deserialize)]
struct NoaaResult {
    date: String,
    datatype: String,
    #[serde(default)]
    value: Option<f64>,
}

fn unit_for(datatype: &str) -> &'static str {
    match datatype {
        "TMAX" | "TMIN" | "TAVG" => "celsius",
        "PRCP" | "SNOW" | "SNWD" => "mm",
        _ => "",
    }
}

/// `2024-01-15T00:00:00` -> 2024-01-15
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

impl SourceApi for NoaaApi {
    fn source_id(&self) -> SourceId {
        SourceId::Weather
    }

    fn max_span_days(&self) -> u32 {
        self.max_span_days
    }

    fn first_offset(&self) -> u32 {
        1
    }

    fn credential(&self) -> &str {
        &self.token
    }

    fn build_request(&self, city: City, chunk: &DateRange, offset: u32) -> HttpRequest {
        let mut request = HttpRequest::get(NOAA_API_URL)
            .query("datasetid", NOAA_DATASET)
            .query("stationid", city.noaa_station_id());
        for datatype in NOAA_DATATYPES {
            request = request.query("datatypeid", datatype);
        }
        request
            .query("startdate", chunk.start.to_string())
            .query("enddate", chunk.end.to_string())
            .query("units", "metric")
            .query("limit", NOAA_PAGE_LIMIT.to_string())
            .query("offset", offset.to_string())
    }

    fn authenticate(&self, request: HttpRequest) -> HttpRequest {
        request.header("token", &self.token)
    }

    fn parse_page(
        &self,
        city: City,
        chunk: &DateRange,
        offset: u32,
        body: &[u8],
    ) -> std::result::Result<Page, String> {
        let response: NoaaResponse = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        let total = response.metadata.as_ref().map(|m| m.resultset.count).unwrap_or(0);
        let returned = response.results.len() as u32;

        let mut observations = Vec::with_capacity(response.results.len());
        for result in response.results {
            let Some(date) = parse_date(&result.date) else {
                debug!(city = %city, date = %result.date, "Skipping NOAA result with bad date");
                continue;
            };
            if !chunk.contains(date) {
                continue;
            }
            observations.push(RawObservation {
                source: SourceId::Weather,
                city,
                date,
                unit: unit_for(&result.datatype).to_string(),
                metric: result.datatype,
                value: result.value.unwrap_or(f64::NAN),
            });
        }

        // offset is 1-based: records seen so far = offset - 1 + returned
        let seen = offset.saturating_sub(1) + returned;
        let next_offset = (returned > 0 && seen < total).then_some(offset + returned);
        Ok(Page {
            observations,
            next_offset,
        })
    }
}
