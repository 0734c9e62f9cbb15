#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use weather_energy_pipeline::app::ports::{
    DelayPort, HttpClientPort, HttpRequest, HttpResponse, TransportError,
};
use weather_energy_pipeline::common::City;

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Scripted HTTP transport that records every request it receives.
pub struct FakeHttp {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn weather_requests(&self) -> usize {
        self.requests().iter().filter(|r| is_weather(r)).count()
    }

    pub fn energy_requests(&self) -> usize {
        self.requests().iter().filter(|r| is_energy(r)).count()
    }
}

#[async_trait]
impl HttpClientPort for FakeHttp {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(request)
    }
}

/// Records requested waits and returns immediately.
#[derive(Default)]
pub struct RecordingDelay {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl DelayPort for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// Cancels `token` on the first wait and then never finishes waiting.
pub struct CancellingDelay {
    pub token: CancellationToken,
}

#[async_trait]
impl DelayPort for CancellingDelay {
    async fn sleep(&self, _duration: Duration) {
        self.token.cancel();
        std::future::pending::<()>().await;
    }
}

/// Never finishes waiting; only cancellation ends a backoff.
pub struct PendingDelay;

#[async_trait]
impl DelayPort for PendingDelay {
    async fn sleep(&self, _duration: Duration) {
        std::future::pending::<()>().await;
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn is_weather(request: &HttpRequest) -> bool {
    request.url.contains("ncei.noaa.gov")
}

pub fn is_energy(request: &HttpRequest) -> bool {
    request.url.contains("api.eia.gov")
}

/// Start and end dates of the chunk a request asks for.
pub fn requested_range(request: &HttpRequest) -> (NaiveDate, NaiveDate) {
    let (start_key, end_key) = if is_weather(request) {
        ("startdate", "enddate")
    } else {
        ("start", "end")
    };
    let parse = |key: &str| {
        NaiveDate::parse_from_str(request.query_value(key).unwrap(), "%Y-%m-%d").unwrap()
    };
    (parse(start_key), parse(end_key))
}

pub fn city_for(request: &HttpRequest) -> City {
    if is_weather(request) {
        let station = request.query_value("stationid").unwrap();
        City::ALL.into_iter().find(|c| c.noaa_station_id() == station).unwrap()
    } else {
        let region = request.query_value("facets[respondent][]").unwrap();
        City::ALL.into_iter().find(|c| c.eia_region_code() == region).unwrap()
    }
}

pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

pub fn ok(body: serde_json::Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status: 200,
        body: serde_json::to_vec(&body).unwrap(),
    })
}

pub fn status(code: u16) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status: code,
        body: b"{\"message\":\"scripted failure\"}".to_vec(),
    })
}

/// Smooth daily series so no value is an outlier.
pub fn tmax_for(date: NaiveDate) -> f64 {
    use chrono::Datelike;
    10.0 + 0.1 * f64::from(date.ordinal())
}

pub fn demand_for(city: City, date: NaiveDate) -> f64 {
    use chrono::Datelike;
    let base = match city {
        City::NewYork => 400_000.0,
        City::Chicago => 1_800_000.0,
        City::Houston => 900_000.0,
        City::Phoenix => 120_000.0,
        City::Seattle => 25_000.0,
    };
    base + 50.0 * f64::from(date.ordinal())
}

/// NOAA body with TMAX and TMIN for every day in the requested chunk.
pub fn noaa_body(request: &HttpRequest) -> serde_json::Value {
    let (start, end) = requested_range(request);
    let station = request.query_value("stationid").unwrap();
    let mut results = Vec::new();
    for date in days_between(start, end) {
        let stamp = format!("{}T00:00:00", date);
        results.push(json!({"date": stamp, "datatype": "TMAX", "station": station, "value": tmax_for(date)}));
        results.push(json!({"date": stamp, "datatype": "TMIN", "station": station, "value": tmax_for(date) - 8.0}));
    }
    json!({
        "metadata": {"resultset": {"offset": 1, "count": results.len(), "limit": 1000}},
        "results": results,
    })
}

/// EIA body with one demand row per day, values as strings like the live API.
pub fn eia_body_with(request: &HttpRequest, value: impl Fn(City, NaiveDate) -> f64) -> serde_json::Value {
    let (start, end) = requested_range(request);
    let city = city_for(request);
    let data: Vec<_> = days_between(start, end)
        .into_iter()
        .map(|date| {
            json!({
                "period": date.to_string(),
                "respondent": city.eia_region_code(),
                "type": "D",
                "value": value(city, date).to_string(),
                "value-units": "megawatthours",
            })
        })
        .collect();
    json!({"response": {"total": data.len().to_string(), "data": data}})
}

pub fn eia_body(request: &HttpRequest) -> serde_json::Value {
    eia_body_with(request, demand_for)
}

/// Both APIs healthy for every request.
pub fn healthy(request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    if is_weather(request) {
        ok(noaa_body(request))
    } else {
        ok(eia_body(request))
    }
}
