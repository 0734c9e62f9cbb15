mod common;

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::*;
use weather_energy_pipeline::apis::{energy_client, weather_client, SourceClient};
use weather_energy_pipeline::app::ports::TransportError;
use weather_energy_pipeline::common::{City, DateRange, SourceError, SourceId};
use weather_energy_pipeline::config::FetchConfig;

fn fetch_config() -> FetchConfig {
    FetchConfig {
        weather_min_interval_ms: 0,
        ..FetchConfig::default()
    }
}

fn range(start: u32, end: u32) -> DateRange {
    DateRange::new(day(2024, 3, start), day(2024, 3, end)).unwrap()
}

#[tokio::test]
async fn test_transient_failures_back_off_then_become_a_gap() {
    let http = FakeHttp::new(|_| status(503));
    let delay = RecordingDelay::new();
    let client = energy_client("key", &fetch_config(), http.clone(), delay.clone());

    let outcome = client
        .fetch(City::Seattle, range(1, 3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(http.energy_requests(), 5);
    let secs: Vec<u64> = delay.waits().iter().map(Duration::as_secs).collect();
    assert_eq!(secs, vec![1, 2, 4, 8]);
    let gaps: Vec<_> = outcome.gaps().collect();
    assert_eq!(gaps.len(), 1);
    assert!(matches!(gaps[0].1, SourceError::Unavailable { attempts: 5, .. }));
    assert_eq!(outcome.missing_dates().len(), 3);
}

#[tokio::test]
async fn test_rate_limit_response_is_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let http = FakeHttp::new(move |request| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            status(429)
        } else {
            ok(eia_body(request))
        }
    });
    let delay = RecordingDelay::new();
    let client = energy_client("key", &fetch_config(), http.clone(), delay.clone());

    let outcome = client
        .fetch(City::Houston, range(1, 2), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.observations().count(), 2);
    assert_eq!(delay.waits(), vec![Duration::from_secs(1)]);
}

#[tokio::test]
async fn test_bad_credentials_are_rejected_without_retry() {
    let http = FakeHttp::new(|_| status(401));
    let delay = RecordingDelay::new();
    let client = weather_client("bad", &fetch_config(), http.clone(), delay.clone());

    let err = client
        .fetch(City::Chicago, range(1, 3), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SourceError::Rejected { source_id: SourceId::Weather, status: Some(401), .. }
    ));
    assert_eq!(http.weather_requests(), 1);
    assert!(delay.waits().is_empty());
}

#[tokio::test]
async fn test_empty_credential_is_rejected_before_any_request() {
    let http = FakeHttp::new(healthy);
    let client = energy_client("  ", &fetch_config(), http.clone(), RecordingDelay::new());

    let err = client
        .fetch(City::Phoenix, range(1, 3), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::Rejected { status: None, .. }));
    assert!(http.requests().is_empty());
}

#[tokio::test]
async fn test_long_ranges_are_chunked_and_only_failed_chunk_is_a_gap() {
    let http = FakeHttp::new(|request| {
        let (start, _) = requested_range(request);
        if start == day(2024, 3, 2) {
            Err(TransportError::Timeout)
        } else {
            ok(eia_body(request))
        }
    });
    let config = FetchConfig {
        energy_max_span_days: 1,
        max_attempts: 2,
        ..fetch_config()
    };
    let client = energy_client("key", &config, http.clone(), RecordingDelay::new());

    let outcome = client
        .fetch(City::Seattle, range(1, 3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.chunks.len(), 3);
    assert_eq!(outcome.observations().count(), 2);
    assert_eq!(outcome.missing_dates(), vec![day(2024, 3, 2)]);
    // one request each for days 1 and 3, two attempts for day 2
    assert_eq!(http.energy_requests(), 4);
}

#[tokio::test]
async fn test_pages_are_followed_until_total_is_reached() {
    let http = FakeHttp::new(|request| {
        let offset: u32 = request.query_value("offset").unwrap().parse().unwrap();
        let row = |d: u32| json!({"period": format!("2024-03-0{}", d), "type": "D", "value": 100 + d, "value-units": "megawatthours"});
        if offset == 0 {
            ok(json!({"response": {"total": 3, "data": [row(1), row(2)]}}))
        } else {
            ok(json!({"response": {"total": 3, "data": [row(3)]}}))
        }
    });
    let client = energy_client("key", &fetch_config(), http.clone(), RecordingDelay::new());

    let outcome = client
        .fetch(City::NewYork, range(1, 3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.observations().count(), 3);
    let offsets: Vec<String> = http
        .requests()
        .iter()
        .map(|r| r.query_value("offset").unwrap().to_string())
        .collect();
    assert_eq!(offsets, vec!["0", "2"]);
}

#[tokio::test]
async fn test_malformed_body_is_treated_as_transient() {
    let http = FakeHttp::new(|_| {
        Ok(weather_energy_pipeline::app::ports::HttpResponse {
            status: 200,
            body: b"<html>maintenance</html>".to_vec(),
        })
    });
    let config = FetchConfig {
        max_attempts: 2,
        ..fetch_config()
    };
    let client = weather_client("tok", &config, http.clone(), RecordingDelay::new());

    let outcome = client
        .fetch(City::Seattle, range(1, 2), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(http.weather_requests(), 2);
    assert!(!outcome.is_complete());
}

#[tokio::test]
async fn test_cancellation_interrupts_backoff() {
    let token = CancellationToken::new();
    let http = FakeHttp::new(|_| status(500));
    let delay = Arc::new(CancellingDelay {
        token: token.clone(),
    });
    let client = weather_client("tok", &fetch_config(), http.clone(), delay);

    let err = client.fetch(City::Seattle, range(1, 2), &token).await.unwrap_err();
    assert!(matches!(err, SourceError::Cancelled { source_id: SourceId::Weather }));
    assert_eq!(http.weather_requests(), 1);
}

#[tokio::test]
async fn test_weather_requests_carry_token_header() {
    let http = FakeHttp::new(healthy);
    let client = weather_client("secret", &fetch_config(), http.clone(), RecordingDelay::new());
    client
        .fetch(City::Phoenix, range(1, 1), &CancellationToken::new())
        .await
        .unwrap();

    let request = &http.requests()[0];
    assert_eq!(request.header_value("token"), Some("secret"));
    assert_eq!(request.query_value("stationid"), Some(City::Phoenix.noaa_station_id()));
}
