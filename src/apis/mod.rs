//! Source clients.
//!
//! Each upstream is described by a [`SourceApi`] (request shaping, auth,
//! pagination and body parsing) and driven by the shared
//! [`HttpSourceClient`], which owns chunking, rate limiting, retries,
//! timeouts and cancellation.

pub mod eia;
pub mod noaa;
pub mod rate_limiter;
pub mod retry;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::{DelayPort, HttpClientPort, HttpRequest};
use crate::common::constants::MAX_PAGES_PER_CHUNK;
use crate::common::error::SourceError;
use crate::common::types::{City, DateRange, RawObservation, SourceId};
use crate::config::FetchConfig;
use crate::observability::metrics;
use rate_limiter::RateLimiter;
use retry::{RetryPolicy, RetryStep};

pub use eia::EiaApi;
pub use noaa::NoaaApi;

/// One decoded page plus the offset of the next page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub observations: Vec<RawObservation>,
    pub next_offset: Option<u32>,
}

/// Wire-level description of one upstream API.
pub trait SourceApi: Send + Sync {
    fn source_id(&self) -> SourceId;

    /// Longest date span a single request may cover.
    fn max_span_days(&self) -> u32;

    fn first_offset(&self) -> u32;

    fn credential(&self) -> &str;

    /// Unauthenticated request for one page of one chunk.
    fn build_request(&self, city: City, chunk: &DateRange, offset: u32) -> HttpRequest;

    fn authenticate(&self, request: HttpRequest) -> HttpRequest;

    /// Decode a 2xx body. An `Err` means the body was malformed.
    fn parse_page(
        &self,
        city: City,
        chunk: &DateRange,
        offset: u32,
        body: &[u8],
    ) -> std::result::Result<Page, String>;
}

/// Result of one chunk of a fetch.
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    Fetched {
        range: DateRange,
        observations: Vec<RawObservation>,
    },
    /// The chunk exhausted its retries; the error is always `Unavailable`
    Gap { range: DateRange, error: SourceError },
}

/// Everything one source returned for one city over the requested range.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub source: SourceId,
    pub city: City,
    pub range: DateRange,
    pub chunks: Vec<ChunkOutcome>,
}

impl FetchOutcome {
    pub fn observations(&self) -> impl Iterator<Item = &RawObservation> {
        self.chunks.iter().flat_map(|chunk| match chunk {
            ChunkOutcome::Fetched { observations, .. } => observations.as_slice(),
            ChunkOutcome::Gap { .. } => &[][..],
        })
    }

    pub fn into_observations(self) -> Vec<RawObservation> {
        self.chunks
            .into_iter()
            .flat_map(|chunk| match chunk {
                ChunkOutcome::Fetched { observations, .. } => observations,
                ChunkOutcome::Gap { .. } => Vec::new(),
            })
            .collect()
    }

    pub fn gaps(&self) -> impl Iterator<Item = (&DateRange, &SourceError)> {
        self.chunks.iter().filter_map(|chunk| match chunk {
            ChunkOutcome::Gap { range, error } => Some((range, error)),
            ChunkOutcome::Fetched { .. } => None,
        })
    }

    /// Dates covered by gap chunks.
    pub fn missing_dates(&self) -> Vec<NaiveDate> {
        self.gaps().flat_map(|(range, _)| range.days()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.gaps().next().is_none()
    }
}

/// A data source as the orchestrator sees it.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn source_id(&self) -> SourceId;

    /// Fetch `range` for `city`. Transient failures that survive retries
    /// become gap chunks; `Rejected` and `Cancelled` abort the whole fetch.
    async fn fetch(
        &self,
        city: City,
        range: DateRange,
        cancel: &CancellationToken,
    ) -> std::result::Result<FetchOutcome, SourceError>;
}

enum StatusClass {
    Success,
    Transient,
    Permanent,
}

fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        408 | 429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Permanent,
    }
}

fn body_snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(body).chars().take(200).collect()
}

pub struct HttpSourceClient<A> {
    api: A,
    http: Arc<dyn HttpClientPort>,
    delay: Arc<dyn DelayPort>,
    retry: RetryPolicy,
    request_timeout: Duration,
    rate_limiter: RateLimiter,
}

impl<A: SourceApi> HttpSourceClient<A> {
    pub fn new(
        api: A,
        http: Arc<dyn HttpClientPort>,
        delay: Arc<dyn DelayPort>,
        retry: RetryPolicy,
        request_timeout: Duration,
        min_interval: Duration,
    ) -> Self {
        Self {
            api,
            http,
            delay,
            retry,
            request_timeout,
            rate_limiter: RateLimiter::new(min_interval),
        }
    }

    fn cancelled(&self) -> SourceError {
        SourceError::Cancelled {
            source_id: self.api.source_id(),
        }
    }

    async fn fetch_chunk(
        &self,
        city: City,
        chunk: &DateRange,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<RawObservation>, SourceError> {
        let mut offset = self.api.first_offset();
        let mut observations = Vec::new();
        for page_no in 1..=MAX_PAGES_PER_CHUNK {
            let request = self
                .api
                .authenticate(self.api.build_request(city, chunk, offset));
            let page = self.fetch_page(city, chunk, offset, &request, cancel).await?;
            debug!(
                source = %self.api.source_id(),
                city = %city,
                chunk = %chunk,
                page = page_no,
                records = page.observations.len(),
                "Fetched page"
            );
            observations.extend(page.observations);
            match page.next_offset {
                Some(next) if next > offset => offset = next,
                _ => break,
            }
        }
        Ok(observations)
    }

    async fn fetch_page(
        &self,
        city: City,
        chunk: &DateRange,
        offset: u32,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<Page, SourceError> {
        let source_id = self.api.source_id();
        let mut retry = self.retry.start();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(self.cancelled()),
                _ = self.rate_limiter.acquire(self.delay.as_ref()) => {}
            }

            let started = Instant::now();
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Err(self.cancelled()),
                res = tokio::time::timeout(self.request_timeout, self.http.send(request)) => res,
            };
            let elapsed = started.elapsed().as_secs_f64();

            let failure = match attempt {
                Err(_) => "request timed out".to_string(),
                Ok(Err(transport)) => transport.to_string(),
                Ok(Ok(response)) => match classify_status(response.status) {
                    StatusClass::Success => {
                        match self.api.parse_page(city, chunk, offset, &response.body) {
                            Ok(page) => {
                                metrics::sources::request(source_id.as_str(), "ok", elapsed);
                                metrics::sources::records_fetched(
                                    source_id.as_str(),
                                    page.observations.len(),
                                );
                                return Ok(page);
                            }
                            Err(reason) => format!("malformed response body: {}", reason),
                        }
                    }
                    StatusClass::Transient => format!(
                        "HTTP {}: {}",
                        response.status,
                        body_snippet(&response.body)
                    ),
                    StatusClass::Permanent => {
                        metrics::sources::request(source_id.as_str(), "rejected", elapsed);
                        return Err(SourceError::Rejected {
                            source_id,
                            status: Some(response.status),
                            reason: format!(
                                "HTTP {}: {}",
                                response.status,
                                body_snippet(&response.body)
                            ),
                        });
                    }
                },
            };
            metrics::sources::request(source_id.as_str(), "transient", elapsed);

            match retry.on_transient_failure() {
                RetryStep::Retry { attempt, delay } => {
                    warn!(
                        source = %source_id,
                        city = %city,
                        chunk = %chunk,
                        next_attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {}",
                        failure
                    );
                    metrics::sources::retry(source_id.as_str());
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(self.cancelled()),
                        _ = self.delay.sleep(delay) => {}
                    }
                }
                RetryStep::Exhausted { attempts } => {
                    return Err(SourceError::Unavailable {
                        source_id,
                        city,
                        range: *chunk,
                        attempts,
                        reason: failure,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl<A: SourceApi> SourceClient for HttpSourceClient<A> {
    fn source_id(&self) -> SourceId {
        self.api.source_id()
    }

    #[instrument(skip(self, cancel), fields(source = %self.api.source_id()))]
    async fn fetch(
        &self,
        city: City,
        range: DateRange,
        cancel: &CancellationToken,
    ) -> std::result::Result<FetchOutcome, SourceError> {
        let source_id = self.api.source_id();
        if self.api.credential().trim().is_empty() {
            return Err(SourceError::Rejected {
                source_id,
                status: None,
                reason: "API credential is not configured".to_string(),
            });
        }

        let mut outcome = FetchOutcome {
            source: source_id,
            city,
            range,
            chunks: Vec::new(),
        };
        for chunk in range.chunks(self.api.max_span_days()) {
            match self.fetch_chunk(city, &chunk, cancel).await {
                Ok(observations) => outcome.chunks.push(ChunkOutcome::Fetched {
                    range: chunk,
                    observations,
                }),
                Err(error @ SourceError::Unavailable { .. }) => {
                    warn!(city = %city, chunk = %chunk, "Recording gap: {}", error);
                    metrics::sources::gap(source_id.as_str());
                    outcome.chunks.push(ChunkOutcome::Gap {
                        range: chunk,
                        error,
                    });
                }
                Err(fatal) => return Err(fatal),
            }
        }

        info!(
            city = %city,
            records = outcome.observations().count(),
            gaps = outcome.gaps().count(),
            "Fetch finished"
        );
        Ok(outcome)
    }
}

/// Production client for NOAA daily weather.
pub fn weather_client(
    key: &str,
    fetch: &FetchConfig,
    http: Arc<dyn HttpClientPort>,
    delay: Arc<dyn DelayPort>,
) -> HttpSourceClient<NoaaApi> {
    HttpSourceClient::new(
        NoaaApi::new(key, fetch.weather_max_span_days),
        http,
        delay,
        fetch.retry_policy(),
        fetch.request_timeout(),
        Duration::from_millis(fetch.weather_min_interval_ms),
    )
}

/// Production client for EIA daily demand.
pub fn energy_client(
    key: &str,
    fetch: &FetchConfig,
    http: Arc<dyn HttpClientPort>,
    delay: Arc<dyn DelayPort>,
) -> HttpSourceClient<EiaApi> {
    HttpSourceClient::new(
        EiaApi::new(key, fetch.energy_max_span_days),
        http,
        delay,
        fetch.retry_policy(),
        fetch.request_timeout(),
        Duration::from_millis(fetch.energy_min_interval_ms),
    )
}
