/// Endpoint and protocol constants for the two upstream APIs, plus pipeline
/// defaults shared between configuration and the processing stages.

// NOAA Climate Data Online (weather)
pub const NOAA_API_URL: &str = "https://www.ncei.noaa.gov/cdo-web/api/v2/data";
pub const NOAA_DATASET: &str = "GHCND";
pub const NOAA_DATATYPES: [&str; 5] = ["TMAX", "TMIN", "TAVG", "PRCP", "SNOW"];
pub const NOAA_PAGE_LIMIT: u32 = 1000;
pub const NOAA_MAX_SPAN_DAYS: u32 = 365;
pub const NOAA_MIN_INTERVAL_MS: u64 = 200;

// EIA Open Data v2 (electricity demand)
pub const EIA_API_URL: &str = "https://api.eia.gov/v2/electricity/rto/daily-region-data/data/";
pub const EIA_DEMAND_TYPE: &str = "D";
pub const EIA_PAGE_LENGTH: u32 = 5000;
pub const EIA_MAX_SPAN_DAYS: u32 = 180;

// Credential overrides read from the environment (.env supported)
pub const WEATHER_KEY_ENV: &str = "NOAA_API_TOKEN";
pub const ENERGY_KEY_ENV: &str = "EIA_API_KEY";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "data/processed";
pub const DEFAULT_WINDOW_DAYS: i64 = 90;

// Retry defaults
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Quality and analysis defaults
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 3.5;
pub const DEFAULT_FRESHNESS_THRESHOLD_DAYS: i64 = 5;
pub const DEFAULT_MIN_POINTS_FOR_ANALYSIS: usize = 14;
pub const DEFAULT_MAX_MISSING_RATIO: f64 = 0.10;
pub const DEFAULT_MAX_OUTLIER_RATIO: f64 = 0.05;

/// Smallest series the MAD outlier check will score.
pub const MIN_SERIES_FOR_OUTLIERS: usize = 3;
/// Smallest number of same-date pairs a correlation is computed from.
pub const MIN_PAIRS_FOR_CORRELATION: usize = 3;
/// Upper bound on pages requested for one chunk.
pub const MAX_PAGES_PER_CHUNK: u32 = 1000;
