use crate::error::{AppError, Result};
use crate::types::{BarShape, ValidityGate};

pub const YAHOO_BASE_URL: &str = "https://query2.finance.yahoo.com";
pub const YAHOO_COOKIE_URL: &str = "https://fc.yahoo.com";

/// Yahoo rejects requests without a browser-like user agent.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Lookback before `earliest_date` for compact chart bars (~1 month).
pub const COMPACT_LOOKBACK_SECS: i64 = 2_592_000;

/// Lookback before `earliest_date` for detailed bars (~3 months).
pub const DETAILED_LOOKBACK_SECS: i64 = 7_776_000;

/// Defaults for `/api/market/ticker/{ticker}/history/` query params.
pub const DEFAULT_HISTORY_PERIOD: &str = "1y";
pub const DEFAULT_HISTORY_INTERVAL: &str = "1d";

/// Period used by the price lookup. Only the latest bar is read.
pub const PRICE_LOOKUP_PERIOD: &str = "1d";

/// Bar interval for the windowed history endpoint.
pub const WINDOW_INTERVAL: &str = "1d";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    pub yahoo_base_url: String,
    pub yahoo_cookie_url: String,
    /// reqwest client timeout for upstream calls (UPSTREAM_TIMEOUT_SECS)
    pub upstream_timeout_secs: u64,
    /// Fundamentals validity gate (VALIDITY_GATE: strict | tolerant)
    pub validity_gate: ValidityGate,
    /// Bar shape served by /api/market/history/{ticker}/{earliest_date}
    /// (HISTORY_BAR_SHAPE: compact | detailed)
    pub bar_shape: BarShape,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            yahoo_base_url: std::env::var("YAHOO_BASE_URL")
                .unwrap_or_else(|_| YAHOO_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            yahoo_cookie_url: std::env::var("YAHOO_COOKIE_URL")
                .unwrap_or_else(|_| YAHOO_COOKIE_URL.to_string()),
            upstream_timeout_secs: std::env::var("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .unwrap_or(30),
            validity_gate: std::env::var("VALIDITY_GATE")
                .unwrap_or_else(|_| "tolerant".to_string())
                .parse::<ValidityGate>()
                .map_err(AppError::Config)?,
            bar_shape: std::env::var("HISTORY_BAR_SHAPE")
                .unwrap_or_else(|_| "compact".to_string())
                .parse::<BarShape>()
                .map_err(AppError::Config)?,
        })
    }
}
