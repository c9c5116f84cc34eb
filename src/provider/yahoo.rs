//! Yahoo Finance client.
//!
//! Snapshot fields come from the v10 quoteSummary endpoint (crumb-authenticated)
//! and are flattened into one record. Bars come from the v8 chart endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, UpstreamCall};
use crate::config::{Config, USER_AGENT};
use crate::error::{AppError, Result};
use crate::provider::MarketDataProvider;
use crate::types::{HistoryRange, HistoryRow, HistorySeries, RawInfoRecord};

/// quoteSummary modules, in precedence order when keys collide.
const INFO_MODULES: &[&str] = &[
    "price",
    "quoteType",
    "summaryProfile",
    "summaryDetail",
    "financialData",
    "defaultKeyStatistics",
];

const SECS_PER_DAY: i64 = 86_400;

pub struct YahooClient {
    client: reqwest::Client,
    base_url: String,
    cookie_url: String,
    crumb: RwLock<Option<String>>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl YahooClient {
    pub fn new(cfg: &Config, health: Arc<HealthState>, latency: Arc<LatencyStats>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.upstream_timeout_secs))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: cfg.yahoo_base_url.clone(),
            cookie_url: cfg.yahoo_cookie_url.clone(),
            crumb: RwLock::new(None),
            health,
            latency,
        })
    }

    /// Send one upstream request, recording latency and failure counts.
    async fn send(
        &self,
        call: UpstreamCall,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let started = Instant::now();
        let result = req.send().await;
        self.latency.record(call, started.elapsed());
        self.health.inc_upstream_requests();

        match result {
            Ok(resp) => {
                let status = resp.status();
                if !status.is_success() && status != StatusCode::NOT_FOUND {
                    self.health.record_upstream_failure();
                }
                Ok(resp)
            }
            Err(e) => {
                self.health.record_upstream_failure();
                Err(e.into())
            }
        }
    }

    /// Cached crumb, fetched on first use or after invalidation.
    async fn crumb(&self) -> Result<String> {
        if let Some(crumb) = self.crumb.read().await.clone() {
            return Ok(crumb);
        }

        let mut slot = self.crumb.write().await;
        if let Some(crumb) = slot.clone() {
            return Ok(crumb);
        }

        // Only the session cookie matters; the status of this page does not.
        if let Err(e) = self.send(UpstreamCall::Crumb, self.client.get(&self.cookie_url)).await {
            warn!("[YAHOO] cookie bootstrap failed: {e}");
        }

        let url = format!("{}/v1/test/getcrumb", self.base_url);
        let resp = self
            .send(
                UpstreamCall::Crumb,
                self.client.get(&url).header("referer", "https://finance.yahoo.com/"),
            )
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        let crumb = body.trim();

        if !status.is_success() || !is_plausible_crumb(crumb) {
            return Err(AppError::Upstream(format!(
                "failed to obtain yahoo crumb (status {status})"
            )));
        }

        debug!("[YAHOO] obtained crumb");
        *slot = Some(crumb.to_string());
        Ok(crumb.to_string())
    }

    async fn invalidate_crumb(&self) {
        *self.crumb.write().await = None;
    }
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    async fn fetch_info(&self, ticker: &str) -> Result<RawInfoRecord> {
        let crumb = self.crumb().await?;
        let url = format!(
            "{}/v10/finance/quoteSummary/{}",
            self.base_url,
            urlencoding::encode(ticker)
        );
        let modules = INFO_MODULES.join(",");
        let req = self
            .client
            .get(&url)
            .query(&[("modules", modules.as_str()), ("crumb", crumb.as_str())]);

        let resp = self.send(UpstreamCall::QuoteSummary, req).await?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND {
            info!(ticker = %ticker, "[YAHOO] quoteSummary: unknown symbol");
            return Ok(RawInfoRecord::new());
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.invalidate_crumb().await;
            return Err(AppError::Upstream(format!(
                "yahoo rejected credentials (status {status})"
            )));
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "yahoo quoteSummary returned status {status}"
            )));
        }

        let body: Value = resp.json().await?;
        let info = flatten_quote_summary(&body)?;
        debug!(ticker = %ticker, fields = info.len(), "[YAHOO] quoteSummary fetched");
        Ok(info)
    }

    async fn fetch_history(&self, ticker: &str, range: &HistoryRange) -> Result<HistorySeries> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            urlencoding::encode(ticker)
        );
        let req = match range {
            HistoryRange::Period { period, interval } => self
                .client
                .get(&url)
                .query(&[("range", period.as_str()), ("interval", interval.as_str())]),
            HistoryRange::Window { start, end, interval } => self.client.get(&url).query(&[
                ("period1", start.to_string()),
                ("period2", end.to_string()),
                ("interval", interval.clone()),
            ]),
        }
        .query(&[("events", "div,splits"), ("includePrePost", "false")]);

        let resp = self.send(UpstreamCall::Chart, req).await?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND {
            info!(ticker = %ticker, "[YAHOO] chart: unknown symbol");
            return Ok(HistorySeries::default());
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "yahoo chart returned status {status}"
            )));
        }

        let body = resp.text().await?;
        let series = parse_chart(&body, range)?;
        debug!(ticker = %ticker, rows = series.len(), "[YAHOO] chart fetched");
        Ok(series)
    }
}

fn is_plausible_crumb(s: &str) -> bool {
    !s.is_empty() && s.len() < 100 && !s.contains(char::is_whitespace) && !s.contains('<')
}

// ---------------------------------------------------------------------------
// quoteSummary
// ---------------------------------------------------------------------------

/// Merge the quoteSummary modules into one flat record.
///
/// `{"raw": x, "fmt": ..}` wrappers collapse to `x`; empty wrappers, nested
/// lists and `maxAge` are skipped. The first non-null value for a key wins.
pub fn flatten_quote_summary(body: &Value) -> Result<RawInfoRecord> {
    let summary = body
        .get("quoteSummary")
        .ok_or_else(|| AppError::Upstream("quoteSummary missing from response".to_string()))?;

    if let Some(err) = summary.get("error").filter(|e| !e.is_null()) {
        let code = err.get("code").and_then(|c| c.as_str()).unwrap_or("");
        if code == "Not Found" {
            return Ok(RawInfoRecord::new());
        }
        let description = err
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or(code);
        return Err(AppError::Upstream(format!(
            "yahoo quoteSummary error: {description}"
        )));
    }

    let mut info = RawInfoRecord::new();
    let Some(result) = summary
        .get("result")
        .and_then(|r| r.as_array())
        .and_then(|a| a.first())
    else {
        return Ok(info);
    };

    for module in INFO_MODULES {
        let Some(Value::Object(fields)) = result.get(*module) else {
            continue;
        };
        for (key, value) in fields {
            if key == "maxAge" || info.get(key).is_some() {
                continue;
            }
            if let Some(flat) = flatten_value(value) {
                info.insert(key.clone(), flat);
            }
        }
    }

    Ok(info)
}

fn flatten_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null | Value::Array(_) => None,
        Value::Object(obj) => obj.get("raw").filter(|r| !r.is_null()).cloned(),
        scalar => Some(scalar.clone()),
    }
}

// ---------------------------------------------------------------------------
// chart
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    events: Option<ChartEvents>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
    #[serde(default)]
    splits: HashMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

/// Bars finer than a day.
pub fn is_intraday(interval: &str) -> bool {
    matches!(
        interval,
        "1m" | "2m" | "5m" | "15m" | "30m" | "60m" | "90m" | "1h"
    )
}

/// Floor `ts` to midnight in the exchange's local time.
fn local_midnight(ts: i64, utc_offset_secs: i32) -> i64 {
    let offset = i64::from(utc_offset_secs);
    ts - (ts + offset).rem_euclid(SECS_PER_DAY)
}

/// Parse a v8 chart body into an ascending series.
///
/// Rows with no price at all (holidays) are dropped and daily-or-longer bars
/// are keyed on local midnight. Window requests keep `start <= t < end`.
/// Prices are back-adjusted for dividends and splits: where a row has a
/// non-zero close and adjusted close, open/high/low scale by `adj / close`
/// and the close becomes the adjusted close.
pub fn parse_chart(body: &str, range: &HistoryRange) -> Result<HistorySeries> {
    let resp: ChartResponse = serde_json::from_str(body)?;

    if let Some(err) = resp.chart.error {
        if err.code == "Not Found" {
            return Ok(HistorySeries::default());
        }
        return Err(AppError::Upstream(format!(
            "yahoo chart error: {}: {}",
            err.code, err.description
        )));
    }

    let intraday = is_intraday(range.interval());
    let Some(data) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(HistorySeries {
            intraday,
            ..HistorySeries::default()
        });
    };

    let offset = data.meta.gmtoffset;
    let key = |ts: i64| if intraday { ts } else { local_midnight(ts, offset) };

    let events = data.events.unwrap_or_default();
    let dividends: HashMap<i64, f64> = events
        .dividends
        .values()
        .map(|d| (key(d.date), d.amount))
        .collect();
    let splits: HashMap<i64, f64> = events
        .splits
        .values()
        .filter(|s| s.denominator != 0.0)
        .map(|s| (key(s.date), s.numerator / s.denominator))
        .collect();

    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_close = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let bounds = match range {
        HistoryRange::Window { start, end, .. } => Some((*start, *end)),
        HistoryRange::Period { .. } => None,
    };

    let timestamps = data.timestamp.unwrap_or_default();
    let mut rows: Vec<HistoryRow> = Vec::with_capacity(timestamps.len());

    for (i, &raw_ts) in timestamps.iter().enumerate() {
        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        if open.is_none() && high.is_none() && low.is_none() && close.is_none() {
            continue;
        }

        let (open, high, low, close) = match (close, adj_close.get(i).copied().flatten()) {
            (Some(c), Some(adj)) if c != 0.0 && adj != 0.0 => {
                let factor = adj / c;
                let scale = |v: Option<f64>| v.map(|v| v * factor);
                (scale(open), scale(high), scale(low), Some(adj))
            }
            _ => (open, high, low, close),
        };

        let ts = key(raw_ts);
        if let Some((start, end)) = bounds {
            if raw_ts < start || ts >= end {
                continue;
            }
        }

        let row = HistoryRow {
            timestamp: ts,
            open,
            high,
            low,
            close,
            volume: quote
                .volume
                .get(i)
                .copied()
                .flatten()
                .filter(|v| *v >= 0.0)
                .map(|v| v as u64),
            dividends: dividends.get(&ts).copied().unwrap_or(0.0),
            stock_splits: splits.get(&ts).copied().unwrap_or(0.0),
        };

        // Yahoo repeats the live session as a trailing duplicate of the last bar.
        if rows.last().is_some_and(|last| last.timestamp == ts) {
            rows.pop();
        }
        rows.push(row);
    }

    Ok(HistorySeries {
        rows,
        utc_offset_secs: offset,
        intraday,
    })
}
