use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary, UpstreamCall};
use crate::assembler::build_report;
use crate::config::{
    DEFAULT_HISTORY_INTERVAL, DEFAULT_HISTORY_PERIOD, PRICE_LOOKUP_PERIOD, WINDOW_INTERVAL,
};
use crate::error::AppError;
use crate::history::{latest_close, lookback_window, to_chart_bars, to_detailed_bars, to_raw_bars};
use crate::provider::MarketDataProvider;
use crate::types::{
    BarShape, FundamentalsReport, HistoryRange, HistoryResponse, InfoResponse, ValidityGate,
};

#[derive(Clone)]
pub struct ApiState {
    pub provider: Arc<dyn MarketDataProvider>,
    pub gate: ValidityGate,
    pub bar_shape: BarShape,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/market/ticker/:ticker/", get(get_ticker_info))
        .route("/api/market/ticker/:ticker/fundamentals", get(get_fundamentals))
        .route("/api/market/ticker/:ticker/history/", get(get_history))
        .route("/api/market/ticker_price/:ticker/", get(get_ticker_price))
        .route("/api/market/history/:ticker/:earliest_date", get(get_history_window))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

/// Symbols are trimmed and upper-cased; nothing else is validated.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub period: Option<String>,
    pub interval: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub upstream_requests: u64,
    pub upstream_failures: u64,
    pub last_failure_at: Option<u64>,
}

/// One entry per Yahoo endpoint.
#[derive(Serialize)]
pub struct LatencyResponse {
    pub crumb: LatencySummary,
    pub quote_summary: LatencySummary,
    pub chart: LatencySummary,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_fundamentals(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
) -> Result<Json<FundamentalsReport>, AppError> {
    let ticker = normalize_ticker(&ticker);
    info!(ticker = %ticker, gate = %state.gate, "Looking up fundamental data");

    let raw = state.provider.fetch_info(&ticker).await?;
    let report = build_report(&ticker, &raw, state.gate)?;
    Ok(Json(report))
}

async fn get_ticker_price(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
) -> Result<Json<f64>, AppError> {
    let ticker = normalize_ticker(&ticker);
    info!(ticker = %ticker, "Looking up price");

    let range = HistoryRange::period(PRICE_LOOKUP_PERIOD, DEFAULT_HISTORY_INTERVAL);
    let series = state.provider.fetch_history(&ticker, &range).await?;
    latest_close(&series).map(Json).ok_or_else(|| {
        AppError::NotFound(format!("Ticker '{ticker}' not found or no data available."))
    })
}

async fn get_history(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let ticker = normalize_ticker(&ticker);
    let period = params
        .period
        .unwrap_or_else(|| DEFAULT_HISTORY_PERIOD.to_string());
    let interval = params
        .interval
        .unwrap_or_else(|| DEFAULT_HISTORY_INTERVAL.to_string());
    info!(ticker = %ticker, period = %period, interval = %interval, "Looking up historical data");

    let series = state
        .provider
        .fetch_history(&ticker, &HistoryRange::period(period, interval))
        .await?;
    if series.is_empty() {
        return Err(AppError::NotFound(format!(
            "No history data found for {ticker}."
        )));
    }

    Ok(Json(HistoryResponse {
        history: to_raw_bars(&series),
        ticker,
    }))
}

async fn get_history_window(
    State(state): State<ApiState>,
    Path((ticker, earliest_date)): Path<(String, i64)>,
) -> Result<Response, AppError> {
    let ticker = normalize_ticker(&ticker);
    let Some((start, end)) = lookback_window(earliest_date, state.bar_shape) else {
        return Err(AppError::NotFound(format!(
            "data for {ticker} is not found, is empty, or no data available."
        )));
    };
    info!(
        ticker = %ticker,
        start,
        end,
        shape = %state.bar_shape,
        "Looking up history window"
    );

    let range = HistoryRange::window(start, end, WINDOW_INTERVAL);
    let series = state.provider.fetch_history(&ticker, &range).await?;
    if series.is_empty() {
        return Err(AppError::NotFound(format!(
            "data for {ticker} is not found, is empty, or no data available."
        )));
    }

    let body = match state.bar_shape {
        BarShape::Compact => Json(to_chart_bars(&series)).into_response(),
        BarShape::Detailed => Json(to_detailed_bars(&series)).into_response(),
    };
    Ok(body)
}

/// Unshaped snapshot: no schema, no validity gate.
async fn get_ticker_info(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
) -> Result<Json<InfoResponse>, AppError> {
    let ticker = normalize_ticker(&ticker);
    info!(ticker = %ticker, "Looking up raw info");

    let raw = state.provider.fetch_info(&ticker).await?;
    Ok(Json(InfoResponse { info: raw }))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        upstream_requests: state.health.upstream_requests(),
        upstream_failures: state.health.upstream_failures(),
        last_failure_at: state.health.last_failure_at(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    Json(LatencyResponse {
        crumb: state.latency.summary(UpstreamCall::Crumb),
        quote_summary: state.latency.summary(UpstreamCall::QuoteSummary),
        chart: state.latency.summary(UpstreamCall::Chart),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeProvider;
    use crate::types::{HistoryRow, HistorySeries, RawInfoRecord};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt; // oneshot

    const EARLIEST: i64 = 1_760_000_000;

    fn state_with(provider: Arc<FakeProvider>, gate: ValidityGate, bar_shape: BarShape) -> ApiState {
        ApiState {
            provider,
            gate,
            bar_shape,
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new(30)),
        }
    }

    async fn call(state: ApiState, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = router(state).oneshot(req).await.expect("oneshot failed");
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .expect("body collect failed")
            .to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn info(v: Value) -> RawInfoRecord {
        match v {
            Value::Object(map) => RawInfoRecord::from(map),
            _ => panic!("fixture must be an object"),
        }
    }

    fn equity_info() -> RawInfoRecord {
        info(json!({
            "quoteType": "EQUITY",
            "longName": "Apple Inc.",
            "marketCap": 3800000000000i64,
            "fiftyTwoWeekHigh": 260.1,
            "totalDebt": 1000,
            "totalCash": 200,
            "ebitda": 400,
        }))
    }

    fn bar(ts: i64, close: f64, volume: u64) -> HistoryRow {
        HistoryRow {
            open: Some(close - 1.0),
            high: Some(close + 1.0),
            low: Some(close - 2.0),
            close: Some(close),
            volume: Some(volume),
            ..HistoryRow::new(ts)
        }
    }

    fn daily_series() -> HistorySeries {
        HistorySeries {
            rows: vec![
                bar(1759723200, 185.54, 41_000_000),
                bar(1759809600, 184.9, 0),
                bar(1759896000, 187.7749, 45_250_000),
            ],
            utc_offset_secs: -14_400,
            intraday: false,
        }
    }

    // -----------------------------------------------------------------------
    // fundamentals
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn fundamentals_returns_labelled_report_for_normalized_ticker() {
        let fake = Arc::new(FakeProvider::new().with_info("AAPL", equity_info()));
        let state = state_with(fake.clone(), ValidityGate::Tolerant, BarShape::Compact);

        let (status, body) = call(state, "/api/market/ticker/%20aapl%20/fundamentals").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["companyName"], "Apple Inc.");
        assert_eq!(body["marketData"]["52 Week High"], 260.1);
        assert_eq!(body["capitalStructure"]["LTM Net Debt"], 800);
        assert_eq!(body["capitalStructure"]["LTM Net Debt/EBITDA"], 2.0);
        assert!(body["marketData"]["Beta"].is_null());
        assert_eq!(fake.info_calls.lock().unwrap().as_slice(), ["AAPL"]);
    }

    #[tokio::test]
    async fn fundamentals_unknown_ticker_is_404() {
        let state = state_with(Arc::new(FakeProvider::new()), ValidityGate::Tolerant, BarShape::Compact);
        let (status, body) = call(state, "/api/market/ticker/zzzz/fundamentals").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Ticker 'ZZZZ' not found or no data available.");
    }

    #[tokio::test]
    async fn fundamentals_index_depends_on_gate() {
        let index = info(json!({ "quoteType": "INDEX", "longName": "S&P 500", "regularMarketPrice": 6700.1 }));
        let fake = Arc::new(FakeProvider::new().with_info("^GSPC", index));

        let (status, body) = call(
            state_with(fake.clone(), ValidityGate::Tolerant, BarShape::Compact),
            "/api/market/ticker/%5EGSPC/fundamentals",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["companyName"], "S&P 500");
        assert!(body["capitalStructure"]["Market Cap"].is_null());

        let (status, _) = call(
            state_with(fake, ValidityGate::Strict, BarShape::Compact),
            "/api/market/ticker/%5EGSPC/fundamentals",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upstream_failure_is_500_with_message() {
        let state = state_with(Arc::new(FakeProvider::failing()), ValidityGate::Tolerant, BarShape::Compact);
        let (status, body) = call(state, "/api/market/ticker/AAPL/fundamentals").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("An unexpected error occurred:"), "detail={detail}");
        assert!(detail.contains("connection refused"), "detail={detail}");
    }

    // -----------------------------------------------------------------------
    // price
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn price_is_latest_close_rounded() {
        let fake = Arc::new(FakeProvider::new().with_series("AAPL", daily_series()));
        let state = state_with(fake.clone(), ValidityGate::Tolerant, BarShape::Compact);

        let (status, body) = call(state, "/api/market/ticker_price/aapl/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(187.77));

        let calls = fake.history_calls.lock().unwrap();
        assert_eq!(calls[0], ("AAPL".to_string(), HistoryRange::period("1d", "1d")));
    }

    #[tokio::test]
    async fn price_without_bars_is_404() {
        let state = state_with(Arc::new(FakeProvider::new()), ValidityGate::Tolerant, BarShape::Compact);
        let (status, body) = call(state, "/api/market/ticker_price/ZZZZ/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Ticker 'ZZZZ' not found or no data available.");
    }

    // -----------------------------------------------------------------------
    // standard history
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn history_defaults_to_one_year_daily() {
        let fake = Arc::new(FakeProvider::new().with_series("MSFT", daily_series()));
        let state = state_with(fake.clone(), ValidityGate::Tolerant, BarShape::Compact);

        let (status, body) = call(state, "/api/market/ticker/msft/history/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ticker"], "MSFT");
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0]["Date"], "2025-10-06T00:00:00-04:00");
        assert_eq!(history[0]["Close"], 185.54);
        assert_eq!(history[1]["Volume"], 0);
        assert_eq!(history[2]["Stock Splits"], 0.0);

        let calls = fake.history_calls.lock().unwrap();
        assert_eq!(calls[0].1, HistoryRange::period("1y", "1d"));
    }

    #[tokio::test]
    async fn history_passes_params_verbatim() {
        let fake = Arc::new(FakeProvider::new().with_series("MSFT", daily_series()));
        let state = state_with(fake.clone(), ValidityGate::Tolerant, BarShape::Compact);

        let (status, _) = call(state, "/api/market/ticker/MSFT/history/?period=5d&interval=15m").await;
        assert_eq!(status, StatusCode::OK);
        let calls = fake.history_calls.lock().unwrap();
        assert_eq!(calls[0].1, HistoryRange::period("5d", "15m"));
    }

    #[tokio::test]
    async fn history_empty_is_404() {
        let state = state_with(Arc::new(FakeProvider::new()), ValidityGate::Tolerant, BarShape::Compact);
        let (status, body) = call(state, "/api/market/ticker/ZZZZ/history/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "No history data found for ZZZZ.");
    }

    // -----------------------------------------------------------------------
    // windowed history
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn compact_window_returns_chart_bars() {
        let fake = Arc::new(FakeProvider::new().with_series("AAPL", daily_series()));
        let state = state_with(fake.clone(), ValidityGate::Tolerant, BarShape::Compact);

        let (status, body) = call(state, &format!("/api/market/history/AAPL/{EARLIEST}")).await;
        assert_eq!(status, StatusCode::OK);
        let bars = body.as_array().unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0]["time"], 1759723200);
        assert_eq!(bars[0]["close"], 185.54);
        assert!(bars[0].get("volume").is_none());
        assert!(bars[0].get("Date").is_none());

        let calls = fake.history_calls.lock().unwrap();
        assert_eq!(
            calls[0].1,
            HistoryRange::window(EARLIEST - 2_592_000, EARLIEST, "1d")
        );
    }

    #[tokio::test]
    async fn detailed_window_returns_full_bars_with_zero_volume_nulled() {
        let fake = Arc::new(FakeProvider::new().with_series("AAPL", daily_series()));
        let state = state_with(fake.clone(), ValidityGate::Tolerant, BarShape::Detailed);

        let (status, body) = call(state, &format!("/api/market/history/aapl/{EARLIEST}")).await;
        assert_eq!(status, StatusCode::OK);
        let bars = body.as_array().unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0]["Date"], "2025-10-06T00:00:00-04:00");
        assert_eq!(bars[0]["Volume"], 41_000_000);
        assert!(bars[1]["Volume"].is_null());

        let calls = fake.history_calls.lock().unwrap();
        assert_eq!(
            calls[0],
            (
                "AAPL".to_string(),
                HistoryRange::window(EARLIEST - 7_776_000, EARLIEST, "1d")
            )
        );
    }

    #[tokio::test]
    async fn empty_window_is_404_for_both_shapes() {
        for shape in [BarShape::Compact, BarShape::Detailed] {
            let state = state_with(Arc::new(FakeProvider::new()), ValidityGate::Tolerant, shape);
            let (status, body) = call(state, &format!("/api/market/history/ZZZZ/{EARLIEST}")).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "shape={shape}");
            assert_eq!(
                body["detail"],
                "data for ZZZZ is not found, is empty, or no data available."
            );
        }
    }

    #[tokio::test]
    async fn pre_epoch_earliest_date_is_404_without_upstream_call() {
        for date in ["0", "-86400"] {
            let fake = Arc::new(FakeProvider::failing());
            let state = state_with(fake.clone(), ValidityGate::Tolerant, BarShape::Compact);
            let (status, body) = call(state, &format!("/api/market/history/aapl/{date}")).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "date={date}");
            assert_eq!(
                body["detail"],
                "data for AAPL is not found, is empty, or no data available."
            );
            assert!(fake.history_calls.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn non_numeric_earliest_date_is_rejected() {
        let fake = Arc::new(FakeProvider::new());
        let state = state_with(fake.clone(), ValidityGate::Tolerant, BarShape::Compact);
        let (status, _) = call(state, "/api/market/history/AAPL/yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(fake.history_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn window_upstream_failure_is_500() {
        let state = state_with(Arc::new(FakeProvider::failing()), ValidityGate::Tolerant, BarShape::Detailed);
        let (status, _) = call(state, &format!("/api/market/history/AAPL/{EARLIEST}")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    // -----------------------------------------------------------------------
    // pass-through and ops
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn raw_info_is_passed_through_unshaped() {
        let fake = Arc::new(FakeProvider::new().with_info("AAPL", equity_info()));
        let state = state_with(fake, ValidityGate::Strict, BarShape::Compact);

        let (status, body) = call(state, "/api/market/ticker/AAPL/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["info"]["longName"], "Apple Inc.");
        assert_eq!(body["info"]["totalDebt"], 1000);
    }

    #[tokio::test]
    async fn raw_info_for_unknown_ticker_is_empty_object() {
        let state = state_with(Arc::new(FakeProvider::new()), ValidityGate::Strict, BarShape::Compact);
        let (status, body) = call(state, "/api/market/ticker/ZZZZ/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "info": {} }));
    }

    #[tokio::test]
    async fn health_reports_upstream_counters() {
        let state = state_with(Arc::new(FakeProvider::new()), ValidityGate::Tolerant, BarShape::Compact);
        state.health.inc_upstream_requests();
        state.health.record_upstream_failure();

        let (status, body) = call(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["upstream_requests"], 1);
        assert_eq!(body["upstream_failures"], 1);
        assert!(body["last_failure_at"].is_u64());
    }

    #[tokio::test]
    async fn latency_stats_report_each_endpoint_in_millis() {
        let state = state_with(Arc::new(FakeProvider::new()), ValidityGate::Tolerant, BarShape::Compact);
        let (_, body) = call(state.clone(), "/stats/latency").await;
        for endpoint in ["crumb", "quote_summary", "chart"] {
            assert_eq!(body[endpoint]["samples"], 0, "{endpoint}");
            assert!(body[endpoint]["p50_ms"].is_null(), "{endpoint}");
        }

        state.latency.record_us(UpstreamCall::Chart, 2_000);
        let (status, body) = call(state, "/stats/latency").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chart"]["samples"], 1);
        let p50 = body["chart"]["p50_ms"].as_f64().unwrap();
        assert!((1.99..=2.01).contains(&p50), "p50={p50}");
        assert_eq!(body["quote_summary"]["samples"], 0);
        assert_eq!(body["crumb"]["samples"], 0);
    }

    #[test]
    fn tickers_are_trimmed_and_uppercased() {
        assert_eq!(normalize_ticker("  brk-b "), "BRK-B");
        assert_eq!(normalize_ticker("^gspc"), "^GSPC");
    }
}
