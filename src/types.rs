use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{COMPACT_LOOKBACK_SECS, DETAILED_LOOKBACK_SECS};

// ---------------------------------------------------------------------------
// Raw upstream records
// ---------------------------------------------------------------------------

/// Flat snapshot of provider-defined fields for one symbol.
///
/// The key set depends on the instrument type, so every accessor treats a
/// missing key, a JSON `null` and a value of the wrong JSON type the same
/// way: `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawInfoRecord(Map<String, Value>);

impl RawInfoRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_f64().filter(|f| f.is_finite())
    }

    /// Integral read. Floats with a fractional part are rounded.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        let v = self.get(key)?;
        v.as_i64().or_else(|| {
            v.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.round() as i64)
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Present and not zero, empty or false.
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.get(key) {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::Null) => false,
        }
    }
}

impl From<Map<String, Value>> for RawInfoRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// What slice of history to request from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryRange {
    /// Provider-relative span ending now, e.g. `1y` of `1d` bars.
    Period { period: String, interval: String },
    /// Absolute window in epoch seconds, `end` exclusive.
    Window { start: i64, end: i64, interval: String },
}

impl HistoryRange {
    pub fn period(period: impl Into<String>, interval: impl Into<String>) -> Self {
        HistoryRange::Period {
            period: period.into(),
            interval: interval.into(),
        }
    }

    pub fn window(start: i64, end: i64, interval: impl Into<String>) -> Self {
        HistoryRange::Window {
            start,
            end,
            interval: interval.into(),
        }
    }

    pub fn interval(&self) -> &str {
        match self {
            HistoryRange::Period { interval, .. } | HistoryRange::Window { interval, .. } => {
                interval
            }
        }
    }
}

/// One upstream OHLCV row.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    /// Epoch seconds. Daily-or-longer bars sit on exchange-local midnight.
    pub timestamp: i64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
    pub dividends: f64,
    pub stock_splits: f64,
}

impl HistoryRow {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            dividends: 0.0,
            stock_splits: 0.0,
        }
    }
}

/// Ordered (ascending time) series of rows for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySeries {
    pub rows: Vec<HistoryRow>,
    /// Exchange offset from UTC, used when rendering dates.
    pub utc_offset_secs: i32,
    /// Bars finer than one day are keyed `Datetime` instead of `Date`.
    pub intraday: bool,
}

impl HistorySeries {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

// ---------------------------------------------------------------------------
// Fundamentals report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketSnapshot {
    #[serde(rename = "52 Week High")]
    pub fifty_two_week_high: Option<f64>,
    #[serde(rename = "52 Week Low")]
    pub fifty_two_week_low: Option<f64>,
    #[serde(rename = "Avg. 3 Month Volume")]
    pub avg_volume_3_month: Option<i64>,
    #[serde(rename = "Beta")]
    pub beta: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapitalStructure {
    #[serde(rename = "Market Cap")]
    pub market_cap: Option<i64>,
    #[serde(rename = "Enterprise Value")]
    pub enterprise_value: Option<i64>,
    /// Derived: total debt minus total cash.
    #[serde(rename = "LTM Net Debt")]
    pub net_debt: Option<i64>,
    /// Derived: net debt over EBITDA.
    #[serde(rename = "LTM Net Debt/EBITDA")]
    pub net_debt_to_ebitda: Option<f64>,
}

/// Ratios, not percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Efficiency {
    #[serde(rename = "LTM Gross Margin")]
    pub gross_margin: Option<f64>,
    #[serde(rename = "LTM EBIT Margin")]
    pub ebit_margin: Option<f64>,
    #[serde(rename = "LTM ROE")]
    pub roe: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Growth {
    #[serde(rename = "LTM Rev. Growth")]
    pub revenue_growth: Option<f64>,
    #[serde(rename = "LTM EPS Growth")]
    pub eps_growth: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Valuation {
    #[serde(rename = "Street Target Price")]
    pub target_mean_price: Option<f64>,
    #[serde(rename = "NTM P/E")]
    pub forward_pe: Option<f64>,
    #[serde(rename = "LTM P/E")]
    pub trailing_pe: Option<f64>,
    #[serde(rename = "LTM P/B")]
    pub price_to_book: Option<f64>,
    #[serde(rename = "Dividend Yield")]
    pub dividend_yield: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundamentalsReport {
    pub company_name: Option<String>,
    pub market_data: MarketSnapshot,
    pub capital_structure: CapitalStructure,
    pub valuation: Valuation,
    pub efficiency: Efficiency,
    pub growth: Growth,
    pub long_business_summary: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub trailing_annual_dividend_rate: Option<f64>,
    /// Epoch seconds.
    pub ex_dividend_date: Option<i64>,
}

// ---------------------------------------------------------------------------
// Bars
// ---------------------------------------------------------------------------

/// Chart-library bar: lowercase keys, epoch-seconds `time`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartBar {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub time: i64,
}

/// Full-detail bar. Zero or absent numerics serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetailedBar {
    /// ISO-8601 with exchange offset.
    pub date: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

/// Bar as the provider names its columns, with the time index restored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawHistoryBar {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: u64,
    pub dividends: f64,
    #[serde(rename = "Stock Splits")]
    pub stock_splits: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub ticker: String,
    pub history: Vec<RawHistoryBar>,
}

/// Unshaped snapshot pass-through.
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub info: RawInfoRecord,
}

// ---------------------------------------------------------------------------
// Behavior switches
// ---------------------------------------------------------------------------

/// Decides whether an info record counts as "ticker found".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityGate {
    /// Requires a market cap. Rejects indices.
    Strict,
    /// Accepts indices, or anything with a market cap or a market price.
    Tolerant,
}

impl std::str::FromStr for ValidityGate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ValidityGate::Strict),
            "tolerant" => Ok(ValidityGate::Tolerant),
            other => Err(format!("unknown validity gate '{other}' (expected strict or tolerant)")),
        }
    }
}

impl std::fmt::Display for ValidityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidityGate::Strict => "strict",
            ValidityGate::Tolerant => "tolerant",
        };
        write!(f, "{s}")
    }
}

/// Output shape of the windowed history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarShape {
    /// `{open, high, low, close, time}` over ~30 days.
    Compact,
    /// `{Date, Open, High, Low, Close, Volume}` over ~90 days.
    Detailed,
}

impl BarShape {
    pub fn lookback_secs(self) -> i64 {
        match self {
            BarShape::Compact => COMPACT_LOOKBACK_SECS,
            BarShape::Detailed => DETAILED_LOOKBACK_SECS,
        }
    }
}

impl std::str::FromStr for BarShape {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(BarShape::Compact),
            "detailed" => Ok(BarShape::Detailed),
            other => Err(format!("unknown bar shape '{other}' (expected compact or detailed)")),
        }
    }
}

impl std::fmt::Display for BarShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BarShape::Compact => "compact",
            BarShape::Detailed => "detailed",
        };
        write!(f, "{s}")
    }
}
