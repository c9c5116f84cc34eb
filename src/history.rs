//! History transforms: upstream OHLCV rows -> response bars.
//!
//! All transforms are one-to-one and order-preserving. Callers reject empty
//! series before transforming.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use crate::types::{BarShape, ChartBar, DetailedBar, HistorySeries, RawHistoryBar};

/// `(start, end)` in epoch seconds for a window ending at `earliest`.
/// `end` is exclusive; `start` never goes below the epoch. `None` when
/// `earliest` is at or before the epoch, since no bar can precede it.
pub fn lookback_window(earliest: i64, shape: BarShape) -> Option<(i64, i64)> {
    if earliest <= 0 {
        return None;
    }
    let start = earliest.saturating_sub(shape.lookback_secs()).max(0);
    Some((start, earliest))
}

/// Compact bars for the chart widget. Every other column is dropped.
pub fn to_chart_bars(series: &HistorySeries) -> Vec<ChartBar> {
    series
        .rows
        .iter()
        .map(|row| ChartBar {
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            time: row.timestamp,
        })
        .collect()
}

/// Detailed bars. Zero and absent numerics both become `null`, so a
/// genuine zero-volume session is indistinguishable from missing data.
pub fn to_detailed_bars(series: &HistorySeries) -> Vec<DetailedBar> {
    series
        .rows
        .iter()
        .map(|row| DetailedBar {
            date: format_timestamp(row.timestamp, series.utc_offset_secs),
            open: non_zero(row.open),
            high: non_zero(row.high),
            low: non_zero(row.low),
            close: non_zero(row.close),
            volume: row.volume.filter(|v| *v != 0),
        })
        .collect()
}

/// Bars under the provider's own column names, index restored as `Date`
/// (or `Datetime` for intraday series).
pub fn to_raw_bars(series: &HistorySeries) -> Vec<RawHistoryBar> {
    series
        .rows
        .iter()
        .map(|row| {
            let stamp = format_timestamp(row.timestamp, series.utc_offset_secs);
            let (date, datetime) = if series.intraday {
                (None, Some(stamp))
            } else {
                (Some(stamp), None)
            };
            RawHistoryBar {
                date,
                datetime,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume.unwrap_or(0),
                dividends: row.dividends,
                stock_splits: row.stock_splits,
            }
        })
        .collect()
}

/// Most recent close, rounded to cents.
pub fn latest_close(series: &HistorySeries) -> Option<f64> {
    series
        .rows
        .iter()
        .rev()
        .find_map(|row| row.close)
        .map(round_cents)
}

fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn non_zero(x: Option<f64>) -> Option<f64> {
    x.filter(|v| *v != 0.0)
}

/// ISO-8601 in the exchange's offset, e.g. `2025-10-06T00:00:00-04:00`.
pub fn format_timestamp(ts: i64, utc_offset_secs: i32) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp(ts, 0) else {
        return ts.to_string();
    };
    match FixedOffset::east_opt(utc_offset_secs) {
        Some(offset) => utc
            .with_timezone(&offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false),
        None => utc.to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}
