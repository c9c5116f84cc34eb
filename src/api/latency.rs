//! Per-endpoint latency histograms for Yahoo calls.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Longest ceiling we size a histogram for, whatever the configured timeout.
const MAX_CEILING_US: u64 = 3_600 * 1_000_000;

/// Which upstream endpoint a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamCall {
    /// Cookie bootstrap and `getcrumb`.
    Crumb,
    QuoteSummary,
    Chart,
}

impl UpstreamCall {
    pub const ALL: [UpstreamCall; 3] = [Self::Crumb, Self::QuoteSummary, Self::Chart];

    fn slot(self) -> usize {
        match self {
            Self::Crumb => 0,
            Self::QuoteSummary => 1,
            Self::Chart => 2,
        }
    }
}

/// Percentiles for one endpoint, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

/// Shared latency stats. The Yahoo client records, `/stats/latency` reads.
/// Values stored in microseconds, one histogram per [`UpstreamCall`].
pub struct LatencyStats {
    inner: Mutex<[Histogram<u64>; 3]>,
    ceiling_us: u64,
}

impl LatencyStats {
    /// Size the histograms to twice the request timeout. A sample can land a
    /// little past the timeout before reqwest gives up.
    pub fn new(timeout_secs: u64) -> Self {
        let ceiling_us = timeout_secs
            .max(1)
            .saturating_mul(2_000_000)
            .min(MAX_CEILING_US);
        // 2 <= ceiling and 3 sig figs are always accepted bounds.
        let histogram =
            Histogram::new_with_bounds(1, ceiling_us, 3).expect("valid histogram bounds");
        Self {
            inner: Mutex::new([histogram.clone(), histogram.clone(), histogram]),
            ceiling_us,
        }
    }

    pub fn ceiling_us(&self) -> u64 {
        self.ceiling_us
    }

    /// Samples past the ceiling are counted at the ceiling.
    pub fn record_us(&self, call: UpstreamCall, us: u64) {
        if let Ok(mut h) = self.inner.lock() {
            h[call.slot()].saturating_record(us.max(1));
        }
    }

    pub fn record(&self, call: UpstreamCall, d: Duration) {
        let us = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        self.record_us(call, us);
    }

    pub fn summary(&self, call: UpstreamCall) -> LatencySummary {
        let empty = LatencySummary {
            samples: 0,
            p50_ms: None,
            p95_ms: None,
            p99_ms: None,
        };
        let Ok(h) = self.inner.lock() else {
            return empty;
        };
        let h = &h[call.slot()];
        if h.len() == 0 {
            return empty;
        }
        let ms = |q: f64| Some(h.value_at_quantile(q) as f64 / 1_000.0);
        LatencySummary {
            samples: h.len(),
            p50_ms: ms(0.5),
            p95_ms: ms(0.95),
            p99_ms: ms(0.99),
        }
    }
}
