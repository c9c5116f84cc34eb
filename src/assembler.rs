//! Fundamentals assembly: raw info record -> fixed-shape report.

use crate::error::{AppError, Result};
use crate::types::{
    CapitalStructure, Efficiency, FundamentalsReport, Growth, MarketSnapshot, RawInfoRecord,
    Valuation, ValidityGate,
};

/// Provider sentinel for "no such symbol".
const QUOTE_TYPE_NONE: &str = "NONE";
const QUOTE_TYPE_INDEX: &str = "INDEX";

impl ValidityGate {
    /// Whether the record describes a found ticker with usable data.
    pub fn admits(self, info: &RawInfoRecord) -> bool {
        if info.is_empty() || info.get_str("quoteType") == Some(QUOTE_TYPE_NONE) {
            return false;
        }
        match self {
            ValidityGate::Strict => info.is_truthy("marketCap"),
            ValidityGate::Tolerant => {
                info.get_str("quoteType") == Some(QUOTE_TYPE_INDEX)
                    || info.is_truthy("marketCap")
                    || info.is_truthy("regularMarketPrice")
            }
        }
    }
}

/// Gate the record, then assemble. A failed gate is a not-found.
pub fn build_report(
    ticker: &str,
    info: &RawInfoRecord,
    gate: ValidityGate,
) -> Result<FundamentalsReport> {
    if !gate.admits(info) {
        return Err(AppError::NotFound(format!(
            "Ticker '{ticker}' not found or no data available."
        )));
    }
    Ok(assemble(info))
}

/// Map every field independently; a missing source field nulls only itself.
pub fn assemble(info: &RawInfoRecord) -> FundamentalsReport {
    let (net_debt, net_debt_to_ebitda) = net_debt_metrics(
        info.get_f64("totalDebt"),
        info.get_f64("totalCash"),
        info.get_f64("ebitda"),
    );

    FundamentalsReport {
        company_name: info.get_str("longName").map(str::to_string),
        market_data: MarketSnapshot {
            fifty_two_week_high: info.get_f64("fiftyTwoWeekHigh"),
            fifty_two_week_low: info.get_f64("fiftyTwoWeekLow"),
            avg_volume_3_month: info.get_i64("averageDailyVolume3Month"),
            beta: info.get_f64("beta"),
        },
        capital_structure: CapitalStructure {
            market_cap: info.get_i64("marketCap"),
            enterprise_value: info.get_i64("enterpriseValue"),
            net_debt: net_debt.map(|d| d.round() as i64),
            net_debt_to_ebitda,
        },
        valuation: Valuation {
            target_mean_price: info.get_f64("targetMeanPrice"),
            forward_pe: info.get_f64("forwardPE"),
            trailing_pe: info.get_f64("trailingPE"),
            price_to_book: info.get_f64("priceToBook"),
            dividend_yield: info.get_f64("dividendYield"),
        },
        efficiency: Efficiency {
            gross_margin: info.get_f64("grossMargins"),
            ebit_margin: info.get_f64("operatingMargins"),
            roe: info.get_f64("returnOnEquity"),
        },
        growth: Growth {
            revenue_growth: info.get_f64("revenueGrowth"),
            eps_growth: info.get_f64("earningsGrowth"),
        },
        long_business_summary: info.get_str("longBusinessSummary").map(str::to_string),
        sector: info.get_str("sector").map(str::to_string),
        industry: info.get_str("industry").map(str::to_string),
        trailing_annual_dividend_rate: info.get_f64("trailingAnnualDividendRate"),
        ex_dividend_date: info.get_i64("exDividendDate"),
    }
}

/// Returns `(net_debt, net_debt / ebitda)`.
/// The ratio needs a net debt and a non-zero EBITDA.
pub fn net_debt_metrics(
    total_debt: Option<f64>,
    total_cash: Option<f64>,
    ebitda: Option<f64>,
) -> (Option<f64>, Option<f64>) {
    let net_debt = match (total_debt, total_cash) {
        (Some(debt), Some(cash)) => Some(debt - cash),
        _ => None,
    };
    let ratio = match (net_debt, ebitda) {
        (Some(nd), Some(e)) if e != 0.0 => Some(nd / e),
        _ => None,
    };
    (net_debt, ratio)
}
