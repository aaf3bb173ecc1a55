//! Canonical metric set and the normalizer that builds it from untrusted
//! provider fields.

use rust_decimal::{Decimal, prelude::*};
use rust_finprim::rate::cagr;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

/// Number of dividend periods considered for the growth rate.
pub const DIVIDEND_HISTORY_PERIODS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    DividendYield,
    DividendGrowth,
    FcfPayout,
    EpsPayout,
    DebtToEbitda,
    InterestCoverage,
    Roic,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::DividendYield,
        Metric::DividendGrowth,
        Metric::FcfPayout,
        Metric::EpsPayout,
        Metric::DebtToEbitda,
        Metric::InterestCoverage,
        Metric::Roic,
    ];

    /// KPIs gated by thresholds, independent of role matching.
    pub const CORE: [Metric; 5] = [
        Metric::FcfPayout,
        Metric::EpsPayout,
        Metric::DebtToEbitda,
        Metric::InterestCoverage,
        Metric::Roic,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Metric::DividendYield => "dividendYield",
            Metric::DividendGrowth => "dividendGrowth",
            Metric::FcfPayout => "fcfPayout",
            Metric::EpsPayout => "epsPayout",
            Metric::DebtToEbitda => "debtToEbitda",
            Metric::InterestCoverage => "interestCoverage",
            Metric::Roic => "roic",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::DividendYield => "Dividend Yield",
            Metric::DividendGrowth => "Dividend Growth",
            Metric::FcfPayout => "FCF Payout",
            Metric::EpsPayout => "EPS Payout",
            Metric::DebtToEbitda => "Debt / EBITDA",
            Metric::InterestCoverage => "Interest Coverage",
            Metric::Roic => "ROIC",
        }
    }

    /// Ratios shown as percentages; the rest are multiples.
    pub fn is_percentage(&self) -> bool {
        !matches!(self, Metric::DebtToEbitda | Metric::InterestCoverage)
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown metric: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: Option<f64>,
    #[serde(rename = "asOf", default)]
    pub as_of: String,
    #[serde(default)]
    pub source: String,
}

impl MetricValue {
    pub fn new(value: Option<f64>, as_of: &str, source: &str) -> Self {
        Self {
            value: value.filter(|v| v.is_finite()),
            as_of: as_of.to_string(),
            source: source.to_string(),
        }
    }

    pub fn missing(as_of: &str, source: &str) -> Self {
        Self::new(None, as_of, source)
    }
}

/// All seven canonical metrics, each with a possibly-null value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Metric, MetricValue>", into = "BTreeMap<Metric, MetricValue>")]
pub struct MetricSet {
    values: BTreeMap<Metric, MetricValue>,
}

impl MetricSet {
    pub fn empty(as_of: &str, source: &str) -> Self {
        let values = Metric::ALL
            .into_iter()
            .map(|m| (m, MetricValue::missing(as_of, source)))
            .collect();
        Self { values }
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).and_then(|v| v.value)
    }

    pub fn get(&self, metric: Metric) -> Option<&MetricValue> {
        self.values.get(&metric)
    }

    pub fn set(&mut self, metric: Metric, value: MetricValue) {
        let value = MetricValue {
            value: value.value.filter(|v| v.is_finite()),
            ..value
        };
        self.values.insert(metric, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Metric, &MetricValue)> {
        self.values.iter()
    }

    /// Builds a set from plain values, leaving absent metrics null.
    pub fn from_values<I>(values: I, as_of: &str, source: &str) -> Self
    where
        I: IntoIterator<Item = (Metric, Option<f64>)>,
    {
        let mut set = Self::empty(as_of, source);
        for (metric, value) in values {
            set.set(metric, MetricValue::new(value, as_of, source));
        }
        set
    }
}

impl From<BTreeMap<Metric, MetricValue>> for MetricSet {
    fn from(map: BTreeMap<Metric, MetricValue>) -> Self {
        let mut set = MetricSet::empty("", "");
        for (metric, value) in map {
            set.set(metric, value);
        }
        set
    }
}

impl From<MetricSet> for BTreeMap<Metric, MetricValue> {
    fn from(set: MetricSet) -> Self {
        set.values
    }
}

/// Raw provider fields before coercion. Every field is untrusted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFundamentals {
    pub dividend_yield: Option<Value>,
    pub payout_ratio: Option<Value>,
    pub free_cash_flow: Option<Value>,
    /// Most recent period first.
    pub dividends_paid: Vec<Value>,
    pub total_debt: Option<Value>,
    pub ebitda: Option<Value>,
    pub operating_income: Option<Value>,
    pub interest_expense: Option<Value>,
    pub interest_coverage: Option<Value>,
    pub return_on_invested_capital: Option<Value>,
    pub return_on_equity: Option<Value>,
}

/// Coerces an untyped value into a finite number.
///
/// Accepts JSON numbers, numeric strings and Yahoo style `{"raw": x}`
/// wrappers. Anything else yields `None`.
pub fn safe_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        Value::Object(map) => map.get("raw").and_then(safe_number),
        _ => None,
    }
}

fn opt_number(value: &Option<Value>) -> Option<f64> {
    value.as_ref().and_then(safe_number)
}

pub fn safe_divide(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d).filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Compound annual growth of dividends paid, most recent period first.
pub fn dividend_cagr(history: &[Value]) -> Option<f64> {
    let points: Vec<f64> = history
        .iter()
        .take(DIVIDEND_HISTORY_PERIODS)
        .filter_map(safe_number)
        .filter(|v| *v > 0.0)
        .collect();

    if points.len() < 2 {
        return None;
    }

    let latest = Decimal::from_f64(*points.first()?)?;
    let earliest = Decimal::from_f64(*points.last()?)?;
    let years = Decimal::from(points.len() - 1);

    // Ratios beyond Decimal range would overflow inside cagr.
    latest.checked_div(earliest)?;

    let rate = cagr(earliest, latest, years);
    debug!("dividend cagr: {earliest} -> {latest} over {years}y = {rate}");
    rate.to_f64().filter(|v| v.is_finite())
}

/// Builds the canonical metric set from raw provider fields.
pub fn normalize(raw: &RawFundamentals, as_of: &str, source: &str) -> MetricSet {
    let latest_dividends = raw
        .dividends_paid
        .first()
        .and_then(safe_number)
        .map(f64::abs);
    let fcf_payout = safe_divide(latest_dividends, opt_number(&raw.free_cash_flow));

    let debt_to_ebitda = safe_divide(opt_number(&raw.total_debt), opt_number(&raw.ebitda));

    let interest_coverage = opt_number(&raw.interest_coverage).or_else(|| {
        safe_divide(
            opt_number(&raw.operating_income),
            opt_number(&raw.interest_expense).map(f64::abs),
        )
    });

    let roic = opt_number(&raw.return_on_invested_capital)
        .or_else(|| opt_number(&raw.return_on_equity));

    MetricSet::from_values(
        [
            (Metric::DividendYield, opt_number(&raw.dividend_yield)),
            (Metric::DividendGrowth, dividend_cagr(&raw.dividends_paid)),
            (Metric::FcfPayout, fcf_payout),
            (Metric::EpsPayout, opt_number(&raw.payout_ratio)),
            (Metric::DebtToEbitda, debt_to_ebitda),
            (Metric::InterestCoverage, interest_coverage),
            (Metric::Roic, roic),
        ],
        as_of,
        source,
    )
}
