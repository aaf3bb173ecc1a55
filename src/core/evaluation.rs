//! Applies rule thresholds to a metric set.
use crate::core::metrics::{Metric, MetricSet};
use crate::core::rules::{RoleRange, RuleSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiStatus {
    Success,
    Fail,
    Neutral,
}

impl Display for KpiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                KpiStatus::Success => "success",
                KpiStatus::Fail => "fail",
                KpiStatus::Neutral => "neutral",
            }
        )
    }
}

/// Overall verdict over the core KPIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Good,
    Watch,
    Critical,
}

impl Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Rating::Good => "Good",
                Rating::Watch => "Watch",
                Rating::Critical => "Critical",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub role: Option<String>,
    pub kpi_statuses: BTreeMap<Metric, KpiStatus>,
}

impl Evaluation {
    pub fn status(&self, metric: Metric) -> KpiStatus {
        self.kpi_statuses
            .get(&metric)
            .copied()
            .unwrap_or(KpiStatus::Neutral)
    }

    /// Two or more failing core KPIs are critical; one failure or any
    /// unknown core KPI means watch.
    pub fn rating(&self) -> Rating {
        let statuses = Metric::CORE.map(|m| self.status(m));
        let failed = statuses.iter().filter(|s| **s == KpiStatus::Fail).count();
        let unknown = statuses.iter().any(|s| *s == KpiStatus::Neutral);

        if failed >= 2 {
            Rating::Critical
        } else if failed == 1 || unknown {
            Rating::Watch
        } else {
            Rating::Good
        }
    }
}

pub fn compare_max(value: Option<f64>, threshold: Option<f64>) -> KpiStatus {
    match (value, threshold) {
        (Some(v), Some(t)) if v <= t => KpiStatus::Success,
        (Some(_), Some(_)) => KpiStatus::Fail,
        _ => KpiStatus::Neutral,
    }
}

pub fn compare_min(value: Option<f64>, threshold: Option<f64>) -> KpiStatus {
    match (value, threshold) {
        (Some(v), Some(t)) if v >= t => KpiStatus::Success,
        (Some(_), Some(_)) => KpiStatus::Fail,
        _ => KpiStatus::Neutral,
    }
}

/// Inclusive range check; a missing bound is open, a missing value never matches.
fn within(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    match value {
        Some(v) => min.is_none_or(|m| v >= m) && max.is_none_or(|m| v <= m),
        None => false,
    }
}

fn range_status(in_range: bool) -> KpiStatus {
    if in_range {
        KpiStatus::Success
    } else {
        KpiStatus::Fail
    }
}

fn fallback_status(value: Option<f64>) -> KpiStatus {
    if value.is_some() {
        KpiStatus::Success
    } else {
        KpiStatus::Neutral
    }
}

/// Classifies a stock into the first matching role and grades each KPI.
///
/// Roles are tried in declared order. When none matches, the yield and
/// growth statuses reflect the range check of the last role tried.
pub fn evaluate(metrics: &MetricSet, rules: &RuleSet) -> Evaluation {
    let thresholds = &rules.kpi_thresholds;
    let mut statuses = BTreeMap::new();

    statuses.insert(
        Metric::FcfPayout,
        compare_max(metrics.value(Metric::FcfPayout), thresholds.fcf_payout_max),
    );
    statuses.insert(
        Metric::EpsPayout,
        compare_max(metrics.value(Metric::EpsPayout), thresholds.eps_payout_max),
    );
    statuses.insert(
        Metric::DebtToEbitda,
        compare_max(
            metrics.value(Metric::DebtToEbitda),
            thresholds.debt_to_ebitda_max,
        ),
    );
    statuses.insert(
        Metric::InterestCoverage,
        compare_min(
            metrics.value(Metric::InterestCoverage),
            thresholds.interest_coverage_min,
        ),
    );
    statuses.insert(
        Metric::Roic,
        compare_min(metrics.value(Metric::Roic), thresholds.roic_min),
    );

    let core_failed = Metric::CORE
        .iter()
        .any(|m| statuses.get(m) == Some(&KpiStatus::Fail));

    let dividend_yield = metrics.value(Metric::DividendYield);
    let dividend_growth = metrics.value(Metric::DividendGrowth);
    let mut yield_status = KpiStatus::Neutral;
    let mut growth_status = KpiStatus::Neutral;
    let mut matched = None;

    for role in &rules.roles {
        let RoleRange {
            dividend_yield_min,
            dividend_yield_max,
            dividend_growth_min,
            dividend_growth_max,
        } = role.range;
        let yield_ok = within(dividend_yield, dividend_yield_min, dividend_yield_max);
        let growth_ok = within(dividend_growth, dividend_growth_min, dividend_growth_max);

        if yield_ok && growth_ok && !core_failed {
            debug!(role = %role.name, "Role matched");
            yield_status = KpiStatus::Success;
            growth_status = KpiStatus::Success;
            matched = Some(role.name.clone());
            break;
        }

        yield_status = range_status(yield_ok);
        growth_status = range_status(growth_ok);
    }

    if matched.is_none()
        && yield_status == KpiStatus::Neutral
        && growth_status == KpiStatus::Neutral
    {
        yield_status = fallback_status(dividend_yield);
        growth_status = fallback_status(dividend_growth);
    }

    statuses.insert(Metric::DividendYield, yield_status);
    statuses.insert(Metric::DividendGrowth, growth_status);

    Evaluation {
        role: matched,
        kpi_statuses: statuses,
    }
}
